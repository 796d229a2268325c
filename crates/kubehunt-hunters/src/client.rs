//! HTTP client for the cluster API.

use std::fmt;
use std::time::Duration;

use kubehunt_events::Target;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{HuntError, HuntResult};

/// Content type for JSON patch documents.
pub const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: true,
            user_agent: format!("kubehunt/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable TLS certificate verification.
    #[must_use]
    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Shared HTTP client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
}

impl ApiClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns [`HuntError::Client`] if the TLS backend cannot be set up.
    pub fn new(config: &ClientConfig) -> HuntResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| HuntError::Client(e.to_string()))?;
        Ok(Self { http })
    }

    /// Open a session against `target`, optionally authenticated.
    ///
    /// # Errors
    ///
    /// Returns [`HuntError::InvalidCredential`] if the credential contains
    /// characters not allowed in a header.
    pub fn session(&self, target: &Target, credential: Option<&str>) -> HuntResult<ApiSession> {
        let authorization = credential
            .map(|token| {
                let mut value = HeaderValue::try_from(format!("Bearer {token}"))
                    .map_err(|e| HuntError::InvalidCredential(e.to_string()))?;
                value.set_sensitive(true);
                Ok::<_, HuntError>(value)
            })
            .transpose()?;

        Ok(ApiSession {
            http: self.http.clone(),
            base_url: target.base_url(),
            authorization,
        })
    }
}

/// Requests against one target with one identity.
#[derive(Clone)]
pub struct ApiSession {
    http: Client,
    base_url: String,
    authorization: Option<HeaderValue>,
}

impl fmt::Debug for ApiSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSession")
            .field("base_url", &self.base_url)
            .field("has_credential", &self.authorization.is_some())
            .finish_non_exhaustive()
    }
}

impl ApiSession {
    /// Base URL requests are made against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether requests carry a bearer token.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authorization.is_some()
    }

    /// `GET` a path and return the raw body.
    ///
    /// # Errors
    ///
    /// Returns a transport or status error.
    pub async fn get_text(&self, path: &str) -> HuntResult<String> {
        self.send(Method::GET, path, None).await
    }

    /// `GET` a path and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns a transport, status or decode error.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> HuntResult<T> {
        let body = self.send(Method::GET, path, None).await?;
        self.decode(path, &body)
    }

    /// `POST` a JSON document.
    ///
    /// `Ok(None)` means the server accepted the request but the body did
    /// not decode as `T`.
    ///
    /// # Errors
    ///
    /// Returns a transport or status error.
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        document: &Value,
    ) -> HuntResult<Option<T>> {
        let body = self
            .send(Method::POST, path, Some((document, "application/json")))
            .await?;
        Ok(self.decode_accepted(path, &body))
    }

    /// `PATCH` with a JSON patch document.
    ///
    /// `Ok(None)` means the server accepted the patch but the body did not
    /// decode as `T`.
    ///
    /// # Errors
    ///
    /// Returns a transport or status error.
    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        patch: &Value,
    ) -> HuntResult<Option<T>> {
        let body = self
            .send(Method::PATCH, path, Some((patch, JSON_PATCH_CONTENT_TYPE)))
            .await?;
        Ok(self.decode_accepted(path, &body))
    }

    /// `DELETE` a path.
    ///
    /// `Ok(None)` means the server accepted the deletion but the body did
    /// not decode as `T`.
    ///
    /// # Errors
    ///
    /// Returns a transport or status error.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> HuntResult<Option<T>> {
        let body = self.send(Method::DELETE, path, None).await?;
        Ok(self.decode_accepted(path, &body))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.http.request(method, url);
        match &self.authorization {
            Some(value) => request.header(AUTHORIZATION, value.clone()),
            None => request,
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<(&Value, &str)>,
    ) -> HuntResult<String> {
        let url = self.url(path);
        trace!(
            method = %method,
            url = %url,
            authenticated = self.is_authenticated(),
            "Sending request"
        );

        let mut request = self.request(method.clone(), &url);
        if let Some((document, content_type)) = body {
            request = request
                .header(CONTENT_TYPE, content_type)
                .body(document.to_string());
        }

        let response = request.send().await.map_err(|e| {
            debug!(method = %method, url = %url, error = %e, "Request failed");
            HuntError::Transport {
                url: url.clone(),
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            debug!(method = %method, url = %url, status = %status, "Request rejected");
            return Err(HuntError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| HuntError::Transport {
            url,
            message: e.to_string(),
        })
    }

    fn decode<T: DeserializeOwned>(&self, path: &str, body: &str) -> HuntResult<T> {
        serde_json::from_str(body).map_err(|e| HuntError::Decode {
            url: self.url(path),
            message: e.to_string(),
        })
    }

    fn decode_accepted<T: DeserializeOwned>(&self, path: &str, body: &str) -> Option<T> {
        self.decode(path, body)
            .inspect_err(|e| debug!(error = %e, "Accepted response body did not decode"))
            .ok()
    }
}
