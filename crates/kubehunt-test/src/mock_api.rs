//! Mock cluster API server built on `wiremock`.

use kubehunt_events::Target;
use serde_json::Value;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use crate::fixtures::{empty_list_body, named_list_body, pods_body};

/// Path of the cluster role collection.
pub const CLUSTER_ROLES_PATH: &str = "/apis/rbac.authorization.k8s.io/v1/clusterroles";

/// A local HTTP server answering like a cluster API.
///
/// Requests that match no mounted mock get a 404.
pub struct MockApiServer {
    server: MockServer,
}

impl std::fmt::Debug for MockApiServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockApiServer")
            .field("uri", &self.server.uri())
            .finish()
    }
}

impl MockApiServer {
    /// Start a server on a random local port.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URI of the server.
    #[must_use]
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// The server as a scan target (plain HTTP).
    #[must_use]
    pub fn target(&self) -> Target {
        let address = self.server.address();
        Target::new(address.ip().to_string(), Some(address.port()), "http")
    }

    /// The underlying `wiremock` server, for custom mocks.
    #[must_use]
    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    /// Answer `verb` on exactly `route` with `status` and a JSON body.
    pub async fn mock_json(&self, verb: &str, route: &str, status: u16, body: Value) {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answer `verb` on paths matching `pattern` with `status` and a JSON body.
    pub async fn mock_json_matching(&self, verb: &str, pattern: &str, status: u16, body: Value) {
        Mock::given(method(verb))
            .and(path_regex(pattern))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answer `verb` on `route` with `status` and a plain-text body.
    pub async fn mock_text(&self, verb: &str, route: &str, status: u16, body: &str) {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Answer `verb` on `route` with a bare status.
    pub async fn mock_status(&self, verb: &str, route: &str, status: u16) {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Mount the passive-phase cluster used across tests.
    ///
    /// `/api` answers `{}`, one namespace `hello`, pods `podA/namespaceA`
    /// and `podB/namespaceB`, roles are forbidden, and the cluster role
    /// list holds `cluster_roles`.
    pub async fn mount_passive_cluster(&self, cluster_roles: &[&str]) {
        self.mock_json("GET", "/api", 200, serde_json::json!({})).await;
        self.mock_json("GET", "/api/v1/namespaces", 200, named_list_body(&["hello"]))
            .await;
        self.mock_json(
            "GET",
            "/api/v1/pods",
            200,
            pods_body(&[("podA", "namespaceA"), ("podB", "namespaceB")]),
        )
        .await;
        self.mock_status("GET", "/apis/rbac.authorization.k8s.io/v1/roles", 403)
            .await;
        let cluster_role_body = if cluster_roles.is_empty() {
            empty_list_body()
        } else {
            named_list_body(cluster_roles)
        };
        self.mock_json("GET", CLUSTER_ROLES_PATH, 200, cluster_role_body)
            .await;
    }

    /// Every request received so far.
    pub async fn requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Requests received for `verb` on `route`.
    pub async fn requests_to(&self, verb: &str, route: &str) -> Vec<Request> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.method.as_str() == verb && r.url.path() == route)
            .collect()
    }

    /// Whether any received request carried an `Authorization` header.
    pub async fn saw_authorization(&self) -> bool {
        self.requests()
            .await
            .iter()
            .any(|r| r.headers.contains_key("authorization"))
    }

    /// `Authorization` header values received, in arrival order.
    pub async fn authorization_values(&self) -> Vec<String> {
        self.requests()
            .await
            .iter()
            .filter_map(|r| r.headers.get("authorization"))
            .filter_map(|v| v.to_str().ok().map(ToString::to_string))
            .collect()
    }
}
