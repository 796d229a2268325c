//! Passive API server hunters.
//!
//! Both hunters trigger on [`EventKind::ApiServerFound`] and run the same
//! read-only sequence: access check, namespaces, pods, roles and (with a
//! token) cluster roles. Each run ends with exactly one
//! [`EventKind::PassiveHuntFinished`] listing the namespaces it saw.

use std::sync::Arc;

use async_trait::async_trait;
use kubehunt_events::{EventBus, EventKind, EventPayload, HuntEvent, PodRef};
use tracing::{debug, info, warn};

use crate::api::{
    API_PATH, CLUSTER_ROLES_PATH, NAMESPACES_PATH, ObjectList, PODS_PATH, ROLES_PATH,
};
use crate::client::{ApiClient, ApiSession};
use crate::error::HuntResult;
use crate::hunter::{Hunter, PassiveHunter};

const SEED: &[EventKind] = &[EventKind::ApiServerFound];

/// Probes the API server without credentials.
pub struct AccessApiServer {
    event: Arc<HuntEvent>,
    client: ApiClient,
}

#[async_trait]
impl Hunter for AccessApiServer {
    const NAME: &'static str = "access_api_server";

    fn from_event(event: Arc<HuntEvent>, client: ApiClient) -> Self {
        Self { event, client }
    }

    async fn execute(self, bus: &EventBus) -> HuntResult<()> {
        let session = self.client.session(&self.event.target, None)?;
        PassiveRun {
            trigger: &self.event,
            session,
            credential: None,
            source: Self::NAME,
            bus,
        }
        .run(false)
        .await;
        Ok(())
    }
}

impl PassiveHunter for AccessApiServer {
    fn subscriptions() -> &'static [EventKind] {
        SEED
    }
}

/// Probes the API server with the seed's service account token.
pub struct AccessApiServerWithToken {
    event: Arc<HuntEvent>,
    client: ApiClient,
}

#[async_trait]
impl Hunter for AccessApiServerWithToken {
    const NAME: &'static str = "access_api_server_with_token";

    fn from_event(event: Arc<HuntEvent>, client: ApiClient) -> Self {
        Self { event, client }
    }

    async fn execute(self, bus: &EventBus) -> HuntResult<()> {
        let credential = self.event.credential().map(ToString::to_string);
        let session = match self.client.session(&self.event.target, credential.as_deref()) {
            Ok(session) => session,
            Err(e) => {
                warn!(hunter = Self::NAME, error = %e, "Credential unusable; nothing probed");
                // The run still ends with its (empty) aggregate
                bus.publish(HuntEvent::derive(
                    &self.event,
                    Self::NAME,
                    credential,
                    EventPayload::PassiveHuntFinished {
                        namespaces: Vec::new(),
                    },
                ));
                return Err(e);
            },
        };
        PassiveRun {
            trigger: &self.event,
            session,
            credential,
            source: Self::NAME,
            bus,
        }
        .run(true)
        .await;
        Ok(())
    }
}

impl PassiveHunter for AccessApiServerWithToken {
    fn subscriptions() -> &'static [EventKind] {
        SEED
    }

    fn accepts(event: &HuntEvent) -> bool {
        event.credential().is_some()
    }
}

/// State of one passive run. Owns the namespace aggregate.
struct PassiveRun<'a> {
    trigger: &'a HuntEvent,
    session: ApiSession,
    credential: Option<String>,
    source: &'static str,
    bus: &'a EventBus,
}

impl PassiveRun<'_> {
    async fn run(self, include_cluster_roles: bool) {
        self.access_api().await;

        let namespaces = self.list_names(NAMESPACES_PATH).await;
        if !namespaces.is_empty() {
            self.publish(EventPayload::NamespacesListed {
                namespaces: namespaces.clone(),
            });
        }

        let pods = self.list_pods().await;
        if !pods.is_empty() {
            self.publish(EventPayload::PodsListed { pods });
        }

        let roles = self.list_names(ROLES_PATH).await;
        if !roles.is_empty() {
            self.publish(EventPayload::RolesListed { roles });
        }

        if include_cluster_roles {
            let cluster_roles = self.list_names(CLUSTER_ROLES_PATH).await;
            if !cluster_roles.is_empty() {
                self.publish(EventPayload::ClusterRolesListed { cluster_roles });
            }
        }

        info!(
            hunter = self.source,
            namespaces = namespaces.len(),
            "Passive hunt finished"
        );
        self.publish(EventPayload::PassiveHuntFinished { namespaces });
    }

    async fn access_api(&self) {
        match self.session.get_text(API_PATH).await {
            Ok(response) => self.publish(EventPayload::ApiServerAccess { response }),
            Err(e) => debug!(error = %e, "No access to API"),
        }
    }

    async fn list(&self, path: &str) -> Option<ObjectList> {
        match self.session.get_json::<ObjectList>(path).await {
            Ok(list) => Some(list),
            Err(e) => {
                debug!(path, error = %e, "Nothing found");
                None
            },
        }
    }

    async fn list_names(&self, path: &str) -> Vec<String> {
        self.list(path)
            .await
            .map(|list| list.names())
            .unwrap_or_default()
    }

    async fn list_pods(&self) -> Vec<PodRef> {
        let Some(list) = self.list(PODS_PATH).await else {
            return Vec::new();
        };
        list.items
            .into_iter()
            .filter_map(|item| {
                let name = item.metadata.name?;
                Some(PodRef::new(name, item.metadata.namespace.unwrap_or_default()))
            })
            .collect()
    }

    fn publish(&self, payload: EventPayload) {
        let event =
            HuntEvent::derive(self.trigger, self.source, self.credential.clone(), payload);
        debug!(event_kind = %event.kind(), "Finding published");
        self.bus.publish(event);
    }
}
