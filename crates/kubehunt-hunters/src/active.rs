//! Active API server hunting.
//!
//! Active hunters change remote state. They are never subscribable: the
//! only way to build one is [`ApiServerActiveHunter::new`], which requires
//! an [`ActiveAuthorization`] obtained from an explicit operator decision.

use std::sync::Arc;

use chrono::Utc;
use kubehunt_events::{EventBus, EventKind, EventPayload, HuntEvent, PodRef};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{
    CLUSTER_ROLES_PATH, NAMESPACES_PATH, Object, cluster_role_manifest, cluster_role_path,
    namespace_manifest, namespace_path, namespaced_pods_path, namespaced_roles_path, pod_manifest,
    pod_path, probe_label_patch, role_manifest, role_path,
};
use crate::client::{ApiClient, ApiSession};
use crate::error::{HuntError, HuntResult};

/// Prefix of every object the active hunter creates.
pub const DEFAULT_NAMESPACE_PREFIX: &str = "kubehunt-";

/// Proof that an operator opted in to state-changing probes.
///
/// There is no `Default` and no way to build one implicitly.
#[derive(Debug, Clone)]
pub struct ActiveAuthorization {
    reason: String,
}

impl ActiveAuthorization {
    /// Grant authorization, recording why.
    #[must_use]
    pub fn grant(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(reason = %reason, "Active hunting authorized");
        Self { reason }
    }

    /// Grant authorization only when `enabled` is set.
    #[must_use]
    pub fn from_flag(enabled: bool, reason: impl Into<String>) -> Option<Self> {
        enabled.then(|| Self::grant(reason))
    }

    /// Why authorization was granted.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Creates, patches and deletes objects to confirm write access.
///
/// Triggered by a [`EventKind::PassiveHuntFinished`] aggregate. Probes run
/// in the namespace it creates and in every namespace the passive phase
/// saw. The created namespace is always deleted at the end.
pub struct ApiServerActiveHunter {
    event: Arc<HuntEvent>,
    client: ApiClient,
    namespace_prefix: String,
}

impl std::fmt::Debug for ApiServerActiveHunter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiServerActiveHunter")
            .field("event", &self.event)
            .field("namespace_prefix", &self.namespace_prefix)
            .finish_non_exhaustive()
    }
}

impl ApiServerActiveHunter {
    /// Source name of derived events.
    pub const NAME: &'static str = "api_server_active_hunter";

    /// Bind an active hunter to a passive-phase aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`HuntError::UnexpectedTrigger`] for any other event kind.
    pub fn new(
        event: Arc<HuntEvent>,
        client: ApiClient,
        authorization: &ActiveAuthorization,
        namespace_prefix: impl Into<String>,
    ) -> HuntResult<Self> {
        if event.kind() != EventKind::PassiveHuntFinished {
            return Err(HuntError::UnexpectedTrigger {
                expected: EventKind::PassiveHuntFinished,
                actual: event.kind(),
            });
        }
        debug!(
            reason = authorization.reason(),
            target = %event.target,
            "Active hunter created"
        );
        Ok(Self {
            event,
            client,
            namespace_prefix: namespace_prefix.into(),
        })
    }

    /// Run every probe and clean up.
    ///
    /// # Errors
    ///
    /// Returns [`HuntError::Cleanup`] if the created namespace could not be
    /// deleted, or the namespace creation error when nothing succeeded.
    pub async fn execute(self, bus: &EventBus) -> HuntResult<()> {
        let credential = self.event.credential().map(ToString::to_string);
        let session = self.client.session(&self.event.target, credential.as_deref())?;
        let mut run = ActiveRun {
            trigger: &self.event,
            session,
            credential,
            bus,
            suffix: random_suffix(),
            prefix: &self.namespace_prefix,
            published: 0,
        };

        info!(target = %self.event.target, "Active hunt started");

        let created = run.create_namespace().await;

        run.probe_cluster_role().await;
        for namespace in run.target_namespaces(created.as_ref().ok()) {
            run.probe_pods(&namespace).await;
            run.probe_role(&namespace).await;
        }

        let outcome = match created {
            Ok(name) => run.delete_namespace(&name).await,
            Err(e) if run.published == 0 => Err(e),
            Err(_) => Ok(()),
        };

        info!(findings = run.published, ok = outcome.is_ok(), "Active hunt finished");
        outcome
    }
}

struct ActiveRun<'a> {
    trigger: &'a HuntEvent,
    session: ApiSession,
    credential: Option<String>,
    bus: &'a EventBus,
    suffix: String,
    prefix: &'a str,
    published: usize,
}

impl ActiveRun<'_> {
    fn object_name(&self, kind: &str) -> String {
        format!("{}{kind}-{}", self.prefix, self.suffix)
    }

    fn publish(&mut self, payload: EventPayload) {
        let event = HuntEvent::derive(
            self.trigger,
            ApiServerActiveHunter::NAME,
            self.credential.clone(),
            payload,
        );
        debug!(event_kind = %event.kind(), "Finding published");
        self.bus.publish(event);
        self.published = self.published.saturating_add(1);
    }

    /// Created namespace first, then the aggregate's, without repeats.
    fn target_namespaces(&self, created: Option<&String>) -> Vec<String> {
        let mut namespaces: Vec<String> = created.into_iter().cloned().collect();
        if let EventPayload::PassiveHuntFinished { namespaces: seen } = &self.trigger.payload {
            for namespace in seen {
                if !namespaces.contains(namespace) {
                    namespaces.push(namespace.clone());
                }
            }
        }
        namespaces
    }

    async fn create_namespace(&mut self) -> HuntResult<String> {
        let requested = format!("{}{}", self.prefix, self.suffix);
        let object: Option<Object> = self
            .session
            .post(NAMESPACES_PATH, &namespace_manifest(&requested))
            .await
            .inspect_err(|e| {
                warn!(namespace = %requested, error = %e, "Could not create namespace");
            })?;

        // The server accepted the request; fall back to the name we asked for
        let name = object
            .and_then(|object| object.metadata.name)
            .unwrap_or(requested);
        self.publish(EventPayload::NamespaceCreated { name: name.clone() });
        Ok(name)
    }

    async fn delete_namespace(&mut self, name: &str) -> HuntResult<()> {
        match self.delete(&namespace_path(name)).await {
            Ok(deletion_timestamp) => {
                self.publish(EventPayload::NamespaceDeleted {
                    name: name.to_string(),
                    deletion_timestamp,
                });
                Ok(())
            },
            Err(e) => {
                warn!(namespace = %name, error = %e, "Could not delete created namespace");
                Err(HuntError::Cleanup {
                    namespace: name.to_string(),
                    reason: e.to_string(),
                })
            },
        }
    }

    async fn probe_cluster_role(&mut self) {
        let name = self.object_name("cluster-role");
        if !self
            .attempt(CLUSTER_ROLES_PATH, &cluster_role_manifest(&name), "create cluster role")
            .await
        {
            return;
        }
        self.publish(EventPayload::ClusterRoleCreated { name: name.clone() });

        let path = cluster_role_path(&name);
        if self.attempt_patch(&path, "patch cluster role").await {
            self.publish(EventPayload::ClusterRolePatched { name: name.clone() });
        }
        if let Some(deletion_timestamp) = self.attempt_delete(&path, "delete cluster role").await {
            self.publish(EventPayload::ClusterRoleDeleted {
                name,
                deletion_timestamp,
            });
        }
    }

    async fn probe_pods(&mut self, namespace: &str) {
        let collection = namespaced_pods_path(namespace);

        let privileged = PodRef::new(self.object_name("privileged-pod"), namespace);
        if self
            .attempt(
                &collection,
                &pod_manifest(namespace, &privileged.name, true),
                "create privileged pod",
            )
            .await
        {
            self.publish(EventPayload::PodCreated {
                pod: privileged.clone(),
                privileged: true,
            });
            let path = pod_path(namespace, &privileged.name);
            if let Some(deletion_timestamp) =
                self.attempt_delete(&path, "delete privileged pod").await
            {
                self.publish(EventPayload::PodDeleted {
                    pod: privileged,
                    deletion_timestamp,
                });
            }
        }

        let pod = PodRef::new(self.object_name("pod"), namespace);
        if !self
            .attempt(&collection, &pod_manifest(namespace, &pod.name, false), "create pod")
            .await
        {
            return;
        }
        self.publish(EventPayload::PodCreated {
            pod: pod.clone(),
            privileged: false,
        });

        let path = pod_path(namespace, &pod.name);
        if self.attempt_patch(&path, "patch pod").await {
            self.publish(EventPayload::PodPatched { pod: pod.clone() });
        }
        if let Some(deletion_timestamp) = self.attempt_delete(&path, "delete pod").await {
            self.publish(EventPayload::PodDeleted {
                pod,
                deletion_timestamp,
            });
        }
    }

    async fn probe_role(&mut self, namespace: &str) {
        let name = self.object_name("role");
        if !self
            .attempt(
                &namespaced_roles_path(namespace),
                &role_manifest(namespace, &name),
                "create role",
            )
            .await
        {
            return;
        }
        self.publish(EventPayload::RoleCreated {
            name: name.clone(),
            namespace: namespace.to_string(),
        });

        let path = role_path(namespace, &name);
        if self.attempt_patch(&path, "patch role").await {
            self.publish(EventPayload::RolePatched {
                name: name.clone(),
                namespace: namespace.to_string(),
            });
        }
        if let Some(deletion_timestamp) = self.attempt_delete(&path, "delete role").await {
            self.publish(EventPayload::RoleDeleted {
                name,
                namespace: namespace.to_string(),
                deletion_timestamp,
            });
        }
    }

    async fn attempt(&self, path: &str, manifest: &Value, action: &str) -> bool {
        match self.session.post::<Object>(path, manifest).await {
            Ok(_) => true,
            Err(e) => {
                debug!(action, path, error = %e, "Probe failed");
                false
            },
        }
    }

    async fn attempt_patch(&self, path: &str, action: &str) -> bool {
        match self.session.patch::<Object>(path, &probe_label_patch()).await {
            Ok(_) => true,
            Err(e) => {
                debug!(action, path, error = %e, "Probe failed");
                false
            },
        }
    }

    async fn attempt_delete(&self, path: &str, action: &str) -> Option<String> {
        match self.delete(path).await {
            Ok(deletion_timestamp) => Some(deletion_timestamp),
            Err(e) => {
                debug!(action, path, error = %e, "Probe failed");
                None
            },
        }
    }

    /// Delete and return the server's deletion timestamp, or now.
    async fn delete(&self, path: &str) -> HuntResult<String> {
        let object: Option<Object> = self.session.delete(path).await?;
        Ok(object
            .and_then(|object| object.metadata.deletion_timestamp)
            .unwrap_or_else(|| Utc::now().to_rfc3339()))
    }
}

fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string().chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use kubehunt_events::Target;

    fn client() -> ApiClient {
        ApiClient::new(&ClientConfig::default()).unwrap()
    }

    #[test]
    fn test_authorization_from_flag() {
        assert!(ActiveAuthorization::from_flag(false, "test").is_none());
        let granted = ActiveAuthorization::from_flag(true, "operator asked").unwrap();
        assert_eq!(granted.reason(), "operator asked");
    }

    #[test]
    fn test_rejects_non_aggregate_trigger() {
        let seed = Arc::new(HuntEvent::seed(Target::new("h", Some(443), "https"), None));
        let result = ApiServerActiveHunter::new(
            seed,
            client(),
            &ActiveAuthorization::grant("test"),
            DEFAULT_NAMESPACE_PREFIX,
        );
        assert!(matches!(
            result,
            Err(HuntError::UnexpectedTrigger {
                expected: EventKind::PassiveHuntFinished,
                actual: EventKind::ApiServerFound,
            })
        ));
    }

    #[test]
    fn test_random_suffix_is_short_hex() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(suffix, random_suffix());
    }
}
