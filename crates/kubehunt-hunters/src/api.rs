//! Cluster API paths, response shapes and request manifests.

use serde::Deserialize;
use serde_json::{Value, json};

/// Discovery root.
pub const API_PATH: &str = "/api";
/// Namespace collection.
pub const NAMESPACES_PATH: &str = "/api/v1/namespaces";
/// Pods across all namespaces.
pub const PODS_PATH: &str = "/api/v1/pods";
/// Roles across all namespaces.
pub const ROLES_PATH: &str = "/apis/rbac.authorization.k8s.io/v1/roles";
/// Cluster role collection.
pub const CLUSTER_ROLES_PATH: &str = "/apis/rbac.authorization.k8s.io/v1/clusterroles";

const RBAC_API_VERSION: &str = "rbac.authorization.k8s.io/v1";
const PROBE_IMAGE: &str = "nginx";

/// Path of one namespace.
#[must_use]
pub fn namespace_path(name: &str) -> String {
    format!("{NAMESPACES_PATH}/{name}")
}

/// Path of one cluster role.
#[must_use]
pub fn cluster_role_path(name: &str) -> String {
    format!("{CLUSTER_ROLES_PATH}/{name}")
}

/// Pod collection of a namespace.
#[must_use]
pub fn namespaced_pods_path(namespace: &str) -> String {
    format!("{NAMESPACES_PATH}/{namespace}/pods")
}

/// Path of one pod.
#[must_use]
pub fn pod_path(namespace: &str, name: &str) -> String {
    format!("{NAMESPACES_PATH}/{namespace}/pods/{name}")
}

/// Role collection of a namespace.
#[must_use]
pub fn namespaced_roles_path(namespace: &str) -> String {
    format!("/apis/{RBAC_API_VERSION}/namespaces/{namespace}/roles")
}

/// Path of one role.
#[must_use]
pub fn role_path(namespace: &str, name: &str) -> String {
    format!("/apis/{RBAC_API_VERSION}/namespaces/{namespace}/roles/{name}")
}

/// A list response. A missing `items` field reads as an empty list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectList {
    /// Listed objects.
    #[serde(default)]
    pub items: Vec<Object>,
}

impl ObjectList {
    /// Names of the listed objects, skipping unnamed ones.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|item| item.metadata.name.clone())
            .collect()
    }
}

/// A single object; only its metadata is read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Object {
    /// Object metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
}

/// The metadata fields probes look at.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name.
    pub name: Option<String>,
    /// Namespace of a namespaced object.
    pub namespace: Option<String>,
    /// Set once deletion has been accepted.
    pub deletion_timestamp: Option<String>,
}

/// Manifest for a namespace.
#[must_use]
pub fn namespace_manifest(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": name },
    })
}

/// Manifest for a read-only cluster role.
#[must_use]
pub fn cluster_role_manifest(name: &str) -> Value {
    json!({
        "apiVersion": RBAC_API_VERSION,
        "kind": "ClusterRole",
        "metadata": { "name": name },
        "rules": [{
            "apiGroups": [""],
            "resources": ["pods"],
            "verbs": ["get", "watch", "list"],
        }],
    })
}

/// Manifest for a read-only role in `namespace`.
#[must_use]
pub fn role_manifest(namespace: &str, name: &str) -> Value {
    json!({
        "apiVersion": RBAC_API_VERSION,
        "kind": "Role",
        "metadata": { "name": name, "namespace": namespace },
        "rules": [{
            "apiGroups": [""],
            "resources": ["pods"],
            "verbs": ["get", "watch", "list"],
        }],
    })
}

/// Manifest for a single-container pod.
#[must_use]
pub fn pod_manifest(namespace: &str, name: &str, privileged: bool) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": { "name": name, "namespace": namespace },
        "spec": {
            "containers": [{
                "name": name,
                "image": PROBE_IMAGE,
                "securityContext": { "privileged": privileged },
            }],
        },
    })
}

/// JSON patch that labels an object as touched by a probe.
#[must_use]
pub fn probe_label_patch() -> Value {
    json!([{
        "op": "add",
        "path": "/metadata/labels",
        "value": { "kubehunt/probe": "true" },
    }])
}
