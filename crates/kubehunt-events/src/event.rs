//! Event types exchanged between hunters.
//!
//! Every event is a [`HuntEvent`]: a target (host/port/protocol), the
//! credential the producing hunter used, metadata for correlation, and an
//! [`EventPayload`] whose variant fixes both the [`EventKind`] used for
//! routing and the shape of the evidence it carries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of characters of a raw response kept in rendered evidence.
const MAX_RENDERED_RESPONSE: usize = 256;

/// Closed set of event types the bus routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // ========== Discovery ==========
    /// An API server was found (seed event).
    ApiServerFound,

    // ========== Passive findings ==========
    /// The API server answered at all.
    ApiServerAccess,
    /// Namespace names were enumerated.
    NamespacesListed,
    /// Pod and namespace pairs were enumerated.
    PodsListed,
    /// Role names were enumerated.
    RolesListed,
    /// Cluster role names were enumerated.
    ClusterRolesListed,
    /// The passive phase for a target completed.
    PassiveHuntFinished,

    // ========== Active findings ==========
    /// A namespace was created.
    NamespaceCreated,
    /// A namespace was deleted.
    NamespaceDeleted,
    /// A cluster role was created.
    ClusterRoleCreated,
    /// A cluster role was patched.
    ClusterRolePatched,
    /// A cluster role was deleted.
    ClusterRoleDeleted,
    /// A pod was created.
    PodCreated,
    /// A pod was patched.
    PodPatched,
    /// A pod was deleted.
    PodDeleted,
    /// A role was created.
    RoleCreated,
    /// A role was patched.
    RolePatched,
    /// A role was deleted.
    RoleDeleted,
}

impl EventKind {
    /// Every event kind.
    pub const ALL: &'static [EventKind] = &[
        Self::ApiServerFound,
        Self::ApiServerAccess,
        Self::NamespacesListed,
        Self::PodsListed,
        Self::RolesListed,
        Self::ClusterRolesListed,
        Self::PassiveHuntFinished,
        Self::NamespaceCreated,
        Self::NamespaceDeleted,
        Self::ClusterRoleCreated,
        Self::ClusterRolePatched,
        Self::ClusterRoleDeleted,
        Self::PodCreated,
        Self::PodPatched,
        Self::PodDeleted,
        Self::RoleCreated,
        Self::RolePatched,
        Self::RoleDeleted,
    ];

    /// Every kind a hunter can derive (everything but the seed).
    pub const DERIVED: &'static [EventKind] = &[
        Self::ApiServerAccess,
        Self::NamespacesListed,
        Self::PodsListed,
        Self::RolesListed,
        Self::ClusterRolesListed,
        Self::PassiveHuntFinished,
        Self::NamespaceCreated,
        Self::NamespaceDeleted,
        Self::ClusterRoleCreated,
        Self::ClusterRolePatched,
        Self::ClusterRoleDeleted,
        Self::PodCreated,
        Self::PodPatched,
        Self::PodDeleted,
        Self::RoleCreated,
        Self::RolePatched,
        Self::RoleDeleted,
    ];

    /// Stable snake_case identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApiServerFound => "api_server_found",
            Self::ApiServerAccess => "api_server_access",
            Self::NamespacesListed => "namespaces_listed",
            Self::PodsListed => "pods_listed",
            Self::RolesListed => "roles_listed",
            Self::ClusterRolesListed => "cluster_roles_listed",
            Self::PassiveHuntFinished => "passive_hunt_finished",
            Self::NamespaceCreated => "namespace_created",
            Self::NamespaceDeleted => "namespace_deleted",
            Self::ClusterRoleCreated => "cluster_role_created",
            Self::ClusterRolePatched => "cluster_role_patched",
            Self::ClusterRoleDeleted => "cluster_role_deleted",
            Self::PodCreated => "pod_created",
            Self::PodPatched => "pod_patched",
            Self::PodDeleted => "pod_deleted",
            Self::RoleCreated => "role_created",
            Self::RolePatched => "role_patched",
            Self::RoleDeleted => "role_deleted",
        }
    }

    /// Whether this kind reports a change made to the remote system.
    #[must_use]
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::NamespaceCreated
                | Self::NamespaceDeleted
                | Self::ClusterRoleCreated
                | Self::ClusterRolePatched
                | Self::ClusterRoleDeleted
                | Self::PodCreated
                | Self::PodPatched
                | Self::PodDeleted
                | Self::RoleCreated
                | Self::RolePatched
                | Self::RoleDeleted
        )
    }

    /// Whether this kind is a passive enumeration result.
    #[must_use]
    pub fn is_enumeration(self) -> bool {
        matches!(
            self,
            Self::NamespacesListed | Self::PodsListed | Self::RolesListed | Self::ClusterRolesListed
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vulnerability category assigned to a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// A response was obtained without presenting any credential.
    UnauthenticatedAccess,
    /// A credential revealed data its holder should not reach this way.
    InformationDisclosure,
    /// Remote state could be changed.
    AccessRisk,
    /// A workload with elevated privileges could be scheduled.
    PrivilegeEscalation,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::UnauthenticatedAccess => "Unauthenticated Access",
            Self::InformationDisclosure => "Information Disclosure",
            Self::AccessRisk => "Access Risk",
            Self::PrivilegeEscalation => "Privilege Escalation",
        };
        f.write_str(label)
    }
}

/// Trust context a hunter probed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    /// No credential was sent.
    Anonymous,
    /// A bearer token was sent.
    Token,
}

impl Identity {
    /// Identity implied by an optional credential.
    #[must_use]
    pub fn of(credential: Option<&str>) -> Self {
        if credential.is_some() {
            Self::Token
        } else {
            Self::Anonymous
        }
    }

    /// Suffix appended to event names.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::Anonymous => "as anonymous user",
            Self::Token => "using service account token",
        }
    }
}

/// Remote endpoint an event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Host name or address.
    pub host: String,
    /// TCP port, when known.
    pub port: Option<u16>,
    /// URL scheme (`http` or `https`).
    pub protocol: String,
}

impl Target {
    /// Create a new target.
    #[must_use]
    pub fn new(host: impl Into<String>, port: Option<u16>, protocol: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: protocol.into(),
        }
    }

    /// Base URL `{protocol}://{host}[:{port}]` with no trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{port}", self.protocol, self.host),
            None => format!("{}://{}", self.protocol, self.host),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

/// A pod name together with its namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodRef {
    /// Pod name.
    pub name: String,
    /// Namespace the pod lives in.
    pub namespace: String,
}

impl PodRef {
    /// Create a new pod reference.
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

/// Metadata attached to every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Hunter (or collaborator) that created the event.
    pub source: String,
    /// Scan this event belongs to, if the seed carried one.
    pub scan_id: Option<Uuid>,
}

impl EventMetadata {
    /// Create new event metadata.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            scan_id: None,
        }
    }

    /// Set scan ID.
    #[must_use]
    pub fn with_scan_id(mut self, id: Uuid) -> Self {
        self.scan_id = Some(id);
        self
    }
}

/// Event-specific evidence. The variant decides the event kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Seed produced by discovery.
    ApiServerFound,
    /// `GET /api` succeeded.
    ApiServerAccess {
        /// Raw response body.
        response: String,
    },
    /// Namespace enumeration.
    NamespacesListed {
        /// Namespace names.
        namespaces: Vec<String>,
    },
    /// Pod enumeration.
    PodsListed {
        /// Pods with their namespaces.
        pods: Vec<PodRef>,
    },
    /// Role enumeration.
    RolesListed {
        /// Role names.
        roles: Vec<String>,
    },
    /// Cluster role enumeration.
    ClusterRolesListed {
        /// Cluster role names.
        cluster_roles: Vec<String>,
    },
    /// End of the passive phase for one hunter run.
    PassiveHuntFinished {
        /// Every namespace name seen during the phase.
        namespaces: Vec<String>,
    },
    /// A namespace was created.
    NamespaceCreated {
        /// Server-assigned namespace name.
        name: String,
    },
    /// A namespace was deleted.
    NamespaceDeleted {
        /// Namespace name.
        name: String,
        /// Deletion timestamp reported by the server.
        deletion_timestamp: String,
    },
    /// A cluster role was created.
    ClusterRoleCreated {
        /// Cluster role name.
        name: String,
    },
    /// A cluster role was patched.
    ClusterRolePatched {
        /// Cluster role name.
        name: String,
    },
    /// A cluster role was deleted.
    ClusterRoleDeleted {
        /// Cluster role name.
        name: String,
        /// Deletion timestamp.
        deletion_timestamp: String,
    },
    /// A pod was created.
    PodCreated {
        /// The created pod.
        pod: PodRef,
        /// Whether the pod requested a privileged container.
        privileged: bool,
    },
    /// A pod was patched.
    PodPatched {
        /// The patched pod.
        pod: PodRef,
    },
    /// A pod was deleted.
    PodDeleted {
        /// The deleted pod.
        pod: PodRef,
        /// Deletion timestamp.
        deletion_timestamp: String,
    },
    /// A role was created.
    RoleCreated {
        /// Role name.
        name: String,
        /// Namespace of the role.
        namespace: String,
    },
    /// A role was patched.
    RolePatched {
        /// Role name.
        name: String,
        /// Namespace of the role.
        namespace: String,
    },
    /// A role was deleted.
    RoleDeleted {
        /// Role name.
        name: String,
        /// Namespace of the role.
        namespace: String,
        /// Deletion timestamp.
        deletion_timestamp: String,
    },
}

impl EventPayload {
    /// The routing kind of this payload.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ApiServerFound => EventKind::ApiServerFound,
            Self::ApiServerAccess { .. } => EventKind::ApiServerAccess,
            Self::NamespacesListed { .. } => EventKind::NamespacesListed,
            Self::PodsListed { .. } => EventKind::PodsListed,
            Self::RolesListed { .. } => EventKind::RolesListed,
            Self::ClusterRolesListed { .. } => EventKind::ClusterRolesListed,
            Self::PassiveHuntFinished { .. } => EventKind::PassiveHuntFinished,
            Self::NamespaceCreated { .. } => EventKind::NamespaceCreated,
            Self::NamespaceDeleted { .. } => EventKind::NamespaceDeleted,
            Self::ClusterRoleCreated { .. } => EventKind::ClusterRoleCreated,
            Self::ClusterRolePatched { .. } => EventKind::ClusterRolePatched,
            Self::ClusterRoleDeleted { .. } => EventKind::ClusterRoleDeleted,
            Self::PodCreated { .. } => EventKind::PodCreated,
            Self::PodPatched { .. } => EventKind::PodPatched,
            Self::PodDeleted { .. } => EventKind::PodDeleted,
            Self::RoleCreated { .. } => EventKind::RoleCreated,
            Self::RolePatched { .. } => EventKind::RolePatched,
            Self::RoleDeleted { .. } => EventKind::RoleDeleted,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::ApiServerFound => "API server found",
            Self::ApiServerAccess { .. } => "Access to API",
            Self::NamespacesListed { .. } => "Listing namespaces",
            Self::PodsListed { .. } => "Listing pods",
            Self::RolesListed { .. } => "Listing roles",
            Self::ClusterRolesListed { .. } => "Listing cluster roles",
            Self::PassiveHuntFinished { .. } => "API server passive hunt finished",
            Self::NamespaceCreated { .. } => "Created a namespace",
            Self::NamespaceDeleted { .. } => "Deleted a namespace",
            Self::ClusterRoleCreated { .. } => "Created a cluster role",
            Self::ClusterRolePatched { .. } => "Patched a cluster role",
            Self::ClusterRoleDeleted { .. } => "Deleted a cluster role",
            Self::PodCreated {
                privileged: true, ..
            } => "Created a privileged pod",
            Self::PodCreated { .. } => "Created a pod",
            Self::PodPatched { .. } => "Patched a pod",
            Self::PodDeleted { .. } => "Deleted a pod",
            Self::RoleCreated { .. } => "Created a role",
            Self::RolePatched { .. } => "Patched a role",
            Self::RoleDeleted { .. } => "Deleted a role",
        }
    }
}

/// A single immutable event.
///
/// Hunters never modify the event that triggered them; they build new ones
/// with [`HuntEvent::derive`], which copies the target and scan correlation.
#[derive(Clone, Serialize)]
pub struct HuntEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Remote endpoint.
    pub target: Target,
    /// Credential used by the producer. Never serialized.
    #[serde(skip)]
    credential: Option<String>,
    /// Event-specific evidence.
    pub payload: EventPayload,
}

impl fmt::Debug for HuntEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HuntEvent")
            .field("metadata", &self.metadata)
            .field("target", &self.target)
            .field("has_credential", &self.credential.is_some())
            .field("payload", &self.payload)
            .finish()
    }
}

impl HuntEvent {
    /// Create a discovery seed event.
    #[must_use]
    pub fn seed(target: Target, credential: Option<String>) -> Self {
        Self {
            metadata: EventMetadata::new("discovery"),
            target,
            credential,
            payload: EventPayload::ApiServerFound,
        }
    }

    /// Create an event derived from `trigger`.
    ///
    /// The target and scan ID are copied from the trigger. `credential` is
    /// the credential the deriving hunter actually presented.
    #[must_use]
    pub fn derive(
        trigger: &HuntEvent,
        source: impl Into<String>,
        credential: Option<String>,
        payload: EventPayload,
    ) -> Self {
        let mut metadata = EventMetadata::new(source);
        metadata.scan_id = trigger.metadata.scan_id;
        Self {
            metadata,
            target: trigger.target.clone(),
            credential,
            payload,
        }
    }

    /// Attach a scan ID.
    #[must_use]
    pub fn with_scan_id(mut self, id: Uuid) -> Self {
        self.metadata.scan_id = Some(id);
        self
    }

    /// Routing kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// The credential carried by this event, if any.
    #[must_use]
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    /// Trust context that produced this event.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::of(self.credential())
    }

    /// Display name. Always states whether a credential was used.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{} {}", self.payload.title(), self.identity().describe())
    }

    /// Vulnerability category of this event.
    ///
    /// For [`EventKind::ApiServerAccess`] this is
    /// [`Category::UnauthenticatedAccess`] exactly when no credential is
    /// present, and [`Category::InformationDisclosure`] otherwise.
    #[must_use]
    pub fn classification(&self) -> Option<Category> {
        match &self.payload {
            EventPayload::ApiServerFound | EventPayload::PassiveHuntFinished { .. } => None,
            EventPayload::ApiServerAccess { .. } => Some(match self.identity() {
                Identity::Anonymous => Category::UnauthenticatedAccess,
                Identity::Token => Category::InformationDisclosure,
            }),
            EventPayload::NamespacesListed { .. }
            | EventPayload::PodsListed { .. }
            | EventPayload::RolesListed { .. }
            | EventPayload::ClusterRolesListed { .. } => Some(Category::InformationDisclosure),
            EventPayload::PodCreated {
                privileged: true, ..
            } => Some(Category::PrivilegeEscalation),
            EventPayload::NamespaceCreated { .. }
            | EventPayload::NamespaceDeleted { .. }
            | EventPayload::ClusterRoleCreated { .. }
            | EventPayload::ClusterRolePatched { .. }
            | EventPayload::ClusterRoleDeleted { .. }
            | EventPayload::PodCreated {
                privileged: false, ..
            }
            | EventPayload::PodPatched { .. }
            | EventPayload::PodDeleted { .. }
            | EventPayload::RoleCreated { .. }
            | EventPayload::RolePatched { .. }
            | EventPayload::RoleDeleted { .. } => Some(Category::AccessRisk),
        }
    }

    /// Human-readable rendering of the evidence.
    #[must_use]
    pub fn evidence(&self) -> String {
        match &self.payload {
            EventPayload::ApiServerFound => self.target.to_string(),
            EventPayload::ApiServerAccess { response } => truncate(response),
            EventPayload::NamespacesListed { namespaces }
            | EventPayload::PassiveHuntFinished { namespaces } => namespaces.join(", "),
            EventPayload::PodsListed { pods } => pods
                .iter()
                .map(|p| format!("{}/{}", p.namespace, p.name))
                .collect::<Vec<_>>()
                .join(", "),
            EventPayload::RolesListed { roles } => roles.join(", "),
            EventPayload::ClusterRolesListed { cluster_roles } => cluster_roles.join(", "),
            EventPayload::NamespaceCreated { name } => format!("new namespace name: {name}"),
            EventPayload::NamespaceDeleted {
                name,
                deletion_timestamp,
            } => format!("namespace {name} deleted at {deletion_timestamp}"),
            EventPayload::ClusterRoleCreated { name } => format!("cluster role name: {name}"),
            EventPayload::ClusterRolePatched { name } => format!("patched cluster role: {name}"),
            EventPayload::ClusterRoleDeleted {
                name,
                deletion_timestamp,
            } => format!("cluster role {name} deleted at {deletion_timestamp}"),
            EventPayload::PodCreated { pod, privileged } => format!(
                "pod {}/{} (privileged: {privileged})",
                pod.namespace, pod.name
            ),
            EventPayload::PodPatched { pod } => {
                format!("patched pod {}/{}", pod.namespace, pod.name)
            },
            EventPayload::PodDeleted {
                pod,
                deletion_timestamp,
            } => format!(
                "pod {}/{} deleted at {deletion_timestamp}",
                pod.namespace, pod.name
            ),
            EventPayload::RoleCreated { name, namespace } => {
                format!("role {namespace}/{name}")
            },
            EventPayload::RolePatched { name, namespace } => {
                format!("patched role {namespace}/{name}")
            },
            EventPayload::RoleDeleted {
                name,
                namespace,
                deletion_timestamp,
            } => format!("role {namespace}/{name} deleted at {deletion_timestamp}"),
        }
    }
}

fn truncate(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_RENDERED_RESPONSE {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_RENDERED_RESPONSE).collect();
    out.push_str("...");
    out
}
