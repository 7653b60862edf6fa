use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known label keys carried on resource metadata.
pub mod labels {
    /// Cluster the resource was declared on: `zone` or `global`.
    pub const ORIGIN: &str = "mesh.io/origin";

    /// Name of the zone a zone-origin resource came from.
    pub const ZONE: &str = "mesh.io/zone";

    /// Original name of a resource whose store name was rewritten (e.g. by
    /// cross-zone sync hashing or namespace prefixing).
    pub const DISPLAY_NAME: &str = "mesh.io/display-name";

    /// Role of a namespaced policy: `system`, `producer` or `consumer`.
    pub const POLICY_ROLE: &str = "mesh.io/policy-role";

    /// Kubernetes namespace a resource was created in.
    pub const K8S_NAMESPACE: &str = "k8s.mesh.io/namespace";

    /// Tag holding the legacy service name of a dataplane inbound.
    pub const SERVICE: &str = "mesh.io/service";
}

/// Metadata of a policy or target resource, supplied by the resource store.
///
/// The engine never writes metadata; it only reads identity and the
/// provenance labels through the accessors below.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub name: String,
    pub mesh: String,
    pub labels: BTreeMap<String, String>,
}

/// Which cluster a resource was declared on. Zone-declared policies take
/// precedence over global ones, so `Zone` orders after `Global`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResourceOrigin {
    Global,
    Zone,
}

/// Role of a namespaced policy resource. Consumer policies take precedence
/// over producer policies, which take precedence over system ones.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PolicyRole {
    System,
    Producer,
    Consumer,
}

// === impl ResourceMeta ===

impl ResourceMeta {
    pub fn new(
        name: impl Into<String>,
        mesh: impl Into<String>,
        labels: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            mesh: mesh.into(),
            labels,
        }
    }

    fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// The name the resource was originally created with, falling back to the
    /// store name when no rewrite happened.
    pub fn display_name(&self) -> &str {
        self.label(labels::DISPLAY_NAME).unwrap_or(&self.name)
    }

    /// A resource without an origin label is local to the cluster doing the
    /// computation, i.e. zone-declared.
    pub fn origin(&self) -> ResourceOrigin {
        match self.label(labels::ORIGIN) {
            Some("global") => ResourceOrigin::Global,
            _ => ResourceOrigin::Zone,
        }
    }

    pub fn role(&self) -> PolicyRole {
        match self.label(labels::POLICY_ROLE) {
            Some("consumer") => PolicyRole::Consumer,
            Some("producer") => PolicyRole::Producer,
            _ => PolicyRole::System,
        }
    }

    pub fn zone(&self) -> Option<&str> {
        self.label(labels::ZONE)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.label(labels::K8S_NAMESPACE)
    }
}
