use crate::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a policy (or one of its rule entries) applies to.
///
/// Kinds are listed least- to most-specific; the precedence sorter relies on
/// this ordering, so new kinds must be inserted at their specificity rank.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TargetRefKind {
    Mesh,
    MeshSubset,
    MeshGateway,
    MeshService,
    MeshExternalService,
    MeshMultiZoneService,
    MeshServiceSubset,
    MeshHTTPRoute,
    Dataplane,
}

/// A policy's declarative selector for the resources or proxies it applies
/// to. Only the fields relevant to the targeted kind are set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub kind: TargetRefKind,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub section_name: Option<String>,
    /// Tag constraints for the subset kinds and `MeshGateway` listeners.
    pub tags: Option<BTreeMap<String, String>>,
    /// Label selector matched against resource labels.
    pub labels: Option<BTreeMap<String, String>>,
}

// === impl TargetRefKind ===

impl TargetRefKind {
    /// Whether refs of this kind resolve to retrievable resources. Subset
    /// kinds only ever match proxy tags directly.
    pub fn is_real_resource(self) -> bool {
        !matches!(self, Self::MeshSubset | Self::MeshServiceSubset)
    }

    /// The resource type a real-resource ref of this kind resolves against.
    pub fn resource_kind(self) -> Option<ResourceKind> {
        match self {
            Self::Mesh => Some(ResourceKind::Mesh),
            Self::MeshGateway => Some(ResourceKind::MeshGateway),
            Self::MeshService => Some(ResourceKind::MeshService),
            Self::MeshExternalService => Some(ResourceKind::MeshExternalService),
            Self::MeshMultiZoneService => Some(ResourceKind::MeshMultiZoneService),
            Self::MeshHTTPRoute => Some(ResourceKind::MeshHTTPRoute),
            Self::Dataplane => Some(ResourceKind::Dataplane),
            Self::MeshSubset | Self::MeshServiceSubset => None,
        }
    }
}

// === impl TargetRef ===

impl Default for TargetRef {
    fn default() -> Self {
        Self::of_kind(TargetRefKind::Mesh)
    }
}

impl TargetRef {
    pub fn of_kind(kind: TargetRefKind) -> Self {
        Self {
            kind,
            name: None,
            namespace: None,
            section_name: None,
            tags: None,
            labels: None,
        }
    }

    pub fn mesh() -> Self {
        Self::of_kind(TargetRefKind::Mesh)
    }

    pub fn mesh_service(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::of_kind(TargetRefKind::MeshService)
        }
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    pub fn with_namespace(self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..self
        }
    }

    pub fn with_section_name(self, section_name: impl Into<String>) -> Self {
        Self {
            section_name: Some(section_name.into()),
            ..self
        }
    }

    pub fn with_tags(self, tags: BTreeMap<String, String>) -> Self {
        Self {
            tags: Some(tags),
            ..self
        }
    }

    pub fn with_labels(self, labels: BTreeMap<String, String>) -> Self {
        Self {
            labels: Some(labels),
            ..self
        }
    }
}
