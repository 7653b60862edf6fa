use crate::{Resource, ResourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a stored resource within a snapshot. Names rewritten by the
/// store (sync hashing, namespace prefixing) are normalized back to the
/// display name plus the originating namespace, so the same logical resource
/// compares equal no matter which cluster it is looked at from.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    pub mesh: String,
    pub namespace: Option<String>,
    pub name: String,
}

/// The engine's primary key for "a resource, optionally narrowed to one of
/// its sections" (typically a named port).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypedResourceIdentifier {
    pub kind: ResourceKind,
    pub id: ResourceIdentifier,
    pub section_name: Option<String>,
}

// === impl ResourceIdentifier ===

impl ResourceIdentifier {
    pub fn new(mesh: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mesh: mesh.into(),
            namespace: None,
            name: name.into(),
        }
    }

    pub fn namespaced(
        mesh: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            mesh: mesh.into(),
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// The identity of a stored resource. `Mesh` resources are mesh-wide and
    /// identified by bare name.
    pub fn of(resource: &dyn Resource) -> Self {
        let meta = resource.meta();
        if resource.kind() == ResourceKind::Mesh {
            return Self::new("", &meta.name);
        }
        Self {
            mesh: meta.mesh.clone(),
            namespace: meta.namespace().map(Into::into),
            name: meta.display_name().to_string(),
        }
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.mesh.is_empty() {
            write!(f, "mesh/{}:", self.mesh)?;
        }
        if let Some(ns) = &self.namespace {
            write!(f, "namespace/{ns}:")?;
        }
        write!(f, "name/{}", self.name)
    }
}

// === impl TypedResourceIdentifier ===

impl TypedResourceIdentifier {
    pub fn new(kind: ResourceKind, id: ResourceIdentifier) -> Self {
        Self {
            kind,
            id,
            section_name: None,
        }
    }

    pub fn of(resource: &dyn Resource) -> Self {
        Self::new(resource.kind(), ResourceIdentifier::of(resource))
    }

    pub fn with_section_name(self, section_name: impl Into<String>) -> Self {
        Self {
            section_name: Some(section_name.into()),
            ..self
        }
    }

    /// The identifier of the whole resource, section dropped.
    pub fn without_section(&self) -> Self {
        Self {
            kind: self.kind,
            id: self.id.clone(),
            section_name: None,
        }
    }
}

impl fmt::Display for TypedResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str().to_lowercase(), self.id)?;
        if let Some(section) = &self.section_name {
            write!(f, ":section/{section}")?;
        }
        Ok(())
    }
}
