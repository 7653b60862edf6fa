use crate::{ResourceIdentifier, ResourceMeta};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Port reserved for traffic that carries no service identity. Legacy
/// service-less names resolve to this sentinel; no real resource ever
/// declares it.
pub const TCP_PORT_RESERVED: u32 = 49151;

/// Types of resources a policy target ref can resolve against.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Mesh,
    Dataplane,
    MeshGateway,
    MeshService,
    MeshExternalService,
    MeshMultiZoneService,
    MeshHTTPRoute,
}

/// A named sub-part of a resource that policies can target through a
/// target ref's `section_name`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub port: u32,
    pub name: Option<String>,
}

/// A stored resource, as the engine sees it: metadata plus the sections that
/// target refs can narrow to. The domain payload stays with the store.
pub trait Resource: Send + Sync {
    fn meta(&self) -> &ResourceMeta;

    fn kind(&self) -> ResourceKind;

    fn ports(&self) -> &[Port] {
        &[]
    }

    /// Whether `section_name` names one of this resource's sections: a named
    /// port, or the decimal port number of an unnamed one.
    fn has_section(&self, section_name: &str) -> bool {
        self.ports().iter().any(|p| p.matches(section_name))
    }
}

/// Read-only view of a resource snapshot, supplied by the store. The engine
/// never re-reads during a single build, so an immutable materialized
/// snapshot is expected.
pub trait ResourceReader {
    fn get(&self, kind: ResourceKind, id: &ResourceIdentifier) -> Option<Arc<dyn Resource>>;

    fn list_or_empty(&self, kind: ResourceKind) -> Vec<Arc<dyn Resource>>;
}

// === impl ResourceKind ===

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mesh => "Mesh",
            Self::Dataplane => "Dataplane",
            Self::MeshGateway => "MeshGateway",
            Self::MeshService => "MeshService",
            Self::MeshExternalService => "MeshExternalService",
            Self::MeshMultiZoneService => "MeshMultiZoneService",
            Self::MeshHTTPRoute => "MeshHTTPRoute",
        }
    }
}

// === impl Port ===

impl Port {
    pub fn new(port: u32) -> Self {
        Self { port, name: None }
    }

    pub fn named(port: u32, name: impl Into<String>) -> Self {
        Self {
            port,
            name: Some(name.into()),
        }
    }

    /// The section name this port is addressed by.
    pub fn name_or_port(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.port.to_string())
    }

    fn matches(&self, section_name: &str) -> bool {
        match &self.name {
            Some(name) => name == section_name,
            None => section_name == self.port.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_ports_are_addressed_by_name_only() {
        let port = Port::named(8080, "tcp-port");
        assert!(port.matches("tcp-port"));
        assert!(!port.matches("8080"));
        assert_eq!(port.name_or_port(), "tcp-port");
    }

    #[test]
    fn unnamed_ports_are_addressed_by_number() {
        let port = Port::new(8080);
        assert!(port.matches("8080"));
        assert!(!port.matches("tcp-port"));
        assert_eq!(port.name_or_port(), "8080");
    }
}
