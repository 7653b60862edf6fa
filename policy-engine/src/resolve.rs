//! Resolution of target refs against a resource snapshot.

use crate::subset::Subset;
use policy_engine_core::{
    Resource, ResourceIdentifier, ResourceKind, ResourceMeta, ResourceReader, TargetRef,
    TypedResourceIdentifier, TCP_PORT_RESERVED,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A resolved target: a live resource, optionally narrowed to one section.
#[derive(Clone)]
pub struct ResourceSection {
    pub resource: Arc<dyn Resource>,
    pub section_name: Option<String>,
}

// === impl ResourceSection ===

impl ResourceSection {
    pub fn id(&self) -> TypedResourceIdentifier {
        let id = TypedResourceIdentifier::of(self.resource.as_ref());
        match &self.section_name {
            Some(section) => id.with_section_name(section.clone()),
            None => id,
        }
    }
}

impl std::fmt::Debug for ResourceSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResourceSection({})", self.id())
    }
}

/// Resolves a target ref into the resources (and sections) it denotes within
/// the policy's mesh. Subset kinds match proxy tags directly and resolve to
/// nothing here; refs naming unknown resources or sections resolve to
/// nothing rather than failing.
pub fn resolve_target_ref(
    target_ref: &TargetRef,
    policy_meta: &ResourceMeta,
    reader: &dyn ResourceReader,
) -> Vec<ResourceSection> {
    let kind = match target_ref.kind.resource_kind() {
        Some(kind) => kind,
        None => return Vec::new(),
    };
    match kind {
        ResourceKind::Mesh => {
            let id = ResourceIdentifier::new("", &policy_meta.mesh);
            reader
                .get(ResourceKind::Mesh, &id)
                .map(|resource| ResourceSection {
                    resource,
                    section_name: None,
                })
                .into_iter()
                .collect()
        }
        ResourceKind::MeshService
        | ResourceKind::MeshExternalService
        | ResourceKind::MeshMultiZoneService => {
            resolve_service(kind, target_ref, policy_meta, reader)
        }
        ResourceKind::Dataplane | ResourceKind::MeshGateway | ResourceKind::MeshHTTPRoute => {
            resolve_by_name(kind, target_ref, policy_meta, reader)
        }
    }
}

fn resolve_service(
    kind: ResourceKind,
    target_ref: &TargetRef,
    policy_meta: &ResourceMeta,
    reader: &dyn ResourceReader,
) -> Vec<ResourceSection> {
    if let Some(selector) = &target_ref.labels {
        let mut sections: Vec<ResourceSection> = reader
            .list_or_empty(kind)
            .into_iter()
            .filter(|r| r.meta().mesh == policy_meta.mesh)
            .filter(|r| matches_labels(r.meta(), selector))
            .filter_map(|r| with_explicit_section(r, target_ref.section_name.as_deref()))
            .collect();
        sections.sort_by_key(ResourceSection::id);
        return sections;
    }

    let name = match &target_ref.name {
        Some(name) => name,
        None => return Vec::new(),
    };

    // An explicit section name always wins over a legacy-derived one, so a
    // sectioned ref is looked up verbatim.
    if kind == ResourceKind::MeshService && target_ref.section_name.is_none() {
        if let Some((service, namespace, port)) = parse_legacy_service_name(name) {
            let id = ResourceIdentifier::namespaced(&policy_meta.mesh, namespace, service);
            return match reader.get(kind, &id) {
                Some(resource) => {
                    // Keep the resource even when the legacy port no longer
                    // exists; the conf then applies to the whole service.
                    let section_name = resource
                        .ports()
                        .iter()
                        .find(|p| p.port == port)
                        .map(|p| p.name_or_port());
                    vec![ResourceSection {
                        resource,
                        section_name,
                    }]
                }
                None => {
                    debug!(%id, "legacy service name does not resolve");
                    Vec::new()
                }
            };
        }
    }

    let id = ResourceIdentifier {
        mesh: policy_meta.mesh.clone(),
        namespace: target_ref
            .namespace
            .clone()
            .or_else(|| policy_meta.namespace().map(Into::into)),
        name: name.clone(),
    };
    reader
        .get(kind, &id)
        .and_then(|r| with_explicit_section(r, target_ref.section_name.as_deref()))
        .into_iter()
        .collect()
}

fn resolve_by_name(
    kind: ResourceKind,
    target_ref: &TargetRef,
    policy_meta: &ResourceMeta,
    reader: &dyn ResourceReader,
) -> Vec<ResourceSection> {
    let name = match &target_ref.name {
        Some(name) => name,
        None => return Vec::new(),
    };
    let id = ResourceIdentifier {
        mesh: policy_meta.mesh.clone(),
        namespace: target_ref
            .namespace
            .clone()
            .or_else(|| policy_meta.namespace().map(Into::into)),
        name: name.clone(),
    };
    reader
        .get(kind, &id)
        .map(|resource| ResourceSection {
            resource,
            section_name: None,
        })
        .into_iter()
        .collect()
}

/// Applies an explicit section name: the resource is dropped unless one of
/// its ports is addressed by that name.
fn with_explicit_section(
    resource: Arc<dyn Resource>,
    section_name: Option<&str>,
) -> Option<ResourceSection> {
    match section_name {
        None => Some(ResourceSection {
            resource,
            section_name: None,
        }),
        Some(section) if resource.has_section(section) => Some(ResourceSection {
            section_name: Some(section.to_string()),
            resource,
        }),
        Some(section) => {
            debug!(%section, "section not found on targeted resource");
            None
        }
    }
}

fn matches_labels(meta: &ResourceMeta, selector: &BTreeMap<String, String>) -> bool {
    Subset::from_map(selector).contains_element(&meta.labels)
}

/// Splits a legacy `<name>_<namespace>_svc[_<port>]` service name. The
/// port-less form denotes service-less traffic and maps to the reserved
/// port, which never matches a declared one.
pub fn parse_legacy_service_name(name: &str) -> Option<(&str, &str, u32)> {
    if let Some(rest) = name.strip_suffix("_svc") {
        let (service, namespace) = rest.rsplit_once('_')?;
        return Some((service, namespace, TCP_PORT_RESERVED));
    }
    let (rest, port) = name.rsplit_once('_')?;
    let port = port.parse().ok()?;
    let rest = rest.strip_suffix("_svc")?;
    let (service, namespace) = rest.rsplit_once('_')?;
    Some((service, namespace, port))
}
