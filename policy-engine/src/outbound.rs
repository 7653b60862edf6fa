//! Outbound rule building: policies' "to" entries are resolved to the
//! destinations they target and collapsed into one effective conf per
//! destination (or destination section).

use crate::merge::{merge_entries, Mergeable};
use crate::policy::{
    origins, with_policy_attributes, MatchesHash, Origin, PolicyWithToList, ToEntry,
    WithPolicyAttributes,
};
use crate::resolve::{resolve_target_ref, ResourceSection};
use crate::sort::sort_to_entries;
use anyhow::Context;
use policy_engine_core::{
    ResourceIdentifier, ResourceKind, ResourceMeta, ResourceReader, TypedResourceIdentifier,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;


/// The effective configuration for one destination, with provenance.
#[derive(Clone, Debug)]
pub struct ResourceRule<C> {
    pub resource: ResourceMeta,
    pub resource_section_name: Option<String>,
    /// One merged conf per partition group.
    pub conf: Vec<C>,
    pub origin: Vec<Origin>,
    /// Positions in `origin` of the policies whose entries carried each
    /// matches hash.
    pub backend_ref_origin_index: BTreeMap<MatchesHash, usize>,
}

/// Effective outbound rules keyed by destination identifier.
pub struct ResourceRules<C>(BTreeMap<TypedResourceIdentifier, ResourceRule<C>>);

// === impl ResourceRule ===

impl<C> ResourceRule<C> {
    pub fn backend_ref_origin(&self, hash: &MatchesHash) -> Option<&Origin> {
        self.backend_ref_origin_index
            .get(hash)
            .and_then(|&index| self.origin.get(index))
    }
}

// === impl ResourceRules ===

impl<C> Default for ResourceRules<C> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<C> FromIterator<(TypedResourceIdentifier, ResourceRule<C>)> for ResourceRules<C> {
    fn from_iter<I: IntoIterator<Item = (TypedResourceIdentifier, ResourceRule<C>)>>(
        iter: I,
    ) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<C> ResourceRules<C> {
    pub fn get(&self, uri: &TypedResourceIdentifier) -> Option<&ResourceRule<C>> {
        self.0.get(uri)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TypedResourceIdentifier, &ResourceRule<C>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Finds the most specific rule applying to `uri`: the exact identifier,
    /// then the whole resource with the section dropped, then the owning
    /// `Mesh` resolved through the reader.
    pub fn compute(
        &self,
        uri: &TypedResourceIdentifier,
        reader: &dyn ResourceReader,
    ) -> Option<&ResourceRule<C>> {
        if let Some(rule) = self.0.get(uri) {
            return Some(rule);
        }
        if uri.section_name.is_some() {
            return self.compute(&uri.without_section(), reader);
        }
        if uri.kind != ResourceKind::Mesh {
            let mesh_id = ResourceIdentifier::new("", &uri.id.mesh);
            let mesh = reader.get(ResourceKind::Mesh, &mesh_id)?;
            return self.compute(&TypedResourceIdentifier::of(mesh.as_ref()), reader);
        }
        None
    }
}

/// Builds the effective outbound rules from the policies matching one proxy.
/// Every destination any entry resolves to gets a rule merging all entries
/// relevant to it, least-specific first.
pub fn build_rules<C>(
    policies: &[Arc<dyn PolicyWithToList<Conf = C>>],
    reader: &dyn ResourceReader,
) -> anyhow::Result<ResourceRules<C>>
where
    C: Mergeable,
{
    let mut items = with_policy_attributes(policies);
    sort_to_entries(&mut items);

    let resolved: Vec<Vec<ResourceSection>> = items
        .iter()
        .map(|item| resolve_target_ref(&item.entry.target_ref, &item.meta, reader))
        .collect();

    let mut targets: BTreeMap<TypedResourceIdentifier, ResourceSection> = BTreeMap::new();
    for sections in &resolved {
        for section in sections {
            targets.entry(section.id()).or_insert_with(|| section.clone());
        }
    }

    let mut rules = BTreeMap::new();
    for (uri, target) in targets {
        let relevant: Vec<WithPolicyAttributes<ToEntry<C>>> = items
            .iter()
            .zip(&resolved)
            .filter(|(_, sections)| sections.iter().any(|s| is_relevant(&s.id(), &uri)))
            .map(|(item, _)| item.clone())
            .collect();
        if relevant.is_empty() {
            continue;
        }

        let conf = merge_entries(&relevant)
            .with_context(|| format!("failed to merge confs for {uri}"))?;
        let (origin, backend_ref_origin_index) = origins(&relevant, true);
        rules.insert(
            uri,
            ResourceRule {
                resource: target.resource.meta().clone(),
                resource_section_name: target.section_name.clone(),
                conf,
                origin,
                backend_ref_origin_index,
            },
        );
    }
    debug!(targets = rules.len(), "built outbound rules");
    Ok(ResourceRules(rules))
}

/// Whether a conf resolved for `item` applies to the destination `uri`. A
/// mesh-wide item covers every destination in its mesh; a service item
/// covers its own resource, and every section of it when the item itself is
/// unsectioned.
fn is_relevant(item: &TypedResourceIdentifier, uri: &TypedResourceIdentifier) -> bool {
    match item.kind {
        ResourceKind::Mesh => {
            if uri.kind == ResourceKind::Mesh {
                item == uri
            } else {
                item.id.name == uri.id.mesh
            }
        }
        ResourceKind::MeshService
        | ResourceKind::MeshExternalService
        | ResourceKind::MeshMultiZoneService => {
            item.kind == uri.kind
                && item.id == uri.id
                && (item.section_name.is_none() || item.section_name == uri.section_name)
        }
        _ => false,
    }
}
