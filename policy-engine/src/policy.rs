//! Policy traits and the attributed-entry wrappers shared by the rule
//! builders.

use crate::merge::Mergeable;
use ahash::AHashMap as HashMap;
use policy_engine_core::{ResourceMeta, TargetRef};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A policy resource: a top-level target ref plus a mergeable configuration
/// payload.
pub trait Policy: Send + Sync {
    type Conf: Mergeable;

    fn meta(&self) -> Arc<ResourceMeta>;

    /// The top-level selector for what this policy applies to.
    fn target_ref(&self) -> &TargetRef;
}

/// A policy carrying inbound ("from") rule entries.
pub trait PolicyWithRules: Policy {
    fn rules(&self) -> &[RuleEntry<Self::Conf>];
}

/// A policy carrying outbound ("to") entries.
pub trait PolicyWithToList: Policy {
    fn to_list(&self) -> &[ToEntry<Self::Conf>];
}

/// An inbound rule entry: configuration applied to the proxy the policy's
/// top-level target ref selects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleEntry<C> {
    pub default: C,
}

/// An outbound entry: configuration applied to traffic toward the
/// destination its own target ref selects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToEntry<C> {
    pub target_ref: TargetRef,
    pub default: C,
    /// Identifies the route match this entry's conf was produced for, when
    /// the policy is derived from a route. Lets backend-ref lookups find the
    /// originating entry after merging.
    pub matches_hash: Option<MatchesHash>,
}

/// Opaque digest of a route match.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchesHash(pub String);

/// Either entry flavor, as the merge engine and origin tracking see it.
pub trait Entry {
    type Conf;

    fn conf(&self) -> &Self::Conf;

    fn matches_hash(&self) -> Option<&MatchesHash> {
        None
    }
}

/// An entry joined with the attributes of the policy it came from. Entries
/// from every policy are pooled, sorted and merged together; the attributes
/// keep precedence and provenance decidable per entry.
#[derive(Clone, Debug)]
pub struct WithPolicyAttributes<E> {
    pub entry: E,
    pub meta: Arc<ResourceMeta>,
    pub top_level: TargetRef,
    /// Position of the entry within its policy's list.
    pub rule_index: usize,
}

/// A policy a computed conf originated from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Origin {
    pub resource: Arc<ResourceMeta>,
    /// The originating entry's position, when origins are tracked per entry.
    pub rule_index: Option<usize>,
}

// === impl RuleEntry ===

impl<C> RuleEntry<C> {
    pub fn new(default: C) -> Self {
        Self { default }
    }
}

impl<C> Entry for RuleEntry<C> {
    type Conf = C;

    fn conf(&self) -> &C {
        &self.default
    }
}

// === impl ToEntry ===

impl<C> ToEntry<C> {
    pub fn new(target_ref: TargetRef, default: C) -> Self {
        Self {
            target_ref,
            default,
            matches_hash: None,
        }
    }

    pub fn with_matches_hash(self, hash: impl Into<String>) -> Self {
        Self {
            matches_hash: Some(MatchesHash(hash.into())),
            ..self
        }
    }
}

impl<C> Entry for ToEntry<C> {
    type Conf = C;

    fn conf(&self) -> &C {
        &self.default
    }

    fn matches_hash(&self) -> Option<&MatchesHash> {
        self.matches_hash.as_ref()
    }
}

/// Pools every policy's outbound entries, each joined with its policy's
/// attributes. Policy order is preserved; precedence sorting happens later.
pub fn with_policy_attributes<C: Mergeable>(
    policies: &[Arc<dyn PolicyWithToList<Conf = C>>],
) -> Vec<WithPolicyAttributes<ToEntry<C>>> {
    let mut items = Vec::new();
    for policy in policies {
        let meta = policy.meta();
        for (rule_index, entry) in policy.to_list().iter().enumerate() {
            items.push(WithPolicyAttributes {
                entry: entry.clone(),
                meta: meta.clone(),
                top_level: policy.target_ref().clone(),
                rule_index,
            });
        }
    }
    items
}

/// Collects the distinct policies a merged conf originated from, in entry
/// order. With `with_rule_index` set, distinct entries of one policy count
/// as distinct origins. Entries carrying a matches hash get their origin's
/// position recorded in the returned index.
pub fn origins<E: Entry>(
    items: &[WithPolicyAttributes<E>],
    with_rule_index: bool,
) -> (Vec<Origin>, BTreeMap<MatchesHash, usize>) {
    let mut origins: Vec<Origin> = Vec::new();
    let mut seen: HashMap<(String, String, Option<usize>), usize> = HashMap::new();
    let mut backend_ref_origin_index = BTreeMap::new();

    for item in items {
        let rule_index = with_rule_index.then_some(item.rule_index);
        let key = (item.meta.mesh.clone(), item.meta.name.clone(), rule_index);
        let origin_index = match seen.get(&key) {
            Some(&index) => index,
            None => {
                let index = origins.len();
                seen.insert(key, index);
                origins.push(Origin {
                    resource: item.meta.clone(),
                    rule_index,
                });
                index
            }
        };
        if let Some(hash) = item.entry.matches_hash() {
            backend_ref_origin_index
                .entry(hash.clone())
                .or_insert(origin_index);
        }
    }
    (origins, backend_ref_origin_index)
}
