//! Inbound rule building: every matched policy's "from" entries collapse
//! into one effective conf per partition group for the selected proxy.

use crate::merge::{merge_entries, Mergeable};
use crate::policy::{origins, Origin, PolicyWithRules, WithPolicyAttributes};
use crate::sort::sort_rule_entries;
use anyhow::Context;
use std::sync::Arc;
use tracing::debug;

/// An effective inbound configuration and the policies it came from.
#[derive(Clone, Debug)]
pub struct Rule<C> {
    pub conf: C,
    pub origin: Vec<Origin>,
}

/// Builds the effective inbound rules from the policies matching one proxy.
/// Entries from every policy pool together, sort by precedence and merge
/// least-specific first, so the most specific policy wins field by field.
pub fn build_rules<C>(
    policies: &[Arc<dyn PolicyWithRules<Conf = C>>],
) -> anyhow::Result<Vec<Rule<C>>>
where
    C: Mergeable,
{
    let mut items = Vec::new();
    for policy in policies {
        let meta = policy.meta();
        for (rule_index, entry) in policy.rules().iter().enumerate() {
            items.push(WithPolicyAttributes {
                entry: entry.clone(),
                meta: meta.clone(),
                top_level: policy.target_ref().clone(),
                rule_index,
            });
        }
    }
    if items.is_empty() {
        return Ok(Vec::new());
    }

    sort_rule_entries(&mut items);
    let confs = merge_entries(&items).context("failed to merge inbound confs")?;
    let (origin, _) = origins(&items, false);
    debug!(policies = origin.len(), rules = confs.len(), "built inbound rules");

    Ok(confs
        .into_iter()
        .map(|conf| Rule {
            conf,
            origin: origin.clone(),
        })
        .collect())
}
