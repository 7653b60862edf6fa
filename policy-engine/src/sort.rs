//! Precedence ordering for pooled policy entries.
//!
//! Entries sort least- to most-specific so that a left-to-right merge lets
//! the most specific conf win: target kind specificity first, then origin
//! (zone overrides global), then listener tag count between `MeshGateway`
//! refs, then role (consumer overrides producer), and finally the display
//! name in reverse order so the lexicographically smaller name takes
//! precedence. The sort is stable.

use crate::policy::{RuleEntry, ToEntry, WithPolicyAttributes};
use policy_engine_core::{TargetRef, TargetRefKind};
use std::cmp::Ordering;

pub fn sort_rule_entries<C>(items: &mut [WithPolicyAttributes<RuleEntry<C>>]) {
    items.sort_by(|a, b| {
        a.top_level
            .kind
            .cmp(&b.top_level.kind)
            .then_with(|| by_policy_attributes(a, b))
    });
}

/// Outbound entries additionally rank by the entry's own target kind and,
/// between `MeshService` entries, by explicit-section presence: the entry
/// narrowed to a section is more specific.
pub fn sort_to_entries<C>(items: &mut [WithPolicyAttributes<ToEntry<C>>]) {
    items.sort_by(|a, b| {
        a.top_level
            .kind
            .cmp(&b.top_level.kind)
            .then_with(|| a.meta.origin().cmp(&b.meta.origin()))
            .then_with(|| by_gateway_tags(a, b))
            .then_with(|| a.meta.role().cmp(&b.meta.role()))
            .then_with(|| a.entry.target_ref.kind.cmp(&b.entry.target_ref.kind))
            .then_with(|| by_section_presence(a, b))
            .then_with(|| b.meta.display_name().cmp(a.meta.display_name()))
    });
}

fn by_section_presence<C>(
    a: &WithPolicyAttributes<ToEntry<C>>,
    b: &WithPolicyAttributes<ToEntry<C>>,
) -> Ordering {
    if a.entry.target_ref.kind != TargetRefKind::MeshService
        || b.entry.target_ref.kind != TargetRefKind::MeshService
    {
        return Ordering::Equal;
    }
    a.entry
        .target_ref
        .section_name
        .is_some()
        .cmp(&b.entry.target_ref.section_name.is_some())
}

fn by_policy_attributes<E>(
    a: &WithPolicyAttributes<E>,
    b: &WithPolicyAttributes<E>,
) -> Ordering {
    a.meta
        .origin()
        .cmp(&b.meta.origin())
        .then_with(|| by_gateway_tags(a, b))
        .then_with(|| a.meta.role().cmp(&b.meta.role()))
        .then_with(|| b.meta.display_name().cmp(a.meta.display_name()))
}

/// Between `MeshGateway` policies, the one selecting with fewer listener
/// tags is less specific and sorts first. The kinds are already equal when
/// this tie-break runs.
fn by_gateway_tags<E>(a: &WithPolicyAttributes<E>, b: &WithPolicyAttributes<E>) -> Ordering {
    if a.top_level.kind != TargetRefKind::MeshGateway {
        return Ordering::Equal;
    }
    let count = |t: &TargetRef| t.tags.as_ref().map_or(0, |tags| tags.len());
    count(&a.top_level).cmp(&count(&b.top_level))
}
