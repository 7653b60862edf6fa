#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Policy targeting and merge engine for the mesh control plane.
//!
//! Given a snapshot of resources and a set of precedence-ordered policies,
//! computes the single effective configuration for every targeted resource:
//! [`inbound::build_rules`] for dataplane-scoped ("from") rules,
//! [`outbound::build_rules`] for destination-scoped ("to") rules, and
//! [`merge::merge_confs`] for ad hoc structural merges.

pub mod inbound;
pub mod merge;
pub mod outbound;
pub mod policy;
pub mod resolve;
pub mod sort;
pub mod subset;

#[cfg(test)]
pub(crate) mod testing;

pub use self::merge::{merge_confs, MergeByKey, MergeSchema, Mergeable};
