#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod identifier;
mod meta;
mod resource;
mod target_ref;

pub use self::{
    identifier::{ResourceIdentifier, TypedResourceIdentifier},
    meta::{labels, PolicyRole, ResourceMeta, ResourceOrigin},
    resource::{Port, Resource, ResourceKind, ResourceReader, TCP_PORT_RESERVED},
    target_ref::{TargetRef, TargetRefKind},
};
