pub mod container;
pub mod core;
pub mod metadata;
pub mod volume;
pub mod workloads;

pub use container::*;
pub use core::*;
pub use metadata::*;
pub use volume::*;
pub use workloads::*;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

use crate::store::Object;

/// Fields owned outright, as `(path, keys)` into the rendered JSON. A listed
/// key that the rendered object leaves out must be absent from the live
/// object too. A `*` path segment steps into every array element.
pub type ManagedFields = &'static [(&'static str, &'static [&'static str])];

/// A typed description of a child object, rendered into its API type with
/// the namespace and owner of the parent.
pub trait ChildResource: Send + Sync {
    type K8sType: Object;

    /// Empty for kinds that are created once and never replaced.
    const MANAGED: ManagedFields = &[];

    fn name(&self) -> &str;
    fn into_k8s(self, namespace: &str, owner_ref: Option<OwnerReference>) -> Self::K8sType;
}
