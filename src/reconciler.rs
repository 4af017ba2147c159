//! Idempotent ensure-steps for child objects.
//!
//! Every child kind goes through the same three operations: create if absent,
//! create or leave a storage claim alone, and create or replace on drift. A
//! live child controlled by some other object is never adopted.

use k8s_openapi::api::core::v1::PersistentVolumeClaim as CoreClaim;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::builder::{BoundClaim, ClaimSpec};
use crate::error::{Error, Result};
use crate::quantity;
use crate::store::{Object, ObjectStore};
use crate::types::{requested_storage, ChildResource, ManagedFields};

/// Controller edge from a child to `owner`. Fails if the owner has not been
/// persisted yet, since a child without an owner would outlive it.
pub fn owner_reference<K: Resource<DynamicType = ()>>(owner: &K) -> Result<OwnerReference> {
    let kind = K::kind(&()).to_string();
    let name = owner
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::OwnerReference(format!("{kind} has no name")))?;
    let uid = owner
        .meta()
        .uid
        .clone()
        .ok_or_else(|| Error::OwnerReference(format!("{kind} {name} has no uid")))?;

    Ok(OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind,
        name,
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// Fails when `live` has a controller other than `owner`. Objects without a
/// controller are taken over by the next write.
pub fn ensure_controlled_by<T: Object>(live: &T, owner: &OwnerReference) -> Result<()> {
    let foreign = live
        .owner_references()
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner.uid);

    match foreign {
        Some(other) => Err(Error::AlreadyOwned {
            kind: T::kind(&()).to_string(),
            name: live.name_any(),
            owner: format!("{} {}", other.kind, other.name),
        }),
        None => Ok(()),
    }
}

#[derive(Clone, Debug)]
pub enum Applied<T> {
    Created(T),
    Updated(T),
    Unchanged(T),
}

impl<T> Applied<T> {
    pub fn into_inner(self) -> T {
        match self {
            Applied::Created(t) | Applied::Updated(t) | Applied::Unchanged(t) => t,
        }
    }

    pub fn wrote(&self) -> bool {
        !matches!(self, Applied::Unchanged(_))
    }
}

/// A live claim whose size no longer matches the spec. Claims are never
/// resized or recreated automatically.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResizeNeeded {
    pub claim: String,
    pub current: String,
    pub requested: String,
}

#[derive(Clone, Debug)]
pub struct EnsuredClaim {
    pub bound: BoundClaim,
    pub created: bool,
    pub resize: Option<ResizeNeeded>,
}

pub struct ChildReconciler<'a, S> {
    store: &'a S,
    namespace: String,
    owner: OwnerReference,
}

impl<'a, S: ObjectStore> ChildReconciler<'a, S> {
    pub fn new<K>(store: &'a S, parent: &K) -> Result<Self>
    where
        K: Resource<DynamicType = ()>,
    {
        let namespace = parent
            .namespace()
            .ok_or(Error::MissingField("metadata.namespace"))?;
        Ok(Self {
            store,
            namespace,
            owner: owner_reference(parent)?,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Creates the object when absent. An existing object is never touched.
    pub async fn ensure_exists<T: ChildResource>(
        &self,
        desired: T,
    ) -> Result<Applied<T::K8sType>> {
        let kind = T::K8sType::kind(&());
        let name = desired.name().to_string();

        if let Some(existing) = self
            .store
            .get::<T::K8sType>(&self.namespace, &name)
            .await?
        {
            ensure_controlled_by(&existing, &self.owner)?;
            debug!(%kind, %name, "Already exists");
            return Ok(Applied::Unchanged(existing));
        }

        let rendered = desired.into_k8s(&self.namespace, Some(self.owner.clone()));
        let created = self.store.create(&rendered).await?;
        info!(%kind, %name, "Created");
        Ok(Applied::Created(created))
    }

    /// Creates the claim when absent. An existing claim is compared by
    /// parsed size and reported, never mutated.
    pub async fn ensure_claim(&self, spec: &ClaimSpec) -> Result<EnsuredClaim> {
        let applied = self.ensure_exists(spec.claim.clone()).await?;
        let created = applied.wrote();
        let live = applied.into_inner();
        let claim_name = live.name_any();

        let resize = if created {
            None
        } else {
            size_mismatch(&live, spec.size())?
        };
        if let Some(resize) = &resize {
            warn!(
                claim = %resize.claim,
                current = %resize.current,
                requested = %resize.requested,
                "Storage claim size differs from spec, resize needed"
            );
        }

        Ok(EnsuredClaim {
            bound: spec.bind(claim_name),
            created,
            resize,
        })
    }

    /// Creates the object when absent and replaces it when it has drifted
    /// from `desired`. Nothing is written when the live object already
    /// matches every desired field and carries none of the managed fields
    /// `desired` leaves out.
    pub async fn ensure_matches<T: ChildResource>(
        &self,
        desired: T,
    ) -> Result<Applied<T::K8sType>> {
        let kind = T::K8sType::kind(&());
        let name = desired.name().to_string();
        let rendered = desired.into_k8s(&self.namespace, Some(self.owner.clone()));

        let Some(existing) = self
            .store
            .get::<T::K8sType>(&self.namespace, &name)
            .await?
        else {
            let created = self.store.create(&rendered).await?;
            info!(%kind, %name, "Created");
            return Ok(Applied::Created(created));
        };
        ensure_controlled_by(&existing, &self.owner)?;

        let mut want = serde_json::to_value(&rendered)?;
        mark_managed(&mut want, T::MANAGED);
        let have = serde_json::to_value(&existing)?;
        if !has_drifted(&want, &have) {
            debug!(%kind, %name, "Up to date");
            return Ok(Applied::Unchanged(existing));
        }

        let replacement = overlay_onto(&existing, have, want)?;
        let updated = self.store.update(&replacement).await?;
        info!(%kind, %name, "Drifted, replaced");
        Ok(Applied::Updated(updated))
    }
}

fn size_mismatch(live: &CoreClaim, requested: &str) -> Result<Option<ResizeNeeded>> {
    let current = requested_storage(live).unwrap_or_default();
    let same = !current.is_empty() && quantity::same_quantity(current, requested)?;

    Ok((!same).then(|| ResizeNeeded {
        claim: live.name_any(),
        current: current.to_string(),
        requested: requested.to_string(),
    }))
}

/// Writes an explicit `null` for every managed key `value` leaves out, so
/// the comparison and the overlay treat the key as one to clear.
pub fn mark_managed(value: &mut Value, managed: ManagedFields) {
    for (path, keys) in managed {
        let path: Vec<&str> = path.split('/').collect();
        mark_at(value, &path, keys);
    }
}

fn mark_at(value: &mut Value, path: &[&str], keys: &[&str]) {
    match path.split_first() {
        None => {
            if let Value::Object(map) = value {
                for key in keys {
                    map.entry(*key).or_insert(Value::Null);
                }
            }
        }
        Some((&"*", rest)) => {
            if let Value::Array(items) = value {
                for item in items {
                    mark_at(item, rest, keys);
                }
            }
        }
        Some((segment, rest)) => {
            if let Some(next) = value.get_mut(*segment) {
                mark_at(next, rest, keys);
            }
        }
    }
}

/// True when `existing` is missing a desired field, differs from one, or
/// still sets a field `desired` marks `null`. Other fields the server fills
/// in never count as drift. Under `limits` and `requests` the key sets must
/// match and quantities compare by value.
pub fn has_drifted(desired: &Value, existing: &Value) -> bool {
    !contains(existing, desired, false)
}

fn contains(have: &Value, want: &Value, quantities: bool) -> bool {
    match (want, have) {
        (Value::Null, have) => is_unset(have),
        (Value::Object(want), Value::Object(have)) => {
            let fields = want.iter().all(|(key, value)| {
                let quantities = quantities || key == "limits" || key == "requests";
                match have.get(key) {
                    Some(existing) => contains(existing, value, quantities),
                    None => is_unset(value),
                }
            });
            fields && (!quantities || have.keys().all(|key| want.contains_key(key)))
        }
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len()
                && want
                    .iter()
                    .zip(have)
                    .all(|(w, h)| contains(h, w, quantities))
        }
        (Value::String(want), Value::String(have)) if quantities => {
            want == have || quantity::same_quantity(want, have).unwrap_or(false)
        }
        _ => want == have,
    }
}

/// The API server drops empty maps, lists and false flags, and returns
/// `resources: {}` for a container without any.
fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// The live object with every desired field laid over it and every field
/// desired marks `null` removed. Keeps the live `resourceVersion` and the
/// fields the server assigned, such as a Service's `clusterIP`.
fn overlay_onto<K: Object>(existing: &K, mut merged: Value, desired: Value) -> Result<K> {
    overlay(&mut merged, desired);
    let mut merged: K = serde_json::from_value(merged)?;
    merged.meta_mut().resource_version = existing.meta().resource_version.clone();
    Ok(merged)
}

fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Object(base), Value::Object(top)) => overlay_map(base, top),
        (base, top) => *base = top,
    }
}

fn overlay_map(base: &mut Map<String, Value>, top: Map<String, Value>) {
    for (key, value) in top {
        if value.is_null() {
            base.remove(&key);
            continue;
        }
        match base.get_mut(&key) {
            Some(slot) => overlay(slot, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}
