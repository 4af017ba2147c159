//! One-time server password bootstrap.
//!
//! The password lives in an `Opaque` Secret named after the server. The
//! resource only ever holds a reference to it, and that reference is written
//! once.

use k8s_openapi::api::core::v1::Secret as CoreSecret;
use kube::ResourceExt;
use rand::distr::Alphanumeric;
use rand::Rng;
use tracing::{info, instrument};

use crate::crd::{GameServer, SecretReference};
use crate::error::{Error, Result};
use crate::reconciler::{ensure_controlled_by, owner_reference};
use crate::store::ObjectStore;
use crate::types::{ChildResource, Secret};

pub const PASSWORD_KEY: &str = "password";
pub const PASSWORD_LENGTH: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bootstrap {
    /// A new secret was generated and stored.
    Generated,
    /// The secret already existed and was only referenced.
    Adopted,
}

/// Draws from `[A-Za-z0-9]` using the thread-local CSPRNG.
pub fn generate_password(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Makes sure the password Secret exists, then records a reference to it on
/// the resource. The reference update carries the resourceVersion that was
/// read, so a concurrent edit of the resource surfaces as a conflict. A
/// Secret controlled by another object is never adopted.
#[instrument(skip_all, fields(game = K::GAME, name = %server.name_any()))]
pub async fn bootstrap<K, S>(store: &S, server: &K) -> Result<Bootstrap>
where
    K: GameServer,
    S: ObjectStore,
{
    let name = server.name_any();
    let namespace = server
        .namespace()
        .ok_or(Error::MissingField("metadata.namespace"))?;

    let owner = owner_reference(server)?;

    let outcome = match store.get::<CoreSecret>(&namespace, &name).await? {
        Some(existing) => {
            ensure_controlled_by(&existing, &owner)?;
            info!(secret = %name, "Password secret exists, adopting it");
            Bootstrap::Adopted
        }
        None => {
            let secret = Secret::opaque(&name)
                .labels(server.child_labels())
                .data(PASSWORD_KEY, generate_password(PASSWORD_LENGTH))
                .into_k8s(&namespace, Some(owner));
            store.create(&secret).await?;
            info!(secret = %name, "Generated server password");
            Bootstrap::Generated
        }
    };

    let mut updated = server.clone();
    updated.set_credential(SecretReference {
        name,
        namespace: Some(namespace),
    });
    store.update(&updated).await?;

    Ok(outcome)
}
