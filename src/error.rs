use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid quantity {value:?}: {reason}")]
    InvalidQuantity { value: String, reason: &'static str },

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Cannot set owner reference: {0}")]
    OwnerReference(String),

    #[error("{kind} {name} is already controlled by {owner}")]
    AlreadyOwned {
        kind: String,
        name: String,
        owner: String,
    },

    #[error("Reconcile cancelled during {0}")]
    Cancelled(&'static str),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Object store error: {0}")]
    Store(String),
}

impl Error {
    /// Errors caused by racing writers. The whole invocation should be retried
    /// against a fresh read.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::AlreadyExists(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref e) if e.code == 409 && e.reason == "AlreadyExists" => {
                Error::AlreadyExists(e.message.clone())
            }
            kube::Error::Api(ref e) if e.code == 409 => Error::Conflict(e.message.clone()),
            kube::Error::Api(ref e) if e.code == 404 => Error::NotFound(e.message.clone()),
            other => Error::Kube(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
