use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("mutation already registered: {0}")]
    DuplicateMutation(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("method `{method}` declared more than once on {service}")]
    DuplicateMethod { service: String, method: String },

    #[error("event `{event}` handled by both `{first}` and `{second}`")]
    DuplicateEvent {
        event: String,
        first: String,
        second: String,
    },

    #[error("asset key for `{0}` is already registered")]
    DuplicateAsset(String),

    #[error("invalid event handler `{method}`: {reason}")]
    InvalidHandler { method: String, reason: String },

    #[error("invalid type descriptor `{0}`")]
    InvalidType(String),

    #[error("asset `{0}` already has a build path")]
    AlreadyBuilt(String),

    #[error("asset `{0}` already has a remote key")]
    AlreadyPublished(String),

    #[error("asset `{0}` has not been built")]
    NotBuilt(String),
}
