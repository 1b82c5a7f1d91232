use thiserror::Error;

use super::entry::AccessProperty;

/// Failures callers are expected to tell apart. Raised through `anyhow` and
/// recovered with `downcast_ref::<RepoError>()`; anything else coming out of
/// the repository is a store or filesystem failure.
#[derive(Debug, Error)]
pub(crate) enum RepoError {
    #[error("{principal} lacks {property:?} on {entry}")]
    Unauthorized {
        principal: String,
        entry: String,
        property: AccessProperty,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("quota of {quota} bytes exceeded by {context}, fill level would be {requested}")]
    QuotaExceeded {
        context: String,
        quota: u64,
        requested: u64,
    },
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("not allowed: {0}")]
    Disallowed(String),
}

pub(crate) fn is_unauthorized(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<RepoError>(),
        Some(RepoError::Unauthorized { .. })
    )
}
