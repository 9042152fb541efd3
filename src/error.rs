//! Failure modes of a single message's amputation.
//!
//! None of these are fatal to the process. Finding no URLs is not an error
//! at all; see [`crate::amputate::Outcome::NothingToDo`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AmputateError {
    /// Transport failure, bad status or unparseable body from the resolver.
    #[error("resolution failed: {0}")]
    ResolutionFailed(String),

    /// The resolver answered but had no canonical URLs for a nonempty request.
    #[error("resolver returned no canonical URLs")]
    ResolutionEmpty,

    /// Chat-platform metadata (e.g. a server's name) could not be fetched.
    #[error("lookup failed: {0}")]
    LookupFailed(String),

    /// The event write errored or did not affect exactly the expected rows.
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),
}

impl From<reqwest::Error> for AmputateError {
    fn from(err: reqwest::Error) -> Self {
        Self::ResolutionFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AmputateError>;
