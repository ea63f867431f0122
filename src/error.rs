use thiserror::Error;

use crate::profile_document::types::SCHEMA_VERSION;

/// Fatal (tier-1) failures. Everything else in the core is a soft warning
/// plus a counter bump, never an `Err`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open profile file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse profile document: {0}")]
    Syntax(#[from] serde_yaml::Error),
    #[error("unsupported profile schema version {0}, expected {SCHEMA_VERSION}")]
    VersionMismatch(u64),
    #[error("profile declares more than one event in a single event-names field: {0:?}")]
    MultiEvent(String),
}
