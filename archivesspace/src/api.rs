use crate::types::DateRecord;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchivesSpaceError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Authentication failed for user {username}")]
    Authentication { username: String },

    #[error("Record not found: {uri}")]
    NotFound { uri: String },

    #[error("{count} results found for search {search}. Expected one result.")]
    UnexpectedResultCount { count: usize, search: String },

    #[error("No dates found for {uri} or any of its ancestors")]
    NoDates { uri: String },

    #[error("Date list is empty")]
    EmptyDates,

    #[error("Date record is missing {field}")]
    MissingDateField { field: String },

    #[error("Invalid date {value:?}: {reason}")]
    InvalidDate { value: String, reason: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },
}

pub type ArchivesSpaceResult<T> = Result<T, ArchivesSpaceError>;

/// Read access to ArchivesSpace needed for packaging
#[async_trait]
pub trait ArchivesSpaceApi: Send + Sync {
    /// Resolves a ref id to the URI of exactly one archival object.
    async fn archival_object_uri(&self, refid: &str) -> ArchivesSpaceResult<String>;

    /// Dates of the object at `uri`, or of its nearest dated ancestor.
    async fn closest_dates(&self, uri: &str) -> ArchivesSpaceResult<Vec<DateRecord>>;

    fn repository(&self) -> &str;
}
