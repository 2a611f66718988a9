//! Error types for the entsync engine.

use thiserror::Error;

/// Errors that can occur during a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A scraped record was missing or had an unparsable required field.
    /// These are skipped and counted, never merged into a neighbor.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// The calendar collaborator could not be read before mutation.
    /// Fatal for the run: a failed read must never look like an empty calendar.
    #[error("calendar unavailable: {0}")]
    CalendarUnavailable(String),
}

/// Result type alias for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors returned by a [`CalendarStore`](crate::store::CalendarStore) operation.
///
/// The executor's retry policy keys off the variant: `Transient` failures
/// are retried with backoff, `Rejected` ones are not.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store cannot be reached at all (network down, auth expired).
    #[error("calendar unavailable: {0}")]
    Unavailable(String),

    /// Rate limit, timeout, or other failure worth retrying.
    #[error("transient calendar error: {0}")]
    Transient(String),

    /// The store refused the operation; retrying won't help.
    #[error("calendar rejected operation: {0}")]
    Rejected(String),
}
