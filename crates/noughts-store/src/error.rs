/// Errors returned by a [`SessionStore`](crate::SessionStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No record with that id.
    #[error("{0} not found")]
    NotFound(String),

    /// A conditional write found the record in a different state than the
    /// caller expected. Nothing was written.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backing store failed.
    #[error("store backend error: {0}")]
    Backend(String),
}
