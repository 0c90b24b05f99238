use thiserror::Error;

use crate::media::SourceId;
use crate::source::SourceError;

/// Why refreshing one entry failed.
///
/// Every variant is recorded per entry by the coordinator; none of them stops
/// a library refresh.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A remote backend returned no items at all
    #[error("Backend returned an empty item listing")]
    EmptyRemoteListing,

    /// The entry's source is not installed
    #[error("Source not installed: {0}")]
    BackendUnavailable(SourceId),

    /// Network or filesystem failure in the source layer
    #[error("{0}")]
    TransientIo(String),

    /// Stored data changed underneath a refresh in a way it cannot reconcile
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error(transparent)]
    Repository(#[from] anyhow::Error),

    /// Any other backend failure
    #[error(transparent)]
    Source(SourceError),
}

impl From<SourceError> for SyncError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Io(msg) => SyncError::TransientIo(msg),
            other => SyncError::Source(other),
        }
    }
}
