//! Backends that list an entry's items.
//!
//! - [`SourceClient`] - the contract every backend implements
//! - [`SourceRegistry`] - lookup by source id, reporting missing backends
//! - [`LocalSource`] - directory-backed source whose empty listings are trusted

mod local;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::media::{Entry, EntryDetails, RemoteItem, SourceId};
use crate::sync::SyncError;

pub use local::{LocalSource, LOCAL_SOURCE_ID};

/// Errors a backend may report while listing or describing an entry.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network or filesystem failure; the next scheduled run may succeed
    #[error("I/O error: {0}")]
    Io(String),
    /// Backend answered but the payload could not be interpreted
    #[error("Invalid response: {0}")]
    Parse(String),
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err.to_string())
    }
}

#[async_trait]
pub trait SourceClient: Send + Sync {
    fn id(&self) -> SourceId;

    fn name(&self) -> &str;

    /// Local sources are ground truth: an empty listing means the entry
    /// really has no items.
    fn is_local(&self) -> bool {
        false
    }

    /// Unmetered sources do not count towards the per-source queue warning.
    fn is_unmetered(&self) -> bool {
        self.is_local()
    }

    /// Full item listing for an entry, newest first.
    async fn item_list(&self, entry: &Entry) -> Result<Vec<RemoteItem>, SourceError>;

    /// Hook to complete lazily populated fields before matching.
    fn prepare_new_item(&self, _item: &mut RemoteItem, _entry: &Entry) {}

    /// Descriptive metadata, when the backend offers any.
    async fn details(&self, _entry: &Entry) -> Result<Option<EntryDetails>, SourceError> {
        Ok(None)
    }
}

/// Installed sources keyed by id.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: HashMap<SourceId, Arc<dyn SourceClient>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn SourceClient>) {
        tracing::debug!(source_id = source.id(), name = source.name(), "Registered source");
        self.sources.insert(source.id(), source);
    }

    /// # Errors
    ///
    /// [`SyncError::BackendUnavailable`] when no source with that id is installed.
    pub fn get(&self, id: SourceId) -> Result<Arc<dyn SourceClient>, SyncError> {
        self.sources
            .get(&id)
            .cloned()
            .ok_or(SyncError::BackendUnavailable(id))
    }

    /// Display name, falling back to the bare id for missing sources.
    pub fn display_name(&self, id: SourceId) -> String {
        match self.sources.get(&id) {
            Some(source) => source.name().to_string(),
            None => format!("Source {id} (not installed)"),
        }
    }

    /// Missing sources count as metered.
    pub fn is_unmetered(&self, id: SourceId) -> bool {
        self.sources.get(&id).is_some_and(|s| s.is_unmetered())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl FromIterator<Arc<dyn SourceClient>> for SourceRegistry {
    fn from_iter<T: IntoIterator<Item = Arc<dyn SourceClient>>>(iter: T) -> Self {
        let mut registry = SourceRegistry::new();
        for source in iter {
            registry.register(source);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(SourceId);

    #[async_trait]
    impl SourceClient for Named {
        fn id(&self) -> SourceId {
            self.0
        }

        fn name(&self) -> &str {
            "Named"
        }

        async fn item_list(&self, _entry: &Entry) -> Result<Vec<RemoteItem>, SourceError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_missing_source_is_unavailable() {
        let registry: SourceRegistry = [Arc::new(Named(7)) as Arc<dyn SourceClient>]
            .into_iter()
            .collect();

        assert!(registry.get(7).is_ok());
        assert!(matches!(
            registry.get(8),
            Err(SyncError::BackendUnavailable(8))
        ));
        assert_eq!(registry.display_name(8), "Source 8 (not installed)");
        assert!(!registry.is_unmetered(7));
        assert!(!registry.is_unmetered(8));
    }
}
