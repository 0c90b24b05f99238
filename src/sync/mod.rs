//! The library synchronization engine.
//!
//! - [`ReconciliationEngine`] merges one entry's remote listing into storage
//! - [`FetchIntervalEstimator`] decides when an entry is next due
//! - [`LibraryRefreshCoordinator`] refreshes a whole library with bounded
//!   concurrency and reports the outcome

mod coordinator;
mod error;
mod interval;
mod options;
mod recognition;
mod reconcile;
mod report;
mod repository;
mod selection;

pub use coordinator::{LibraryRefreshCoordinator, RefreshSummary, UpdatedEntry};
pub use error::SyncError;
pub use interval::{FetchIntervalEstimator, FetchSchedule, FetchWindow};
pub use options::{DownloadPolicy, LibraryPreferences, UpdateRestrictions};
pub use recognition::{NumberRecognizer, PatternRecognizer};
pub use reconcile::{ReconcileOutcome, ReconciliationEngine};
pub use report::{render_error_report, write_error_report, FailedEntry};
pub use repository::ContentRepository;
pub use selection::{select_entries, Selection, SkipReason, SkippedEntry};
