//! Library refresh engine for manga, anime and audiobook collections.
//!
//! - [`sync`] - reconciliation, fetch interval estimation and the batch refresh
//! - [`media`] - entries, items and the per-domain item adapters
//! - [`source`] - backend contract, registry and the local directory source
//! - [`storage`] - SQLite persistence implementing the sync repository
//! - [`scheduler`] - periodic and on-demand refresh host

pub mod clock;
pub mod config;
pub mod download;
pub mod media;
pub mod notify;
pub mod preferences;
pub mod scheduler;
pub mod source;
pub mod storage;
pub mod sync;
pub mod util;
