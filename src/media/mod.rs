//! Library domain model shared by the manga, anime and audiobook collections.
//!
//! - [`entry`] - saved library entries and their scheduling fields
//! - [`item`] - the [`LibraryItem`] capability trait and the shared [`ItemCore`]
//! - [`manga`], [`anime`], [`audiobook`] - thin per-domain item adapters
//!
//! The sync engine is written once against [`LibraryItem`]; each adapter only
//! contributes its resume-position fields and a few naming rules.

pub mod anime;
pub mod audiobook;
mod entry;
mod item;
pub mod manga;

pub use anime::Episode;
pub use audiobook::Track;
pub use entry::{
    CategoryId, Entry, EntryDetails, EntryId, EntryStatus, LibraryEntry, MediaKind, NewEntry,
    SourceId, UpdateStrategy, DEFAULT_CATEGORY,
};
pub use item::{ItemCore, ItemId, ItemNumber, LibraryItem, RemoteItem, ResumePosition};
pub use manga::Chapter;
