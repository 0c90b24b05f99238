use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type EntryId = i64;
pub type SourceId = i64;
pub type CategoryId = i64;

/// Category every entry without an explicit category belongs to.
pub const DEFAULT_CATEGORY: CategoryId = 0;

// ============================================================================
// Enumerations
// ============================================================================

/// Which collection an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Manga,
    Anime,
    Audiobook,
}

impl MediaKind {
    pub const ALL: [MediaKind; 3] = [MediaKind::Manga, MediaKind::Anime, MediaKind::Audiobook];

    /// String representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Manga => "manga",
            MediaKind::Anime => "anime",
            MediaKind::Audiobook => "audiobook",
        }
    }

    /// Message recorded when a backend returns an empty listing.
    pub fn no_items_message(&self) -> &'static str {
        match self {
            MediaKind::Manga => "No chapters found",
            MediaKind::Anime => "No episodes found",
            MediaKind::Audiobook => "No tracks found",
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manga" => Ok(MediaKind::Manga),
            "anime" => Ok(MediaKind::Anime),
            "audiobook" => Ok(MediaKind::Audiobook),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publication status reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    #[default]
    Unknown,
    Ongoing,
    Completed,
    Licensed,
    PublishingFinished,
    Cancelled,
    OnHiatus,
}

impl EntryStatus {
    pub fn code(&self) -> i64 {
        match self {
            EntryStatus::Unknown => 0,
            EntryStatus::Ongoing => 1,
            EntryStatus::Completed => 2,
            EntryStatus::Licensed => 3,
            EntryStatus::PublishingFinished => 4,
            EntryStatus::Cancelled => 5,
            EntryStatus::OnHiatus => 6,
        }
    }

    /// Unknown codes fall back to `Unknown` rather than failing the row.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => EntryStatus::Ongoing,
            2 => EntryStatus::Completed,
            3 => EntryStatus::Licensed,
            4 => EntryStatus::PublishingFinished,
            5 => EntryStatus::Cancelled,
            6 => EntryStatus::OnHiatus,
            _ => EntryStatus::Unknown,
        }
    }
}

/// Whether periodic refresh may touch an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpdateStrategy {
    #[default]
    AlwaysUpdate,
    OnlyFetchOnce,
}

impl UpdateStrategy {
    pub fn code(&self) -> i64 {
        match self {
            UpdateStrategy::AlwaysUpdate => 0,
            UpdateStrategy::OnlyFetchOnce => 1,
        }
    }

    pub fn from_code(code: i64) -> Self {
        if code == 1 {
            UpdateStrategy::OnlyFetchOnce
        } else {
            UpdateStrategy::AlwaysUpdate
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A saved library entry (one manga, anime or audiobook).
///
/// `fetch_interval` is signed: positive values are computed cadences in days,
/// negative values are a user override (magnitude in days), and 0 means the
/// interval has never been computed.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: EntryId,
    pub kind: MediaKind,
    pub source: SourceId,
    /// Backend-side identifier of the entry (path or URL fragment)
    pub url: String,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub thumbnail_url: Option<String>,
    pub favorite: bool,
    pub status: EntryStatus,
    pub update_strategy: UpdateStrategy,
    pub fetch_interval: i32,
    /// Epoch ms of the last time the item set changed
    pub last_update: i64,
    /// Epoch ms of the next scheduled check
    pub next_update: i64,
    pub date_added: i64,
}

/// Values needed to create an entry.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub kind: MediaKind,
    pub source: SourceId,
    pub url: String,
    pub title: String,
    pub favorite: bool,
    pub status: EntryStatus,
    pub update_strategy: UpdateStrategy,
}

impl NewEntry {
    /// A favorited, always-updating entry with unknown status.
    pub fn favorite(kind: MediaKind, source: SourceId, url: &str, title: &str) -> Self {
        Self {
            kind,
            source,
            url: url.to_string(),
            title: title.to_string(),
            favorite: true,
            status: EntryStatus::Unknown,
            update_strategy: UpdateStrategy::AlwaysUpdate,
        }
    }

    /// The entry as first stored: no details, no schedule yet.
    pub fn into_entry(self, id: EntryId, date_added: i64) -> Entry {
        Entry {
            id,
            kind: self.kind,
            source: self.source,
            url: self.url,
            title: self.title,
            author: None,
            description: None,
            genre: None,
            thumbnail_url: None,
            favorite: self.favorite,
            status: self.status,
            update_strategy: self.update_strategy,
            fetch_interval: 0,
            last_update: 0,
            next_update: 0,
            date_added,
        }
    }
}

/// Descriptive metadata a backend may report for an entry.
///
/// Every field is optional; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EntryDetails {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub thumbnail_url: Option<String>,
    pub status: Option<EntryStatus>,
}

impl EntryDetails {
    pub fn is_empty(&self) -> bool {
        self == &EntryDetails::default()
    }
}

/// Library view of an entry: categories plus item counters used by the
/// refresh restrictions.
#[derive(Debug, Clone)]
pub struct LibraryEntry {
    pub entry: Entry,
    /// Category memberships; `[DEFAULT_CATEGORY]` when uncategorized
    pub categories: Vec<CategoryId>,
    pub total_items: i64,
    pub read_items: i64,
}

impl LibraryEntry {
    pub fn unread_items(&self) -> i64 {
        (self.total_items - self.read_items).max(0)
    }

    pub fn has_started(&self) -> bool {
        self.read_items > 0
    }

    pub fn in_any(&self, categories: &[CategoryId]) -> bool {
        self.categories.iter().any(|c| categories.contains(c))
    }
}
