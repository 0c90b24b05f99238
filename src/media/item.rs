use std::fmt::Debug;

use super::entry::{EntryId, MediaKind};

pub type ItemId = i64;

/// Numeric index recognized from an item's name (chapter 12.5, episode 3, ...).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ItemNumber {
    Recognized(f64),
    #[default]
    Unrecognized,
}

impl ItemNumber {
    /// Interpret a backend-provided number; negative or non-finite values mean
    /// the backend did not know it.
    pub fn from_hint(hint: Option<f64>) -> Self {
        match hint {
            Some(n) if n.is_finite() && n >= 0.0 => ItemNumber::Recognized(n),
            _ => ItemNumber::Unrecognized,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            ItemNumber::Recognized(n) => Some(*n),
            ItemNumber::Unrecognized => None,
        }
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, ItemNumber::Recognized(_))
    }

    /// Hashable identity of a recognized number (`-0.0` folds into `0.0`).
    pub(crate) fn key(&self) -> Option<u64> {
        self.value().map(|n| (n + 0.0).to_bits())
    }
}

/// An item as listed by a backend, before it is matched against local state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteItem {
    pub url: String,
    pub name: String,
    pub scanlator: Option<String>,
    /// Number supplied by the backend, if it knows one
    pub number: Option<f64>,
    /// Epoch ms, 0 when unknown
    pub date_upload: i64,
}

impl RemoteItem {
    pub fn new(url: &str, name: &str) -> Self {
        Self {
            url: url.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Playback/reading progress, stored in two generic columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResumePosition {
    pub position: i64,
    pub total: i64,
}

/// Fields every chapter, episode and track has in common.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemCore {
    pub id: ItemId,
    pub entry_id: EntryId,
    pub url: String,
    pub name: String,
    pub scanlator: Option<String>,
    pub number: ItemNumber,
    pub source_order: i64,
    pub date_fetch: i64,
    pub date_upload: i64,
    pub read: bool,
    pub bookmark: bool,
}

impl ItemCore {
    /// Build an unsaved item (id 0) from a remote listing row.
    pub fn from_remote(
        entry_id: EntryId,
        remote: RemoteItem,
        source_order: i64,
        number: ItemNumber,
    ) -> Self {
        Self {
            id: 0,
            entry_id,
            url: remote.url,
            name: remote.name,
            scanlator: remote.scanlator,
            number,
            source_order,
            date_fetch: 0,
            date_upload: remote.date_upload,
            read: false,
            bookmark: false,
        }
    }
}

/// Capability interface the sync engine is generic over.
///
/// Adapters expose their shared fields through [`core`](LibraryItem::core) and
/// keep their own resume fields. The provided methods encode the metadata
/// comparison and download naming rules; adapters override them where their
/// domain differs.
pub trait LibraryItem: Clone + Debug + Send + Sync + 'static {
    const KIND: MediaKind;

    fn core(&self) -> &ItemCore;

    fn core_mut(&mut self) -> &mut ItemCore;

    fn resume(&self) -> ResumePosition;

    fn from_parts(core: ItemCore, resume: ResumePosition) -> Self;

    fn from_core(core: ItemCore) -> Self {
        Self::from_parts(core, ResumePosition::default())
    }

    /// Whether a freshly listed item carries metadata the stored one lacks.
    ///
    /// An unknown remote upload date (0) never counts as a change, so undated
    /// items stay stable across refreshes.
    fn metadata_differs(&self, remote: &Self) -> bool {
        let (old, new) = (self.core(), remote.core());
        old.name != new.name
            || old.scanlator != new.scanlator
            || old.number != new.number
            || old.source_order != new.source_order
            || (new.date_upload != 0 && old.date_upload != new.date_upload)
    }

    /// Copy listing metadata from `remote`, keeping ids and user state.
    fn apply_remote_metadata(&mut self, remote: &Self) {
        let new = remote.core();
        let core = self.core_mut();
        core.name = new.name.clone();
        core.scanlator = new.scanlator.clone();
        core.number = new.number;
        core.source_order = new.source_order;
        if new.date_upload != 0 {
            core.date_upload = new.date_upload;
        }
    }

    /// Directory name the download index files this item under.
    fn download_key(&self) -> String {
        let core = self.core();
        match core.scanlator.as_deref().filter(|s| !s.is_empty()) {
            Some(group) => {
                crate::util::sanitize_file_name(&format!("{}_{}", group, core.name)).into_owned()
            }
            None => crate::util::sanitize_file_name(&core.name).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Chapter;

    fn chapter(name: &str, scanlator: Option<&str>, upload: i64) -> Chapter {
        let mut remote = RemoteItem::new("/c/1", name);
        remote.scanlator = scanlator.map(str::to_string);
        remote.date_upload = upload;
        Chapter::from_core(ItemCore::from_remote(1, remote, 0, ItemNumber::Recognized(1.0)))
    }

    #[test]
    fn test_hint_rejects_negative_and_nan() {
        assert_eq!(ItemNumber::from_hint(Some(-1.0)), ItemNumber::Unrecognized);
        assert_eq!(ItemNumber::from_hint(Some(f64::NAN)), ItemNumber::Unrecognized);
        assert_eq!(ItemNumber::from_hint(None), ItemNumber::Unrecognized);
        assert_eq!(ItemNumber::from_hint(Some(0.0)), ItemNumber::Recognized(0.0));
    }

    #[test]
    fn test_negative_zero_shares_key() {
        assert_eq!(
            ItemNumber::Recognized(-0.0).key(),
            ItemNumber::Recognized(0.0).key()
        );
        assert_eq!(ItemNumber::Unrecognized.key(), None);
    }

    #[test]
    fn test_unknown_upload_date_is_not_a_change() {
        let stored = chapter("Chapter 1", None, 5_000);
        let listed = chapter("Chapter 1", None, 0);
        assert!(!stored.metadata_differs(&listed));

        let redated = chapter("Chapter 1", None, 6_000);
        assert!(stored.metadata_differs(&redated));
    }

    #[test]
    fn test_apply_keeps_user_state_and_known_date() {
        let mut stored = chapter("Ch 1", None, 5_000);
        stored.core_mut().read = true;
        stored.core_mut().id = 9;
        let listed = chapter("Chapter 1", Some("Group"), 0);

        stored.apply_remote_metadata(&listed);

        assert_eq!(stored.core().name, "Chapter 1");
        assert_eq!(stored.core().scanlator.as_deref(), Some("Group"));
        assert_eq!(stored.core().date_upload, 5_000);
        assert!(stored.core().read);
        assert_eq!(stored.core().id, 9);
    }

    #[test]
    fn test_download_key_includes_group() {
        assert_eq!(chapter("Ch 1", Some("Team"), 0).download_key(), "Team_Ch 1");
        assert_eq!(chapter("Ch 1", Some(""), 0).download_key(), "Ch 1");
    }
}
