//! Audiobook adapter: tracks resume at a millisecond offset.
//!
//! Narrator labels travel in the scanlator slot but do not name download
//! directories; a track is filed by its title alone.

use super::entry::MediaKind;
use super::item::{ItemCore, LibraryItem, ResumePosition};

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub core: ItemCore,
    pub position_ms: i64,
    pub duration_ms: i64,
}

impl LibraryItem for Track {
    const KIND: MediaKind = MediaKind::Audiobook;

    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn resume(&self) -> ResumePosition {
        ResumePosition {
            position: self.position_ms,
            total: self.duration_ms,
        }
    }

    fn from_parts(core: ItemCore, resume: ResumePosition) -> Self {
        Self {
            core,
            position_ms: resume.position,
            duration_ms: resume.total,
        }
    }

    fn download_key(&self) -> String {
        crate::util::sanitize_file_name(&self.core.name).into_owned()
    }
}
