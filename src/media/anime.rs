//! Anime adapter: episodes track the playback second and the episode length.

use super::entry::MediaKind;
use super::item::{ItemCore, LibraryItem, ResumePosition};

#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub core: ItemCore,
    pub last_second_seen: i64,
    pub total_seconds: i64,
}

impl LibraryItem for Episode {
    const KIND: MediaKind = MediaKind::Anime;

    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn resume(&self) -> ResumePosition {
        ResumePosition {
            position: self.last_second_seen,
            total: self.total_seconds,
        }
    }

    fn from_parts(core: ItemCore, resume: ResumePosition) -> Self {
        Self {
            core,
            last_second_seen: resume.position,
            total_seconds: resume.total,
        }
    }
}
