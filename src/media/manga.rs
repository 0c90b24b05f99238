//! Manga adapter: chapters remember the last page read.

use super::entry::MediaKind;
use super::item::{ItemCore, LibraryItem, ResumePosition};

#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub core: ItemCore,
    pub last_page_read: i64,
}

impl LibraryItem for Chapter {
    const KIND: MediaKind = MediaKind::Manga;

    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn resume(&self) -> ResumePosition {
        ResumePosition {
            position: self.last_page_read,
            total: 0,
        }
    }

    fn from_parts(core: ItemCore, resume: ResumePosition) -> Self {
        Self {
            core,
            last_page_read: resume.position,
        }
    }
}
