//! View models for the library grid, the chapter list and the reader.

use std::sync::Arc;

use url::Url;

use crate::config::ClientConfig;
use crate::formats::{ChapterBadge, Manifest, ReadingPosition};
use crate::progress::ProgressTracker;

/// Navigation referenced an id absent from the loaded manifest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("work not found: {0}")]
    WorkNotFound(String),
    #[error("chapter not found: {novel_id}/{chapter_id}")]
    ChapterNotFound {
        novel_id: String,
        chapter_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct LibraryEntry {
    pub novel_id: String,
    pub title: String,
    pub author: String,
    pub cover_url: Option<Url>,
    pub chapter_count: usize,
    pub page_count: usize,
    pub last_read: Option<ReadingPosition>,
}

pub fn library_entries(
    manifest: &Manifest,
    config: &ClientConfig,
    tracker: &ProgressTracker,
) -> Vec<LibraryEntry> {
    manifest
        .novels
        .iter()
        .map(|work| LibraryEntry {
            novel_id: work.id.clone(),
            title: work.title.clone(),
            author: work.author.clone(),
            cover_url: resolve(config, &work.cover_image),
            chapter_count: work.chapters.len(),
            page_count: work.page_count(),
            last_read: tracker.get_last_read(&work.id),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ChapterRow {
    pub chapter_id: String,
    pub title: String,
    pub page_count: usize,
    pub badge: ChapterBadge,
}

#[derive(Debug, Clone)]
pub struct ChapterListing {
    pub novel_id: String,
    pub title: String,
    pub author: String,
    pub cover_url: Option<Url>,
    pub chapters: Vec<ChapterRow>,
}

pub fn chapter_listing(
    manifest: &Manifest,
    novel_id: &str,
    config: &ClientConfig,
    tracker: &ProgressTracker,
) -> Result<ChapterListing, LookupError> {
    let work = manifest
        .find_work(novel_id)
        .ok_or_else(|| LookupError::WorkNotFound(novel_id.to_owned()))?;

    let chapters = work
        .chapters
        .iter()
        .map(|chapter| ChapterRow {
            chapter_id: chapter.id.clone(),
            title: chapter.title.clone(),
            page_count: chapter.pages.len(),
            badge: ChapterBadge::derive(
                tracker.get_position(&work.id, &chapter.id),
                chapter.pages.len(),
            ),
        })
        .collect();

    Ok(ChapterListing {
        novel_id: work.id.clone(),
        title: work.title.clone(),
        author: work.author.clone(),
        cover_url: resolve(config, &work.cover_image),
        chapters,
    })
}

/// An open chapter. Every page change is recorded in the tracker.
#[derive(Debug)]
pub struct ReaderSession {
    tracker: Arc<ProgressTracker>,
    novel_id: String,
    chapter_id: String,
    chapter_title: String,
    pages: Vec<String>,
    current: usize,
}

impl ReaderSession {
    /// Opens at the stored position, clamped to the chapter's current length.
    pub fn open(
        manifest: &Manifest,
        tracker: Arc<ProgressTracker>,
        novel_id: &str,
        chapter_id: &str,
    ) -> Result<Self, LookupError> {
        let work = manifest
            .find_work(novel_id)
            .ok_or_else(|| LookupError::WorkNotFound(novel_id.to_owned()))?;
        let chapter = work
            .find_chapter(chapter_id)
            .ok_or_else(|| LookupError::ChapterNotFound {
                novel_id: novel_id.to_owned(),
                chapter_id: chapter_id.to_owned(),
            })?;

        let stored = tracker.get_position(novel_id, chapter_id);
        let current = clamp_page(stored, chapter.pages.len());
        if current != stored {
            tracing::debug!(stored, current, "stored page is past the end of the chapter");
        }

        Ok(Self {
            tracker,
            novel_id: work.id.clone(),
            chapter_id: chapter.id.clone(),
            chapter_title: chapter.title.clone(),
            pages: chapter.pages.clone(),
            current,
        })
    }

    pub fn chapter_title(&self) -> &str {
        &self.chapter_title
    }

    pub fn current_page(&self) -> usize {
        self.current
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn current_path(&self) -> Option<&str> {
        self.pages.get(self.current).map(String::as_str)
    }

    /// Selects a page (clamped) and records it. Returns the selected index.
    pub fn go_to(&mut self, page_index: usize) -> usize {
        if self.pages.is_empty() {
            return 0;
        }
        self.current = clamp_page(page_index, self.pages.len());
        self.tracker
            .save_position(&self.novel_id, &self.chapter_id, self.current);
        self.current
    }

    /// Advances one page (leftwards in right-to-left layout).
    pub fn next(&mut self) -> Option<usize> {
        if self.current + 1 >= self.pages.len() {
            return None;
        }
        Some(self.go_to(self.current + 1))
    }

    pub fn previous(&mut self) -> Option<usize> {
        if self.current == 0 || self.pages.is_empty() {
            return None;
        }
        Some(self.go_to(self.current - 1))
    }

    /// Pages adjacent to the current one, for the image component to prefetch.
    pub fn prefetch_targets(&self) -> Vec<&str> {
        let mut targets = Vec::new();
        if self.current > 0
            && let Some(page) = self.pages.get(self.current - 1)
        {
            targets.push(page.as_str());
        }
        if let Some(page) = self.pages.get(self.current + 1) {
            targets.push(page.as_str());
        }
        targets
    }

    pub fn progress_label(&self) -> String {
        if self.pages.is_empty() {
            return "0 / 0".to_owned();
        }
        format!("{} / {}", self.current + 1, self.pages.len())
    }
}

fn clamp_page(page_index: usize, page_count: usize) -> usize {
    page_index.min(page_count.saturating_sub(1))
}

fn resolve(config: &ClientConfig, relative_path: &str) -> Option<Url> {
    match config.asset_url(relative_path) {
        Ok(url) => Some(url),
        Err(err) => {
            tracing::warn!(?err, relative_path, "unresolvable asset path");
            None
        }
    }
}
