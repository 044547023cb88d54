use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Catalog served by the image server as `manga-manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: u32,
    pub generated_at: String,
    pub novels: Vec<Work>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Work {
    pub id: String,
    pub title: String,
    pub author: String,
    pub cover_image: String,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub pages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingPosition {
    pub novel_id: String,
    pub chapter_id: String,
    pub page_index: usize,
    pub updated_at: DateTime<Utc>,
}

impl Manifest {
    pub fn find_work(&self, novel_id: &str) -> Option<&Work> {
        self.novels.iter().find(|work| work.id == novel_id)
    }

    /// Returns a human-readable problem for every duplicated id.
    ///
    /// Duplicates are not fatal: lookups resolve to the first match.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut work_ids = HashSet::new();
        for work in &self.novels {
            if !work_ids.insert(work.id.as_str()) {
                problems.push(format!("duplicate work id: {}", work.id));
            }
            let mut chapter_ids = HashSet::new();
            for chapter in &work.chapters {
                if !chapter_ids.insert(chapter.id.as_str()) {
                    problems.push(format!(
                        "duplicate chapter id in {}: {}",
                        work.id, chapter.id
                    ));
                }
            }
        }
        problems
    }
}

impl Work {
    pub fn find_chapter(&self, chapter_id: &str) -> Option<&Chapter> {
        self.chapters.iter().find(|chapter| chapter.id == chapter_id)
    }

    pub fn page_count(&self) -> usize {
        self.chapters.iter().map(|chapter| chapter.pages.len()).sum()
    }
}

/// Composite key of the progress map: `novelId/chapterId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressKey<'a> {
    pub novel_id: &'a str,
    pub chapter_id: &'a str,
}

impl<'a> ProgressKey<'a> {
    pub fn new(novel_id: &'a str, chapter_id: &'a str) -> Self {
        Self {
            novel_id,
            chapter_id,
        }
    }
}

impl fmt::Display for ProgressKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.novel_id, self.chapter_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterBadge {
    Unread,
    InProgress { page_index: usize, total: usize },
    Read,
}

impl ChapterBadge {
    /// `read_page` is the stored page index (0 when never opened).
    pub fn derive(read_page: usize, total: usize) -> Self {
        if read_page.saturating_add(1) >= total {
            Self::Read
        } else if read_page > 0 {
            Self::InProgress {
                page_index: read_page,
                total,
            }
        } else {
            Self::Unread
        }
    }
}

impl fmt::Display for ChapterBadge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unread => Ok(()),
            Self::InProgress { page_index, total } => write!(f, "{}/{}", page_index + 1, total),
            Self::Read => f.write_str("read"),
        }
    }
}
