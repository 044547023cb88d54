use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::config::ClientConfig;
use crate::formats::{ProgressKey, ReadingPosition};
use crate::queue::WriteQueue;
use crate::store::KeyValueStore;

/// Composite key (`novelId/chapterId`) to the position last recorded for it.
pub type ProgressMap = BTreeMap<String, ReadingPosition>;

/// Per-chapter reading positions, kept in memory and mirrored to storage.
///
/// Reads never touch storage. Every save replaces the in-memory record and
/// queues a snapshot of the whole map; storage failures are logged and kept
/// in [`last_error`](Self::last_error) but never returned to callers.
#[derive(Debug)]
pub struct ProgressTracker {
    positions: Mutex<ProgressMap>,
    writer: WriteQueue,
}

impl ProgressTracker {
    /// Loads the persisted map; a missing or corrupt blob starts empty.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn initialize(store: Arc<dyn KeyValueStore>, config: &ClientConfig) -> Self {
        let key = config.reading_progress_key();
        let mut load_error = None;

        let positions = match store.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<ProgressMap>(&raw) {
                Ok(positions) => positions,
                Err(err) => {
                    tracing::warn!(%err, "discarding corrupt reading progress");
                    load_error = Some(format!("parse reading progress: {err}"));
                    ProgressMap::new()
                }
            },
            Ok(None) => ProgressMap::new(),
            Err(err) => {
                tracing::warn!(?err, "read reading progress failed; starting empty");
                load_error = Some(format!("{err:#}"));
                ProgressMap::new()
            }
        };
        tracing::debug!(records = positions.len(), "loaded reading progress");

        let writer = WriteQueue::spawn(store, key);
        if let Some(message) = load_error {
            writer.record_error(message);
        }

        Self {
            positions: Mutex::new(positions),
            writer,
        }
    }

    /// Stored page index, or `0` when the chapter was never opened.
    pub fn get_position(&self, novel_id: &str, chapter_id: &str) -> usize {
        let key = ProgressKey::new(novel_id, chapter_id).to_string();
        self.lock()
            .get(&key)
            .map(|position| position.page_index)
            .unwrap_or(0)
    }

    pub fn save_position(&self, novel_id: &str, chapter_id: &str, page_index: usize) {
        self.record_position(ReadingPosition {
            novel_id: novel_id.to_owned(),
            chapter_id: chapter_id.to_owned(),
            page_index,
            updated_at: Utc::now(),
        });
    }

    /// Like [`save_position`](Self::save_position) with a caller-supplied timestamp.
    pub fn record_position(&self, position: ReadingPosition) {
        let key = ProgressKey::new(&position.novel_id, &position.chapter_id).to_string();
        let mut positions = self.lock();
        positions.insert(key, position);

        // Serialize and enqueue under the lock so queue order matches update order.
        match serde_json::to_string(&*positions) {
            Ok(snapshot) => self.writer.submit(snapshot),
            Err(err) => {
                tracing::warn!(%err, "serialize reading progress failed");
                self.writer
                    .record_error(format!("serialize reading progress: {err}"));
            }
        }
    }

    /// Most recently updated position among the work's chapters.
    pub fn get_last_read(&self, novel_id: &str) -> Option<ReadingPosition> {
        self.lock()
            .values()
            .filter(|position| position.novel_id == novel_id)
            .max_by_key(|position| position.updated_at)
            .cloned()
    }

    pub fn positions(&self) -> ProgressMap {
        self.lock().clone()
    }

    /// Waits for every snapshot queued so far to reach storage.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    pub fn last_error(&self) -> Option<String> {
        self.writer.last_error()
    }

    fn lock(&self) -> MutexGuard<'_, ProgressMap> {
        self.positions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
