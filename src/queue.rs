use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use crate::store::KeyValueStore;

#[derive(Debug)]
enum WriteJob {
    Put(String),
    Flush(oneshot::Sender<()>),
}

/// Single-writer queue for one storage slot.
///
/// Values are written in submission order by one background task, so the
/// last submitted value is the one left in storage. Values still pending
/// when the writer wakes up are coalesced to the newest.
#[derive(Debug, Clone)]
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<WriteJob>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl WriteQueue {
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<dyn KeyValueStore>, key: String) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let last_error = Arc::new(Mutex::new(None));
        tokio::spawn(run_writer(store, key, rx, Arc::clone(&last_error)));
        Self { tx, last_error }
    }

    pub fn submit(&self, value: String) {
        if self.tx.send(WriteJob::Put(value)).is_err() {
            self.record_error("write queue is closed".to_owned());
        }
    }

    /// Waits until every value submitted before this call has been written
    /// (or has failed).
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(WriteJob::Flush(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.await;
    }

    /// Failure of the latest write, or of loading the slot when nothing has
    /// been written since. Cleared by a successful write.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub(crate) fn record_error(&self, message: String) {
        set_error(&self.last_error, Some(message));
    }
}

async fn run_writer(
    store: Arc<dyn KeyValueStore>,
    key: String,
    mut rx: mpsc::UnboundedReceiver<WriteJob>,
    last_error: Arc<Mutex<Option<String>>>,
) {
    while let Some(job) = rx.recv().await {
        let mut latest = None;
        let mut acks = Vec::new();
        match job {
            WriteJob::Put(value) => latest = Some(value),
            WriteJob::Flush(ack) => acks.push(ack),
        }
        while let Ok(job) = rx.try_recv() {
            match job {
                WriteJob::Put(value) => latest = Some(value),
                WriteJob::Flush(ack) => acks.push(ack),
            }
        }

        if let Some(value) = latest {
            match store.set(&key, &value).await {
                Ok(()) => {
                    tracing::debug!(key = %key, bytes = value.len(), "persisted slot");
                    set_error(&last_error, None);
                }
                Err(err) => {
                    tracing::warn!(key = %key, ?err, "persist slot failed; keeping in-memory state");
                    set_error(&last_error, Some(format!("{err:#}")));
                }
            }
        }

        for ack in acks {
            let _ = ack.send(());
        }
    }
}

fn set_error(slot: &Mutex<Option<String>>, value: Option<String>) {
    match slot.lock() {
        Ok(mut guard) => *guard = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}
