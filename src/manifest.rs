use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context as _;
use reqwest::header::{ACCEPT, USER_AGENT};

use crate::config::ClientConfig;
use crate::formats::Manifest;
use crate::store::KeyValueStore;

/// Why a manifest could not be obtained from the network.
///
/// Only surfaced to callers when no cached copy exists either.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("invalid manifest: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("invalid manifest url: {0}")]
    Url(String),
}

/// What consumers observe; exactly one holds at any instant.
#[derive(Debug, Clone)]
pub enum ManifestStatus {
    Loading,
    Error(String),
    Ready(Arc<Manifest>),
}

#[derive(Debug, Clone)]
struct ManifestState {
    manifest: Option<Arc<Manifest>>,
    loading: bool,
    error: Option<String>,
}

/// Fetches the catalog and falls back to the last cached copy.
pub struct ManifestProvider {
    client: reqwest::Client,
    store: Arc<dyn KeyValueStore>,
    config: ClientConfig,
    state: Mutex<ManifestState>,
    generation: AtomicU64,
    last_storage_error: Mutex<Option<String>>,
}

impl ManifestProvider {
    /// The provider starts out `Loading`; the first [`load`](Self::load) resolves it.
    pub fn new(config: ClientConfig, store: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            store,
            config,
            state: Mutex::new(ManifestState {
                manifest: None,
                loading: true,
                error: None,
            }),
            generation: AtomicU64::new(0),
            last_storage_error: Mutex::new(None),
        })
    }

    pub fn status(&self) -> ManifestStatus {
        let state = lock(&self.state);
        if state.loading {
            return ManifestStatus::Loading;
        }
        if let Some(error) = &state.error {
            return ManifestStatus::Error(error.clone());
        }
        match &state.manifest {
            Some(manifest) => ManifestStatus::Ready(Arc::clone(manifest)),
            None => ManifestStatus::Loading,
        }
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.state).loading
    }

    pub fn error(&self) -> Option<String> {
        lock(&self.state).error.clone()
    }

    /// Last manifest obtained, kept visible while a refetch is in flight.
    pub fn current_manifest(&self) -> Option<Arc<Manifest>> {
        lock(&self.state).manifest.clone()
    }

    /// Most recent cache read/write failure, if any.
    pub fn last_storage_error(&self) -> Option<String> {
        lock(&self.last_storage_error).clone()
    }

    pub async fn load(&self) -> Result<Arc<Manifest>, ManifestError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = lock(&self.state);
            state.loading = true;
            state.error = None;
        }

        let result = self.fetch_with_fallback(generation).await;

        if self.generation.load(Ordering::SeqCst) == generation {
            let mut state = lock(&self.state);
            state.loading = false;
            match &result {
                Ok(manifest) => {
                    state.manifest = Some(Arc::clone(manifest));
                    state.error = None;
                }
                Err(err) => state.error = Some(err.to_string()),
            }
        } else {
            tracing::debug!(generation, "manifest load superseded; result not applied");
        }

        result
    }

    pub async fn refetch(&self) -> Result<Arc<Manifest>, ManifestError> {
        self.load().await
    }

    async fn fetch_with_fallback(&self, generation: u64) -> Result<Arc<Manifest>, ManifestError> {
        let err = match self.fetch_remote().await {
            Ok((manifest, raw)) => {
                // A newer load owns the cache slot once it has started.
                if self.generation.load(Ordering::SeqCst) == generation {
                    self.write_cache(&raw).await;
                }
                return Ok(Arc::new(manifest));
            }
            Err(err) => err,
        };

        match self.read_cache().await {
            Some(cached) => {
                tracing::warn!(error = %err, "manifest fetch failed; using cached copy");
                Ok(Arc::new(cached))
            }
            None => {
                tracing::error!(error = %err, "manifest fetch failed and no cache is available");
                Err(err)
            }
        }
    }

    async fn fetch_remote(&self) -> Result<(Manifest, String), ManifestError> {
        let url = self
            .config
            .manifest_url()
            .map_err(|err| ManifestError::Url(format!("{err:#}")))?;
        tracing::debug!(%url, "fetching manifest");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("mangashelf/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .map_err(ManifestError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ManifestError::Status(status.as_u16()));
        }

        let raw = response.text().await.map_err(ManifestError::Transport)?;
        let manifest: Manifest = serde_json::from_str(&raw).map_err(ManifestError::Parse)?;
        for problem in manifest.validate() {
            tracing::warn!(%problem, "manifest has duplicate ids");
        }
        tracing::info!(
            works = manifest.novels.len(),
            version = manifest.version,
            "fetched manifest"
        );
        Ok((manifest, raw))
    }

    async fn read_cache(&self) -> Option<Manifest> {
        let key = self.config.manifest_cache_key();
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(?err, "read manifest cache failed");
                self.record_storage_error(format!("{err:#}"));
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(manifest) => Some(manifest),
            Err(err) => {
                tracing::warn!(%err, "discarding corrupt manifest cache");
                None
            }
        }
    }

    async fn write_cache(&self, raw: &str) {
        let key = self.config.manifest_cache_key();
        if let Err(err) = self.store.set(&key, raw).await {
            tracing::warn!(?err, "write manifest cache failed");
            self.record_storage_error(format!("{err:#}"));
        }
    }

    fn record_storage_error(&self, message: String) {
        *lock(&self.last_storage_error) = Some(message);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
