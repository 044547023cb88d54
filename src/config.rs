use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_DATA_DIR: &str = "mangashelf-data";
pub const DEFAULT_NAMESPACE: &str = "mangashelf";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub const MANIFEST_FILE_NAME: &str = "manga-manifest.json";

const MANIFEST_CACHE_KEY: &str = "manifest_cache";
const READING_PROGRESS_KEY: &str = "reading_progress";

/// Settings shared by the manifest provider and the progress tracker.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub image_server_base_url: Url,
    pub storage_key_namespace: String,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(image_server_base_url: &str, storage_key_namespace: &str) -> anyhow::Result<Self> {
        let image_server_base_url = parse_base_url(image_server_base_url)?;
        let storage_key_namespace = parse_namespace(storage_key_namespace)?;
        Ok(Self {
            image_server_base_url,
            storage_key_namespace,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn manifest_url(&self) -> anyhow::Result<Url> {
        self.asset_url(MANIFEST_FILE_NAME)
    }

    /// Resolves a manifest-relative path (cover or page) against the server base.
    pub fn asset_url(&self, relative_path: &str) -> anyhow::Result<Url> {
        let relative_path = relative_path.trim_start_matches('/');
        self.image_server_base_url
            .join(relative_path)
            .with_context(|| format!("resolve asset url: {relative_path}"))
    }

    pub fn manifest_cache_key(&self) -> String {
        format!("{}.{MANIFEST_CACHE_KEY}", self.storage_key_namespace)
    }

    pub fn reading_progress_key(&self) -> String {
        format!("{}.{READING_PROGRESS_KEY}", self.storage_key_namespace)
    }
}

/// Values resolved from CLI flags, then environment, then defaults.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub client: ClientConfig,
    pub data_dir: PathBuf,
}

impl ResolvedSettings {
    pub fn resolve(
        server_url: Option<&str>,
        data_dir: Option<&str>,
        namespace: Option<&str>,
        timeout_secs: Option<u64>,
    ) -> anyhow::Result<Self> {
        let server_url = pick(server_url, "MANGASHELF_SERVER_URL", DEFAULT_SERVER_URL);
        let data_dir = pick(data_dir, "MANGASHELF_DATA_DIR", DEFAULT_DATA_DIR);
        let namespace = pick(namespace, "MANGASHELF_NAMESPACE", DEFAULT_NAMESPACE);
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1));

        let client = ClientConfig::new(&server_url, &namespace)
            .with_context(|| format!("invalid server url {server_url:?} or namespace {namespace:?}"))?
            .with_request_timeout(timeout);

        Ok(Self {
            client,
            data_dir: PathBuf::from(data_dir),
        })
    }
}

fn pick(flag: Option<&str>, env_var: &str, default: &str) -> String {
    if let Some(value) = flag {
        return value.to_owned();
    }
    match std::env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_owned(),
        _ => default.to_owned(),
    }
}

fn parse_base_url(raw: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(raw.trim()).context("parse image server url")?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("image server url must be http/https: {url}");
    }
    if url.cannot_be_a_base() {
        anyhow::bail!("image server url cannot be a base: {url}");
    }
    // `Url::join` replaces the last segment unless the path ends with '/'.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn parse_namespace(raw: &str) -> anyhow::Result<String> {
    let namespace = raw.trim();
    if namespace.is_empty() {
        anyhow::bail!("storage key namespace is empty");
    }
    if !namespace
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        anyhow::bail!("storage key namespace must be [A-Za-z0-9_-]: {namespace:?}");
    }
    Ok(namespace.to_owned())
}
