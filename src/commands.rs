use std::sync::Arc;

use anyhow::Context as _;
use tokio::io::AsyncBufReadExt as _;

use crate::cli::{ChaptersArgs, GlobalArgs, ProgressArgs, ReadArgs};
use crate::config::{ClientConfig, ResolvedSettings};
use crate::formats::{ChapterBadge, Manifest, ReadingPosition};
use crate::library::{self, ChapterListing, LibraryEntry, ReaderSession};
use crate::manifest::ManifestProvider;
use crate::progress::ProgressTracker;
use crate::store::{KeyValueStore, LocalFsStore};

/// Manifest provider and progress tracker wired to the local data dir.
pub struct Client {
    pub config: ClientConfig,
    pub provider: ManifestProvider,
    pub tracker: Arc<ProgressTracker>,
}

impl Client {
    pub async fn open(global: &GlobalArgs) -> anyhow::Result<Self> {
        let settings = ResolvedSettings::resolve(
            global.server_url.as_deref(),
            global.data_dir.as_deref(),
            global.namespace.as_deref(),
            global.timeout_secs,
        )
        .context("resolve settings")?;
        tracing::debug!(?settings, "resolved settings");

        let store: Arc<dyn KeyValueStore> = Arc::new(LocalFsStore::new(&settings.data_dir));
        Self::with_store(settings.client, store).await
    }

    pub async fn with_store(
        config: ClientConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> anyhow::Result<Self> {
        let provider = ManifestProvider::new(config.clone(), Arc::clone(&store))
            .context("create manifest provider")?;
        let tracker = Arc::new(ProgressTracker::initialize(store, &config).await);
        Ok(Self {
            config,
            provider,
            tracker,
        })
    }

    async fn manifest(&self) -> anyhow::Result<Arc<Manifest>> {
        match self.provider.load().await {
            Ok(manifest) => Ok(manifest),
            Err(err) => {
                let url = self
                    .config
                    .manifest_url()
                    .map(|url| url.to_string())
                    .unwrap_or_default();
                anyhow::bail!(
                    "no manifest available: {err}\nhint: start a static file server that serves {url}, then retry"
                )
            }
        }
    }

    async fn finish(&self) {
        self.tracker.flush().await;
        if let Some(err) = self.tracker.last_error() {
            tracing::warn!(%err, "reading progress may not have been saved");
        }
    }
}

pub async fn library(global: &GlobalArgs) -> anyhow::Result<()> {
    let client = Client::open(global).await?;
    let manifest = client.manifest().await?;
    let entries = library::library_entries(&manifest, &client.config, &client.tracker);
    print!("{}", render_library(&entries));
    Ok(())
}

pub async fn chapters(global: &GlobalArgs, args: ChaptersArgs) -> anyhow::Result<()> {
    let client = Client::open(global).await?;
    let manifest = client.manifest().await?;
    let listing =
        library::chapter_listing(&manifest, &args.novel, &client.config, &client.tracker)?;
    print!("{}", render_chapters(&listing));
    Ok(())
}

pub async fn read(global: &GlobalArgs, args: ReadArgs) -> anyhow::Result<()> {
    let client = Client::open(global).await?;
    let outcome = read_session(&client, args).await;
    client.finish().await;
    outcome
}

async fn read_session(client: &Client, args: ReadArgs) -> anyhow::Result<()> {
    let manifest = client.manifest().await?;
    let mut session = ReaderSession::open(
        &manifest,
        Arc::clone(&client.tracker),
        &args.novel,
        &args.chapter,
    )?;
    println!("{}", session.chapter_title());

    match args.page {
        Some(page) => {
            session.go_to(page);
            print_page(&client.config, &session)
        }
        None => {
            print_page(&client.config, &session)?;
            read_interactively(&client.config, &mut session).await
        }
    }
}

pub async fn progress(global: &GlobalArgs, args: ProgressArgs) -> anyhow::Result<()> {
    let client = Client::open(global).await?;
    match args.novel {
        Some(novel_id) => match client.tracker.get_last_read(&novel_id) {
            Some(position) => println!("{}", render_position(&position)),
            None => println!("no progress for {novel_id}"),
        },
        None => {
            for position in client.tracker.positions().values() {
                println!("{}", render_position(position));
            }
        }
    }
    Ok(())
}

async fn read_interactively(
    config: &ClientConfig,
    session: &mut ReaderSession,
) -> anyhow::Result<()> {
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = stdin
            .read_until(b'\n', &mut buf)
            .await
            .context("read reader command")?;
        if read == 0 {
            break;
        }
        // Undecodable bytes become U+FFFD and fall through to "unknown command".
        let line = String::from_utf8_lossy(&buf);
        let moved = match line.trim() {
            "" => continue,
            "q" | "quit" => break,
            "n" | "next" | "left" => session.next(),
            "p" | "prev" | "right" => session.previous(),
            other => match other.parse::<usize>() {
                Ok(page) => Some(session.go_to(page)),
                Err(_) => {
                    eprintln!("unknown command: {other} (n, p, <page>, q)");
                    continue;
                }
            },
        };
        match moved {
            Some(_) => print_page(config, session)?,
            None => println!("{} (no more pages)", session.progress_label()),
        }
    }
    Ok(())
}

fn print_page(config: &ClientConfig, session: &ReaderSession) -> anyhow::Result<()> {
    let Some(path) = session.current_path() else {
        println!("{} (empty chapter)", session.progress_label());
        return Ok(());
    };
    let url = config.asset_url(path)?;
    println!("{}  {url}", session.progress_label());

    for neighbor in session.prefetch_targets() {
        if let Ok(url) = config.asset_url(neighbor) {
            tracing::debug!(%url, "prefetch candidate");
        }
    }
    Ok(())
}

pub fn render_library(entries: &[LibraryEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!(
            "{}  {} / {}  ({} chapters, {} pages)\n",
            entry.novel_id, entry.title, entry.author, entry.chapter_count, entry.page_count
        ));
        if let Some(cover) = &entry.cover_url {
            out.push_str(&format!("    cover: {cover}\n"));
        }
        if let Some(last) = &entry.last_read {
            out.push_str(&format!(
                "    last read: {} page {}\n",
                last.chapter_id,
                last.page_index + 1
            ));
        }
    }
    out
}

pub fn render_chapters(listing: &ChapterListing) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} / {}\n", listing.title, listing.author));
    for (index, row) in listing.chapters.iter().enumerate() {
        let badge = match row.badge {
            ChapterBadge::Unread => String::new(),
            badge => format!("  [{badge}]"),
        };
        out.push_str(&format!(
            "{:>3}. {}  {} ({} pages){badge}\n",
            index + 1,
            row.chapter_id,
            row.title,
            row.page_count
        ));
    }
    out
}

fn render_position(position: &ReadingPosition) -> String {
    format!(
        "{}/{}  page {}  ({})",
        position.novel_id,
        position.chapter_id,
        position.page_index + 1,
        position.updated_at.to_rfc3339()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::ChapterRow;

    #[test]
    fn chapter_rows_show_badges() {
        let listing = ChapterListing {
            novel_id: "A".to_owned(),
            title: "Work A".to_owned(),
            author: "Someone".to_owned(),
            cover_url: None,
            chapters: vec![
                ChapterRow {
                    chapter_id: "1".to_owned(),
                    title: "One".to_owned(),
                    page_count: 3,
                    badge: ChapterBadge::Read,
                },
                ChapterRow {
                    chapter_id: "2".to_owned(),
                    title: "Two".to_owned(),
                    page_count: 4,
                    badge: ChapterBadge::InProgress {
                        page_index: 1,
                        total: 4,
                    },
                },
                ChapterRow {
                    chapter_id: "3".to_owned(),
                    title: "Three".to_owned(),
                    page_count: 2,
                    badge: ChapterBadge::Unread,
                },
            ],
        };

        assert_eq!(
            render_chapters(&listing),
            "Work A / Someone\n  1. 1  One (3 pages)  [read]\n  2. 2  Two (4 pages)  [2/4]\n  3. 3  Three (2 pages)\n"
        );
    }
}
