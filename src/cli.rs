use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Image server base URL (default: $MANGASHELF_SERVER_URL or http://127.0.0.1:8080).
    #[arg(long, global = true)]
    pub server_url: Option<String>,

    /// Local data directory for the manifest cache and reading progress
    /// (default: $MANGASHELF_DATA_DIR or ./mangashelf-data).
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// Prefix for storage keys (default: $MANGASHELF_NAMESPACE or mangashelf).
    #[arg(long, global = true)]
    pub namespace: Option<String>,

    /// Manifest request timeout in seconds.
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the works in the manifest.
    Library,
    /// List a work's chapters with read / in-progress badges.
    Chapters(ChaptersArgs),
    /// Open a chapter in the reader.
    Read(ReadArgs),
    /// Show stored reading positions.
    Progress(ProgressArgs),
    Manifest {
        #[command(subcommand)]
        command: ManifestCommand,
    },
}

#[derive(Debug, Args)]
pub struct ChaptersArgs {
    /// Work id.
    #[arg(long)]
    pub novel: String,
}

#[derive(Debug, Args)]
pub struct ReadArgs {
    /// Work id.
    #[arg(long)]
    pub novel: String,

    /// Chapter id.
    #[arg(long)]
    pub chapter: String,

    /// Jump to this zero-based page and record it. Without it, commands are
    /// read from stdin: `n` (next, leftwards), `p` (previous), a page number, `q`.
    #[arg(long)]
    pub page: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ProgressArgs {
    /// Only show the most recently read chapter of this work.
    #[arg(long)]
    pub novel: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ManifestCommand {
    /// Scan a directory of page_NNN.png images and write manga-manifest.json.
    Generate(GenerateArgs),
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Directory served by the image server.
    #[arg(long)]
    pub dir: String,

    /// Work id (also the page subdirectory name).
    #[arg(long)]
    pub novel_id: String,

    /// Work title (default: the work id).
    #[arg(long)]
    pub title: Option<String>,

    #[arg(long, default_value = "unknown")]
    pub author: String,

    /// Pages per chapter (0 = all pages in one chapter).
    #[arg(long, default_value_t = 0)]
    pub pages_per_chapter: usize,
}
