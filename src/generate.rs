use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli::GenerateArgs;
use crate::config::MANIFEST_FILE_NAME;
use crate::formats::{Chapter, Manifest, Work};

pub const MANIFEST_VERSION: u32 = 1;

pub fn run(args: GenerateArgs) -> anyhow::Result<()> {
    let output_dir = PathBuf::from(&args.dir);
    if !output_dir.is_dir() {
        anyhow::bail!("page directory does not exist: {}", output_dir.display());
    }

    let title = args.title.clone().unwrap_or_else(|| args.novel_id.clone());
    let manifest = build_manifest(
        &output_dir,
        &args.novel_id,
        &title,
        &args.author,
        args.pages_per_chapter,
    )?;

    let manifest_path = output_dir.join(MANIFEST_FILE_NAME);
    let json = serde_json::to_string_pretty(&manifest).context("serialize manifest")?;
    std::fs::write(&manifest_path, json)
        .with_context(|| format!("write manifest: {}", manifest_path.display()))?;

    let work = &manifest.novels[0];
    tracing::info!(path = %manifest_path.display(), "wrote manifest");
    println!("wrote {}", manifest_path.display());
    println!("  {} ({})", work.title, work.id);
    println!(
        "  {} chapters, {} pages",
        work.chapters.len(),
        work.page_count()
    );

    Ok(())
}

/// Builds a single-work manifest from `page_NNN.png` files.
///
/// Pages found directly in `output_dir` are copied into `output_dir/<novel_id>/`
/// first, so page paths are relative to the server root. `pages_per_chapter == 0`
/// puts every page in one chapter.
pub fn build_manifest(
    output_dir: &Path,
    novel_id: &str,
    title: &str,
    author: &str,
    pages_per_chapter: usize,
) -> anyhow::Result<Manifest> {
    if novel_id.is_empty() || novel_id.contains(['/', '\\']) || novel_id == ".." {
        anyhow::bail!("invalid novel id: {novel_id:?}");
    }

    let novel_dir = ensure_novel_subdir(output_dir, novel_id)?;
    let pages = find_page_images(&novel_dir)?;
    if pages.is_empty() {
        anyhow::bail!(
            "no page_*.png found in {} or {}",
            output_dir.display(),
            novel_dir.display()
        );
    }

    let chunks: Vec<&[String]> = if pages_per_chapter > 0 {
        pages.chunks(pages_per_chapter).collect()
    } else {
        vec![pages.as_slice()]
    };
    let multiple = chunks.len() > 1;

    let chapters = chunks
        .iter()
        .enumerate()
        .map(|(idx, chunk)| {
            let number = idx + 1;
            Chapter {
                id: format!("chapter_{number:02}"),
                title: if multiple {
                    format!("第{number}章")
                } else {
                    "全編".to_owned()
                },
                pages: chunk.iter().map(|page| format!("{novel_id}/{page}")).collect(),
            }
        })
        .collect();

    Ok(Manifest {
        version: MANIFEST_VERSION,
        generated_at: chrono::Utc::now().to_rfc3339(),
        novels: vec![Work {
            id: novel_id.to_owned(),
            title: title.to_owned(),
            author: author.to_owned(),
            cover_image: format!("{novel_id}/{}", pages[0]),
            chapters,
        }],
    })
}

/// File names matching `page_<digits>.png` in `dir`, sorted by name.
pub fn find_page_images(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut pages = Vec::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("read page dir: {}", dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if is_page_image(&name) {
            pages.push(name);
        }
    }
    pages.sort();
    Ok(pages)
}

fn is_page_image(name: &str) -> bool {
    name.strip_prefix("page_")
        .and_then(|rest| rest.strip_suffix(".png"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

fn ensure_novel_subdir(output_dir: &Path, novel_id: &str) -> anyhow::Result<PathBuf> {
    let novel_dir = output_dir.join(novel_id);
    std::fs::create_dir_all(&novel_dir)
        .with_context(|| format!("create novel dir: {}", novel_dir.display()))?;

    if !find_page_images(&novel_dir)?.is_empty() {
        return Ok(novel_dir);
    }

    for page in find_page_images(output_dir)? {
        let dest = novel_dir.join(&page);
        if dest.exists() {
            continue;
        }
        std::fs::copy(output_dir.join(&page), &dest)
            .with_context(|| format!("copy page into {}", dest.display()))?;
    }
    tracing::debug!(dir = %novel_dir.display(), "populated novel dir from root pages");

    Ok(novel_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, b"png")?;
        Ok(())
    }

    #[test]
    fn page_names_must_be_numbered_png() {
        assert!(is_page_image("page_001.png"));
        assert!(is_page_image("page_12.png"));
        assert!(!is_page_image("page_.png"));
        assert!(!is_page_image("page_01a.png"));
        assert!(!is_page_image("cover.png"));
        assert!(!is_page_image("page_001.jpg"));
    }

    #[test]
    fn splits_pages_into_chapters() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        for n in 1..=5 {
            touch(&temp.path().join(format!("page_{n:03}.png")))?;
        }
        touch(&temp.path().join("notes.txt"))?;

        let manifest = build_manifest(temp.path(), "work", "Title", "Author", 2)?;
        let work = &manifest.novels[0];
        assert_eq!(work.cover_image, "work/page_001.png");
        assert_eq!(
            work.chapters.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["chapter_01", "chapter_02", "chapter_03"]
        );
        assert_eq!(work.chapters[0].title, "第1章");
        assert_eq!(
            work.chapters[2].pages,
            vec!["work/page_005.png".to_owned()]
        );
        assert!(temp.path().join("work/page_003.png").exists());
        Ok(())
    }

    #[test]
    fn zero_pages_per_chapter_means_one_chapter() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        std::fs::create_dir(temp.path().join("work"))?;
        touch(&temp.path().join("work/page_002.png"))?;
        touch(&temp.path().join("work/page_001.png"))?;

        let manifest = build_manifest(temp.path(), "work", "Title", "Author", 0)?;
        let chapter = &manifest.novels[0].chapters[0];
        assert_eq!(manifest.novels[0].chapters.len(), 1);
        assert_eq!(chapter.title, "全編");
        assert_eq!(chapter.pages, vec!["work/page_001.png", "work/page_002.png"]);
        Ok(())
    }

    #[test]
    fn empty_directory_is_an_error() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let err = build_manifest(temp.path(), "work", "T", "A", 0).unwrap_err();
        assert!(err.to_string().contains("no page_*.png"));
        Ok(())
    }
}
