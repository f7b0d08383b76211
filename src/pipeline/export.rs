//! Write a finished comic to disk.
//!
//! Layout of the output directory:
//!
//! ```text
//! out/
//! ├── page-001.png
//! ├── page-002.jpg
//! ├── comic.json   # ComicOutput, pretty-printed
//! └── comic.md     # analysis followed by one section per page
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place, so
//! an interrupted export never leaves a half-written page behind.

use crate::error::ComicError;
use crate::output::{ComicOutput, ComicPage};
use crate::pipeline::encode::{decode_data_url, image_extension};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Export `output` into `dir`, creating it if needed.
///
/// Inline pages are decoded; remote pages are downloaded with `client`.
/// Returns the written paths, pages first.
pub async fn export_comic(
    output: &ComicOutput,
    dir: &Path,
    client: &reqwest::Client,
) -> Result<Vec<PathBuf>, ComicError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| write_failed(dir, e))?;

    let mut written = Vec::with_capacity(output.pages.len() + 2);
    let mut image_files = Vec::with_capacity(output.pages.len());
    for page in &output.pages {
        let (bytes, mime_type) = page_bytes(page, client).await?;
        let file_name = format!(
            "page-{:03}.{}",
            page.page_number,
            image_extension(&bytes, &mime_type)
        );
        let path = dir.join(&file_name);
        write_atomic(&path, bytes).await?;
        debug!("Wrote {}", path.display());
        image_files.push(file_name);
        written.push(path);
    }

    let json = serde_json::to_vec_pretty(output)
        .map_err(|e| ComicError::Internal(format!("serialize comic: {e}")))?;
    let json_path = dir.join("comic.json");
    write_atomic(&json_path, json).await?;
    written.push(json_path);

    let md_path = dir.join("comic.md");
    write_atomic(&md_path, render_markdown(output, &image_files).into_bytes()).await?;
    written.push(md_path);

    info!(
        "Exported {} page(s) to {}",
        output.pages.len(),
        dir.display()
    );
    Ok(written)
}

async fn page_bytes(
    page: &ComicPage,
    client: &reqwest::Client,
) -> Result<(Vec<u8>, String), ComicError> {
    if let Some(decoded) = decode_data_url(&page.image_url)? {
        return Ok((decoded.bytes, decoded.mime_type));
    }

    let url = page.image_url.as_str();
    let failed = |reason: String| ComicError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| failed(e.to_string()))?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }
    let mime_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/png")
        .to_string();
    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    Ok((bytes.to_vec(), mime_type))
}

/// The reader-facing markdown: analysis, then each page's image and text.
pub fn render_markdown(output: &ComicOutput, image_files: &[String]) -> String {
    let mut md = String::from("# Comic\n\n");
    if !output.analysis.trim().is_empty() {
        md.push_str(output.analysis.trim());
        md.push_str("\n\n");
    }
    for (page, file) in output.pages.iter().zip(image_files) {
        md.push_str(&format!(
            "## Page {}\n\n![Page {}]({})\n\n{}\n\n",
            page.page_number,
            page.page_number,
            file,
            page.description.trim()
        ));
    }
    md
}

async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<(), ComicError> {
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = target.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| write_failed(&target, e))?;
        tmp.write_all(&bytes).map_err(|e| write_failed(&target, e))?;
        tmp.persist(&target)
            .map_err(|e| write_failed(&target, e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| ComicError::Internal(format!("export task panicked: {e}")))?
}

fn write_failed(path: &Path, source: std::io::Error) -> ComicError {
    ComicError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    }
}
