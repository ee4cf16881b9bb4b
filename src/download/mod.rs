//! Writes a post's content blocks to a local directory tree.
//!
//! ```text
//! <directory>/<creator_id>/<post_id>_<title>_<YYYYmmddHHMM>/
//!     comment.txt
//!     0000_thumb.jpg
//!     <block_id>_<block title>/000.jpg ...
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::{Result, StashError};
use crate::domain::{ContentBlock, FileBlock, GalleryBlock, Post, ProductBlock, TextBlock};
use crate::fetcher::SessionClient;

/// Longest file name most filesystems accept, in bytes.
const MAX_COMPONENT_BYTES: usize = 255;

/// Configuration for media downloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Root directory for downloaded posts
    pub directory: PathBuf,

    /// Also save each post's thumbnail
    pub download_thumbnail: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("downloads/fantia"),
            download_thumbnail: false,
        }
    }
}

/// What happened to one file of a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// Fetched (or already complete on disk) with this many bytes
    Downloaded(u64),
    /// Written from post metadata
    Saved,
    /// The server answered 404
    Missing,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub status: FileStatus,
}

/// Per-file results for one post.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub post_id: String,
    pub directory: PathBuf,
    pub files: Vec<FileOutcome>,
}

impl DownloadReport {
    fn record(&mut self, path: PathBuf, status: FileStatus) {
        self.files.push(FileOutcome { path, status });
    }

    pub fn succeeded(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::Downloaded(_) | FileStatus::Saved))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::Failed(_)))
    }

    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }
}

pub struct MediaDownloader {
    client: Arc<SessionClient>,
    root: PathBuf,
    download_thumbnail: bool,
}

impl MediaDownloader {
    pub fn new(client: Arc<SessionClient>, config: &DownloadConfig) -> Self {
        Self {
            client,
            root: config.directory.clone(),
            download_thumbnail: config.download_thumbnail,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a post is stored in.
    pub fn post_directory(&self, post: &Post) -> PathBuf {
        let stamp = post.published_at().format("%Y%m%d%H%M");
        self.root
            .join(sanitize_path_component(&post.creator_id))
            .join(labelled_component(
                &format!("{}_", post.id),
                &post.title,
                &format!("_{}", stamp),
            ))
    }

    /// Store every supported block of `post`.
    ///
    /// A failed file is recorded in the report and the rest continue.
    /// Only authentication failures abort.
    pub async fn download_post(&self, post: &Post) -> Result<DownloadReport> {
        let directory = self.post_directory(post);
        let mut report = DownloadReport {
            post_id: post.id.clone(),
            directory: directory.clone(),
            files: Vec::new(),
        };

        if let Err(e) = tokio::fs::create_dir_all(&directory).await {
            warn!(
                post_id = %post.id,
                path = %directory.display(),
                "Cannot create post directory: {}",
                e
            );
            report.record(directory, FileStatus::Failed(e.to_string()));
            return Ok(report);
        }
        info!(post_id = %post.id, path = %directory.display(), "Saving post");

        if let Some(comment) = non_empty(&post.comment) {
            self.save_text(&mut report, directory.join("comment.txt"), comment)
                .await?;
        }

        if self.download_thumbnail {
            match &post.thumbnail {
                Some(thumb) => {
                    let dest = directory.join(format!("0000_thumb{}", thumb.ext));
                    self.fetch(&mut report, &thumb.url, dest).await?;
                }
                None => info!(post_id = %post.id, "No thumbnail for this post"),
            }
        }

        for block in &post.blocks {
            match block {
                ContentBlock::Gallery(gallery) => {
                    self.save_gallery(&mut report, &directory, gallery).await?
                }
                ContentBlock::File(file) => self.save_file(&mut report, &directory, file).await?,
                ContentBlock::Text(text) => self.save_text_block(&mut report, &directory, text).await?,
                ContentBlock::Product(product) => {
                    self.save_product(&mut report, &directory, product).await?
                }
                ContentBlock::Unsupported { id, category } => {
                    info!(content_id = %id, "Skipping unsupported {} content", category);
                    report.record(
                        directory.join(id),
                        FileStatus::Skipped(format!("unsupported category {}", category)),
                    );
                }
            }
        }

        Ok(report)
    }

    /// Create the directory for one block, recording a failure in `report`.
    async fn block_directory(
        &self,
        report: &mut DownloadReport,
        post_dir: &Path,
        id: &str,
        title: &str,
    ) -> Option<PathBuf> {
        let dir = post_dir.join(labelled_component(&format!("{}_", id), title, ""));
        match tokio::fs::create_dir_all(&dir).await {
            Ok(()) => Some(dir),
            Err(e) => {
                warn!(content_id = %id, path = %dir.display(), "Cannot create directory: {}", e);
                report.record(dir, FileStatus::Failed(e.to_string()));
                None
            }
        }
    }

    async fn save_gallery(
        &self,
        report: &mut DownloadReport,
        post_dir: &Path,
        gallery: &GalleryBlock,
    ) -> Result<()> {
        info!(content_id = %gallery.id, "Downloading {} photos", gallery.photos.len());
        let Some(dir) = self
            .block_directory(report, post_dir, &gallery.id, &gallery.title)
            .await
        else {
            return Ok(());
        };

        if let Some(comment) = non_empty(&gallery.comment) {
            self.save_text(report, dir.join("comment.txt"), comment).await?;
        }
        for (index, photo) in gallery.photos.iter().enumerate() {
            let dest = dir.join(format!("{:03}{}", index, photo.ext));
            self.fetch(report, &photo.url, dest).await?;
        }
        Ok(())
    }

    async fn save_file(
        &self,
        report: &mut DownloadReport,
        post_dir: &Path,
        file: &FileBlock,
    ) -> Result<()> {
        info!(content_id = %file.id, "Downloading file {}", file.name);
        let Some(dir) = self
            .block_directory(report, post_dir, &file.id, &file.title)
            .await
        else {
            return Ok(());
        };

        if let Some(comment) = non_empty(&file.comment) {
            self.save_text(report, dir.join("comment.txt"), comment).await?;
        }
        let dest = dir.join(sanitize_path_component(&file.name));
        self.fetch(report, &file.url, dest).await
    }

    async fn save_text_block(
        &self,
        report: &mut DownloadReport,
        post_dir: &Path,
        text: &TextBlock,
    ) -> Result<()> {
        let Some(comment) = non_empty(&text.comment) else {
            warn!(content_id = %text.id, "Text content has no body");
            return Ok(());
        };
        let Some(dir) = self
            .block_directory(report, post_dir, &text.id, &text.title)
            .await
        else {
            return Ok(());
        };
        self.save_text(report, dir.join("content.txt"), comment).await
    }

    async fn save_product(
        &self,
        report: &mut DownloadReport,
        post_dir: &Path,
        product: &ProductBlock,
    ) -> Result<()> {
        let Some(dir) = self
            .block_directory(report, post_dir, &product.id, &product.title)
            .await
        else {
            return Ok(());
        };

        match non_empty(&product.comment) {
            Some(comment) => {
                self.save_text(report, dir.join("content.txt"), comment)
                    .await?
            }
            None => warn!(content_id = %product.id, "Product content has no description"),
        }
        self.save_text(report, dir.join("url.txt"), &product.url).await
    }

    async fn save_text(&self, report: &mut DownloadReport, path: PathBuf, text: &str) -> Result<()> {
        match tokio::fs::write(&path, text).await {
            Ok(()) => report.record(path, FileStatus::Saved),
            Err(e) => {
                warn!(path = %path.display(), "Failed to write: {}", e);
                report.record(path, FileStatus::Failed(e.to_string()));
            }
        }
        Ok(())
    }

    async fn fetch(&self, report: &mut DownloadReport, url: &str, dest: PathBuf) -> Result<()> {
        match self.client.download(url, &dest).await {
            Ok(Some(bytes)) => report.record(dest, FileStatus::Downloaded(bytes)),
            Ok(None) => report.record(dest, FileStatus::Missing),
            Err(e @ StashError::Authentication(_)) => return Err(e),
            Err(e) => {
                warn!(url = %url, "Download failed: {}", e);
                report.record(dest, FileStatus::Failed(e.to_string()));
            }
        }
        Ok(())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Make `value` safe to use as a single path component.
pub fn sanitize_path_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => ' ',
            other => other,
        })
        .collect();

    let capped = truncate_bytes(trim_component_end(&cleaned), MAX_COMPONENT_BYTES);
    let trimmed = trim_component_end(capped);
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `prefix` + `title` + `suffix` as one component, shortening the title
/// so the prefix and suffix survive the length cap.
fn labelled_component(prefix: &str, title: &str, suffix: &str) -> String {
    let budget = MAX_COMPONENT_BYTES.saturating_sub(prefix.len() + suffix.len());
    let title = truncate_bytes(title, budget);
    sanitize_path_component(&format!("{}{}{}", prefix, title, suffix))
}

fn trim_component_end(value: &str) -> &str {
    value.trim_end_matches(|c: char| c == '.' || c.is_whitespace())
}

fn truncate_bytes(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
