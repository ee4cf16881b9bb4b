use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A remote media reference and the file extension to store it under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUrl {
    pub url: String,
    /// Includes the leading dot, empty when the URL path has none
    pub ext: String,
}

impl MediaUrl {
    /// Take the extension from the URL path, ignoring any query string.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let ext = extension_of(&url);
        Self { url, ext }
    }
}

fn extension_of(url: &str) -> String {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    Path::new(&path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryBlock {
    pub id: String,
    pub title: String,
    pub comment: Option<String>,
    pub photos: Vec<MediaUrl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBlock {
    pub id: String,
    pub title: String,
    pub comment: Option<String>,
    pub url: String,
    /// File name the creator uploaded it under
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductBlock {
    pub id: String,
    pub title: String,
    pub comment: Option<String>,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    pub id: String,
    pub title: String,
    pub comment: Option<String>,
}

/// One content entry of a post.
///
/// `Unsupported` keeps categories we cannot store (embeds, blog bodies) in
/// the post so callers can report them instead of failing the whole post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentBlock {
    Gallery(GalleryBlock),
    File(FileBlock),
    Product(ProductBlock),
    Text(TextBlock),
    Unsupported { id: String, category: String },
}

impl ContentBlock {
    pub fn id(&self) -> &str {
        match self {
            ContentBlock::Gallery(b) => &b.id,
            ContentBlock::File(b) => &b.id,
            ContentBlock::Product(b) => &b.id,
            ContentBlock::Text(b) => &b.id,
            ContentBlock::Unsupported { id, .. } => id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ContentBlock::Gallery(b) => &b.title,
            ContentBlock::File(b) => &b.title,
            ContentBlock::Product(b) => &b.title,
            ContentBlock::Text(b) => &b.title,
            ContentBlock::Unsupported { .. } => "",
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            ContentBlock::Gallery(_) => "photo_gallery",
            ContentBlock::File(_) => "file",
            ContentBlock::Product(_) => "product",
            ContentBlock::Text(_) => "text",
            ContentBlock::Unsupported { category, .. } => category,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, ContentBlock::Unsupported { .. })
    }
}

/// Snapshot of a post as the platform served it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub creator_id: String,
    pub creator_name: String,
    pub comment: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub converted_at: Option<DateTime<Utc>>,
    pub thumbnail: Option<MediaUrl>,
    pub blocks: Vec<ContentBlock>,
}

impl Post {
    /// Publication time used for directory names.
    pub fn published_at(&self) -> DateTime<Utc> {
        self.converted_at.unwrap_or(self.posted_at)
    }

    pub fn supported_blocks(&self) -> impl Iterator<Item = &ContentBlock> {
        self.blocks.iter().filter(|b| b.is_supported())
    }
}
