//! Pure functions turning fetched pages into domain values.
//!
//! Post and fanclub data come from the JSON API, the CSRF token and post
//! listings from server-rendered HTML.

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::app::StashError;
use crate::domain::{
    ContentBlock, Creator, FileBlock, GalleryBlock, MediaUrl, Post, ProductBlock, TextBlock,
};

/// Why a page could not be turned into an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// The entity exists but is of a kind we do not handle
    Unsupported(String),
    /// The payload is missing fields or is not the expected shape
    Malformed(String),
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseFailure::Unsupported(msg) => write!(f, "unsupported: {}", msg),
            ParseFailure::Malformed(msg) => write!(f, "malformed: {}", msg),
        }
    }
}

impl From<ParseFailure> for StashError {
    fn from(failure: ParseFailure) -> Self {
        match failure {
            ParseFailure::Unsupported(msg) => StashError::UnsupportedContent(msg),
            ParseFailure::Malformed(msg) => StashError::Parse(msg),
        }
    }
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) if !s.is_empty() => Ok(s),
        other => Err(de::Error::custom(format!("expected an id, got {}", other))),
    }
}

#[derive(Deserialize)]
struct PostEnvelope {
    post: RawPost,
}

#[derive(Deserialize)]
struct RawPost {
    #[serde(deserialize_with = "id_string")]
    id: String,
    title: Option<String>,
    comment: Option<String>,
    posted_at: String,
    converted_at: Option<String>,
    is_blog: Option<bool>,
    fanclub: RawPostFanclub,
    thumb: Option<RawImage>,
    #[serde(default)]
    post_contents: Vec<RawContent>,
}

#[derive(Deserialize)]
struct RawPostFanclub {
    #[serde(deserialize_with = "id_string")]
    id: String,
    creator_name: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawImage {
    original: Option<String>,
}

#[derive(Deserialize)]
struct RawPhoto {
    url: RawImage,
}

#[derive(Deserialize)]
struct RawProduct {
    uri: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawContent {
    #[serde(deserialize_with = "id_string")]
    id: String,
    category: Option<String>,
    visible_status: Option<String>,
    title: Option<String>,
    comment: Option<String>,
    #[serde(default)]
    post_content_photos: Vec<RawPhoto>,
    download_uri: Option<String>,
    filename: Option<String>,
    product: Option<RawProduct>,
}

/// Parse the body of `api/v1/posts/{id}`.
///
/// Relative file and product links are resolved against `base_url`.
pub fn parse_post(body: &str, base_url: &Url) -> Result<Post, ParseFailure> {
    let envelope: PostEnvelope = serde_json::from_str(body)
        .map_err(|e| ParseFailure::Malformed(format!("post payload: {}", e)))?;
    let raw = envelope.post;

    // Blog posts carry their body as a rich-text document we do not store
    if raw.is_blog != Some(false) {
        return Err(ParseFailure::Unsupported(format!(
            "post {} is a blog post",
            raw.id
        )));
    }

    let posted_at = DateTime::parse_from_rfc2822(&raw.posted_at)
        .map_err(|e| {
            ParseFailure::Malformed(format!("post {} posted_at {:?}: {}", raw.id, raw.posted_at, e))
        })?
        .with_timezone(&Utc);

    let converted_at = match raw.converted_at.as_deref() {
        Some(value) if !value.is_empty() => Some(
            DateTime::parse_from_rfc3339(value)
                .map_err(|e| {
                    ParseFailure::Malformed(format!(
                        "post {} converted_at {:?}: {}",
                        raw.id, value, e
                    ))
                })?
                .with_timezone(&Utc),
        ),
        _ => None,
    };

    let thumbnail = raw
        .thumb
        .and_then(|t| t.original)
        .filter(|u| !u.is_empty())
        .map(MediaUrl::new);

    let mut blocks = Vec::with_capacity(raw.post_contents.len());
    for content in raw.post_contents {
        if content.visible_status.as_deref() != Some("visible") {
            debug!(
                post_id = %raw.id,
                content_id = %content.id,
                "Content not available on the current plan, skipping"
            );
            continue;
        }
        blocks.push(parse_content(content, base_url)?);
    }

    let creator_name = raw
        .fanclub
        .creator_name
        .or(raw.fanclub.name)
        .unwrap_or_default();

    Ok(Post {
        id: raw.id,
        title: raw.title.unwrap_or_default(),
        creator_id: raw.fanclub.id,
        creator_name,
        comment: raw.comment,
        posted_at,
        converted_at,
        thumbnail,
        blocks,
    })
}

fn parse_content(content: RawContent, base_url: &Url) -> Result<ContentBlock, ParseFailure> {
    let RawContent {
        id,
        category,
        title,
        comment,
        post_content_photos,
        download_uri,
        filename,
        product,
        ..
    } = content;
    let title = title.unwrap_or_default();

    let block = match category.as_deref() {
        Some("photo_gallery") => ContentBlock::Gallery(GalleryBlock {
            photos: post_content_photos
                .into_iter()
                .filter_map(|p| p.url.original)
                .map(MediaUrl::new)
                .collect(),
            id,
            title,
            comment,
        }),
        Some("file") => {
            let uri = download_uri.ok_or_else(|| {
                ParseFailure::Malformed(format!("file content {} has no download_uri", id))
            })?;
            let url = resolve(base_url, &uri)?;
            let name = filename
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| format!("file_{}{}", id, MediaUrl::new(uri.as_str()).ext));
            ContentBlock::File(FileBlock {
                id,
                title,
                comment,
                url,
                name,
            })
        }
        Some("product") => {
            let product = product.ok_or_else(|| {
                ParseFailure::Malformed(format!("product content {} has no product", id))
            })?;
            let uri = product
                .uri
                .as_deref()
                .map(str::trim)
                .filter(|uri| !uri.is_empty())
                .ok_or_else(|| {
                    ParseFailure::Malformed(format!("product content {} has no link", id))
                })?;
            ContentBlock::Product(ProductBlock {
                url: resolve(base_url, uri)?,
                name: product.name.unwrap_or_default(),
                id,
                title,
                comment,
            })
        }
        Some("text") => ContentBlock::Text(TextBlock { id, title, comment }),
        other => {
            let category = other.unwrap_or("unknown").to_string();
            debug!(content_id = %id, category = %category, "Unsupported content category");
            ContentBlock::Unsupported { id, category }
        }
    };

    Ok(block)
}

fn resolve(base_url: &Url, reference: &str) -> Result<String, ParseFailure> {
    base_url
        .join(reference)
        .map(String::from)
        .map_err(|e| ParseFailure::Malformed(format!("bad link {:?}: {}", reference, e)))
}

fn selector(css: &str) -> Result<Selector, ParseFailure> {
    Selector::parse(css).map_err(|e| ParseFailure::Malformed(format!("selector {}: {}", css, e)))
}

/// The token the post API expects in `X-CSRF-Token`.
pub fn parse_csrf_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let meta = Selector::parse(r#"meta[name="csrf-token"]"#).ok()?;

    document
        .select(&meta)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(String::from)
}

#[derive(Deserialize)]
struct FanclubEnvelope {
    fanclub: RawFanclub,
}

#[derive(Deserialize)]
struct RawFanclub {
    #[serde(deserialize_with = "id_string")]
    id: String,
    name: Option<String>,
    creator_name: Option<String>,
    fanclub_name_with_creator_name: Option<String>,
}

/// Parse the body of `api/v1/fanclubs/{id}` into a creator without posts.
pub fn parse_fanclub(body: &str) -> Result<Creator, ParseFailure> {
    let envelope: FanclubEnvelope = serde_json::from_str(body)
        .map_err(|e| ParseFailure::Malformed(format!("fanclub payload: {}", e)))?;
    let raw = envelope.fanclub;

    let name = [raw.fanclub_name_with_creator_name, raw.creator_name, raw.name]
        .into_iter()
        .flatten()
        .find(|n| !n.is_empty())
        .unwrap_or_default();

    Ok(Creator::new(raw.id, name))
}

/// Post ids listed on one page of `fanclubs/{id}/posts`.
///
/// An empty result means the listing has no more pages.
pub fn parse_post_listing(html: &str) -> Result<Vec<String>, ParseFailure> {
    let document = Html::parse_document(html);
    let post = selector("div.post")?;
    let title = selector(".post-title")?;
    let link = selector("a.link-block")?;

    let mut ids = Vec::new();
    for element in document.select(&post) {
        if element.select(&title).next().is_none() {
            warn!("Post title not found in listing, skipping entry");
            continue;
        }

        let Some(href) = element
            .select(&link)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            warn!("Post link not found in listing, skipping entry");
            continue;
        };

        match post_id_from_href(href) {
            Some(id) => ids.push(id),
            None => warn!(href = %href, "Unrecognized post link, skipping entry"),
        }
    }

    Ok(ids)
}

fn post_id_from_href(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next()?;
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://fantia.jp/").unwrap()
    }

    fn post_json(is_blog: &str, contents: &str) -> String {
        format!(
            r#"{{"post": {{
                "id": 1234,
                "title": "Spring set",
                "comment": "Thanks for the support",
                "posted_at": "Mon, 01 Apr 2024 18:30:00 +0900",
                "converted_at": "2024-04-01T18:30:00.000+09:00",
                "is_blog": {is_blog},
                "thumb": {{"original": "https://c.fantia.jp/uploads/post/file/1234/main.jpg"}},
                "fanclub": {{"id": 42, "creator_name": "Alice", "name": "Alice's club"}},
                "post_contents": {contents}
            }}}}"#
        )
    }

    #[test]
    fn test_parse_post_with_all_block_kinds() {
        let contents = r#"[
            {"id": 1, "category": "photo_gallery", "visible_status": "visible", "title": "Pics",
             "comment": null,
             "post_content_photos": [
                {"url": {"original": "https://cc.fantia.jp/uploads/a.jpg?Key=1"}},
                {"url": {"original": "https://cc.fantia.jp/uploads/b.png"}}
             ]},
            {"id": 2, "category": "file", "visible_status": "visible", "title": "Archive",
             "comment": "zip inside", "download_uri": "/posts/1234/download/2", "filename": "set.zip"},
            {"id": 3, "category": "text", "visible_status": "visible", "title": null,
             "comment": "Just words"},
            {"id": 4, "category": "product", "visible_status": "visible", "title": "Shop",
             "product": {"uri": "/products/77", "name": "Booklet"}},
            {"id": 5, "category": "embed", "visible_status": "visible", "title": "Video"},
            {"id": 6, "category": "photo_gallery", "visible_status": "invisible", "title": "Paid"}
        ]"#;

        let post = parse_post(&post_json("false", contents), &base()).unwrap();

        assert_eq!(post.id, "1234");
        assert_eq!(post.creator_id, "42");
        assert_eq!(post.creator_name, "Alice");
        assert_eq!(post.posted_at.to_rfc3339(), "2024-04-01T09:30:00+00:00");
        assert_eq!(post.converted_at, Some(post.posted_at));
        assert_eq!(post.thumbnail.as_ref().unwrap().ext, ".jpg");
        assert_eq!(post.blocks.len(), 5);

        match &post.blocks[0] {
            ContentBlock::Gallery(g) => {
                assert_eq!(g.photos.len(), 2);
                assert_eq!(g.photos[0].ext, ".jpg");
                assert_eq!(g.photos[1].ext, ".png");
            }
            other => panic!("expected gallery, got {other:?}"),
        }
        match &post.blocks[1] {
            ContentBlock::File(f) => {
                assert_eq!(f.url, "https://fantia.jp/posts/1234/download/2");
                assert_eq!(f.name, "set.zip");
            }
            other => panic!("expected file, got {other:?}"),
        }
        match &post.blocks[2] {
            ContentBlock::Text(t) => {
                assert_eq!(t.title, "");
                assert_eq!(t.comment.as_deref(), Some("Just words"));
            }
            other => panic!("expected text, got {other:?}"),
        }
        match &post.blocks[3] {
            ContentBlock::Product(p) => {
                assert_eq!(p.url, "https://fantia.jp/products/77");
                assert_eq!(p.name, "Booklet");
            }
            other => panic!("expected product, got {other:?}"),
        }
        assert_eq!(
            post.blocks[4],
            ContentBlock::Unsupported {
                id: "5".into(),
                category: "embed".into()
            }
        );
    }

    #[test]
    fn test_blog_post_is_unsupported() {
        let err = parse_post(&post_json("true", "[]"), &base()).unwrap_err();
        assert!(matches!(err, ParseFailure::Unsupported(_)));

        let err = parse_post(&post_json("null", "[]"), &base()).unwrap_err();
        assert!(matches!(err, ParseFailure::Unsupported(_)));
    }

    #[test]
    fn test_malformed_post() {
        assert!(matches!(
            parse_post("<html>", &base()),
            Err(ParseFailure::Malformed(_))
        ));
        assert!(matches!(
            parse_post(r#"{"post": {"id": 1}}"#, &base()),
            Err(ParseFailure::Malformed(_))
        ));

        let bad_date = post_json("false", "[]").replace("Mon, 01 Apr 2024 18:30:00 +0900", "yesterday");
        assert!(matches!(
            parse_post(&bad_date, &base()),
            Err(ParseFailure::Malformed(_))
        ));
    }

    #[test]
    fn test_product_without_link_is_malformed() {
        for product in [r#"{"name": "Booklet"}"#, r#"{"uri": "  ", "name": "Booklet"}"#] {
            let contents = format!(
                r#"[{{"id": 4, "category": "product", "visible_status": "visible",
                    "title": "Shop", "product": {product}}}]"#
            );
            let err = parse_post(&post_json("false", &contents), &base()).unwrap_err();
            assert!(matches!(err, ParseFailure::Malformed(_)));
        }
    }

    #[test]
    fn test_file_without_filename_gets_generated_name() {
        let contents = r#"[{"id": 9, "category": "file", "visible_status": "visible",
            "download_uri": "/posts/1/download/9.mp4"}]"#;
        let post = parse_post(&post_json("false", contents), &base()).unwrap();
        match &post.blocks[0] {
            ContentBlock::File(f) => assert_eq!(f.name, "file_9.mp4"),
            other => panic!("expected file, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_failure_maps_to_soft_errors() {
        let err: StashError = ParseFailure::Unsupported("blog".into()).into();
        assert!(matches!(err, StashError::UnsupportedContent(_)));
        assert!(err.is_soft());

        let err: StashError = ParseFailure::Malformed("x".into()).into();
        assert!(matches!(err, StashError::Parse(_)));
        assert!(err.is_soft());
    }

    #[test]
    fn test_parse_csrf_token() {
        let html = r#"<html><head>
            <meta name="csrf-param" content="authenticity_token">
            <meta name="csrf-token" content="tok3n==">
            </head><body></body></html>"#;
        assert_eq!(parse_csrf_token(html).as_deref(), Some("tok3n=="));
        assert_eq!(parse_csrf_token("<html><head></head></html>"), None);
    }

    #[test]
    fn test_parse_fanclub() {
        let body = r#"{"fanclub": {"id": 42, "name": "Club", "creator_name": "Alice",
            "fanclub_name_with_creator_name": "Club (Alice)"}}"#;
        let creator = parse_fanclub(body).unwrap();
        assert_eq!(creator.id, "42");
        assert_eq!(creator.name, "Club (Alice)");
        assert!(creator.post_ids.is_empty());

        let body = r#"{"fanclub": {"id": "7", "creator_name": "Bob"}}"#;
        assert_eq!(parse_fanclub(body).unwrap().name, "Bob");

        assert!(matches!(parse_fanclub("{}"), Err(ParseFailure::Malformed(_))));
    }

    #[test]
    fn test_parse_post_listing() {
        let html = r#"<html><body>
            <div class="post"><a class="link-block" href="/posts/301"><span class="post-title">A</span></a></div>
            <div class="post"><a class="link-block" href="/posts/302/?utm=x"><span class="post-title">B</span></a></div>
            <div class="post"><a class="link-block" href="/posts/303"></a></div>
            <div class="post"><span class="post-title">No link</span></div>
            <div class="post"><a class="link-block" href="https://fantia.jp/posts/304"><h3 class="post-title">D</h3></a></div>
        </body></html>"#;

        assert_eq!(parse_post_listing(html).unwrap(), vec!["301", "302", "304"]);
    }

    #[test]
    fn test_empty_listing() {
        let html = r#"<html><body><div class="no-posts">Nothing here</div></body></html>"#;
        assert!(parse_post_listing(html).unwrap().is_empty());
    }
}
