use crate::app::{AppContext, Result, StashError};
use crate::repository::dedupe_ids;
use crate::session::SessionProvider;

pub async fn login(ctx: &AppContext) -> Result<()> {
    let cookies = ctx.session.login().await?;
    println!("Logged in, {} cookies captured", cookies.len());
    if let Some(cache) = ctx.session.cache() {
        println!("Session cached at {}", cache.path().display());
    }
    Ok(())
}

pub async fn logout(ctx: &AppContext) -> Result<()> {
    ctx.session.invalidate().await;
    println!("Cached session removed");
    Ok(())
}

pub async fn show_fanclub(ctx: &AppContext, id: &str) -> Result<()> {
    let creator = ctx
        .creators
        .get(id)
        .await?
        .ok_or_else(|| StashError::NotFound(format!("fanclub {}", id)))?;

    println!("{} ({})", creator.name, creator.id);
    println!("{} posts", creator.post_count());
    Ok(())
}

pub async fn download_posts(
    ctx: &AppContext,
    ids: &[String],
    fanclub: Option<&str>,
    download: bool,
) -> Result<()> {
    let mut requested = ids.to_vec();
    if let Some(fanclub_id) = fanclub {
        let creator = ctx
            .creators
            .get(fanclub_id)
            .await?
            .ok_or_else(|| StashError::NotFound(format!("fanclub {}", fanclub_id)))?;
        println!("Fanclub {}: {} posts", creator.name, creator.post_count());
        requested.extend(creator.post_ids);
    }

    let requested = dedupe_ids(&requested);
    if requested.is_empty() {
        println!("No posts to fetch");
        return Ok(());
    }

    println!("Fetching {} posts...", requested.len());
    let posts = ctx.posts.get_many(&requested).await?;
    let skipped = requested.len() - posts.len();

    if !download {
        for post in &posts {
            println!("  {}  {}  ({} blocks)", post.id, post.title, post.blocks.len());
        }
        println!("Resolved {} posts, {} skipped", posts.len(), skipped);
        return Ok(());
    }

    let mut failed_files = 0;
    for post in &posts {
        println!("Downloading {}: {}", post.id, post.title);
        let report = ctx.downloader.download_post(post).await?;
        for failure in report.failures() {
            failed_files += 1;
            eprintln!("  Failed {}: {:?}", failure.path.display(), failure.status);
        }
    }

    println!(
        "Download complete: {} posts, {} skipped, {} failed files",
        posts.len(),
        skipped,
        failed_files
    );
    Ok(())
}
