use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fanstash::app::AppContext;
use fanstash::cli::{commands, Cli, Commands};
use fanstash::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "fanstash=debug" } else { "fanstash=info" };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(workers) = cli.workers {
        config.repository.workers = workers.max(1);
    }

    let app = AppContext::new(config)?;
    let ctx = &app;
    let command = cli.command;

    let run = async move {
        match command {
            Commands::Login => commands::login(ctx).await,
            Commands::Logout => commands::logout(ctx).await,
            Commands::Posts {
                ids,
                fanclub,
                no_download,
            } => commands::download_posts(ctx, &ids, fanclub.as_deref(), !no_download).await,
            Commands::Fanclub { id } => commands::show_fanclub(ctx, &id).await,
        }
    };

    let mut run = Box::pin(run);
    tokio::select! {
        result = &mut run => return Ok(result?),
        _ = tokio::signal::ctrl_c() => {}
    }

    // Release the browser and partial downloads before exiting
    drop(run);
    drop(app);
    eprintln!("Interrupted");
    std::process::exit(130);
}
