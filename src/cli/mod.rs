pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fanstash")]
#[command(about = "Archive posts and media from a subscription content platform", long_about = None)]
pub struct Cli {
    /// Number of posts fetched in parallel (overrides the config file)
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Config file path (default: ~/.config/fanstash/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in through the browser and cache the session
    Login,
    /// Forget the cached session
    Logout,
    /// Download posts
    Posts {
        /// Post ids to download
        #[arg(short = 'i', long = "id", num_args = 1..)]
        ids: Vec<String>,

        /// Also download every post of this fanclub
        #[arg(short, long)]
        fanclub: Option<String>,

        /// Only resolve and list the posts
        #[arg(long)]
        no_download: bool,
    },
    /// Show a fanclub and its post count
    Fanclub {
        /// Fanclub id
        #[arg(short = 'i', long = "id")]
        id: String,
    },
}
