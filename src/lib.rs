//! # fanstash
//!
//! Archives posts and media from a subscription content platform using a
//! browser-derived session.
//!
//! ## Architecture
//!
//! ```text
//! CLI → Repository → SessionClient → SessionProvider → CookieCache / browser login
//!                  ↘ Parser
//! ```
//!
//! - [`session`]: cookie cache, browser login and session provider
//! - [`fetcher`]: session-repairing HTTP client and bounded parallel fan-out
//! - [`repository`]: posts and creators by id
//! - [`download`]: writes post media to disk
//!
//! ## Quick Start
//!
//! ```bash
//! # Log in once; the session is cached
//! fanstash login
//!
//! # Download two posts
//! fanstash posts -i 123456 234567
//!
//! # Download every post of a fanclub
//! fanstash posts -f 4321
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the session,
/// client, repositories and downloader.
pub mod app;

/// Command-line interface using clap.
///
/// - `login` - Log in through the browser
/// - `logout` - Forget the cached session
/// - `posts -i <id>... [-f <fanclub>]` - Download posts
/// - `fanclub -i <id>` - Show a fanclub
pub mod cli;

/// Configuration loaded from `~/.config/fanstash/config.toml`.
pub mod config;

/// Core domain models: [`Post`](domain::Post), its
/// [`ContentBlock`](domain::ContentBlock)s and [`Creator`](domain::Creator).
pub mod domain;

pub mod download;

/// HTTP access to the platform.
///
/// - [`Fetcher`](fetcher::Fetcher): async trait for page fetching
/// - [`SessionClient`](fetcher::SessionClient): reqwest client with one-shot session repair
/// - [`ParallelFetcher`](fetcher::ParallelFetcher): ordered fan-out bounded by a semaphore
pub mod fetcher;

pub mod parser;

pub mod repository;

pub mod session;
