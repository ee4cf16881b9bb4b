use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::CookieSet;

/// A cookie set read back from disk together with the TTL it is judged by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSession {
    pub cookies: CookieSet,
    pub ttl: Duration,
}

impl CachedSession {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(self.cookies.captured_at) < ttl
    }
}

/// Handle to the on-disk cookie cache.
///
/// Clones share one in-process lock. [`CookieCache::lock`] additionally takes
/// an advisory lock on `<file>.lock`, so separate processes pointed at the same
/// cache serialize their read-then-rewrite sequences too.
#[derive(Debug, Clone)]
pub struct CookieCache {
    path: PathBuf,
    ttl: Duration,
    lock: Arc<Mutex<()>>,
}

/// Held while a caller reads and possibly rewrites the cache.
pub struct CacheLockGuard {
    // Dropped first: the OS lock goes before the in-process one
    _file: Option<fs::File>,
    _guard: OwnedMutexGuard<()>,
}

impl CookieCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read the cached session. Missing or corrupted files are a cache miss.
    pub fn load(&self) -> Option<CachedSession> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), "Failed to read cookie cache: {}", e);
                return None;
            }
        };

        match serde_json::from_slice::<CookieSet>(&content) {
            Ok(cookies) => Some(CachedSession {
                cookies,
                ttl: self.ttl,
            }),
            Err(e) => {
                warn!(path = %self.path.display(), "Ignoring corrupted cookie cache: {}", e);
                None
            }
        }
    }

    /// Atomically replace the cache file. Failures are logged, not returned.
    pub fn save(&self, cookies: &CookieSet) {
        match self.write_atomic(cookies) {
            Ok(()) => info!(
                path = %self.path.display(),
                "Saved {} cookies to cache",
                cookies.len()
            ),
            Err(e) => warn!(path = %self.path.display(), "Failed to save cookie cache: {}", e),
        }
    }

    pub fn is_valid(&self, session: &CachedSession, now: DateTime<Utc>) -> bool {
        session.is_valid(now)
    }

    /// Remove the cache file if present.
    pub fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "Cleared cookie cache"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to clear cookie cache: {}", e),
        }
    }

    /// Acquire exclusive access to the cache for a read-then-rewrite sequence.
    pub async fn lock(&self) -> CacheLockGuard {
        let guard = self.lock.clone().lock_owned().await;
        let file = match self.lock_file().await {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %self.path.display(), "Cookie cache file lock unavailable: {}", e);
                None
            }
        };
        CacheLockGuard {
            _file: file,
            _guard: guard,
        }
    }

    fn parent_dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "cookies".into());
        name.push(".lock");
        self.path.with_file_name(name)
    }

    async fn lock_file(&self) -> std::io::Result<fs::File> {
        fs::create_dir_all(self.parent_dir())?;
        let lock_path = self.lock_path();
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;

        debug!(path = %lock_path.display(), "Waiting for cookie cache lock");
        // Blocks until any other process holding the lock is done with its login
        tokio::task::spawn_blocking(move || file.lock().map(|()| file))
            .await
            .map_err(std::io::Error::other)?
    }

    fn write_atomic(&self, cookies: &CookieSet) -> std::io::Result<()> {
        let parent = self.parent_dir();
        fs::create_dir_all(parent)?;

        let json = serde_json::to_vec_pretty(cookies)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
        }

        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
