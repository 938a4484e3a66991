//! Build deduplication
//!
//! Concurrent requests for the same key share one build. In-process
//! callers join a shared future; other processes are serialized with an
//! `flock` on `<locks>/<key>.lock`.

use crate::cache::CacheKey;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Why a layer build did not produce an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildFailure {
    Failed(String),
    TimedOut { secs: u64 },
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "{}", reason),
            Self::TimedOut { secs } => write!(f, "timed out after {}s", secs),
        }
    }
}

pub type BuildResult = Result<String, BuildFailure>;

type SharedBuild = Shared<BoxFuture<'static, BuildResult>>;

/// In-process single-flight map keyed by cache key
#[derive(Clone, Default)]
pub struct SingleFlight {
    inflight: Arc<Mutex<HashMap<CacheKey, SharedBuild>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `start()` unless a build for `key` is already in flight, in
    /// which case wait for that one.
    ///
    /// The build runs on its own tokio task: dropping every waiter does
    /// not cancel it.
    pub async fn run<F, Fut>(&self, key: &CacheKey, start: F) -> BuildResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BuildResult> + Send + 'static,
    {
        let shared = {
            let mut inflight = self.inflight.lock().unwrap_or_else(|p| p.into_inner());

            match inflight.get(key) {
                Some(existing) => {
                    debug!("Joining in-flight build for {}", key);
                    existing.clone()
                }
                None => {
                    let registry = Arc::clone(&self.inflight);
                    let owned_key = key.clone();
                    let build = start();

                    let handle = tokio::spawn(async move {
                        let result = build.await;
                        registry
                            .lock()
                            .unwrap_or_else(|p| p.into_inner())
                            .remove(&owned_key);
                        result
                    });

                    let shared = async move {
                        handle.await.unwrap_or_else(|e| {
                            Err(BuildFailure::Failed(format!("build task aborted: {}", e)))
                        })
                    }
                    .boxed()
                    .shared();

                    inflight.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };

        shared.await
    }

    /// Number of builds currently in flight
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().map(|m| m.len()).unwrap_or(0)
    }
}

impl fmt::Debug for SingleFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Exclusive cross-process lock for one key, released on drop
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
    _file: File,
}

impl BuildLock {
    /// Block (off the async runtime) until the lock for `key` is held
    pub async fn acquire(dir: &Path, key: &CacheKey) -> io::Result<Self> {
        let dir = dir.to_path_buf();
        let path = dir.join(format!("{}.lock", key));

        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir)?;
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)?;
            lock_exclusive(&file)?;
            Ok(Self { path, _file: file })
        })
        .await
        .map_err(io::Error::other)?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let fd = file.as_raw_fd();
    loop {
        // SAFETY: fd is a valid descriptor owned by `file` for the whole call.
        let result = unsafe { libc::flock(fd, libc::LOCK_EX) };
        if result == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> io::Result<()> {
    Ok(())
}
