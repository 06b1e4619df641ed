// In-memory token store for finished downloads
//
// Entries map a token to a file on disk with an expiry time. Lookups never
// filter expired entries; the caller decides (expired-but-present is how the
// API tells "gone" apart from "never existed"). A background sweep removes
// expired entries.
//
// File removal is best effort: attempted once, never retried, never reported.
// An entry whose file could not be removed is still gone from the map.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::errors::DownloadError;
use super::token::generate_token;

/// A finished download available for redemption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEntry {
    pub token: String,
    pub path: PathBuf,
    /// Provider that produced the file
    pub service: String,
    pub spotify_id: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl DownloadEntry {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

type TokenGenerator = fn() -> Result<String, DownloadError>;

pub struct DownloadStore {
    entries: RwLock<HashMap<String, DownloadEntry>>,
    generate: TokenGenerator,
}

impl DownloadStore {
    pub fn new() -> Self {
        Self::with_generator(generate_token)
    }

    pub fn with_generator(generate: TokenGenerator) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generate,
        }
    }

    /// Register `path` under a fresh token valid for `ttl`.
    ///
    /// The store takes ownership of the file: it is removed together with the
    /// entry.
    pub async fn put(
        &self,
        path: impl Into<PathBuf>,
        service: &str,
        spotify_id: &str,
        ttl: Duration,
    ) -> Result<DownloadEntry, DownloadError> {
        let created_at = OffsetDateTime::now_utc();
        let expires_at = time::Duration::try_from(ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add(ttl))
            .ok_or_else(|| DownloadError::InvalidInput("ttl out of range".to_string()))?;
        let token = (self.generate)()?;

        let entry = DownloadEntry {
            token: token.clone(),
            path: path.into(),
            service: service.to_string(),
            spotify_id: spotify_id.to_string(),
            created_at,
            expires_at,
        };

        let mut entries = self.entries.write().await;
        match entries.entry(token) {
            Entry::Occupied(_) => {
                warn!(service, spotify_id, "generated token already in use, refusing to overwrite");
                Err(DownloadError::TokenCollision)
            }
            Entry::Vacant(slot) => {
                slot.insert(entry.clone());
                Ok(entry)
            }
        }
    }

    pub async fn get(&self, token: &str) -> Option<DownloadEntry> {
        self.entries.read().await.get(token).cloned()
    }

    /// Remove the entry and its file. Unknown tokens are a no-op.
    pub async fn delete(&self, token: &str) {
        let removed = self.entries.write().await.remove(token);

        if let Some(entry) = removed {
            release_artifact(&entry.path).await;
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Remove every entry expired as of now. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(OffsetDateTime::now_utc()).await
    }

    pub async fn sweep_at(&self, now: OffsetDateTime) -> usize {
        let expired: Vec<String> = {
            let entries = self.entries.read().await;
            entries
                .values()
                .filter(|entry| entry.is_expired_at(now))
                .map(|entry| entry.token.clone())
                .collect()
        };

        // One write lock per token so redemptions interleave with the sweep
        for token in &expired {
            self.delete(token).await;
        }

        expired.len()
    }

    /// Sweep once per `interval` until `cancel` fires.
    ///
    /// A sweep already running when cancellation arrives finishes its batch;
    /// no further ticks start afterwards.
    pub async fn run_sweep_loop(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(interval_secs = interval.as_secs(), "download sweep started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("download sweep shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = self.sweep().await;
                    if removed > 0 {
                        info!(removed, "expired downloads removed");
                    } else {
                        debug!("download sweep: nothing expired");
                    }
                }
            }
        }
    }
}

impl Default for DownloadStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the sweep loop on the runtime. Cancel `cancel` to stop it.
pub fn spawn_sweep_task(
    store: Arc<DownloadStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        store.run_sweep_loop(interval, cancel).await;
    })
}

/// Remove the file plus up to two now-empty parent directories (the
/// provider dir and the per-request work dir). Failures are ignored.
async fn release_artifact(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), error = %e, "artifact removal skipped");
    }

    let mut dir = path.parent();
    for _ in 0..2 {
        let Some(current) = dir else { break };
        if tokio::fs::remove_dir(current).await.is_err() {
            break;
        }
        dir = current.parent();
    }
}
