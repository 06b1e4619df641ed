// Orchestrator with ordered fallback across providers
//
// Providers are tried one at a time in the order given. The first one that
// leaves a non-empty file behind wins and nothing after it runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::errors::{AllProvidersFailed, DownloadError};
use super::models::{Attempt, TrackRequest};
use super::traits::TrackProvider;
use super::utils::{is_valid_provider_name, strip_exists_prefix};

/// Outcome of a successful resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub path: PathBuf,
    pub service: String,
    pub attempts: Vec<Attempt>,
}

pub struct Downloader {
    backends: Vec<Arc<dyn TrackProvider>>,
    provider_timeout: Option<Duration>,
}

impl Downloader {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
            provider_timeout: None,
        }
    }

    /// Bound each provider attempt separately. Unset means an attempt may
    /// take as long as the provider needs.
    pub fn with_provider_timeout(mut self, limit: Option<Duration>) -> Self {
        self.provider_timeout = limit;
        self
    }

    pub fn add_backend(&mut self, backend: Arc<dyn TrackProvider>) {
        self.backends.push(backend);
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Try each backend in order, giving backend `name` the directory
    /// `work_dir/name` to write into.
    ///
    /// On total failure the caller owns cleanup of `work_dir`.
    pub async fn resolve(
        &self,
        request: &TrackRequest,
        work_dir: &Path,
    ) -> Result<Resolution, AllProvidersFailed> {
        let mut attempts = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            let name = backend.name();
            let output_dir = work_dir.join(name);
            info!(provider = name, track_id = %request.track_id, "trying provider");

            match self.attempt(backend.as_ref(), request, &output_dir).await {
                Ok(path) => {
                    info!(provider = name, path = %path.display(), "provider succeeded");
                    attempts.push(Attempt::success(name));
                    return Ok(Resolution {
                        path,
                        service: name.to_string(),
                        attempts,
                    });
                }
                Err(e) => {
                    warn!(provider = name, error = %e, "provider failed");
                    attempts.push(Attempt::failure(name, e));
                }
            }
        }

        Err(AllProvidersFailed {
            providers: self.backend_names(),
            attempts,
        })
    }

    async fn attempt(
        &self,
        backend: &dyn TrackProvider,
        request: &TrackRequest,
        output_dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        // The name becomes a directory under the work dir
        if !is_valid_provider_name(backend.name()) {
            return Err(DownloadError::InvalidInput(format!(
                "invalid provider name {:?}",
                backend.name()
            )));
        }
        tokio::fs::create_dir_all(output_dir).await?;

        let download = backend.download(request, output_dir);
        let reported = match self.provider_timeout {
            Some(limit) => tokio::time::timeout(limit, download)
                .await
                .map_err(|_| DownloadError::Unknown(format!("timed out after {}", humantime::format_duration(limit))))??,
            None => download.await?,
        };

        validate_artifact(&reported).await
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

/// A provider "success" only counts if the file exists and is non-empty.
async fn validate_artifact(reported: &Path) -> Result<PathBuf, DownloadError> {
    let raw = reported.to_string_lossy();
    let cleaned = strip_exists_prefix(&raw);
    if cleaned.is_empty() {
        return Err(DownloadError::EmptyArtifact("empty file path returned".to_string()));
    }

    let path = PathBuf::from(cleaned);
    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|e| DownloadError::EmptyArtifact(format!("downloaded file missing: {}", e)))?;

    if !meta.is_file() || meta.len() == 0 {
        return Err(DownloadError::EmptyArtifact("downloaded file is empty".to_string()));
    }

    Ok(path)
}
