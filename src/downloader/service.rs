// Acquisition flow: identifier -> metadata -> provider fallback -> token
//
// Owns the per-request work directory until the store takes over the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::backends::ProviderRegistry;
use super::errors::{AllProvidersFailed, DownloadError};
use super::models::{Attempt, TrackRequest};
use super::store::{DownloadEntry, DownloadStore};
use super::traits::MetadataSource;
use super::utils::{extract_track_id, is_valid_provider_name, normalize_service_order};

/// Upper bound for a caller-requested TTL
pub const MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A registered download
#[derive(Debug, Clone)]
pub struct Acquired {
    pub entry: DownloadEntry,
    pub attempts: Vec<Attempt>,
}

#[derive(Debug)]
pub enum AcquireError {
    /// Bad identifier or no usable services; nothing was attempted
    Invalid(DownloadError),
    /// Metadata lookup failed before any provider ran
    Metadata(DownloadError),
    /// Could not create the work directory
    Workspace(DownloadError),
    /// Every provider failed
    AllFailed(AllProvidersFailed),
    /// Token could not be minted; the artifact was discarded
    Token(DownloadError),
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(e) => write!(f, "{}", e),
            Self::Metadata(e) => write!(f, "failed to fetch track metadata: {}", e),
            Self::Workspace(e) => write!(f, "failed to create temp directory: {}", e),
            Self::AllFailed(e) => write!(f, "{}", e),
            Self::Token(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AcquireError {}

pub struct TrackService {
    store: Arc<DownloadStore>,
    registry: ProviderRegistry,
    metadata: Arc<dyn MetadataSource>,
    work_root: PathBuf,
    default_services: Vec<String>,
    default_ttl: Duration,
    provider_timeout: Option<Duration>,
}

impl TrackService {
    pub fn new(
        store: Arc<DownloadStore>,
        registry: ProviderRegistry,
        metadata: Arc<dyn MetadataSource>,
        work_root: PathBuf,
    ) -> Self {
        Self {
            store,
            registry,
            metadata,
            work_root,
            default_services: vec!["tidal".into(), "qobuz".into(), "amazon".into()],
            default_ttl: Duration::from_secs(2 * 60 * 60),
            provider_timeout: None,
        }
    }

    pub fn with_default_services(mut self, services: Vec<String>) -> Self {
        self.default_services = services;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_provider_timeout(mut self, limit: Option<Duration>) -> Self {
        self.provider_timeout = limit;
        self
    }

    pub fn store(&self) -> &Arc<DownloadStore> {
        &self.store
    }

    /// Requested TTL in seconds, capped at [`MAX_TTL`]; zero or absent means
    /// the default.
    pub fn effective_ttl(&self, requested_secs: Option<u64>) -> Duration {
        match requested_secs {
            Some(secs) if secs > 0 => Duration::from_secs(secs).min(MAX_TTL),
            _ => self.default_ttl,
        }
    }

    /// Service order for a request, or `Invalid` if nothing usable remains
    pub fn service_order(&self, requested: &[String]) -> Result<Vec<String>, AcquireError> {
        let order = normalize_service_order(requested, &self.registry.names(), &self.default_services);
        if order.is_empty() {
            return Err(AcquireError::Invalid(DownloadError::InvalidInput(
                "no valid services in services[]".to_string(),
            )));
        }
        Ok(order)
    }

    pub async fn acquire(
        &self,
        input: &str,
        services: &[String],
        ttl: Duration,
    ) -> Result<Acquired, AcquireError> {
        let order = self.service_order(services)?;
        let track_id = extract_track_id(input).map_err(AcquireError::Invalid)?;

        let track_url = format!("https://open.spotify.com/track/{}", track_id);
        let metadata = self
            .metadata
            .fetch(&track_id, &track_url)
            .await
            .map_err(AcquireError::Metadata)?;
        let request = TrackRequest::new(&track_id, metadata);

        let work_dir = self.create_work_dir()?;
        let downloader = self.registry.downloader_for(&order, self.provider_timeout);

        let resolution = match downloader.resolve(&request, &work_dir).await {
            Ok(resolution) => resolution,
            Err(failed) => {
                remove_work_dir(&work_dir).await;
                return Err(AcquireError::AllFailed(failed));
            }
        };

        // Failed providers may have left partial output behind
        for attempt in resolution
            .attempts
            .iter()
            .filter(|a| !a.is_success() && is_valid_provider_name(&a.service))
        {
            let _ = tokio::fs::remove_dir_all(work_dir.join(&attempt.service)).await;
        }

        match self
            .store
            .put(&resolution.path, &resolution.service, &track_id, ttl)
            .await
        {
            Ok(entry) => {
                info!(
                    track_id = %track_id,
                    service = %entry.service,
                    expires_at = %entry.expires_at,
                    "download registered"
                );
                Ok(Acquired {
                    entry,
                    attempts: resolution.attempts,
                })
            }
            Err(e) => {
                remove_work_dir(&work_dir).await;
                match e {
                    DownloadError::InvalidInput(_) => Err(AcquireError::Invalid(e)),
                    e => Err(AcquireError::Token(e)),
                }
            }
        }
    }

    fn create_work_dir(&self) -> Result<PathBuf, AcquireError> {
        std::fs::create_dir_all(&self.work_root)
            .map_err(|e| AcquireError::Workspace(e.into()))?;
        tempfile::Builder::new()
            .prefix("track-dl-")
            .tempdir_in(&self.work_root)
            .map(|dir| dir.keep())
            .map_err(|e| AcquireError::Workspace(e.into()))
    }
}

async fn remove_work_dir(work_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(work_dir).await {
        debug!(path = %work_dir.display(), error = %e, "work dir cleanup skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::downloader::models::TrackMetadata;
    use crate::downloader::traits::TrackProvider;

    const ID: &str = "4uLU6hMCjMI75M1A2tKUQC";
    const HOUR: Duration = Duration::from_secs(3600);

    struct StaticMetadata;

    #[async_trait]
    impl MetadataSource for StaticMetadata {
        async fn fetch(&self, track_id: &str, _url: &str) -> Result<TrackMetadata, DownloadError> {
            if track_id == "0000000000000000000000" {
                return Err(DownloadError::Http(404, "Not Found".into()));
            }
            Ok(TrackMetadata {
                spotify_id: track_id.to_string(),
                name: "Song".into(),
                artists: "Band".into(),
                ..Default::default()
            })
        }
    }

    struct Provider {
        name: &'static str,
        ok: bool,
        seen: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl TrackProvider for Provider {
        fn name(&self) -> &str {
            self.name
        }

        async fn download(
            &self,
            request: &TrackRequest,
            output_dir: &Path,
        ) -> Result<PathBuf, DownloadError> {
            self.seen.lock().unwrap().push(output_dir.to_path_buf());
            let path = output_dir.join(format!("{}.flac", request.metadata.display_name()));
            if self.ok {
                std::fs::write(&path, b"fLaC")?;
                Ok(path)
            } else {
                std::fs::write(output_dir.join("partial.tmp"), b"x")?;
                Err(DownloadError::Unknown(format!("{} unavailable", self.name)))
            }
        }
    }

    fn provider(name: &'static str, ok: bool) -> Arc<Provider> {
        Arc::new(Provider {
            name,
            ok,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn service(root: &Path, providers: &[Arc<Provider>]) -> TrackService {
        let mut registry = ProviderRegistry::new();
        for p in providers {
            registry.register(p.clone()).unwrap();
        }
        TrackService::new(
            Arc::new(DownloadStore::new()),
            registry,
            Arc::new(StaticMetadata),
            root.to_path_buf(),
        )
    }

    fn dir_count(root: &Path) -> usize {
        std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_acquire_registers_winner() {
        let root = tempfile::tempdir().unwrap();
        let tidal = provider("tidal", false);
        let qobuz = provider("qobuz", true);
        let svc = service(root.path(), &[tidal.clone(), qobuz.clone()]);

        let acquired = svc
            .acquire(&format!("https://open.spotify.com/track/{}", ID), &[], HOUR)
            .await
            .unwrap();

        assert_eq!(acquired.entry.service, "qobuz");
        assert_eq!(acquired.entry.spotify_id, ID);
        assert_eq!(acquired.entry.filename(), "Song - Band.flac");
        assert_eq!(
            acquired.attempts,
            vec![Attempt::failure("tidal", "tidal unavailable"), Attempt::success("qobuz")]
        );
        assert!(svc.store().get(&acquired.entry.token).await.is_some());

        // Failed provider output is gone, the winner's is kept
        assert!(!tidal.seen.lock().unwrap()[0].exists());
        assert!(acquired.entry.path.exists());

        // Redeeming and deleting reclaims the whole work dir
        svc.store().delete(&acquired.entry.token).await;
        assert_eq!(dir_count(root.path()), 0);
    }

    #[tokio::test]
    async fn test_each_request_gets_its_own_work_dir() {
        let root = tempfile::tempdir().unwrap();
        let tidal = provider("tidal", true);
        let svc = service(root.path(), &[tidal.clone()]);

        let a = svc.acquire(ID, &[], HOUR).await.unwrap();
        let b = svc.acquire(ID, &[], HOUR).await.unwrap();

        assert_ne!(a.entry.path, b.entry.path);
        assert_eq!(dir_count(root.path()), 2);
    }

    #[tokio::test]
    async fn test_total_failure_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let svc = service(root.path(), &[provider("tidal", false), provider("qobuz", false)]);

        let err = svc.acquire(ID, &[], HOUR).await.unwrap_err();
        match err {
            AcquireError::AllFailed(failed) => {
                assert_eq!(failed.attempts.len(), 2);
                assert!(failed.attempts.iter().all(|a| a.error.is_some()));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(dir_count(root.path()), 0);
        assert!(svc.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_requested_order_is_respected() {
        let root = tempfile::tempdir().unwrap();
        let tidal = provider("tidal", true);
        let amazon = provider("amazon", true);
        let svc = service(root.path(), &[tidal.clone(), amazon.clone()]);

        let acquired = svc
            .acquire(ID, &["Amazon".to_string(), "tidal".to_string()], HOUR)
            .await
            .unwrap();
        assert_eq!(acquired.entry.service, "amazon");
        assert!(tidal.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_input_errors_run_nothing() {
        let root = tempfile::tempdir().unwrap();
        let tidal = provider("tidal", true);
        let svc = service(root.path(), &[tidal.clone()]);

        let err = svc.acquire("not a track", &[], HOUR).await.unwrap_err();
        assert!(matches!(err, AcquireError::Invalid(_)));

        let err = svc.acquire(ID, &["deezer".to_string()], HOUR).await.unwrap_err();
        assert_eq!(err.to_string(), "no valid services in services[]");

        assert!(tidal.seen.lock().unwrap().is_empty());
        assert_eq!(dir_count(root.path()), 0);
    }

    #[tokio::test]
    async fn test_metadata_failure() {
        let root = tempfile::tempdir().unwrap();
        let svc = service(root.path(), &[provider("tidal", true)]);

        let err = svc.acquire("0000000000000000000000", &[], HOUR).await.unwrap_err();
        assert!(matches!(err, AcquireError::Metadata(_)));
        assert!(err.to_string().starts_with("failed to fetch track metadata"));
    }

    #[tokio::test]
    async fn test_token_failure_discards_artifact() {
        let root = tempfile::tempdir().unwrap();
        let mut registry = ProviderRegistry::new();
        registry.register(provider("tidal", true)).unwrap();
        let store = Arc::new(DownloadStore::with_generator(|| {
            Err(DownloadError::TokenGeneration("entropy unavailable".into()))
        }));
        let svc = TrackService::new(store, registry, Arc::new(StaticMetadata), root.path().to_path_buf());

        let err = svc.acquire(ID, &[], HOUR).await.unwrap_err();
        assert!(matches!(err, AcquireError::Token(_)));
        assert_eq!(dir_count(root.path()), 0);
    }

    #[tokio::test]
    async fn test_ttl_out_of_range_discards_artifact() {
        let root = tempfile::tempdir().unwrap();
        let svc = service(root.path(), &[provider("tidal", true)]);

        let err = svc.acquire(ID, &[], Duration::MAX).await.unwrap_err();
        assert!(matches!(err, AcquireError::Invalid(_)));
        assert_eq!(err.to_string(), "ttl out of range");
        assert_eq!(dir_count(root.path()), 0);
        assert!(svc.store().is_empty().await);
    }

    #[test]
    fn test_effective_ttl() {
        let root = tempfile::tempdir().unwrap();
        let svc = service(root.path(), &[]).with_default_ttl(HOUR);
        assert_eq!(svc.effective_ttl(None), HOUR);
        assert_eq!(svc.effective_ttl(Some(0)), HOUR);
        assert_eq!(svc.effective_ttl(Some(90)), Duration::from_secs(90));
        assert_eq!(svc.effective_ttl(Some(10 * 24 * 3600)), MAX_TTL);
    }
}
