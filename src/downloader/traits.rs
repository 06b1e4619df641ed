// Provider and metadata capability traits

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::errors::DownloadError;
use super::models::{TrackMetadata, TrackRequest};

/// One acquisition backend (tidal, qobuz, ...)
///
/// Implementations write into `output_dir`, which belongs to this provider
/// for the current resolution only, and return the path of the produced file.
/// The returned path may carry an `EXISTS:` prefix when the file was already
/// present.
#[async_trait]
pub trait TrackProvider: Send + Sync {
    /// Name of the provider (for logging and attempt records)
    fn name(&self) -> &str;

    async fn download(
        &self,
        request: &TrackRequest,
        output_dir: &Path,
    ) -> Result<PathBuf, DownloadError>;
}

/// Looks up descriptive metadata for a track ID
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, track_id: &str, track_url: &str) -> Result<TrackMetadata, DownloadError>;
}
