use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::downloader::errors::DownloadError;
use crate::downloader::models::TrackRequest;
use crate::downloader::traits::TrackProvider;
use crate::downloader::utils::{run_output_with_timeout, strip_exists_prefix};

/// Provider backed by an external download tool.
///
/// Invoked as `<program> <track_id> <output_dir> <track_url>` with the track
/// metadata in `TRACK_*` environment variables. The tool prints the path of
/// the file it wrote as its last non-empty stdout line.
pub struct CommandBackend {
    name: String,
    program: String,
}

impl CommandBackend {
    pub fn new(name: &str, program: &str) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
        }
    }

    fn build_args(request: &TrackRequest, output_dir: &Path) -> Vec<String> {
        vec![
            request.track_id.clone(),
            output_dir.to_string_lossy().to_string(),
            request.track_url.clone(),
        ]
    }

    fn build_env(request: &TrackRequest) -> Vec<(String, String)> {
        let meta = &request.metadata;
        [
            ("TRACK_ID", request.track_id.clone()),
            ("TRACK_URL", request.track_url.clone()),
            ("TRACK_NAME", meta.name.clone()),
            ("TRACK_ARTISTS", meta.artists.clone()),
            ("TRACK_ALBUM", meta.album_name.clone()),
            ("TRACK_ALBUM_ARTIST", meta.album_artist.clone()),
            ("TRACK_RELEASE_DATE", meta.release_date.clone()),
            ("TRACK_COVER_URL", meta.images.clone()),
            ("TRACK_NUMBER", meta.track_number.to_string()),
            ("TRACK_TOTAL_TRACKS", meta.total_tracks.to_string()),
            ("TRACK_DISC_NUMBER", meta.disc_number.to_string()),
            ("TRACK_TOTAL_DISCS", meta.total_discs.to_string()),
            ("TRACK_COPYRIGHT", meta.copyright.clone()),
            ("TRACK_PUBLISHER", meta.publisher.clone()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    /// Last non-empty stdout line, resolved against `output_dir` if relative
    fn parse_output_path(stdout: &[u8], output_dir: &Path) -> Result<PathBuf, DownloadError> {
        let text = String::from_utf8_lossy(stdout);
        let line = text
            .lines()
            .map(str::trim)
            .rfind(|l| !l.is_empty())
            .ok_or_else(|| DownloadError::EmptyArtifact("empty file path returned".to_string()))?;

        let path = PathBuf::from(strip_exists_prefix(line));
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(output_dir.join(path))
        }
    }
}

#[async_trait]
impl TrackProvider for CommandBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn download(
        &self,
        request: &TrackRequest,
        output_dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let args = Self::build_args(request, output_dir);
        let envs = Self::build_env(request);

        let output = run_output_with_timeout(&self.program, &args, &envs, None).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                return Err(DownloadError::ExecutionError(format!(
                    "{} exited with {}",
                    self.program, output.status
                )));
            }
            return Err(stderr.into());
        }

        Self::parse_output_path(&output.stdout, output_dir)
    }
}
