// Track metadata lookup over HTTP

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::errors::DownloadError;
use super::models::TrackMetadata;
use super::traits::MetadataSource;

const METADATA_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Deserialize)]
struct TrackResponse {
    track: TrackMetadata,
}

/// Fetches `{"track": {...}}` from a URL template with `{id}` and `{url}`
/// placeholders.
pub struct HttpMetadataSource {
    url_template: String,
    client: reqwest::Client,
}

impl HttpMetadataSource {
    pub fn new(url_template: &str, client: reqwest::Client) -> Self {
        Self {
            url_template: url_template.to_string(),
            client,
        }
    }

    fn build_url(&self, track_id: &str, track_url: &str) -> String {
        self.url_template
            .replace("{id}", track_id)
            .replace("{url}", track_url)
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    async fn fetch(&self, track_id: &str, track_url: &str) -> Result<TrackMetadata, DownloadError> {
        let response = self
            .client
            .get(self.build_url(track_id, track_url))
            .timeout(METADATA_TIMEOUT)
            .send()
            .await
            .map_err(|e| DownloadError::from(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Http(
                status.as_u16(),
                status.canonical_reason().unwrap_or("metadata lookup failed").to_string(),
            ));
        }

        let payload: TrackResponse = response
            .json()
            .await
            .map_err(|e| DownloadError::ParseError(format!("invalid metadata JSON: {}", e)))?;

        let mut track = payload.track;
        if track.name.trim().is_empty() {
            return Err(DownloadError::ParseError(
                "metadata did not include track name".to_string(),
            ));
        }
        if track.spotify_id.is_empty() {
            track.spotify_id = track_id.to_string();
        }

        Ok(track)
    }
}
