// Common data models for the downloader

use serde::{Deserialize, Serialize};

/// Descriptive track metadata handed to every provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackMetadata {
    pub spotify_id: String,
    pub artists: String,
    pub name: String,
    pub album_name: String,
    pub album_artist: String,
    /// Cover art URL
    pub images: String,
    pub release_date: String,
    pub track_number: u32,
    pub total_tracks: u32,
    pub disc_number: u32,
    pub total_discs: u32,
    pub copyright: String,
    pub publisher: String,
}

impl TrackMetadata {
    /// `Title - Artist`, used when a provider has to pick a file name itself
    pub fn display_name(&self) -> String {
        match (self.name.trim(), self.artists.trim()) {
            ("", "") => self.spotify_id.clone(),
            (title, "") => title.to_string(),
            ("", artists) => artists.to_string(),
            (title, artists) => format!("{} - {}", title, artists),
        }
    }
}

/// One provider tried during a single resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Attempt {
    pub fn success(service: &str) -> Self {
        Self {
            service: service.to_string(),
            error: None,
        }
    }

    pub fn failure(service: &str, error: impl ToString) -> Self {
        Self {
            service: service.to_string(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Resolved identifier plus metadata, as passed to each provider
#[derive(Debug, Clone)]
pub struct TrackRequest {
    pub track_id: String,
    pub track_url: String,
    pub metadata: TrackMetadata,
}

impl TrackRequest {
    pub fn new(track_id: &str, metadata: TrackMetadata) -> Self {
        Self {
            track_id: track_id.to_string(),
            track_url: format!("https://open.spotify.com/track/{}", track_id),
            metadata,
        }
    }
}
