use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::downloader::errors::DownloadError;
use crate::downloader::models::TrackRequest;
use crate::downloader::traits::TrackProvider;
use crate::downloader::utils::sanitize_filename;

/// Provider that fetches the audio from an HTTP mirror.
///
/// `{id}` and `{url}` in the template are replaced with the track ID and the
/// canonical track URL. The body is streamed into `<Title> - <Artist>.<ext>`.
pub struct HttpBackend {
    name: String,
    url_template: String,
    extension: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(name: &str, url_template: &str, extension: &str, client: reqwest::Client) -> Self {
        Self {
            name: name.to_string(),
            url_template: url_template.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
            client,
        }
    }

    fn build_url(&self, request: &TrackRequest) -> String {
        self.url_template
            .replace("{id}", &request.track_id)
            .replace("{url}", &request.track_url)
    }

    fn target_path(&self, request: &TrackRequest, output_dir: &Path) -> PathBuf {
        let stem = sanitize_filename(&request.metadata.display_name());
        output_dir.join(format!("{}.{}", stem, self.extension))
    }
}

#[async_trait]
impl TrackProvider for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn download(
        &self,
        request: &TrackRequest,
        output_dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let url = self.build_url(request);
        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DownloadError::from(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.trim().chars().take(200).collect();
            return Err(DownloadError::Http(status.as_u16(), snippet));
        }

        let path = self.target_path(request, output_dir);
        let mut file = tokio::fs::File::create(&path).await?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| DownloadError::from(e.to_string()))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path as UrlPath, http::StatusCode, routing::get, Router};
    use crate::downloader::models::TrackMetadata;

    fn request() -> TrackRequest {
        TrackRequest::new(
            "4uLU6hMCjMI75M1A2tKUQC",
            TrackMetadata {
                name: "Song".into(),
                artists: "Band".into(),
                ..Default::default()
            },
        )
    }

    async fn serve_mirror() -> String {
        let app = Router::new().route(
            "/tracks/{id}",
            get(|UrlPath(id): UrlPath<String>| async move {
                if id == "4uLU6hMCjMI75M1A2tKUQC" {
                    (StatusCode::OK, "fLaC-bytes".to_string())
                } else {
                    (StatusCode::NOT_FOUND, "no such track".to_string())
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_build_url_and_target() {
        let backend = HttpBackend::new(
            "mirror",
            "https://mirror.local/get?id={id}&src={url}",
            ".m4a",
            reqwest::Client::new(),
        );
        let req = request();
        assert_eq!(
            backend.build_url(&req),
            "https://mirror.local/get?id=4uLU6hMCjMI75M1A2tKUQC&src=https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"
        );
        assert_eq!(
            backend.target_path(&req, Path::new("/w/mirror")),
            PathBuf::from("/w/mirror/Song - Band.m4a")
        );
    }

    #[tokio::test]
    async fn test_download_streams_body() {
        let base = serve_mirror().await;
        let tmp = tempfile::tempdir().unwrap();
        let backend = HttpBackend::new("mirror", &format!("{}/tracks/{{id}}", base), "flac", reqwest::Client::new());

        let path = backend.download(&request(), tmp.path()).await.unwrap();
        assert_eq!(path, tmp.path().join("Song - Band.flac"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fLaC-bytes");
    }

    #[tokio::test]
    async fn test_download_http_error() {
        let base = serve_mirror().await;
        let tmp = tempfile::tempdir().unwrap();
        let backend = HttpBackend::new("mirror", &format!("{}/tracks/unknown", base), "flac", reqwest::Client::new());

        let err = backend.download(&request(), tmp.path()).await.unwrap_err();
        assert_eq!(err, DownloadError::Http(404, "no such track".to_string()));
        assert!(!tmp.path().join("Song - Band.flac").exists());
    }
}
