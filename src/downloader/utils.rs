// Helper functions shared by the acquisition flow and provider implementations

use regex::Regex;
use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use super::errors::DownloadError;

lazy_static::lazy_static! {
    static ref TRACK_URL_RE: Regex = Regex::new(
        r"(?i)(?:spotify:track:|https?://open\.spotify\.com/(?:intl-[^/]+/)?track/)([A-Za-z0-9]{22})"
    ).unwrap();
    static ref TRACK_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9]{22}$").unwrap();
    static ref PROVIDER_NAME_RE: Regex = Regex::new(r"^[a-z0-9_-]+$").unwrap();
}

/// Provider names double as directory names inside a work dir, so they must
/// be a single plain path component.
pub fn is_valid_provider_name(name: &str) -> bool {
    PROVIDER_NAME_RE.is_match(name)
}

/// Extract the 22-character track ID from a bare ID, a `spotify:track:` URI
/// or an open.spotify.com track URL.
pub fn extract_track_id(input: &str) -> Result<String, DownloadError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DownloadError::InvalidInput("track URL is empty".to_string()));
    }

    if TRACK_ID_RE.is_match(input) {
        return Ok(input.to_string());
    }

    TRACK_URL_RE
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| DownloadError::InvalidInput("invalid Spotify track URL or ID".to_string()))
}

/// Lower-case, drop unknown and repeated names, keep the caller's order.
/// An empty request falls back to `defaults`.
pub fn normalize_service_order(
    requested: &[String],
    known: &HashSet<String>,
    defaults: &[String],
) -> Vec<String> {
    let source = if requested.is_empty() { defaults } else { requested };

    let mut seen = HashSet::new();
    source
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| known.contains(s))
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Providers may flag an already-present file with this prefix
pub fn strip_exists_prefix(path: &str) -> &str {
    path.strip_prefix("EXISTS:").unwrap_or(path)
}

/// Make a string safe to use as a single path component
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = cleaned.trim().trim_matches('.').trim();
    if trimmed.is_empty() {
        "track".to_string()
    } else {
        trimmed.chars().take(180).collect()
    }
}

/// Run a command to completion, capturing stdout and stderr.
///
/// The child is killed if `limit` elapses or if the returned future is
/// dropped.
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    limit: Option<Duration>,
) -> Result<std::process::Output, DownloadError> {
    let mut child = TokioCommand::new(program)
        .args(args)
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DownloadError::ToolNotFound(format!("{}: {}", program, e)))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| DownloadError::ExecutionError(format!("failed to capture stdout from {}", program)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| DownloadError::ExecutionError(format!("failed to capture stderr from {}", program)))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let status = match limit {
        Some(limit) => match timeout(limit, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(DownloadError::NetworkTimeout);
            }
        },
        None => child.wait().await?,
    };

    let stdout = stdout_task
        .await
        .map_err(|e| DownloadError::ExecutionError(format!("stdout task failed: {}", e)))??;
    let stderr = stderr_task
        .await
        .map_err(|e| DownloadError::ExecutionError(format!("stderr task failed: {}", e)))??;

    Ok(std::process::Output { status, stdout, stderr })
}
