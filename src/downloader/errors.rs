// Error types for providers, the token store and the acquisition flow

use std::fmt;

use super::models::Attempt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    /// Provider did not answer in time
    NetworkTimeout,

    /// Provider tool binary could not be started
    ToolNotFound(String),

    /// Caller supplied an unusable identifier or service list
    InvalidInput(String),

    /// Failed to parse provider or metadata output
    ParseError(String),

    /// Provider process ran but reported failure
    ExecutionError(String),

    /// Upstream HTTP endpoint answered with a non-success status
    Http(u16, String),

    /// Local filesystem failure
    Io(String),

    /// Provider reported success but produced nothing usable
    EmptyArtifact(String),

    /// Entropy source failed while minting a token
    TokenGeneration(String),

    /// Freshly minted token already present in the store
    TokenCollision,

    /// Unknown error with details
    Unknown(String),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkTimeout => write!(f, "network timeout: provider is not responding"),
            Self::ToolNotFound(tool) => write!(f, "tool not found: {}", tool),
            Self::InvalidInput(msg) => write!(f, "{}", msg),
            Self::ParseError(msg) => write!(f, "parse error: {}", msg),
            Self::ExecutionError(msg) => write!(f, "execution error: {}", msg),
            Self::Http(status, msg) => write!(f, "HTTP {}: {}", status, msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
            Self::EmptyArtifact(msg) => write!(f, "{}", msg),
            Self::TokenGeneration(msg) => write!(f, "token generation failed: {}", msg),
            Self::TokenCollision => write!(f, "generated token collides with a live entry"),
            Self::Unknown(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for DownloadError {}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

// Providers mostly fail with free-form text (tool stderr, upstream bodies)
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::NetworkTimeout;
        }

        if lower.contains("command not found") || lower.contains("no such file") {
            return Self::ToolNotFound(s);
        }

        if lower.contains("parse") || lower.contains("json") {
            return Self::ParseError(s);
        }

        Self::Unknown(s)
    }
}

/// Every provider was tried and none produced a usable file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllProvidersFailed {
    pub providers: Vec<String>,
    pub attempts: Vec<Attempt>,
}

impl fmt::Display for AllProvidersFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.providers.is_empty() {
            write!(f, "no providers to try")
        } else {
            write!(f, "failed in all services: {}", self.providers.join(" -> "))
        }
    }
}

impl std::error::Error for AllProvidersFailed {}
