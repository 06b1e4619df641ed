// Provider backends and the registry that maps service names to them

pub mod command;
pub mod http;

pub use command::CommandBackend;
pub use http::HttpBackend;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::errors::DownloadError;
use super::orchestrator::Downloader;
use super::traits::TrackProvider;
use super::utils::is_valid_provider_name;

/// How a configured service is backed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    /// External tool, see [`CommandBackend`]
    Command { program: String },
    /// HTTP mirror, see [`HttpBackend`]
    Http { url_template: String, extension: String },
}

/// `name=cmd:<program>`, `name=http:<url template>` or
/// `name=http-<ext>:<url template>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    pub name: String,
    pub kind: ProviderKind,
}

impl FromStr for ProviderSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, rest) = s
            .trim()
            .split_once('=')
            .ok_or_else(|| format!("invalid provider spec {:?}: expected name=kind:target", s))?;
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(format!("invalid provider spec {:?}: empty name", s));
        }
        if !is_valid_provider_name(&name) {
            return Err(format!(
                "invalid provider spec {:?}: name may only contain a-z, 0-9, '_' and '-'",
                s
            ));
        }

        let (kind, target) = rest
            .split_once(':')
            .ok_or_else(|| format!("invalid provider spec {:?}: expected kind:target", s))?;
        let target = target.trim();
        if target.is_empty() {
            return Err(format!("invalid provider spec {:?}: empty target", s));
        }

        let kind = match kind.trim() {
            "cmd" => ProviderKind::Command {
                program: target.to_string(),
            },
            "http" => ProviderKind::Http {
                url_template: target.to_string(),
                extension: "flac".to_string(),
            },
            other => match other.strip_prefix("http-") {
                Some(ext) if !ext.is_empty() => ProviderKind::Http {
                    url_template: target.to_string(),
                    extension: ext.to_string(),
                },
                _ => return Err(format!("unknown provider kind {:?} in {:?}", other, s)),
            },
        };

        Ok(Self { name, kind })
    }
}

impl fmt::Display for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ProviderKind::Command { program } => write!(f, "{}=cmd:{}", self.name, program),
            ProviderKind::Http { url_template, extension } if extension == "flac" => {
                write!(f, "{}=http:{}", self.name, url_template)
            }
            ProviderKind::Http { url_template, extension } => {
                write!(f, "{}=http-{}:{}", self.name, extension, url_template)
            }
        }
    }
}

/// Named providers available to requests
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn TrackProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: &[ProviderSpec], client: &reqwest::Client) -> Result<Self, DownloadError> {
        let mut registry = Self::new();
        for spec in specs {
            let provider: Arc<dyn TrackProvider> = match &spec.kind {
                ProviderKind::Command { program } => Arc::new(CommandBackend::new(&spec.name, program)),
                ProviderKind::Http { url_template, extension } => Arc::new(HttpBackend::new(
                    &spec.name,
                    url_template,
                    extension,
                    client.clone(),
                )),
            };
            registry.register(provider)?;
        }
        Ok(registry)
    }

    /// Later registrations under the same name replace earlier ones.
    /// Names that are not a plain lower-case path component are refused.
    pub fn register(&mut self, provider: Arc<dyn TrackProvider>) -> Result<(), DownloadError> {
        let name = provider.name();
        if !is_valid_provider_name(name) {
            return Err(DownloadError::InvalidInput(format!("invalid provider name {:?}", name)));
        }
        self.providers.insert(name.to_string(), provider);
        Ok(())
    }

    pub fn names(&self) -> HashSet<String> {
        self.providers.keys().cloned().collect()
    }

    /// Downloader trying the named providers in exactly this order.
    /// Unknown names are skipped.
    pub fn downloader_for(&self, order: &[String], provider_timeout: Option<Duration>) -> Downloader {
        let mut downloader = Downloader::new().with_provider_timeout(provider_timeout);
        for name in order {
            if let Some(provider) = self.providers.get(name) {
                downloader.add_backend(provider.clone());
            }
        }
        downloader
    }
}
