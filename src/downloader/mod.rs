// Downloader module: provider fallback, token store and the acquisition flow

pub mod backends;
pub mod errors;
pub mod metadata;
pub mod models;
pub mod orchestrator;
pub mod service;
pub mod store;
pub mod token;
pub mod traits;
pub mod utils;

pub use backends::{ProviderRegistry, ProviderSpec};
pub use errors::{AllProvidersFailed, DownloadError};
pub use metadata::HttpMetadataSource;
pub use models::{Attempt, TrackMetadata, TrackRequest};
pub use orchestrator::{Downloader, Resolution};
pub use service::{AcquireError, Acquired, TrackService};
pub use store::{spawn_sweep_task, DownloadEntry, DownloadStore};
pub use traits::{MetadataSource, TrackProvider};
