use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Component, Path, PathBuf};

use crate::document::DocumentConfig;
use crate::encoder::{EncoderBackend, EncoderConfig};
use crate::retry::RetryConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub document: DocumentConfig,
    #[serde(default)]
    pub stages: StageConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub registry: RegistryClientConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("mediahub.db")
}

/// Where uploads live and where derived artifacts are written.
///
/// Asset records store paths relative to these roots (`uploads/abc`,
/// `thumbnails/7_thumb.jpg`, `streams/7/master.m3u8`).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_uploads_root")]
    pub uploads_root: PathBuf,
    #[serde(default = "default_thumbnails_root")]
    pub thumbnails_root: PathBuf,
    #[serde(default = "default_streams_root")]
    pub streams_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_root: default_uploads_root(),
            thumbnails_root: default_thumbnails_root(),
            streams_root: default_streams_root(),
        }
    }
}

fn default_uploads_root() -> PathBuf {
    PathBuf::from("upload/uploads")
}

fn default_thumbnails_root() -> PathBuf {
    PathBuf::from("upload/thumbnails")
}

fn default_streams_root() -> PathBuf {
    PathBuf::from("upload/streams")
}

/// Prefix the ingestion gateway puts in front of stored upload paths.
pub const UPLOADS_PREFIX: &str = "uploads/";

/// Prefix of thumbnail paths as recorded on the asset.
pub const THUMBNAILS_PREFIX: &str = "thumbnails/";

/// Prefix of stream paths as recorded on the asset.
pub const STREAMS_PREFIX: &str = "streams/";

impl StorageConfig {
    /// Creates a storage layout with all three areas under one directory.
    pub fn under(root: &Path) -> Self {
        Self {
            uploads_root: root.join("uploads"),
            thumbnails_root: root.join("thumbnails"),
            streams_root: root.join("streams"),
        }
    }

    /// Resolves a stored upload path (`uploads/abc` or `abc`) to a file on disk.
    ///
    /// Returns `None` when the path would leave the uploads root.
    pub fn resolve_upload(&self, stored_path: &str) -> Option<PathBuf> {
        let trimmed = stored_path.trim_start_matches('/');
        let relative = Path::new(trimmed.strip_prefix(UPLOADS_PREFIX).unwrap_or(trimmed));
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        contained.then(|| self.uploads_root.join(relative))
    }
}

/// Per-invocation timeouts for the derivation stages.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StageConfig {
    #[serde(default = "default_thumbnail_timeout")]
    pub thumbnail_timeout_secs: u64,
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_secs: u64,
    /// Budget for the whole three-pass sequence, on top of per-pass timeouts.
    #[serde(default = "default_transcode_timeout")]
    pub transcode_timeout_secs: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            thumbnail_timeout_secs: default_thumbnail_timeout(),
            metadata_timeout_secs: default_metadata_timeout(),
            transcode_timeout_secs: default_transcode_timeout(),
        }
    }
}

fn default_thumbnail_timeout() -> u64 {
    120
}

fn default_metadata_timeout() -> u64 {
    60
}

fn default_transcode_timeout() -> u64 {
    4 * 3600
}

/// How the dispatcher reaches the stages.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Stages run in this process.
    #[default]
    Local,
    /// Stages are separate services reached over HTTP.
    Remote,
}

/// Fan-out dispatcher configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatcherConfig {
    #[serde(default)]
    pub mode: DispatchMode,
    /// Thumbnail service endpoint (remote mode).
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    /// Metadata service endpoint (remote mode).
    #[serde(default)]
    pub metadata_url: Option<String>,
    /// Transcoder service endpoint (remote mode).
    #[serde(default)]
    pub transcode_url: Option<String>,
    /// Request timeout for remote stage calls in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::default(),
            thumbnail_url: None,
            metadata_url: None,
            transcode_url: None,
            request_timeout_secs: default_request_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

/// Where transcode status updates are delivered.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryClientConfig {
    /// Remote `update-stream-status` endpoint. When unset, updates are applied
    /// to the local registry.
    #[serde(default)]
    pub update_url: Option<String>,
    /// Request timeout for remote status updates in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Capacity of the status outbox queue.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for RegistryClientConfig {
    fn default() -> Self {
        Self {
            update_url: None,
            request_timeout_secs: default_request_timeout(),
            outbox_capacity: default_outbox_capacity(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_outbox_capacity() -> usize {
    1000
}

/// Sanitized config for API responses
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub encoder: SanitizedEncoderConfig,
    pub stages: StageConfig,
    pub dispatch_mode: DispatchMode,
    pub remote_registry: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedEncoderConfig {
    pub backend: EncoderBackend,
    pub preset: String,
    pub pass_timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            storage: config.storage.clone(),
            encoder: SanitizedEncoderConfig {
                backend: config.encoder.backend,
                preset: config.encoder.preset.clone(),
                pass_timeout_secs: config.encoder.pass_timeout_secs,
            },
            stages: config.stages.clone(),
            dispatch_mode: config.dispatcher.mode,
            remote_registry: config.registry.update_url.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "mediahub.db");
        assert_eq!(config.dispatcher.mode, DispatchMode::Local);
        assert!(config.registry.update_url.is_none());
    }

    #[test]
    fn test_default_matches_empty_file() {
        let config = Config::default();
        assert_eq!(config.dispatcher.request_timeout_secs, 30);
        assert_eq!(config.registry.outbox_capacity, 1000);
        assert_eq!(config.registry.retry, RetryConfig::default());
    }

    #[test]
    fn test_deserialize_storage_and_stages() {
        let toml = r#"
[storage]
uploads_root = "/srv/media/uploads"
streams_root = "/srv/media/streams"

[stages]
transcode_timeout_secs = 600
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.uploads_root, PathBuf::from("/srv/media/uploads"));
        assert_eq!(config.storage.streams_root, PathBuf::from("/srv/media/streams"));
        assert_eq!(config.storage.thumbnails_root, PathBuf::from("upload/thumbnails"));
        assert_eq!(config.stages.transcode_timeout_secs, 600);
        assert_eq!(config.stages.thumbnail_timeout_secs, 120);
    }

    #[test]
    fn test_deserialize_remote_dispatcher() {
        let toml = r#"
[dispatcher]
mode = "remote"
thumbnail_url = "http://thumbs:4003/thumbnail"
metadata_url = "http://meta:4004/process"
transcode_url = "http://transcoder:4005/transcode"

[dispatcher.retry]
max_attempts = 2
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.dispatcher.mode, DispatchMode::Remote);
        assert_eq!(
            config.dispatcher.transcode_url.as_deref(),
            Some("http://transcoder:4005/transcode")
        );
        assert_eq!(config.dispatcher.retry.max_attempts, 2);
        assert_eq!(config.dispatcher.retry.initial_delay_ms, 500);
    }

    #[test]
    fn test_resolve_upload_strips_prefix() {
        let storage = StorageConfig::under(Path::new("/data"));
        assert_eq!(
            storage.resolve_upload("uploads/3f2a"),
            Some(PathBuf::from("/data/uploads/3f2a"))
        );
        assert_eq!(
            storage.resolve_upload("3f2a"),
            Some(PathBuf::from("/data/uploads/3f2a"))
        );
    }

    #[test]
    fn test_resolve_upload_rejects_parent_components() {
        let storage = StorageConfig::under(Path::new("/data"));
        assert_eq!(storage.resolve_upload("uploads/../../etc/passwd"), None);
        assert_eq!(storage.resolve_upload("../streams/7/master.m3u8"), None);
        assert_eq!(storage.resolve_upload("/uploads/a/../b"), None);
        assert_eq!(
            storage.resolve_upload("uploads/./nested/clip.mp4"),
            Some(PathBuf::from("/data/uploads/nested/clip.mp4"))
        );
    }

    #[test]
    fn test_sanitized_config() {
        let mut config = Config::default();
        config.registry.update_url = Some("http://media:4002/update-stream-status".to_string());
        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.server.port, 8080);
        assert!(sanitized.remote_registry);
        assert_eq!(sanitized.encoder.backend, EncoderBackend::Software);
    }
}
