//! Configuration for the encoder module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which ffmpeg video pipeline renders the renditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderBackend {
    /// CUDA decode, `scale_cuda` and `h264_nvenc`.
    Nvenc,
    /// CPU `scale` and `libx264`.
    #[default]
    Software,
}

impl EncoderBackend {
    pub fn video_codec(&self) -> &'static str {
        match self {
            Self::Nvenc => "h264_nvenc",
            Self::Software => "libx264",
        }
    }
}

/// Configuration for the FFmpeg-based encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(default)]
    pub backend: EncoderBackend,

    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Encoder preset passed through `-preset`.
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Timeout for a single rendition pass in seconds.
    #[serde(default = "default_pass_timeout")]
    pub pass_timeout_secs: u64,

    /// Timeout for ffprobe and frame capture in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Additional global ffmpeg arguments.
    #[serde(default)]
    pub extra_ffmpeg_args: Vec<String>,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_preset() -> String {
    "fast".to_string()
}

fn default_pass_timeout() -> u64 {
    3600
}

fn default_probe_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "warning".to_string()
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            backend: EncoderBackend::default(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            preset: default_preset(),
            pass_timeout_secs: default_pass_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            log_level: default_log_level(),
            extra_ffmpeg_args: Vec::new(),
        }
    }
}

impl EncoderConfig {
    /// Creates a new config with custom ffmpeg/ffprobe paths.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            ..Default::default()
        }
    }

    pub fn with_backend(mut self, backend: EncoderBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the per-pass timeout in seconds.
    pub fn with_pass_timeout(mut self, pass_timeout_secs: u64) -> Self {
        self.pass_timeout_secs = pass_timeout_secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EncoderConfig::default();
        assert_eq!(config.backend, EncoderBackend::Software);
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.preset, "fast");
        assert_eq!(config.pass_timeout_secs, 3600);
    }

    #[test]
    fn test_config_builder() {
        let config = EncoderConfig::with_paths(
            PathBuf::from("/opt/ffmpeg/bin/ffmpeg"),
            PathBuf::from("/opt/ffmpeg/bin/ffprobe"),
        )
        .with_backend(EncoderBackend::Nvenc)
        .with_pass_timeout(60);

        assert_eq!(config.ffprobe_path, PathBuf::from("/opt/ffmpeg/bin/ffprobe"));
        assert_eq!(config.backend.video_codec(), "h264_nvenc");
        assert_eq!(config.pass_timeout_secs, 60);
    }
}
