//! Inputs and outputs of encoder operations.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::asset::AssetId;
use crate::rendition::Rendition;

/// One rendition pass of the ladder.
#[derive(Debug, Clone)]
pub struct RenditionJob {
    pub asset_id: AssetId,
    pub input_path: PathBuf,
    /// Tier directory; receives `index.m3u8` and the segments.
    pub output_dir: PathBuf,
    pub rendition: Rendition,
    /// Cancelled when the transcode is aborted; the encode child is killed.
    pub cancel: CancellationToken,
}

/// Result of a successful rendition pass.
#[derive(Debug, Clone, Serialize)]
pub struct RenditionOutput {
    pub tier: &'static str,
    pub index_path: PathBuf,
    pub segment_count: usize,
    pub duration_ms: u64,
}

/// Single still frame extracted from a video.
#[derive(Debug, Clone)]
pub struct FrameJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Offset into the stream.
    pub timestamp_secs: f64,
    /// Width cap; height follows the source aspect ratio.
    pub max_width: u32,
}

impl FrameJob {
    pub const DEFAULT_TIMESTAMP_SECS: f64 = 3.0;
    pub const DEFAULT_MAX_WIDTH: u32 = 300;

    pub fn new(input_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            input_path,
            output_path,
            timestamp_secs: Self::DEFAULT_TIMESTAMP_SECS,
            max_width: Self::DEFAULT_MAX_WIDTH,
        }
    }
}

/// Dimensions of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameOutput {
    pub width: u32,
    pub height: u32,
}

/// Container-level probe of an audio or video file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaProbe {
    pub duration_secs: f64,
    pub size_bytes: u64,
    /// Overall bitrate in bits per second.
    pub bit_rate: Option<u64>,
    /// Short format name, e.g. `mov,mp4,m4a,3gp,3g2,mj2`.
    pub format_name: String,
    /// Human-readable format name, e.g. `QuickTime / MOV`.
    pub format_long_name: Option<String>,
}

impl MediaProbe {
    /// The name reported in metadata documents.
    pub fn display_format(&self) -> &str {
        self.format_long_name
            .as_deref()
            .unwrap_or(self.format_name.as_str())
    }
}
