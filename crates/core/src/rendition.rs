//! The fixed adaptive-bitrate ladder and the HLS master playlist built from it.

use serde::Serialize;
use std::fmt::Write as _;

/// File name of the master playlist at the output root.
pub const MASTER_MANIFEST_NAME: &str = "master.m3u8";

/// File name of each tier's media playlist.
pub const INDEX_MANIFEST_NAME: &str = "index.m3u8";

/// ffmpeg segment filename template inside a tier directory.
pub const SEGMENT_PATTERN: &str = "seg_%03d.ts";

/// One fixed-resolution, fixed-bitrate encoded variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rendition {
    /// Directory name and label, e.g. `720p`.
    pub tier: &'static str,
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
    pub max_bitrate_kbps: u32,
    pub buffer_kbps: u32,
    pub segment_secs: u32,
}

/// Encode order. Passes run sequentially in this order.
pub const LADDER: [Rendition; 3] = [
    Rendition {
        tier: "1080p",
        width: 1920,
        height: 1080,
        bitrate_kbps: 5000,
        max_bitrate_kbps: 5000,
        buffer_kbps: 10000,
        segment_secs: 15,
    },
    Rendition {
        tier: "720p",
        width: 1280,
        height: 720,
        bitrate_kbps: 2800,
        max_bitrate_kbps: 2800,
        buffer_kbps: 6000,
        segment_secs: 15,
    },
    Rendition {
        tier: "480p",
        width: 854,
        height: 480,
        bitrate_kbps: 1400,
        max_bitrate_kbps: 1400,
        buffer_kbps: 3000,
        segment_secs: 20,
    },
];

impl Rendition {
    /// Declared `BANDWIDTH` in bits per second.
    pub fn bandwidth_bps(&self) -> u64 {
        u64::from(self.bitrate_kbps) * 1000
    }

    /// `RESOLUTION` attribute value.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Path of the tier's media playlist relative to the master playlist.
    pub fn index_uri(&self) -> String {
        format!("{}/{}", self.tier, INDEX_MANIFEST_NAME)
    }
}

/// Renders the master playlist, highest bandwidth first.
pub fn render_master_manifest(renditions: &[Rendition]) -> String {
    let mut sorted: Vec<&Rendition> = renditions.iter().collect();
    sorted.sort_by(|a, b| b.bandwidth_bps().cmp(&a.bandwidth_bps()));

    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for rendition in sorted {
        // Infallible for String.
        let _ = writeln!(
            out,
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}\n{}",
            rendition.bandwidth_bps(),
            rendition.resolution(),
            rendition.index_uri()
        );
    }
    out
}

/// A variant line pair read back from a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterEntry {
    pub bandwidth: u64,
    pub resolution: String,
    pub uri: String,
}

/// Parses `#EXT-X-STREAM-INF` entries in file order.
///
/// Unknown tags are skipped. An entry without a `BANDWIDTH` attribute is
/// dropped.
pub fn parse_master_manifest(text: &str) -> Vec<MasterEntry> {
    let mut entries = Vec::new();
    let mut pending: Option<(Option<u64>, String)> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(attrs) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            let mut bandwidth = None;
            let mut resolution = String::new();
            for attr in attrs.split(',') {
                match attr.split_once('=') {
                    Some(("BANDWIDTH", v)) => bandwidth = v.parse().ok(),
                    Some(("RESOLUTION", v)) => resolution = v.to_string(),
                    _ => {}
                }
            }
            pending = Some((bandwidth, resolution));
        } else if !line.starts_with('#') {
            if let Some((Some(bandwidth), resolution)) = pending.take() {
                entries.push(MasterEntry {
                    bandwidth,
                    resolution,
                    uri: line.to_string(),
                });
            }
        }
    }

    entries
}
