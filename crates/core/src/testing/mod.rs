//! Testing utilities and mock implementations.
//!
//! Mocks stand in for the media toolchain and the remote registry so stages,
//! the transcode pipeline and the HTTP surface can be exercised without
//! ffmpeg, poppler or a second service.
//!
//! # Example
//!
//! ```rust,ignore
//! use mediahub_core::testing::{MockEncoder, MockDocumentInspector};
//!
//! let encoder = MockEncoder::new();
//! encoder.fail_tier("720p");
//!
//! // run a transcode...
//! assert_eq!(encoder.encoded_tiers(), vec!["1080p", "720p"]);
//! ```

mod mock_document;
mod mock_encoder;
mod mock_status_sink;

pub use mock_document::MockDocumentInspector;
pub use mock_encoder::MockEncoder;
pub use mock_status_sink::{FlakyStatusSink, RecordingStatusSink};

use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};

/// Writes a PNG of the given size, creating parent directories.
pub fn write_png(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture dir");
    }
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    img.save_with_format(path, ImageFormat::Png)
        .expect("write fixture png");
}

/// Writes an opaque source file, creating parent directories.
pub fn write_source(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture dir");
    }
    std::fs::write(path, b"\x00\x00\x00\x18ftypmp42").expect("write fixture source");
}
