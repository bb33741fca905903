//! Encoder module for rendering HLS renditions and still frames.
//!
//! The [`Encoder`] and [`Prober`] traits are the only way the stages touch the
//! media toolchain. [`FfmpegEncoder`] implements both by driving `ffmpeg` and
//! `ffprobe` as child processes, with either the NVENC or the software video
//! pipeline selected by [`EncoderBackend`].
//!
//! # Example
//!
//! ```ignore
//! use mediahub_core::encoder::{EncoderConfig, FfmpegEncoder, Prober};
//!
//! let encoder = FfmpegEncoder::new(EncoderConfig::default());
//! encoder.validate().await?;
//!
//! let probe = encoder.probe(Path::new("/srv/uploads/clip.mp4")).await?;
//! println!("{} seconds of {}", probe.duration_secs, probe.display_format());
//! ```

mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use config::{EncoderBackend, EncoderConfig};
pub use error::EncoderError;
pub use ffmpeg::FfmpegEncoder;
pub use traits::{Encoder, Prober};
pub use types::{FrameJob, FrameOutput, MediaProbe, RenditionJob, RenditionOutput};
