//! Capability traits for encode and probe backends.

use async_trait::async_trait;
use std::path::Path;

use super::error::EncoderError;
use super::types::{FrameJob, FrameOutput, MediaProbe, RenditionJob, RenditionOutput};

/// Renders renditions and still frames.
///
/// Implementations are interchangeable: the transcode pipeline only relies on
/// a completed pass leaving `index.m3u8` plus segments in the job's output dir.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Returns the name of this encoder implementation.
    fn name(&self) -> &str;

    /// Encodes one rendition tier into HLS segments and an index manifest.
    async fn encode_rendition(&self, job: RenditionJob) -> Result<RenditionOutput, EncoderError>;

    /// Captures a single JPEG frame.
    async fn capture_frame(&self, job: FrameJob) -> Result<FrameOutput, EncoderError>;

    /// Validates that the encoder is properly configured and ready.
    async fn validate(&self) -> Result<(), EncoderError>;
}

/// Read-only container inspection.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaProbe, EncoderError>;
}
