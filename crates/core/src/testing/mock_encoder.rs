//! Mock encoder and prober for testing.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::encoder::{
    Encoder, EncoderError, FrameJob, FrameOutput, MediaProbe, Prober, RenditionJob,
    RenditionOutput,
};
use crate::rendition::INDEX_MANIFEST_NAME;

/// Source dimensions assumed for captured frames.
const SOURCE_WIDTH: u32 = 1920;
const SOURCE_HEIGHT: u32 = 1080;

#[derive(Debug)]
struct State {
    failing_tiers: HashSet<String>,
    pass_delay: Duration,
    encoded: Vec<&'static str>,
    frames: Vec<FrameJob>,
    probe: MediaProbe,
    probe_fails: bool,
}

/// Mock implementation of [`Encoder`] and [`Prober`].
///
/// Rendition passes write a minimal `index.m3u8` and one segment so the
/// transcode pipeline sees real output. Clones share state, so a test can
/// keep a handle after passing one to a stage.
///
/// - `fail_tier` makes the pass for that tier fail
/// - `set_pass_delay` slows each pass down; cancellation is honored while waiting
/// - `captured_frames` / `encoded_tiers` record what was asked
#[derive(Debug, Clone)]
pub struct MockEncoder {
    state: Arc<Mutex<State>>,
}

impl Default for MockEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEncoder {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                failing_tiers: HashSet::new(),
                pass_delay: Duration::ZERO,
                encoded: Vec::new(),
                frames: Vec::new(),
                probe: MediaProbe {
                    duration_secs: 12.5,
                    size_bytes: 4_200_000,
                    bit_rate: Some(2_688_000),
                    format_name: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
                    format_long_name: Some("QuickTime / MOV".to_string()),
                },
                probe_fails: false,
            })),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes every pass for `tier` fail.
    pub fn fail_tier(&self, tier: &str) {
        self.state().failing_tiers.insert(tier.to_string());
    }

    pub fn clear_failures(&self) {
        self.state().failing_tiers.clear();
    }

    pub fn set_pass_delay(&self, delay: Duration) {
        self.state().pass_delay = delay;
    }

    pub fn set_probe(&self, probe: MediaProbe) {
        self.state().probe = probe;
    }

    pub fn fail_probe(&self, fail: bool) {
        self.state().probe_fails = fail;
    }

    /// Tiers whose pass was started, in order.
    pub fn encoded_tiers(&self) -> Vec<&'static str> {
        self.state().encoded.clone()
    }

    pub fn captured_frames(&self) -> Vec<FrameJob> {
        self.state().frames.clone()
    }
}

fn scaled(max_width: u32) -> (u32, u32) {
    if SOURCE_WIDTH <= max_width {
        return (SOURCE_WIDTH, SOURCE_HEIGHT);
    }
    let height = (f64::from(SOURCE_HEIGHT) * f64::from(max_width) / f64::from(SOURCE_WIDTH))
        .round() as u32;
    (max_width, height.max(1))
}

#[async_trait]
impl Encoder for MockEncoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn encode_rendition(&self, job: RenditionJob) -> Result<RenditionOutput, EncoderError> {
        let tier = job.rendition.tier;
        let (delay, fails) = {
            let mut state = self.state();
            state.encoded.push(tier);
            (state.pass_delay, state.failing_tiers.contains(tier))
        };

        if !job.input_path.exists() {
            return Err(EncoderError::InputNotFound {
                path: job.input_path,
            });
        }

        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = job.cancel.cancelled() => return Err(EncoderError::Cancelled),
            }
        }
        if job.cancel.is_cancelled() {
            return Err(EncoderError::Cancelled);
        }

        if fails {
            return Err(EncoderError::encode_failed(
                format!("{} encode exited with status 1", tier),
                Some("Conversion failed!".to_string()),
            ));
        }

        tokio::fs::create_dir_all(&job.output_dir).await?;
        let index_path = job.output_dir.join(INDEX_MANIFEST_NAME);
        let index = format!(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:{secs}\n#EXT-X-MEDIA-SEQUENCE:0\n#EXTINF:{secs}.000000,\nseg_000.ts\n#EXT-X-ENDLIST\n",
            secs = job.rendition.segment_secs
        );
        tokio::fs::write(&index_path, index).await?;
        tokio::fs::write(job.output_dir.join("seg_000.ts"), [0x47u8; 188]).await?;

        Ok(RenditionOutput {
            tier,
            index_path,
            segment_count: 1,
            duration_ms: delay.as_millis() as u64,
        })
    }

    async fn capture_frame(&self, job: FrameJob) -> Result<FrameOutput, EncoderError> {
        self.state().frames.push(job.clone());

        if !job.input_path.exists() {
            return Err(EncoderError::InputNotFound {
                path: job.input_path,
            });
        }

        let (width, height) = scaled(job.max_width);
        if let Some(parent) = job.output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(&job.output_path)?;
        RgbImage::new(width, height)
            .write_with_encoder(JpegEncoder::new_with_quality(file, 80))
            .map_err(|e| EncoderError::encode_failed(e.to_string(), None))?;

        Ok(FrameOutput { width, height })
    }

    async fn validate(&self) -> Result<(), EncoderError> {
        Ok(())
    }
}

#[async_trait]
impl Prober for MockEncoder {
    async fn probe(&self, path: &Path) -> Result<MediaProbe, EncoderError> {
        let state = self.state();
        if state.probe_fails {
            return Err(EncoderError::probe_failed(format!(
                "{}: Invalid data found when processing input",
                path.display()
            )));
        }
        Ok(state.probe.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendition::LADDER;
    use tokio_util::sync::CancellationToken;

    fn job(dir: &Path, source: &Path, tier: usize) -> RenditionJob {
        RenditionJob {
            asset_id: 1,
            input_path: source.to_path_buf(),
            output_dir: dir.join(LADDER[tier].tier),
            rendition: LADDER[tier],
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_pass_writes_index_and_segment() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src");
        crate::testing::write_source(&source);

        let encoder = MockEncoder::new();
        let output = encoder
            .encode_rendition(job(dir.path(), &source, 0))
            .await
            .unwrap();

        assert_eq!(output.tier, "1080p");
        assert!(output.index_path.exists());
        assert!(dir.path().join("1080p/seg_000.ts").exists());
        assert_eq!(encoder.encoded_tiers(), vec!["1080p"]);
    }

    #[tokio::test]
    async fn test_failing_tier() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src");
        crate::testing::write_source(&source);

        let encoder = MockEncoder::new();
        encoder.fail_tier("720p");
        let result = encoder.encode_rendition(job(dir.path(), &source, 1)).await;
        assert!(matches!(result, Err(EncoderError::EncodeFailed { .. })));
        assert!(!dir.path().join("720p").exists());
    }

    #[test]
    fn test_frame_scaling() {
        assert_eq!(scaled(300), (300, 169));
        assert_eq!(scaled(4000), (1920, 1080));
    }
}
