//! The three-pass rendition sequence.
//!
//! [`PassSequence::run`] executes passes strictly in ladder order and stops at
//! the first failure. Only a fully successful run yields a [`CompletedLadder`],
//! and a `CompletedLadder` is the only thing that can write a master playlist.

use std::future::Future;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::encoder::{EncoderError, RenditionOutput};
use crate::rendition::{render_master_manifest, Rendition, LADDER, MASTER_MANIFEST_NAME};

/// Result of one pass.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PassOutcome {
    Completed { output: RenditionOutput },
    Failed { reason: String },
    /// Not attempted because an earlier pass failed.
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct PassReport {
    pub rendition: Rendition,
    pub outcome: PassOutcome,
}

/// Proof that every rendition of the ladder was encoded.
#[derive(Debug)]
pub struct CompletedLadder {
    reports: Vec<PassReport>,
}

impl CompletedLadder {
    pub fn reports(&self) -> &[PassReport] {
        &self.reports
    }

    /// Writes `master.m3u8` under `output_root`.
    ///
    /// The playlist is written to a temporary name and renamed into place, so
    /// readers see either no master or a complete one.
    pub async fn write_master(&self, output_root: &Path) -> std::io::Result<PathBuf> {
        let renditions: Vec<Rendition> = self.reports.iter().map(|r| r.rendition).collect();
        let manifest = render_master_manifest(&renditions);

        let final_path = output_root.join(MASTER_MANIFEST_NAME);
        let tmp_path = output_root.join(format!(".{}.tmp", MASTER_MANIFEST_NAME));
        tokio::fs::write(&tmp_path, manifest).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(final_path)
    }
}

/// A sequence that stopped early.
#[derive(Debug)]
pub struct AbortedLadder {
    pub failed_tier: &'static str,
    pub error: EncoderError,
    pub reports: Vec<PassReport>,
}

#[derive(Debug)]
pub enum SequenceResult {
    Complete(CompletedLadder),
    Aborted(AbortedLadder),
}

/// Ordered renditions encoded one after another.
#[derive(Debug, Clone)]
pub struct PassSequence {
    renditions: Vec<Rendition>,
}

impl Default for PassSequence {
    fn default() -> Self {
        Self::ladder()
    }
}

impl PassSequence {
    /// The standard 1080p, 720p, 480p ladder.
    pub fn ladder() -> Self {
        Self {
            renditions: LADDER.to_vec(),
        }
    }

    pub fn renditions(&self) -> &[Rendition] {
        &self.renditions
    }

    /// Runs `encode` for each rendition in order.
    ///
    /// The token is checked before each pass; a cancelled sequence fails the
    /// next pass with [`EncoderError::Cancelled`] without invoking `encode`.
    pub async fn run<F, Fut>(&self, cancel: &CancellationToken, mut encode: F) -> SequenceResult
    where
        F: FnMut(Rendition) -> Fut,
        Fut: Future<Output = Result<RenditionOutput, EncoderError>>,
    {
        let mut reports = Vec::with_capacity(self.renditions.len());
        let mut remaining = self.renditions.iter();

        while let Some(rendition) = remaining.next() {
            let result = if cancel.is_cancelled() {
                Err(EncoderError::Cancelled)
            } else {
                encode(*rendition).await
            };

            match result {
                Ok(output) => reports.push(PassReport {
                    rendition: *rendition,
                    outcome: PassOutcome::Completed { output },
                }),
                Err(error) => {
                    reports.push(PassReport {
                        rendition: *rendition,
                        outcome: PassOutcome::Failed {
                            reason: error.to_string(),
                        },
                    });
                    reports.extend(remaining.map(|r| PassReport {
                        rendition: *r,
                        outcome: PassOutcome::Skipped,
                    }));
                    return SequenceResult::Aborted(AbortedLadder {
                        failed_tier: rendition.tier,
                        error,
                        reports,
                    });
                }
            }
        }

        SequenceResult::Complete(CompletedLadder { reports })
    }
}
