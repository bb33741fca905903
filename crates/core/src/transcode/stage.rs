use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::inflight::{InflightGuard, InflightRegistry};
use super::passes::{PassSequence, SequenceResult};
use crate::asset::{AssetId, StreamLocation};
use crate::config::StorageConfig;
use crate::encoder::{Encoder, EncoderError, RenditionJob};
use crate::metrics::{ENCODE_PASS_DURATION, STAGE_INVOCATIONS, TRANSCODES_FINISHED};
use crate::stage::{upload_source, StageError};
use crate::status::{StatusOutbox, StatusUpdate};

/// Suffix of the per-asset staging directory under the streams root.
pub const STAGING_SUFFIX: &str = ".partial";

/// Request to (re)build the rendition ladder of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeRequest {
    pub asset_id: AssetId,
    /// Stored upload path, e.g. `uploads/3f2a`.
    pub storage_path: String,
}

impl TranscodeRequest {
    pub fn new(asset_id: AssetId, storage_path: impl Into<String>) -> Self {
        Self {
            asset_id,
            storage_path: storage_path.into(),
        }
    }
}

/// The multi-rendition encode pipeline.
///
/// Stream status moves `processing` then `ready` or `failed`, reported
/// through the status outbox. One transcode per asset runs at a time.
pub struct TranscodeStage {
    encoder: Arc<dyn Encoder>,
    outbox: StatusOutbox,
    storage: StorageConfig,
    inflight: InflightRegistry,
    sequence: PassSequence,
    timeout_secs: u64,
}

impl TranscodeStage {
    pub fn new(
        encoder: Arc<dyn Encoder>,
        outbox: StatusOutbox,
        storage: StorageConfig,
        timeout_secs: u64,
    ) -> Self {
        Self {
            encoder,
            outbox,
            storage,
            inflight: InflightRegistry::new(),
            sequence: PassSequence::ladder(),
            timeout_secs,
        }
    }

    pub fn inflight(&self) -> &InflightRegistry {
        &self.inflight
    }

    /// Output root of an asset's renditions.
    pub fn output_root(&self, asset_id: AssetId) -> PathBuf {
        self.storage.streams_root.join(asset_id.to_string())
    }

    /// Where a running transcode writes until all passes succeed.
    pub fn staging_root(&self, asset_id: AssetId) -> PathBuf {
        self.storage
            .streams_root
            .join(format!("{}{}", asset_id, STAGING_SUFFIX))
    }

    /// Accepts a request and runs the passes in the background.
    ///
    /// Returns once `processing` is queued. Validation, conflict and missing
    /// source are reported synchronously.
    pub async fn submit(self: &Arc<Self>, request: TranscodeRequest) -> Result<(), StageError> {
        let (guard, source) = self.begin(&request).await?;

        let stage = Arc::clone(self);
        tokio::spawn(async move {
            // Outcome is logged and reported by `finish`.
            let _outcome = stage.finish(request, source, guard).await;
        });

        Ok(())
    }

    /// Runs a full transcode on the calling task.
    pub async fn transcode(&self, request: TranscodeRequest) -> Result<StreamLocation, StageError> {
        let (guard, source) = self.begin(&request).await?;
        self.finish(request, source, guard).await
    }

    async fn begin(
        &self,
        request: &TranscodeRequest,
    ) -> Result<(InflightGuard, PathBuf), StageError> {
        if request.asset_id <= 0 {
            return Err(StageError::Validation("assetId is required".to_string()));
        }
        if request.storage_path.trim().is_empty() {
            return Err(StageError::Validation("storagePath is required".to_string()));
        }
        let source = upload_source(&self.storage, &request.storage_path)?;

        let guard = self
            .inflight
            .try_acquire(request.asset_id)
            .ok_or(StageError::Conflict(request.asset_id))?;

        self.outbox
            .report(StatusUpdate::processing(request.asset_id))
            .await;

        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            warn!(
                asset_id = request.asset_id,
                source = %source.display(),
                "Transcode source missing"
            );
            self.record_failure(request.asset_id, "not_found").await;
            return Err(StageError::NotFound(format!(
                "source file {}",
                source.display()
            )));
        }

        Ok((guard, source))
    }

    async fn finish(
        &self,
        request: TranscodeRequest,
        source: PathBuf,
        guard: InflightGuard,
    ) -> Result<StreamLocation, StageError> {
        let asset_id = request.asset_id;
        let cancel = guard.token();
        let started = Instant::now();

        info!(asset_id, source = %source.display(), "Transcode started");

        let result = match tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            self.execute(asset_id, &source, &cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                Err(StageError::Timeout(self.timeout_secs))
            }
        };

        match &result {
            Ok(location) => {
                self.outbox
                    .report(StatusUpdate::ready(asset_id, location.clone()))
                    .await;
                TRANSCODES_FINISHED.with_label_values(&["ready"]).inc();
                STAGE_INVOCATIONS
                    .with_label_values(&["transcode", "success"])
                    .inc();
                info!(
                    asset_id,
                    stream_path = %location.stream_path,
                    elapsed_secs = started.elapsed().as_secs(),
                    "Transcode ready"
                );
            }
            Err(e) => {
                error!(asset_id, error = %e, "Transcode failed");
                self.discard_staging(asset_id).await;
                self.record_failure(asset_id, e.label()).await;
            }
        }

        drop(guard);
        result
    }

    async fn record_failure(&self, asset_id: AssetId, label: &str) {
        self.outbox.report(StatusUpdate::failed(asset_id)).await;
        TRANSCODES_FINISHED.with_label_values(&["failed"]).inc();
        STAGE_INVOCATIONS
            .with_label_values(&["transcode", label])
            .inc();
    }

    async fn discard_staging(&self, asset_id: AssetId) {
        let staging = self.staging_root(asset_id);
        if let Err(e) = remove_dir_if_present(&staging).await {
            warn!(
                asset_id,
                path = %staging.display(),
                error = %e,
                "Cannot remove partial transcode output"
            );
        }
    }

    /// Replaces the published output with a completed staging tree.
    async fn publish(&self, staging: &Path, output_root: &Path) -> Result<(), StageError> {
        remove_dir_if_present(output_root).await.map_err(|e| {
            StageError::ToolFailure(format!("cannot clear {}: {}", output_root.display(), e))
        })?;
        tokio::fs::rename(staging, output_root).await.map_err(|e| {
            StageError::ToolFailure(format!(
                "cannot publish {} to {}: {}",
                staging.display(),
                output_root.display(),
                e
            ))
        })
    }

    async fn execute(
        &self,
        asset_id: AssetId,
        source: &Path,
        cancel: &CancellationToken,
    ) -> Result<StreamLocation, StageError> {
        let output_root = self.output_root(asset_id);
        let staging = self.staging_root(asset_id);

        // Passes write beside the published stream, which stays intact until
        // the new ladder is complete. Leftovers of an interrupted run go first.
        remove_dir_if_present(&staging).await.map_err(|e| {
            StageError::ToolFailure(format!("cannot clear {}: {}", staging.display(), e))
        })?;

        for rendition in self.sequence.renditions() {
            let dir = staging.join(rendition.tier);
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                StageError::ToolFailure(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }

        let result = self
            .sequence
            .run(cancel, |rendition| {
                let job = RenditionJob {
                    asset_id,
                    input_path: source.to_path_buf(),
                    output_dir: staging.join(rendition.tier),
                    rendition,
                    cancel: cancel.clone(),
                };
                let encoder = Arc::clone(&self.encoder);
                async move {
                    let pass_start = Instant::now();
                    let result = encoder.encode_rendition(job).await;
                    let outcome = if result.is_ok() { "success" } else { "failed" };
                    ENCODE_PASS_DURATION
                        .with_label_values(&[rendition.tier, outcome])
                        .observe(pass_start.elapsed().as_secs_f64());
                    match &result {
                        Ok(output) => info!(
                            asset_id,
                            tier = rendition.tier,
                            segments = output.segment_count,
                            "Rendition pass complete"
                        ),
                        Err(e) => warn!(
                            asset_id,
                            tier = rendition.tier,
                            error = %e,
                            "Rendition pass failed"
                        ),
                    }
                    result
                }
            })
            .await;

        match result {
            SequenceResult::Complete(ladder) => {
                ladder.write_master(&staging).await.map_err(|e| {
                    StageError::ToolFailure(format!("cannot write master playlist: {}", e))
                })?;
                self.publish(&staging, &output_root).await?;
                Ok(StreamLocation::for_asset(asset_id))
            }
            SequenceResult::Aborted(aborted) => match aborted.error {
                EncoderError::Cancelled => Err(StageError::Cancelled(asset_id)),
                EncoderError::InputNotFound { path } => Err(StageError::NotFound(format!(
                    "source file {}",
                    path.display()
                ))),
                other => Err(StageError::ToolFailure(format!(
                    "{} pass failed: {}",
                    aborted.failed_tier, other
                ))),
            },
        }
    }
}

async fn remove_dir_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
