//! Transcode lifecycle integration tests.
//!
//! These tests drive the transcode stage with a mock encoder and a real
//! SQLite registry behind the status outbox:
//! - `none -> processing -> ready` with an assembled master playlist
//! - fail-fast on a broken pass, no master playlist
//! - per-asset exclusion, cancellation and the stage timeout
//! - the published stream stays intact while a rerun is in progress
//! - delivery of status updates through an unreliable registry

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use mediahub_core::{
    asset::{AssetRegistry, NewAsset, RegistryError, SqliteAssetRegistry, StreamStatus},
    config::StorageConfig,
    rendition::{parse_master_manifest, MASTER_MANIFEST_NAME},
    status::{create_status_outbox, RegistryStatusSink, StatusOutbox, StatusSink, StatusUpdate},
    testing::{write_source, FlakyStatusSink, MockEncoder},
    transcode::{TranscodeRequest, TranscodeStage},
    AssetId, RetryConfig, StageError,
};

/// Applies updates to the registry and remembers the stream statuses seen.
struct TeeSink {
    registry: RegistryStatusSink,
    seen: Mutex<Vec<(AssetId, Option<StreamStatus>)>>,
}

#[async_trait]
impl StatusSink for TeeSink {
    async fn deliver(&self, update: &StatusUpdate) -> Result<(), RegistryError> {
        self.registry.deliver(update).await?;
        self.seen
            .lock()
            .unwrap()
            .push((update.asset_id, update.stream_status));
        Ok(())
    }
}

struct TestHarness {
    stage: Arc<TranscodeStage>,
    encoder: MockEncoder,
    registry: Arc<SqliteAssetRegistry>,
    outbox: StatusOutbox,
    sink: Arc<TeeSink>,
    storage: StorageConfig,
    _dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_timeout(60)
    }

    fn with_timeout(timeout_secs: u64) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let storage = StorageConfig::under(dir.path());
        let registry = Arc::new(SqliteAssetRegistry::in_memory().expect("registry"));
        let sink = Arc::new(TeeSink {
            registry: RegistryStatusSink::new(registry.clone()),
            seen: Mutex::new(Vec::new()),
        });
        Self::with_sink(dir, storage, registry, sink.clone(), sink, timeout_secs)
    }

    fn with_sink(
        dir: TempDir,
        storage: StorageConfig,
        registry: Arc<SqliteAssetRegistry>,
        sink: Arc<dyn StatusSink>,
        tee: Arc<TeeSink>,
        timeout_secs: u64,
    ) -> Self {
        let (outbox, writer) = create_status_outbox(sink, 64, RetryConfig::immediate(3));
        tokio::spawn(writer.run());

        let encoder = MockEncoder::new();
        let stage = Arc::new(TranscodeStage::new(
            Arc::new(encoder.clone()),
            outbox.clone(),
            storage.clone(),
            timeout_secs,
        ));

        Self {
            stage,
            encoder,
            registry,
            outbox,
            sink: tee,
            storage,
            _dir: dir,
        }
    }

    /// Registers a video asset and writes its source file.
    fn video(&self, name: &str) -> (AssetId, TranscodeRequest) {
        let path = format!("uploads/{}", name);
        write_source(&self.storage.resolve_upload(&path).expect("upload path"));
        let asset = self
            .registry
            .create(NewAsset::new(path.clone(), "video/mp4", 1024))
            .expect("create asset");
        (asset.id, TranscodeRequest::new(asset.id, path))
    }

    async fn drained(&self) {
        wait_until(|| self.outbox.pending() == 0).await;
    }

    fn statuses(&self, id: AssetId) -> Vec<StreamStatus> {
        self.sink
            .seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(asset_id, _)| *asset_id == id)
            .filter_map(|(_, status)| *status)
            .collect()
    }

    fn stream_status(&self, id: AssetId) -> StreamStatus {
        self.registry.get(id).unwrap().unwrap().stream_status
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_successful_transcode_assembles_master() {
    let h = TestHarness::new();
    let (id, request) = h.video("clip");
    assert_eq!(h.stream_status(id), StreamStatus::None);

    let location = h.stage.transcode(request).await.unwrap();
    assert_eq!(location.stream_path, format!("streams/{}/master.m3u8", id));
    assert_eq!(location.stream_folder, format!("streams/{}/", id));

    h.drained().await;
    assert_eq!(
        h.statuses(id),
        vec![StreamStatus::Processing, StreamStatus::Ready]
    );

    let asset = h.registry.get(id).unwrap().unwrap();
    assert_eq!(asset.stream_status, StreamStatus::Ready);
    assert_eq!(asset.stream_location(), Some(location));

    let root = h.stage.output_root(id);
    for tier in ["1080p", "720p", "480p"] {
        assert!(root.join(tier).join("index.m3u8").exists(), "{} index", tier);
    }

    let master = std::fs::read_to_string(root.join(MASTER_MANIFEST_NAME)).unwrap();
    let entries = parse_master_manifest(&master);
    let bandwidths: Vec<u64> = entries.iter().map(|e| e.bandwidth).collect();
    let resolutions: Vec<&str> = entries.iter().map(|e| e.resolution.as_str()).collect();
    assert_eq!(bandwidths, vec![5_000_000, 2_800_000, 1_400_000]);
    assert_eq!(resolutions, vec!["1920x1080", "1280x720", "854x480"]);
    assert_eq!(h.encoder.encoded_tiers(), vec!["1080p", "720p", "480p"]);
}

#[tokio::test]
async fn test_failed_pass_aborts_without_master() {
    let h = TestHarness::new();
    let (id, request) = h.video("clip");
    h.encoder.fail_tier("720p");

    let result = h.stage.transcode(request).await;
    assert!(matches!(result, Err(StageError::ToolFailure(_))));

    assert_eq!(h.encoder.encoded_tiers(), vec!["1080p", "720p"]);
    assert!(!h.stage.output_root(id).join(MASTER_MANIFEST_NAME).exists());

    h.drained().await;
    assert_eq!(
        h.statuses(id),
        vec![StreamStatus::Processing, StreamStatus::Failed]
    );
    let asset = h.registry.get(id).unwrap().unwrap();
    assert_eq!(asset.stream_status, StreamStatus::Failed);
    assert!(asset.stream_location().is_none());
}

#[tokio::test]
async fn test_missing_source_fails_before_any_pass() {
    let h = TestHarness::new();
    let asset = h
        .registry
        .create(NewAsset::new("uploads/never-written", "video/mp4", 1))
        .unwrap();

    let result = h
        .stage
        .transcode(TranscodeRequest::new(asset.id, "uploads/never-written"))
        .await;
    assert!(matches!(result, Err(StageError::NotFound(_))));
    assert!(h.encoder.encoded_tiers().is_empty());

    h.drained().await;
    assert_eq!(h.stream_status(asset.id), StreamStatus::Failed);
    assert!(h.stage.inflight().is_empty());
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let h = TestHarness::new();

    let result = h.stage.transcode(TranscodeRequest::new(0, "uploads/a")).await;
    assert!(matches!(result, Err(StageError::Validation(_))));

    let result = h.stage.transcode(TranscodeRequest::new(5, "  ")).await;
    assert!(matches!(result, Err(StageError::Validation(_))));

    let result = h
        .stage
        .transcode(TranscodeRequest::new(5, "uploads/../../etc/passwd"))
        .await;
    assert!(matches!(result, Err(StageError::Validation(_))));
    assert!(h.stage.inflight().is_empty());
    assert!(h.encoder.encoded_tiers().is_empty());

    assert_eq!(h.outbox.pending(), 0);
}

#[tokio::test]
async fn test_second_request_while_in_flight_conflicts() {
    let h = TestHarness::new();
    let (id, request) = h.video("clip");
    h.encoder.set_pass_delay(Duration::from_millis(100));

    h.stage.submit(request.clone()).await.unwrap();
    assert!(h.stage.inflight().contains(id));

    let second = h.stage.submit(request).await;
    assert!(matches!(second, Err(StageError::Conflict(c)) if c == id));

    wait_until(|| h.stage.inflight().is_empty()).await;
    h.drained().await;
    assert_eq!(
        h.statuses(id),
        vec![StreamStatus::Processing, StreamStatus::Ready]
    );
}

#[tokio::test]
async fn test_cancel_ends_failed() {
    let h = TestHarness::new();
    let (id, request) = h.video("clip");
    h.encoder.set_pass_delay(Duration::from_secs(30));

    h.stage.submit(request).await.unwrap();
    wait_until(|| !h.encoder.encoded_tiers().is_empty()).await;

    assert!(h.stage.inflight().cancel(id));
    wait_until(|| h.stage.inflight().is_empty()).await;
    h.drained().await;

    assert_eq!(h.stream_status(id), StreamStatus::Failed);
    assert_eq!(h.encoder.encoded_tiers(), vec!["1080p"]);
    assert!(!h.stage.output_root(id).join(MASTER_MANIFEST_NAME).exists());
}

#[tokio::test]
async fn test_stage_timeout_fails_and_frees_slot() {
    let h = TestHarness::with_timeout(1);
    let (id, request) = h.video("clip");
    h.encoder.set_pass_delay(Duration::from_secs(3));

    let result = h.stage.transcode(request.clone()).await;
    assert!(matches!(result, Err(StageError::Timeout(1))));
    assert!(h.stage.inflight().is_empty());
    assert!(!h.stage.output_root(id).join(MASTER_MANIFEST_NAME).exists());
    assert!(!h.stage.staging_root(id).exists());

    h.drained().await;
    assert_eq!(h.stream_status(id), StreamStatus::Failed);

    h.encoder.set_pass_delay(Duration::ZERO);
    let location = h.stage.transcode(request).await.unwrap();
    assert_eq!(location.stream_path, format!("streams/{}/master.m3u8", id));

    h.drained().await;
    assert_eq!(h.stream_status(id), StreamStatus::Ready);
    assert_eq!(
        h.statuses(id),
        vec![
            StreamStatus::Processing,
            StreamStatus::Failed,
            StreamStatus::Processing,
            StreamStatus::Ready
        ]
    );
}

#[tokio::test]
async fn test_rerun_replaces_previous_output() {
    let h = TestHarness::new();
    let (id, request) = h.video("clip");

    h.stage.transcode(request.clone()).await.unwrap();
    let stale = h.stage.output_root(id).join("1080p").join("seg_999.ts");
    std::fs::write(&stale, b"old").unwrap();

    h.stage.transcode(request).await.unwrap();
    assert!(!stale.exists());
    assert!(h.stage.output_root(id).join(MASTER_MANIFEST_NAME).exists());
    assert!(!h.stage.staging_root(id).exists());

    h.drained().await;
    assert_eq!(
        h.statuses(id),
        vec![
            StreamStatus::Processing,
            StreamStatus::Ready,
            StreamStatus::Processing,
            StreamStatus::Ready
        ]
    );
}

#[tokio::test]
async fn test_published_stream_survives_rerun() {
    let h = TestHarness::new();
    let (id, request) = h.video("clip");
    let master = h.stage.output_root(id).join(MASTER_MANIFEST_NAME);

    h.stage.transcode(request.clone()).await.unwrap();
    let published = std::fs::read_to_string(&master).unwrap();

    // While the rerun encodes, the old master is still served.
    h.encoder.set_pass_delay(Duration::from_millis(100));
    h.stage.submit(request.clone()).await.unwrap();
    wait_until(|| h.encoder.encoded_tiers().len() > 3).await;
    assert_eq!(std::fs::read_to_string(&master).unwrap(), published);
    assert!(h.stage.staging_root(id).exists());
    wait_until(|| h.stage.inflight().is_empty()).await;

    // A failed rerun leaves it in place and drops the partial tree.
    h.encoder.set_pass_delay(Duration::ZERO);
    h.encoder.fail_tier("480p");
    assert!(h.stage.transcode(request).await.is_err());
    assert!(master.exists());
    assert!(!h.stage.staging_root(id).exists());

    h.drained().await;
    assert_eq!(h.stream_status(id), StreamStatus::Failed);
    assert!(h.registry.get(id).unwrap().unwrap().stream_location().is_none());
}

#[tokio::test]
async fn test_status_updates_survive_unavailable_registry() {
    let dir = TempDir::new().unwrap();
    let storage = StorageConfig::under(dir.path());
    let registry = Arc::new(SqliteAssetRegistry::in_memory().unwrap());
    let tee = Arc::new(TeeSink {
        registry: RegistryStatusSink::new(registry.clone()),
        seen: Mutex::new(Vec::new()),
    });
    let flaky = Arc::new(FlakyStatusSink::new(tee.clone(), 4));
    let h = TestHarness::with_sink(dir, storage, registry, flaky.clone(), tee, 60);

    let (id, request) = h.video("clip");
    h.stage.transcode(request).await.unwrap();
    h.drained().await;

    assert_eq!(h.stream_status(id), StreamStatus::Ready);
    assert_eq!(
        h.statuses(id),
        vec![StreamStatus::Processing, StreamStatus::Ready]
    );
    assert_eq!(flaky.attempts(), 6);
}
