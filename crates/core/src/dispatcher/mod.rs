//! Fan-out of derivation work for newly ingested assets.
//!
//! [`Dispatcher::dispatch`] plans the stage requests for one asset, spawns an
//! independent delivery task per request and returns immediately. Each task
//! retries transient delivery failures with bounded backoff; one stage failing
//! to accept never affects the others or the ingestion caller.

mod invoker;

pub use invoker::{HttpInvoker, LocalInvoker};

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::asset::{Asset, AssetId, MediaCategory};
use crate::metrics::DISPATCH_ATTEMPTS;
use crate::retry::RetryConfig;

/// A derivation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Thumbnail,
    Metadata,
    Transcode,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
            Self::Metadata => "metadata",
            Self::Transcode => "transcode",
        }
    }
}

/// One request to one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRequest {
    Thumbnail { asset_id: AssetId },
    Metadata { asset_id: AssetId },
    Transcode { asset_id: AssetId, storage_path: String },
}

impl StageRequest {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Thumbnail { .. } => StageKind::Thumbnail,
            Self::Metadata { .. } => StageKind::Metadata,
            Self::Transcode { .. } => StageKind::Transcode,
        }
    }

    pub fn asset_id(&self) -> AssetId {
        match self {
            Self::Thumbnail { asset_id }
            | Self::Metadata { asset_id }
            | Self::Transcode { asset_id, .. } => *asset_id,
        }
    }
}

/// What the dispatcher needs to know about a new asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTarget {
    pub asset_id: AssetId,
    pub mime_type: String,
    pub storage_path: String,
}

impl From<&Asset> for DispatchTarget {
    fn from(asset: &Asset) -> Self {
        Self {
            asset_id: asset.id,
            mime_type: asset.mime_type.clone(),
            storage_path: asset.path.clone(),
        }
    }
}

/// Errors delivering a stage request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The stage could not be reached or asked to retry.
    #[error("Stage unavailable: {0}")]
    Transient(String),

    /// The stage answered and refused or failed the request.
    #[error("Stage rejected request: {0}")]
    Rejected(String),
}

/// Delivers stage requests.
#[async_trait]
pub trait StageInvoker: Send + Sync {
    async fn invoke(&self, request: &StageRequest) -> Result<(), DispatchError>;
}

/// Final state of one delivery task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Rejected { reason: String },
    Exhausted { attempts: u32, reason: String },
}

/// Handles to the delivery tasks of one dispatch.
#[derive(Debug)]
pub struct DispatchReceipt {
    pub asset_id: AssetId,
    pub stages: Vec<StageKind>,
    handles: Vec<JoinHandle<DeliveryOutcome>>,
}

impl DispatchReceipt {
    /// Waits for every delivery task. Ingestion never calls this.
    pub async fn join(self) -> Vec<(StageKind, DeliveryOutcome)> {
        let results = join_all(self.handles).await;
        self.stages
            .into_iter()
            .zip(results)
            .map(|(stage, result)| {
                let outcome = result.unwrap_or_else(|e| DeliveryOutcome::Rejected {
                    reason: format!("delivery task failed: {}", e),
                });
                (stage, outcome)
            })
            .collect()
    }
}

/// Fan-out dispatcher.
pub struct Dispatcher {
    invoker: Arc<dyn StageInvoker>,
    retry: RetryConfig,
}

impl Dispatcher {
    pub fn new(invoker: Arc<dyn StageInvoker>, retry: RetryConfig) -> Self {
        Self { invoker, retry }
    }

    /// Thumbnail and metadata always; transcode only for video.
    pub fn plan(target: &DispatchTarget) -> Vec<StageRequest> {
        let mut requests = vec![
            StageRequest::Thumbnail {
                asset_id: target.asset_id,
            },
            StageRequest::Metadata {
                asset_id: target.asset_id,
            },
        ];

        if MediaCategory::from_mime(&target.mime_type) == MediaCategory::Video {
            requests.push(StageRequest::Transcode {
                asset_id: target.asset_id,
                storage_path: target.storage_path.clone(),
            });
        }

        requests
    }

    /// Spawns one delivery task per planned request and returns at once.
    pub fn dispatch(&self, target: &DispatchTarget) -> DispatchReceipt {
        let requests = Self::plan(target);
        let stages: Vec<StageKind> = requests.iter().map(StageRequest::kind).collect();

        info!(
            asset_id = target.asset_id,
            mime_type = %target.mime_type,
            stages = ?stages,
            "Dispatching derivation stages"
        );

        let handles = requests
            .into_iter()
            .map(|request| {
                let invoker = Arc::clone(&self.invoker);
                let retry = self.retry.clone();
                tokio::spawn(async move { deliver(invoker.as_ref(), &request, &retry).await })
            })
            .collect();

        DispatchReceipt {
            asset_id: target.asset_id,
            stages,
            handles,
        }
    }
}

/// Delivers one request, retrying transient failures.
pub async fn deliver(
    invoker: &dyn StageInvoker,
    request: &StageRequest,
    retry: &RetryConfig,
) -> DeliveryOutcome {
    let stage = request.kind().as_str();
    let asset_id = request.asset_id();
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match invoker.invoke(request).await {
            Ok(()) => {
                DISPATCH_ATTEMPTS
                    .with_label_values(&[stage, "accepted"])
                    .inc();
                debug!(asset_id, stage, attempt, "Stage accepted request");
                return DeliveryOutcome::Delivered { attempts: attempt };
            }
            Err(DispatchError::Rejected(reason)) => {
                DISPATCH_ATTEMPTS
                    .with_label_values(&[stage, "rejected"])
                    .inc();
                warn!(asset_id, stage, reason = %reason, "Stage rejected request");
                return DeliveryOutcome::Rejected { reason };
            }
            Err(DispatchError::Transient(reason)) if attempt >= max_attempts => {
                DISPATCH_ATTEMPTS
                    .with_label_values(&[stage, "exhausted"])
                    .inc();
                error!(
                    asset_id,
                    stage,
                    attempts = attempt,
                    reason = %reason,
                    "Giving up on stage dispatch"
                );
                return DeliveryOutcome::Exhausted {
                    attempts: attempt,
                    reason,
                };
            }
            Err(DispatchError::Transient(reason)) => {
                DISPATCH_ATTEMPTS
                    .with_label_values(&[stage, "retry"])
                    .inc();
                let delay = retry.delay_for_attempt(attempt);
                debug!(
                    asset_id,
                    stage,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "Stage dispatch failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Invoker scripted per stage: a list of results consumed in order, then Ok.
    #[derive(Default)]
    struct ScriptedInvoker {
        scripts: Mutex<HashMap<StageKind, Vec<Result<(), DispatchError>>>>,
        calls: Mutex<Vec<StageRequest>>,
    }

    impl ScriptedInvoker {
        fn script(self, kind: StageKind, results: Vec<Result<(), DispatchError>>) -> Self {
            self.scripts.lock().unwrap().insert(kind, results);
            self
        }
    }

    #[async_trait]
    impl StageInvoker for ScriptedInvoker {
        async fn invoke(&self, request: &StageRequest) -> Result<(), DispatchError> {
            self.calls.lock().unwrap().push(request.clone());
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&request.kind()) {
                Some(script) if !script.is_empty() => script.remove(0),
                _ => Ok(()),
            }
        }
    }

    fn target(mime: &str) -> DispatchTarget {
        DispatchTarget {
            asset_id: 12,
            mime_type: mime.to_string(),
            storage_path: "uploads/f00d".to_string(),
        }
    }

    #[test]
    fn test_plan_video_includes_transcode() {
        let kinds: Vec<StageKind> = Dispatcher::plan(&target("video/mp4"))
            .iter()
            .map(StageRequest::kind)
            .collect();
        assert_eq!(
            kinds,
            vec![StageKind::Thumbnail, StageKind::Metadata, StageKind::Transcode]
        );

        let transcode = &Dispatcher::plan(&target("video/quicktime"))[2];
        assert_eq!(
            *transcode,
            StageRequest::Transcode {
                asset_id: 12,
                storage_path: "uploads/f00d".to_string()
            }
        );
    }

    #[test]
    fn test_plan_non_video_skips_transcode() {
        for mime in ["image/png", "audio/mpeg", "application/pdf"] {
            let kinds: Vec<StageKind> = Dispatcher::plan(&target(mime))
                .iter()
                .map(StageRequest::kind)
                .collect();
            assert_eq!(kinds, vec![StageKind::Thumbnail, StageKind::Metadata]);
        }
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let invoker = Arc::new(ScriptedInvoker::default().script(
            StageKind::Thumbnail,
            vec![
                Err(DispatchError::Transient("connection refused".to_string())),
                Err(DispatchError::Transient("connection refused".to_string())),
            ],
        ));
        let dispatcher = Dispatcher::new(invoker.clone(), RetryConfig::immediate(5));

        let outcomes = dispatcher.dispatch(&target("image/jpeg")).join().await;
        assert_eq!(
            outcomes,
            vec![
                (StageKind::Thumbnail, DeliveryOutcome::Delivered { attempts: 3 }),
                (StageKind::Metadata, DeliveryOutcome::Delivered { attempts: 1 }),
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_stage() {
        let invoker = Arc::new(
            ScriptedInvoker::default()
                .script(
                    StageKind::Metadata,
                    vec![Err(DispatchError::Rejected("probe failed".to_string()))],
                )
                .script(
                    StageKind::Transcode,
                    vec![
                        Err(DispatchError::Transient("down".to_string())),
                        Err(DispatchError::Transient("down".to_string())),
                    ],
                ),
        );
        let dispatcher = Dispatcher::new(invoker.clone(), RetryConfig::immediate(2));

        let outcomes: HashMap<StageKind, DeliveryOutcome> = dispatcher
            .dispatch(&target("video/mp4"))
            .join()
            .await
            .into_iter()
            .collect();

        assert_eq!(
            outcomes[&StageKind::Thumbnail],
            DeliveryOutcome::Delivered { attempts: 1 }
        );
        assert_eq!(
            outcomes[&StageKind::Metadata],
            DeliveryOutcome::Rejected {
                reason: "probe failed".to_string()
            }
        );
        assert_eq!(
            outcomes[&StageKind::Transcode],
            DeliveryOutcome::Exhausted {
                attempts: 2,
                reason: "down".to_string()
            }
        );
    }
}
