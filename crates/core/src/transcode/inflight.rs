//! Per-asset mutual exclusion for transcodes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::asset::AssetId;
use crate::metrics::TRANSCODES_IN_FLIGHT;

#[derive(Debug)]
struct InflightEntry {
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Snapshot of one running transcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InflightTranscode {
    pub asset_id: AssetId,
    pub started_at: DateTime<Utc>,
}

/// Arena of running transcodes keyed by asset id.
///
/// At most one entry per asset exists. The entry is owned by an
/// [`InflightGuard`] and removed when the guard drops.
#[derive(Debug, Clone, Default)]
pub struct InflightRegistry {
    entries: Arc<Mutex<HashMap<AssetId, InflightEntry>>>,
}

impl InflightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<AssetId, InflightEntry>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claims the slot for `asset_id`, or `None` if a transcode is running.
    pub fn try_acquire(&self, asset_id: AssetId) -> Option<InflightGuard> {
        let mut entries = self.lock();
        if entries.contains_key(&asset_id) {
            return None;
        }

        let cancel = CancellationToken::new();
        entries.insert(
            asset_id,
            InflightEntry {
                started_at: Utc::now(),
                cancel: cancel.clone(),
            },
        );
        TRANSCODES_IN_FLIGHT.inc();

        Some(InflightGuard {
            registry: self.clone(),
            asset_id,
            cancel,
        })
    }

    pub fn contains(&self, asset_id: AssetId) -> bool {
        self.lock().contains_key(&asset_id)
    }

    /// Running transcodes, oldest first.
    pub fn active(&self) -> Vec<InflightTranscode> {
        let mut active: Vec<InflightTranscode> = self
            .lock()
            .iter()
            .map(|(id, entry)| InflightTranscode {
                asset_id: *id,
                started_at: entry.started_at,
            })
            .collect();
        active.sort_by_key(|t| (t.started_at, t.asset_id));
        active
    }

    /// Signals the running transcode to stop. Returns false if none is running.
    pub fn cancel(&self, asset_id: AssetId) -> bool {
        match self.lock().get(&asset_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for entry in self.lock().values() {
            entry.cancel.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive claim on one asset's transcode slot.
#[derive(Debug)]
pub struct InflightGuard {
    registry: InflightRegistry,
    asset_id: AssetId,
    cancel: CancellationToken,
}

impl InflightGuard {
    pub fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if self.registry.lock().remove(&self.asset_id).is_some() {
            TRANSCODES_IN_FLIGHT.dec();
        }
    }
}
