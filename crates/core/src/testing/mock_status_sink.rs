//! Status sinks for testing the outbox and the transcode stage.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::asset::RegistryError;
use crate::status::{StatusSink, StatusUpdate};

/// Accepts every update and remembers it.
#[derive(Debug, Clone, Default)]
pub struct RecordingStatusSink {
    updates: Arc<Mutex<Vec<StatusUpdate>>>,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivered updates, in delivery order.
    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl StatusSink for RecordingStatusSink {
    async fn deliver(&self, update: &StatusUpdate) -> Result<(), RegistryError> {
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(update.clone());
        Ok(())
    }
}

/// Reports the registry as unavailable for the first `failures` calls, then
/// forwards to an inner sink.
pub struct FlakyStatusSink {
    inner: Arc<dyn StatusSink>,
    remaining: Mutex<u32>,
    attempts: Mutex<u32>,
}

impl FlakyStatusSink {
    pub fn new(inner: Arc<dyn StatusSink>, failures: u32) -> Self {
        Self {
            inner,
            remaining: Mutex::new(failures),
            attempts: Mutex::new(0),
        }
    }

    /// Total delivery attempts seen, failed ones included.
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StatusSink for FlakyStatusSink {
    async fn deliver(&self, update: &StatusUpdate) -> Result<(), RegistryError> {
        *self.attempts.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        {
            let mut remaining = self.remaining.lock().unwrap_or_else(|e| e.into_inner());
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RegistryError::Unavailable(
                    "connection refused".to_string(),
                ));
            }
        }
        self.inner.deliver(update).await
    }
}
