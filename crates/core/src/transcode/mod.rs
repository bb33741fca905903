//! Adaptive-bitrate transcode stage.

mod inflight;
mod passes;
mod stage;

pub use inflight::{InflightGuard, InflightRegistry, InflightTranscode};
pub use passes::{
    AbortedLadder, CompletedLadder, PassOutcome, PassReport, PassSequence, SequenceResult,
};
pub use stage::{TranscodeRequest, TranscodeStage};
