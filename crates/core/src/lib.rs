pub mod asset;
pub mod config;
pub mod dispatcher;
pub mod document;
pub mod encoder;
pub mod metrics;
pub mod rendition;
pub mod retry;
pub mod stage;
pub mod status;
pub mod testing;
pub mod transcode;

pub use asset::{
    Asset, AssetId, AssetPatch, AssetRegistry, MediaCategory, MetadataRecord, NewAsset,
    RegistryError, SqliteAssetRegistry, StreamLocation, StreamStatus,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DispatchMode,
    SanitizedConfig, StorageConfig,
};
pub use dispatcher::{
    DeliveryOutcome, DispatchError, DispatchReceipt, DispatchTarget, Dispatcher, HttpInvoker,
    LocalInvoker, StageInvoker, StageKind, StageRequest,
};
pub use retry::RetryConfig;
pub use stage::{MetadataOutcome, MetadataStage, StageError, ThumbnailOutcome, ThumbnailStage};
pub use status::{create_status_outbox, StatusOutbox, StatusOutboxWriter, StatusSink, StatusUpdate};
pub use transcode::{TranscodeRequest, TranscodeStage};
