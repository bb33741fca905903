use std::sync::Arc;

use anyhow::{Context, Result};
use mediahub_core::{
    asset::AssetRegistry,
    dispatcher::{Dispatcher, HttpInvoker, LocalInvoker, StageInvoker},
    document::DocumentInspector,
    encoder::{Encoder, Prober},
    status::StatusOutbox,
    Config, DispatchMode, MetadataStage, SanitizedConfig, ThumbnailStage, TranscodeStage,
};

/// Backends the stages are built on.
pub struct Services {
    pub registry: Arc<dyn AssetRegistry>,
    pub encoder: Arc<dyn Encoder>,
    pub prober: Arc<dyn Prober>,
    pub inspector: Arc<dyn DocumentInspector>,
    pub outbox: StatusOutbox,
}

/// Shared application state
pub struct AppState {
    config: Config,
    registry: Arc<dyn AssetRegistry>,
    thumbnail: Arc<ThumbnailStage>,
    metadata: Arc<MetadataStage>,
    transcode: Arc<TranscodeStage>,
    dispatcher: Dispatcher,
}

impl AppState {
    /// Builds the stages and a dispatcher that reaches them as configured.
    pub fn new(config: Config, services: Services) -> Result<Self> {
        let Services {
            registry,
            encoder,
            prober,
            inspector,
            outbox,
        } = services;

        let thumbnail = Arc::new(ThumbnailStage::new(
            Arc::clone(&registry),
            Arc::clone(&encoder),
            config.storage.clone(),
            config.stages.thumbnail_timeout_secs,
        ));
        let metadata = Arc::new(MetadataStage::new(
            Arc::clone(&registry),
            prober,
            inspector,
            config.storage.clone(),
            config.stages.metadata_timeout_secs,
        ));
        let transcode = Arc::new(TranscodeStage::new(
            encoder,
            outbox,
            config.storage.clone(),
            config.stages.transcode_timeout_secs,
        ));

        let invoker: Arc<dyn StageInvoker> = match config.dispatcher.mode {
            DispatchMode::Local => Arc::new(LocalInvoker::new(
                Arc::clone(&thumbnail),
                Arc::clone(&metadata),
                Arc::clone(&transcode),
            )),
            DispatchMode::Remote => Arc::new(
                HttpInvoker::from_config(&config.dispatcher)
                    .context("Failed to create remote stage invoker")?,
            ),
        };
        let dispatcher = Dispatcher::new(invoker, config.dispatcher.retry.clone());

        Ok(Self {
            config,
            registry,
            thumbnail,
            metadata,
            transcode,
            dispatcher,
        })
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn registry(&self) -> &dyn AssetRegistry {
        self.registry.as_ref()
    }

    pub fn thumbnail(&self) -> &ThumbnailStage {
        &self.thumbnail
    }

    pub fn metadata(&self) -> &MetadataStage {
        &self.metadata
    }

    pub fn transcode(&self) -> &Arc<TranscodeStage> {
        &self.transcode
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
