use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Storage roots are set
/// - Timeouts and retry budgets are positive
/// - Remote dispatch has all three stage URLs
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let storage = &config.storage;
    for (name, path) in [
        ("storage.uploads_root", &storage.uploads_root),
        ("storage.thumbnails_root", &storage.thumbnails_root),
        ("storage.streams_root", &storage.streams_root),
    ] {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(format!("{} cannot be empty", name)));
        }
    }

    for (name, secs) in [
        ("encoder.pass_timeout_secs", config.encoder.pass_timeout_secs),
        ("encoder.probe_timeout_secs", config.encoder.probe_timeout_secs),
        ("stages.thumbnail_timeout_secs", config.stages.thumbnail_timeout_secs),
        ("stages.metadata_timeout_secs", config.stages.metadata_timeout_secs),
        ("stages.transcode_timeout_secs", config.stages.transcode_timeout_secs),
        ("dispatcher.request_timeout_secs", config.dispatcher.request_timeout_secs),
        ("registry.request_timeout_secs", config.registry.request_timeout_secs),
    ] {
        if secs == 0 {
            return Err(ConfigError::ValidationError(format!("{} must be positive", name)));
        }
    }

    if config.dispatcher.retry.max_attempts == 0 || config.registry.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.registry.outbox_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "registry.outbox_capacity must be at least 1".to_string(),
        ));
    }

    if config.dispatcher.mode == super::DispatchMode::Remote {
        let missing: Vec<&str> = [
            ("thumbnail_url", &config.dispatcher.thumbnail_url),
            ("metadata_url", &config.dispatcher.metadata_url),
            ("transcode_url", &config.dispatcher.transcode_url),
        ]
        .into_iter()
        .filter(|(_, url)| url.is_none())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "remote dispatch requires dispatcher.{}",
                missing.join(", dispatcher.")
            )));
        }
    }

    Ok(())
}
