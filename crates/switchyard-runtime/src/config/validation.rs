//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    BotSettings, DispatchSettings, LogOutput, LoggingConfig, StorageKind, StorageSettings,
    SwitchyardConfig,
};

/// Validates the entire configuration.
pub fn validate_config(config: &SwitchyardConfig) -> ConfigResult<()> {
    validate_bot_settings(&config.bot)?;
    validate_dispatch_settings(&config.dispatch)?;
    validate_storage_settings(&config.storage)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_bot_settings(bot: &BotSettings) -> ConfigResult<()> {
    if bot.token.trim().is_empty() {
        return Err(ConfigError::missing_field("bot.token"));
    }

    let mut seen = HashSet::new();
    for cmd in &bot.commands {
        if !cmd.command.starts_with('/') {
            return Err(ConfigError::InvalidCommand(cmd.command.clone()));
        }
        if cmd.command.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Command '{}' cannot contain whitespace",
                cmd.command
            )));
        }
        if !seen.insert(cmd.command.as_str()) {
            return Err(ConfigError::DuplicateCommand(cmd.command.clone()));
        }
    }

    if let Some(handles) = &bot.allow_list
        && handles.iter().any(|h| h.trim_start_matches('@').is_empty())
    {
        return Err(ConfigError::validation(
            "Allow-list entries cannot be empty",
        ));
    }

    Ok(())
}

fn validate_dispatch_settings(dispatch: &DispatchSettings) -> ConfigResult<()> {
    if dispatch.state_tag_field.is_empty() {
        return Err(ConfigError::missing_field("dispatch.state_tag_field"));
    }
    if dispatch.payload_tag_field.is_empty() {
        return Err(ConfigError::missing_field("dispatch.payload_tag_field"));
    }
    Ok(())
}

fn validate_storage_settings(storage: &StorageSettings) -> ConfigResult<()> {
    if storage.backend == StorageKind::File && storage.resolved_data_dir().is_none() {
        return Err(ConfigError::missing_field("storage.data_dir"));
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}
