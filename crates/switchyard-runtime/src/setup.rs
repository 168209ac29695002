//! Wiring between [`SwitchyardConfig`] and the framework builders.
//!
//! ```rust,ignore
//! let config = load_config()?;
//! let store = state_store(&config, |_| Flow::Idle)?.on_state("awaitingName", receive_name);
//! let dispatcher = Dispatcher::builder(bot)
//!     .with_config(&config)
//!     .store(store)
//!     .codec(callback_codec(&config).on("page", turn_page))
//!     .build()?;
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use switchyard_core::UserId;
use switchyard_framework::{AllowList, DispatcherBuilder, JsonCallbackCodec, JsonUserStateStore};
use tracing::debug;

use crate::config::{ConfigResult, SwitchyardConfig};
use crate::storage::ConfiguredBackend;

/// Extension trait applying the configured bot and dispatch settings to a
/// [`DispatcherBuilder`].
pub trait DispatcherBuilderConfigExt: Sized {
    /// Adds the configured command table and allow-list, and sets per-user
    /// serialization.
    fn with_config(self, config: &SwitchyardConfig) -> Self;
}

impl<S, P> DispatcherBuilderConfigExt for DispatcherBuilder<S, P>
where
    S: Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    fn with_config(self, config: &SwitchyardConfig) -> Self {
        debug!(
            commands = config.bot.commands.len(),
            restricted = config.bot.allow_list.is_some(),
            serialize_per_user = config.dispatch.serialize_per_user,
            "Applying configuration to dispatcher"
        );
        self.commands(config.bot.commands.iter().cloned())
            .allow_list(AllowList::from_config(config.bot.allow_list.as_deref()))
            .serialize_per_user(config.dispatch.serialize_per_user)
    }
}

/// Creates a JSON state store over the configured backend and tag field.
pub fn state_store<S, F>(
    config: &SwitchyardConfig,
    initial: F,
) -> ConfigResult<JsonUserStateStore<S, ConfiguredBackend>>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
    F: Fn(UserId) -> S + Send + Sync + 'static,
{
    let backend = ConfiguredBackend::from_settings(&config.storage)?;
    Ok(JsonUserStateStore::new(backend, initial).tag_field(config.dispatch.state_tag_field.clone()))
}

/// Creates a JSON callback codec using the configured discriminant field.
pub fn callback_codec<P, S>(config: &SwitchyardConfig) -> JsonCallbackCodec<P, S>
where
    P: Serialize + DeserializeOwned + Send + Sync + 'static,
    S: Send + Sync + 'static,
{
    JsonCallbackCodec::new().tag_field(config.dispatch.payload_tag_field.clone())
}
