//! Callback payload codec.
//!
//! Inline keyboard buttons carry a single opaque string back to the bot.
//! A [`CallbackCodec`] turns application payloads into that string and back,
//! and owns the registry of callback handlers keyed by the payload's shape.
//!
//! Decoding never fails loudly: a token the codec cannot read (corrupted,
//! stale, or produced by another bot) decodes to `None`, and the dispatcher
//! answers such callbacks with a bare acknowledgment.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{CodecError, CodecResult};
use crate::handler::{BoxedCallbackHandler, CallbackHandler, into_callback_handler};

/// Maximum size of callback data accepted by the platform, in bytes.
pub const MAX_CALLBACK_DATA_LEN: usize = 64;

/// Default name of the field carrying the payload discriminant.
pub const DEFAULT_PAYLOAD_TAG_FIELD: &str = "type";

/// Encodes and decodes callback payloads and routes them to handlers.
///
/// Implementations are shared by every in-flight event and must be safe for
/// concurrent use.
#[async_trait]
pub trait CallbackCodec<P, S>: Send + Sync + 'static {
    /// Encodes a payload into a callback token.
    fn encode(&self, payload: &P) -> CodecResult<String>;

    /// Decodes a callback token; malformed input yields `None`.
    async fn decode(&self, raw: &str) -> Option<P>;

    /// Returns the handler registered for the payload's shape.
    fn lookup_handler(&self, payload: &P) -> Option<BoxedCallbackHandler<P, S>>;
}

type Validator<P> = Arc<dyn Fn(&P) -> bool + Send + Sync>;

/// A callback codec using compact JSON as the token format.
///
/// The payload type is the schema: a token that does not deserialize into
/// `P`, or that fails the optional validator, decodes to `None`. Handlers are
/// keyed by the discriminant field (default `"type"`), which makes internally
/// tagged enums the natural payload type:
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// #[serde(tag = "type", rename_all = "camelCase")]
/// enum Payload {
///     DeleteSet { id: String },
///     Page { n: u32 },
/// }
///
/// let codec = JsonCallbackCodec::new()
///     .on("deleteSet", delete_set)
///     .on("page", turn_page);
/// ```
pub struct JsonCallbackCodec<P, S = ()> {
    tag_field: String,
    max_len: usize,
    validator: Option<Validator<P>>,
    handlers: HashMap<String, BoxedCallbackHandler<P, S>>,
    _marker: PhantomData<fn() -> S>,
}

impl<P, S> Default for JsonCallbackCodec<P, S>
where
    P: Serialize + DeserializeOwned + Send + Sync + 'static,
    S: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P, S> JsonCallbackCodec<P, S>
where
    P: Serialize + DeserializeOwned + Send + Sync + 'static,
    S: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            tag_field: DEFAULT_PAYLOAD_TAG_FIELD.to_string(),
            max_len: MAX_CALLBACK_DATA_LEN,
            validator: None,
            handlers: HashMap::new(),
            _marker: PhantomData,
        }
    }

    /// Overrides the name of the discriminant field.
    pub fn tag_field(mut self, field: impl Into<String>) -> Self {
        self.tag_field = field.into();
        self
    }

    /// Overrides the maximum encoded length.
    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Adds a validation step run after deserialization.
    pub fn validate<F>(mut self, validator: F) -> Self
    where
        F: Fn(&P) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Registers `handler` for payloads whose discriminant is `discriminant`.
    pub fn on<H>(mut self, discriminant: impl Into<String>, handler: H) -> Self
    where
        H: CallbackHandler<P, S>,
    {
        self.handlers
            .insert(discriminant.into(), into_callback_handler(handler));
        self
    }

    /// Returns the discriminant of `payload`, if it has one.
    pub fn discriminant(&self, payload: &P) -> Option<String> {
        match serde_json::to_value(payload).ok()? {
            Value::String(tag) => Some(tag),
            Value::Object(mut map) => match map.remove(&self.tag_field)? {
                Value::String(tag) => Some(tag),
                _ => None,
            },
            _ => None,
        }
    }
}

#[async_trait]
impl<P, S> CallbackCodec<P, S> for JsonCallbackCodec<P, S>
where
    P: Serialize + DeserializeOwned + Send + Sync + 'static,
    S: Send + Sync + 'static,
{
    fn encode(&self, payload: &P) -> CodecResult<String> {
        let raw = serde_json::to_string(payload)?;
        if raw.len() > self.max_len {
            return Err(CodecError::TooLong {
                len: raw.len(),
                max: self.max_len,
            });
        }
        Ok(raw)
    }

    async fn decode(&self, raw: &str) -> Option<P> {
        let payload: P = match serde_json::from_str(raw) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "Callback data does not match payload schema");
                return None;
            }
        };

        if let Some(validator) = &self.validator
            && !validator(&payload)
        {
            debug!("Callback payload rejected by validator");
            return None;
        }

        Some(payload)
    }

    fn lookup_handler(&self, payload: &P) -> Option<BoxedCallbackHandler<P, S>> {
        let tag = self.discriminant(payload)?;
        let handler = self.handlers.get(&tag).cloned();
        trace!(tag = %tag, found = handler.is_some(), "Callback handler lookup");
        handler
    }
}

impl<P, S> fmt::Debug for JsonCallbackCodec<P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCallbackCodec")
            .field("tag_field", &self.tag_field)
            .field("max_len", &self.max_len)
            .field("has_validator", &self.validator.is_some())
            .field("handler_count", &self.handlers.len())
            .finish()
    }
}
