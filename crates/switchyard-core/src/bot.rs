//! Bot trait and outbound API types.
//!
//! The [`Bot`] trait is the seam between the dispatcher and the chat-platform
//! transport. Transports implement it on top of their HTTP client; the
//! dispatcher and [`Response`](crate::Response) implementations only ever talk
//! to the platform through it.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::event::{BotCommand, ChatId, Message, MessageId};

// ============================================================================
// Outbound API types
// ============================================================================

/// A single inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    /// Button label.
    pub text: String,
    /// Token sent back in [`CallbackQuery::data`](crate::CallbackQuery::data) on press.
    pub callback_data: String,
}

impl InlineButton {
    /// Creates a callback button.
    pub fn callback(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// An inline keyboard attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboard {
    /// Rows of buttons, top to bottom.
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    /// Creates an empty keyboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row of buttons.
    pub fn row(mut self, buttons: impl IntoIterator<Item = InlineButton>) -> Self {
        self.inline_keyboard.push(buttons.into_iter().collect());
        self
    }
}

/// Text formatting mode for outgoing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    /// MarkdownV2 formatting.
    MarkdownV2,
    /// HTML formatting.
    #[serde(rename = "HTML")]
    Html,
}

/// Options for [`Bot::send_message`] and [`Bot::send_sticker`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Message to quote.
    pub reply_to_message_id: Option<MessageId>,
    /// Formatting mode.
    pub parse_mode: Option<ParseMode>,
    /// Keyboard to attach.
    pub reply_markup: Option<InlineKeyboard>,
}

/// Answer to a callback query.
///
/// The default value is the empty acknowledgment: it stops the client's
/// progress indicator without showing anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackAnswer {
    /// Notification text shown to the user.
    pub text: Option<String>,
    /// Show the text as a modal alert instead of a toast.
    pub show_alert: bool,
}

impl CallbackAnswer {
    /// The empty acknowledgment.
    pub fn empty() -> Self {
        Self::default()
    }

    /// An answer carrying a toast notification.
    pub fn notice(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            show_alert: false,
        }
    }

    /// Returns `true` for the empty acknowledgment.
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && !self.show_alert
    }
}

// ============================================================================
// Bot trait
// ============================================================================

/// The outbound half of a chat-platform transport.
///
/// All methods may fail; failures are propagated to the caller. The
/// dispatcher contains them through its error-recovery protocol.
#[async_trait]
pub trait Bot: Send + Sync {
    /// Returns the bot's identifier (typically its username).
    fn id(&self) -> &str;

    /// Sends a text message.
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        options: &SendOptions,
    ) -> ApiResult<Message>;

    /// Replaces the text (and keyboard) of a message previously sent by the bot.
    async fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        reply_markup: Option<&InlineKeyboard>,
    ) -> ApiResult<()>;

    /// Sends a sticker by file id.
    async fn send_sticker(
        &self,
        chat_id: ChatId,
        sticker: &str,
        options: &SendOptions,
    ) -> ApiResult<Message>;

    /// Answers a callback query.
    async fn answer_callback_query(&self, query_id: &str, answer: &CallbackAnswer)
    -> ApiResult<()>;

    /// Publishes the command list for client-side discovery.
    async fn set_my_commands(&self, commands: &[BotCommand]) -> ApiResult<()>;

    /// Returns self as an `Arc<dyn Any>` for downcasting.
    ///
    /// Implementors should simply return `self`.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A shared Bot trait object.
pub type BoxedBot = Arc<dyn Bot>;

/// Attempts to downcast a [`BoxedBot`] to a concrete transport type.
pub fn downcast_bot<T: Bot + 'static>(bot: BoxedBot) -> Option<Arc<T>> {
    Arc::downcast::<T>(bot.as_any()).ok()
}
