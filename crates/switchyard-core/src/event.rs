//! Inbound platform event types.
//!
//! These mirror the subset of the Telegram Bot API update objects that the
//! dispatcher consumes. Field names follow the wire format so that a transport
//! can deserialize updates straight into these types:
//!
//! ```text
//! Update
//! ├── Update::Message(Message { message_id, chat, from?, text? })
//! └── Update::CallbackQuery(CallbackQuery { id, from, message?, data? })
//! ```
//!
//! All event types are read-only to the dispatcher.

use serde::{Deserialize, Serialize};

/// Platform user identifier.
pub type UserId = i64;

/// Platform chat identifier.
pub type ChatId = i64;

/// Message identifier, unique within a chat.
pub type MessageId = i64;

// ============================================================================
// User / Chat
// ============================================================================

/// The sender of a message or callback query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier.
    pub id: UserId,

    /// Whether the account belongs to a bot.
    #[serde(default)]
    pub is_bot: bool,

    /// Display name.
    #[serde(default)]
    pub first_name: String,

    /// Public handle, without the leading `@`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl User {
    /// Creates a user with no handle.
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            is_bot: false,
            first_name: String::new(),
            username: None,
        }
    }

    /// Sets the user's handle.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Returns the user's handle, if any.
    pub fn handle(&self) -> Option<&str> {
        self.username.as_deref()
    }
}

/// The chat a message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Unique chat identifier.
    pub id: ChatId,

    /// Chat type (`private`, `group`, `supergroup` or `channel`).
    #[serde(rename = "type", default = "default_chat_kind")]
    pub kind: String,
}

fn default_chat_kind() -> String {
    "private".to_string()
}

impl Chat {
    /// Creates a private chat.
    pub fn private(id: ChatId) -> Self {
        Self {
            id,
            kind: default_chat_kind(),
        }
    }
}

// ============================================================================
// Message
// ============================================================================

/// An incoming (or previously sent) chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier of the message inside its chat.
    pub message_id: MessageId,

    /// The chat the message was posted in.
    pub chat: Chat,

    /// Sender; absent for channel posts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,

    /// Unix timestamp of the message.
    #[serde(default)]
    pub date: i64,

    /// Text content, for text messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Message {
    /// Creates an empty message in a private chat.
    pub fn new(message_id: MessageId, chat_id: ChatId) -> Self {
        Self {
            message_id,
            chat: Chat::private(chat_id),
            from: None,
            date: 0,
            text: None,
        }
    }

    /// Sets the sender.
    pub fn from_user(mut self, user: User) -> Self {
        self.from = Some(user);
        self
    }

    /// Sets the text content.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Returns the sender, if any.
    pub fn sender(&self) -> Option<&User> {
        self.from.as_ref()
    }

    /// Returns the text content, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Returns the chat identifier.
    pub fn chat_id(&self) -> ChatId {
        self.chat.id
    }
}

// ============================================================================
// CallbackQuery
// ============================================================================

/// A button press on an inline keyboard.
///
/// Every callback query must eventually be answered, otherwise the platform
/// client keeps showing a progress indicator on the pressed button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackQuery {
    /// Identifier used to answer the query.
    pub id: String,

    /// The user who pressed the button.
    pub from: User,

    /// The message carrying the keyboard; absent when it is too old.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,

    /// Opaque token attached to the button.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl CallbackQuery {
    /// Creates a callback query with no message and no data.
    pub fn new(id: impl Into<String>, from: User) -> Self {
        Self {
            id: id.into(),
            from,
            message: None,
            data: None,
        }
    }

    /// Attaches the originating message.
    pub fn with_message(mut self, message: Message) -> Self {
        self.message = Some(message);
        self
    }

    /// Attaches the raw callback token.
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}

// ============================================================================
// Update
// ============================================================================

/// A single inbound event delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Update {
    /// A new message.
    Message(Message),
    /// A button press.
    CallbackQuery(CallbackQuery),
}

impl Update {
    /// Short name of the event kind, used in log spans.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::CallbackQuery(_) => "callback_query",
        }
    }

    /// Returns the user that triggered the event, if known.
    pub fn sender(&self) -> Option<&User> {
        match self {
            Self::Message(message) => message.sender(),
            Self::CallbackQuery(query) => Some(&query.from),
        }
    }
}

impl From<Message> for Update {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

impl From<CallbackQuery> for Update {
    fn from(query: CallbackQuery) -> Self {
        Self::CallbackQuery(query)
    }
}

// ============================================================================
// BotCommand
// ============================================================================

/// An entry of the command table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotCommand {
    /// The exact command token, e.g. `/start`.
    pub command: String,
    /// Human-readable description shown by the platform client.
    pub description: String,
}

impl BotCommand {
    /// Creates a command table entry.
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}
