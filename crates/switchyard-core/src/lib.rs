//! # Switchyard Core
//!
//! Platform-facing building blocks of the Switchyard dispatcher.
//!
//! This crate has no routing logic of its own. It defines:
//!
//! - **Events**: the inbound shapes consumed by the dispatcher ([`Update`],
//!   [`Message`], [`CallbackQuery`], [`User`])
//! - **Transport seam**: the [`Bot`] trait every chat-platform client implements
//! - **Response contract**: the [`Response`] trait handler results satisfy,
//!   plus two reference shapes ([`TextResponse`], [`StickerResponse`])
//! - **Errors**: [`ApiError`] for failed platform calls
//!
//! ```text
//! ┌───────────┐  Update   ┌────────────┐  Response  ┌───────────┐
//! │ Transport │──────────▶│ Dispatcher │───────────▶│    Bot    │
//! └───────────┘           └────────────┘            └───────────┘
//! ```

pub mod bot;
pub mod error;
pub mod event;
pub mod response;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bot::{
    Bot, BoxedBot, CallbackAnswer, InlineButton, InlineKeyboard, ParseMode, SendOptions,
    downcast_bot,
};
pub use error::{ApiError, ApiResult, BoxError};
pub use event::{
    BotCommand, CallbackQuery, Chat, ChatId, Message, MessageId, Update, User, UserId,
};
pub use response::{BoxedResponse, Response, StickerResponse, TextResponse};
