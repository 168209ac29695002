//! The response contract and the reference response shapes.
//!
//! Handlers return values implementing [`Response`]. The dispatcher never
//! inspects a response; it only asks it to deliver itself, either as a reply
//! to a message or as the answer to a callback query.
//!
//! ```rust,ignore
//! async fn start(ctx: MessageContext<()>) -> TextResponse {
//!     TextResponse::new("Welcome!")
//! }
//! ```

use async_trait::async_trait;

use crate::bot::{Bot, CallbackAnswer, InlineKeyboard, ParseMode, SendOptions};
use crate::error::{ApiError, ApiResult};
use crate::event::{CallbackQuery, ChatId, Message, MessageId};

/// A deliverable handler result.
///
/// Only [`send`](Self::send) and [`edit`](Self::edit) are required. The two
/// `respond_*` operations default to sending into the originating chat; a
/// callback response first issues the empty acknowledgment so the query is
/// always answered exactly once.
#[async_trait]
pub trait Response: Send + Sync {
    /// Sends the response as a new message.
    async fn send(
        &self,
        chat_id: ChatId,
        bot: &dyn Bot,
        reply_to_message_id: Option<MessageId>,
    ) -> ApiResult<()>;

    /// Replaces the content of `message` with this response.
    async fn edit(&self, message: &Message, bot: &dyn Bot) -> ApiResult<()>;

    /// Delivers the response as a reply to an incoming message.
    async fn respond_to_message(&self, message: &Message, bot: &dyn Bot) -> ApiResult<()> {
        self.send(message.chat_id(), bot, None).await
    }

    /// Delivers the response as the answer to a callback query.
    async fn respond_to_callback_query(&self, query: &CallbackQuery, bot: &dyn Bot) -> ApiResult<()> {
        bot.answer_callback_query(&query.id, &CallbackAnswer::empty())
            .await?;
        match &query.message {
            Some(message) => self.send(message.chat_id(), bot, None).await,
            None => Ok(()),
        }
    }
}

/// A type-erased response.
pub type BoxedResponse = Box<dyn Response>;

#[async_trait]
impl<R: Response + ?Sized> Response for Box<R> {
    async fn send(
        &self,
        chat_id: ChatId,
        bot: &dyn Bot,
        reply_to_message_id: Option<MessageId>,
    ) -> ApiResult<()> {
        (**self).send(chat_id, bot, reply_to_message_id).await
    }

    async fn edit(&self, message: &Message, bot: &dyn Bot) -> ApiResult<()> {
        (**self).edit(message, bot).await
    }

    async fn respond_to_message(&self, message: &Message, bot: &dyn Bot) -> ApiResult<()> {
        (**self).respond_to_message(message, bot).await
    }

    async fn respond_to_callback_query(&self, query: &CallbackQuery, bot: &dyn Bot) -> ApiResult<()> {
        (**self).respond_to_callback_query(query, bot).await
    }
}

// ============================================================================
// TextResponse
// ============================================================================

/// A text message, optionally with an inline keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextResponse {
    text: String,
    parse_mode: Option<ParseMode>,
    keyboard: Option<InlineKeyboard>,
    quote: bool,
    edit_on_callback: bool,
    notice: Option<String>,
}

impl TextResponse {
    /// Creates a plain text response.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: None,
            keyboard: None,
            quote: false,
            edit_on_callback: false,
            notice: None,
        }
    }

    /// Sets the formatting mode.
    pub fn parse_mode(mut self, mode: ParseMode) -> Self {
        self.parse_mode = Some(mode);
        self
    }

    /// Attaches an inline keyboard.
    pub fn keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    /// Quote the incoming message when replying to it.
    pub fn quote(mut self) -> Self {
        self.quote = true;
        self
    }

    /// When answering a callback query, edit the message carrying the
    /// keyboard instead of sending a new one.
    pub fn edit_on_callback(mut self) -> Self {
        self.edit_on_callback = true;
        self
    }

    /// Toast shown to the user when answering a callback query.
    pub fn notice(mut self, text: impl Into<String>) -> Self {
        self.notice = Some(text.into());
        self
    }

    /// Returns the message text.
    pub fn text(&self) -> &str {
        &self.text
    }

    fn options(&self, reply_to_message_id: Option<MessageId>) -> SendOptions {
        SendOptions {
            reply_to_message_id,
            parse_mode: self.parse_mode,
            reply_markup: self.keyboard.clone(),
        }
    }
}

#[async_trait]
impl Response for TextResponse {
    async fn send(
        &self,
        chat_id: ChatId,
        bot: &dyn Bot,
        reply_to_message_id: Option<MessageId>,
    ) -> ApiResult<()> {
        bot.send_message(chat_id, &self.text, &self.options(reply_to_message_id))
            .await?;
        Ok(())
    }

    async fn edit(&self, message: &Message, bot: &dyn Bot) -> ApiResult<()> {
        bot.edit_message_text(
            message.chat_id(),
            message.message_id,
            &self.text,
            self.keyboard.as_ref(),
        )
        .await
    }

    async fn respond_to_message(&self, message: &Message, bot: &dyn Bot) -> ApiResult<()> {
        let reply_to = self.quote.then_some(message.message_id);
        self.send(message.chat_id(), bot, reply_to).await
    }

    async fn respond_to_callback_query(&self, query: &CallbackQuery, bot: &dyn Bot) -> ApiResult<()> {
        let answer = match &self.notice {
            Some(text) => CallbackAnswer::notice(text.clone()),
            None => CallbackAnswer::empty(),
        };
        bot.answer_callback_query(&query.id, &answer).await?;

        match &query.message {
            Some(message) if self.edit_on_callback => self.edit(message, bot).await,
            Some(message) => self.send(message.chat_id(), bot, None).await,
            None => Ok(()),
        }
    }
}

// ============================================================================
// StickerResponse
// ============================================================================

/// A sticker, identified by its platform file id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickerResponse {
    file_id: String,
}

impl StickerResponse {
    /// Creates a sticker response.
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
        }
    }
}

#[async_trait]
impl Response for StickerResponse {
    async fn send(
        &self,
        chat_id: ChatId,
        bot: &dyn Bot,
        reply_to_message_id: Option<MessageId>,
    ) -> ApiResult<()> {
        let options = SendOptions {
            reply_to_message_id,
            ..SendOptions::default()
        };
        bot.send_sticker(chat_id, &self.file_id, &options).await?;
        Ok(())
    }

    async fn edit(&self, _message: &Message, _bot: &dyn Bot) -> ApiResult<()> {
        Err(ApiError::Unsupported("stickers cannot replace message content"))
    }
}
