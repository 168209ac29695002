//! In-memory [`Bot`] that records every API call.
//!
//! Enabled for this crate's tests and, through the `testing` feature, for the
//! tests of downstream crates.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::bot::{Bot, CallbackAnswer, InlineKeyboard, SendOptions};
use crate::error::{ApiError, ApiResult};
use crate::event::{BotCommand, Chat, ChatId, Message, MessageId};

/// One recorded API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCall {
    SendMessage {
        chat_id: ChatId,
        text: String,
        reply_to_message_id: Option<MessageId>,
    },
    EditMessageText {
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
    },
    SendSticker {
        chat_id: ChatId,
        file_id: String,
    },
    AnswerCallbackQuery {
        query_id: String,
        text: Option<String>,
    },
    SetMyCommands(Vec<BotCommand>),
}

/// A bot that records calls instead of talking to a platform.
///
/// Failure injection: with `fail_sends` set, message sends and edits fail with
/// [`ApiError::NotConnected`]; with `fail_answers` set, callback answers fail.
/// Failed calls are not recorded.
#[derive(Debug, Default)]
pub struct RecordingBot {
    calls: Mutex<Vec<BotCall>>,
    fail_sends: AtomicBool,
    fail_answers: AtomicBool,
    next_message_id: AtomicI64,
}

impl RecordingBot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a new recording bot in an `Arc`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_answers(&self, fail: bool) {
        self.fail_answers.store(fail, Ordering::SeqCst);
    }

    /// Returns a snapshot of all recorded calls, oldest first.
    pub fn calls(&self) -> Vec<BotCall> {
        self.calls.lock().clone()
    }

    /// Texts of all sent messages.
    pub fn sent_texts(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                BotCall::SendMessage { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of callback answers issued.
    pub fn answer_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, BotCall::AnswerCallbackQuery { .. }))
            .count()
    }

    fn record(&self, call: BotCall) {
        self.calls.lock().push(call);
    }

    fn check_sends(&self) -> ApiResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            Err(ApiError::NotConnected)
        } else {
            Ok(())
        }
    }

    fn sent_message(&self, chat_id: ChatId) -> Message {
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        Message {
            message_id: id,
            chat: Chat::private(chat_id),
            from: None,
            date: 0,
            text: None,
        }
    }
}

#[async_trait]
impl Bot for RecordingBot {
    fn id(&self) -> &str {
        "recording-bot"
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        options: &SendOptions,
    ) -> ApiResult<Message> {
        self.check_sends()?;
        self.record(BotCall::SendMessage {
            chat_id,
            text: text.to_string(),
            reply_to_message_id: options.reply_to_message_id,
        });
        Ok(self.sent_message(chat_id).with_text(text))
    }

    async fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        _reply_markup: Option<&InlineKeyboard>,
    ) -> ApiResult<()> {
        self.check_sends()?;
        self.record(BotCall::EditMessageText {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_sticker(
        &self,
        chat_id: ChatId,
        sticker: &str,
        _options: &SendOptions,
    ) -> ApiResult<Message> {
        self.check_sends()?;
        self.record(BotCall::SendSticker {
            chat_id,
            file_id: sticker.to_string(),
        });
        Ok(self.sent_message(chat_id))
    }

    async fn answer_callback_query(
        &self,
        query_id: &str,
        answer: &CallbackAnswer,
    ) -> ApiResult<()> {
        if self.fail_answers.load(Ordering::SeqCst) {
            return Err(ApiError::NotConnected);
        }
        self.record(BotCall::AnswerCallbackQuery {
            query_id: query_id.to_string(),
            text: answer.text.clone(),
        });
        Ok(())
    }

    async fn set_my_commands(&self, commands: &[BotCommand]) -> ApiResult<()> {
        self.check_sends()?;
        self.record(BotCall::SetMyCommands(commands.to_vec()));
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
