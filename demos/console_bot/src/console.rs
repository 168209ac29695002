//! A terminal stand-in for a chat platform.
//!
//! Outgoing calls are printed; stdin lines become incoming updates. A line of
//! the form `!cb <data>` presses a button on the last message the bot sent.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use switchyard::core::{
    ApiResult, Bot, BotCommand, CallbackAnswer, CallbackQuery, ChatId, InlineKeyboard, Message,
    MessageId, SendOptions, Update, User,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

const CONSOLE_CHAT: ChatId = 1;

/// Prints every API call to stdout.
#[derive(Debug)]
pub struct ConsoleBot {
    next_message_id: AtomicI64,
    last_sent: Mutex<Option<Message>>,
}

impl ConsoleBot {
    pub fn new() -> Self {
        Self {
            next_message_id: AtomicI64::new(1000),
            last_sent: Mutex::new(None),
        }
    }

    fn record_sent(&self, chat_id: ChatId, text: &str) -> Message {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let message = Message::new(id, chat_id).with_text(text);
        *self.last_sent.lock() = Some(message.clone());
        message
    }

    fn last_sent(&self) -> Option<Message> {
        self.last_sent.lock().clone()
    }
}

impl Default for ConsoleBot {
    fn default() -> Self {
        Self::new()
    }
}

fn print_keyboard(keyboard: Option<&InlineKeyboard>) {
    let Some(keyboard) = keyboard else { return };
    for row in &keyboard.inline_keyboard {
        let labels: Vec<_> = row
            .iter()
            .map(|b| format!("[{}] !cb {}", b.text, b.callback_data))
            .collect();
        println!("    {}", labels.join("   "));
    }
}

#[async_trait]
impl Bot for ConsoleBot {
    fn id(&self) -> &str {
        "console"
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        options: &SendOptions,
    ) -> ApiResult<Message> {
        match options.reply_to_message_id {
            Some(reply_to) => println!("bot (re #{reply_to})> {text}"),
            None => println!("bot> {text}"),
        }
        print_keyboard(options.reply_markup.as_ref());
        Ok(self.record_sent(chat_id, text))
    }

    async fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        reply_markup: Option<&InlineKeyboard>,
    ) -> ApiResult<()> {
        println!("bot (edit #{message_id})> {text}");
        print_keyboard(reply_markup);
        *self.last_sent.lock() = Some(Message::new(message_id, chat_id).with_text(text));
        Ok(())
    }

    async fn send_sticker(
        &self,
        chat_id: ChatId,
        sticker: &str,
        _options: &SendOptions,
    ) -> ApiResult<Message> {
        println!("bot> <sticker {sticker}>");
        Ok(self.record_sent(chat_id, sticker))
    }

    async fn answer_callback_query(
        &self,
        query_id: &str,
        answer: &CallbackAnswer,
    ) -> ApiResult<()> {
        match &answer.text {
            Some(text) => println!("bot (toast)> {text}"),
            None => debug!(query_id, "Callback acknowledged"),
        }
        Ok(())
    }

    async fn set_my_commands(&self, commands: &[BotCommand]) -> ApiResult<()> {
        println!("Commands:");
        for cmd in commands {
            println!("  /{:<8} {}", cmd.command, cmd.description);
        }
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Reads stdin until EOF, turning each line into an update from `user`.
pub async fn read_updates(bot: Arc<ConsoleBot>, user: User, tx: mpsc::UnboundedSender<Update>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut next_id: i64 = 1;

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        next_id += 1;

        let update = match line.strip_prefix("!cb") {
            Some(data) => {
                let mut query = CallbackQuery::new(next_id.to_string(), user.clone());
                if let Some(message) = bot.last_sent() {
                    query = query.with_message(message);
                }
                let data = data.trim();
                if !data.is_empty() {
                    query = query.with_data(data);
                }
                Update::CallbackQuery(query)
            }
            None => Update::Message(
                Message::new(next_id, CONSOLE_CHAT)
                    .from_user(user.clone())
                    .with_text(line),
            ),
        };

        if tx.send(update).is_err() {
            break;
        }
    }
}
