//! Console Notes Bot
//!
//! A small notes bot running against the terminal instead of a chat platform.
//! It exercises the three routes of the dispatcher:
//!
//! ```text
//! /start, /new, /list      -> command table
//! <text> after /new        -> state handler "awaitingNote"
//! !cb {"type":"delete",..} -> callback handler "delete"
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package console-bot -- --user alice
//! cargo run --package console-bot -- --config demos/console_bot/switchyard.toml
//! ```

mod console;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use switchyard::prelude::*;
use switchyard::runtime::config::{ConfigLoader, validate_config};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::console::{ConsoleBot, read_updates};

#[derive(Debug, Parser)]
#[command(about = "A notes bot driven from the terminal")]
struct Args {
    /// Configuration file; defaults to searching `switchyard.toml`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Handle the console user talks as.
    #[arg(long, default_value = "console")]
    user: String,
}

// ============================================================================
// State and payloads
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Step {
    Idle,
    AwaitingNote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Notebook {
    state: Step,
    notes: Vec<String>,
}

impl Notebook {
    fn empty() -> Self {
        Self {
            state: Step::Idle,
            notes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum NoteAction {
    Delete { index: usize },
}

// ============================================================================
// Handlers
// ============================================================================

async fn start(_ctx: MessageContext<Notebook>) -> TextResponse {
    TextResponse::new("Hi! Use /new to write a note and /list to see them.")
}

async fn new_note(ctx: MessageContext<Notebook>) -> Result<TextResponse> {
    let Some(mut user_data) = ctx.user_data else {
        return Ok(TextResponse::new("Notes are unavailable."));
    };
    let mut notebook = user_data.record().clone();
    notebook.state = Step::AwaitingNote;
    user_data.update(notebook).await?;
    Ok(TextResponse::new("Send me the note text."))
}

async fn save_note(ctx: MessageContext<Notebook>) -> Result<TextResponse> {
    let text = ctx.message.text().unwrap_or_default().to_string();
    let Some(mut user_data) = ctx.user_data else {
        return Ok(TextResponse::new("Notes are unavailable."));
    };
    let mut notebook = user_data.record().clone();
    notebook.notes.push(text);
    notebook.state = Step::Idle;
    let count = notebook.notes.len();
    user_data.update(notebook).await?;
    Ok(TextResponse::new(format!("Saved. You have {count} note(s).")).quote())
}

fn render_notes(
    notebook: &Notebook,
    codec: &JsonCallbackCodec<NoteAction, Notebook>,
) -> Result<TextResponse> {
    if notebook.notes.is_empty() {
        return Ok(TextResponse::new("No notes yet."));
    }

    let mut keyboard = InlineKeyboard::new();
    let mut lines = Vec::with_capacity(notebook.notes.len());
    for (index, note) in notebook.notes.iter().enumerate() {
        lines.push(format!("{}. {note}", index + 1));
        let token = codec.encode(&NoteAction::Delete { index })?;
        keyboard = keyboard.row([InlineButton::callback(format!("Delete {}", index + 1), token)]);
    }
    Ok(TextResponse::new(lines.join("\n")).keyboard(keyboard))
}

async fn list_notes(ctx: MessageContext<Notebook>) -> Result<TextResponse> {
    let notebook = ctx
        .user_data
        .map(|data| data.into_record())
        .unwrap_or_else(Notebook::empty);
    render_notes(&notebook, &JsonCallbackCodec::new())
}

async fn delete_note(ctx: CallbackContext<NoteAction, Notebook>) -> Result<TextResponse> {
    let NoteAction::Delete { index } = ctx.data;
    let Some(mut user_data) = ctx.user_data else {
        return Ok(TextResponse::new("Notes are unavailable.").notice("Nothing to delete"));
    };
    let mut notebook = user_data.record().clone();
    if index >= notebook.notes.len() {
        anyhow::bail!("note {} no longer exists", index + 1);
    }
    notebook.notes.remove(index);
    user_data.update(notebook.clone()).await?;

    Ok(render_notes(&notebook, &JsonCallbackCodec::new())?
        .edit_on_callback()
        .notice("Deleted"))
}

async fn on_message_error(ctx: MessageErrorContext) -> TextResponse {
    TextResponse::new(format!("Sorry, that failed: {}", ctx.err))
}

async fn on_callback_error(_ctx: CallbackErrorContext) -> TextResponse {
    TextResponse::new("That button is out of date.").notice("Try /list again")
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    let mut config = loader.load()?;
    if config.bot.token.is_empty() {
        config.bot.token = "console".into();
    }
    if config.bot.commands.is_empty() {
        config.bot.commands = vec![
            BotCommand::new("/start", "Introduction"),
            BotCommand::new("/new", "Write a note"),
            BotCommand::new("/list", "Show your notes"),
        ];
    }
    validate_config(&config)?;
    init_from_config(&config.logging);

    let events = ErrorEvents::global();
    events.subscribe(|err| warn!(error = %err, "Response error"));

    let bot = Arc::new(ConsoleBot::new());
    let store = state_store(&config, |_| Notebook::empty())?.on_state("awaitingNote", save_note);
    let codec = callback_codec(&config).on("delete", delete_note);

    let dispatcher: Dispatcher<Notebook, NoteAction> = Dispatcher::builder(bot.clone())
        .with_config(&config)
        .on_command("/start", start)
        .on_command("/new", new_note)
        .on_command("/list", list_notes)
        .store(store)
        .codec(codec)
        .on_message_error(on_message_error)
        .on_callback_error(on_callback_error)
        .build()?;

    let (tx, rx) = mpsc::unbounded_channel();
    let user = User::new(1).with_username(args.user.trim_start_matches('@'));
    tokio::spawn(read_updates(bot, user, tx));

    info!("Type a message, or `!cb <data>` to press a button. Ctrl+D exits.");
    let runtime = Runtime::new(dispatcher).publish_commands(config.bot.publish_commands);
    runtime.run(rx).await?;

    Ok(())
}
