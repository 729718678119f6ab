//! Chat console - line-oriented front end for the chat sync engine
use anyhow::Context;
use bytes::Bytes;
use chat_sync_core::conversation::{render_items, separator_label, RenderItem};
use chat_sync_core::{
    ChatSync, ChatSyncHandle, ChatView, Config, Direction, HttpChatApi, LinkState, MessageId, NoticeLevel,
    OutgoingFile, SseTransport, ViewUpdate,
};
use chrono::Local;
use colored::*;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
  /list                 show conversations
  /open <id>            open a conversation
  /close                close it
  /reply <msg-id> <text>
  /retry <local-id>     re-send a failed message
  /file <path>          send an attachment
  /download <msg-id> <path>
  /pic <id>             load a profile picture URL
  /refresh              re-fetch everything
  /hide, /show          simulate the view going to the background
  /status               connection state
  /quit
  anything else is sent as text to the open conversation";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let api = Arc::new(HttpChatApi::new(&config)?);
    let transport = Arc::new(SseTransport::new(&config)?);
    info!("💬 Chat console for {}", config.base_url);

    let chat = ChatSync::spawn(config, api, transport);
    let mut updates = chat.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", "Type /help for commands".dimmed());

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match run_command(&chat, line.trim()).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => eprintln!("{} {}", "✗".red().bold(), e.to_string().red()),
                }
            }
            update = updates.recv() => match update {
                Ok(update) => render(&chat, update).await,
                Err(RecvError::Lagged(n)) => eprintln!("{}", format!("(skipped {} updates)", n).dimmed()),
                Err(RecvError::Closed) => break,
            },
        }
    }

    chat.shutdown().await.ok();
    Ok(())
}

/// Returns `false` to quit
async fn run_command(chat: &ChatSyncHandle, line: &str) -> anyhow::Result<bool> {
    if line.is_empty() {
        return Ok(true);
    }
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match command {
        "/quit" | "/exit" => return Ok(false),
        "/help" => println!("{}", HELP),
        "/list" => print_chat_list(&chat.snapshot().await?),
        "/open" if !rest.is_empty() => chat.open_conversation(rest)?,
        "/close" => chat.close_conversation()?,
        "/refresh" => chat.refresh()?,
        "/hide" => chat.set_visible(false)?,
        "/show" => chat.set_visible(true)?,
        "/pic" if !rest.is_empty() => chat.request_profile_pic(rest)?,
        "/status" => {
            let status = chat.snapshot().await?.connection;
            println!(
                "{:?}, {} failed attempts{}",
                status.state,
                status.attempts,
                if status.fallback { ", polling" } else { "" }
            );
        }
        "/retry" if !rest.is_empty() => chat.retry_send(MessageId::new(rest)).await?,
        "/reply" => {
            let (target, text) = rest
                .split_once(' ')
                .context("usage: /reply <msg-id> <text>")?;
            chat.send_reply(text, MessageId::new(target)).await?;
        }
        "/file" if !rest.is_empty() => {
            let path = Path::new(rest);
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {}", rest))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| rest.to_string());
            let file = OutgoingFile::new(name, guess_mime(path), Bytes::from(bytes));
            chat.send_file(file).await?;
            println!("{} File sent", "✓".green().bold());
        }
        "/download" => {
            let (id, target) = rest
                .split_once(' ')
                .context("usage: /download <msg-id> <path>")?;
            let bytes = chat.download(&MessageId::new(id)).await?;
            tokio::fs::write(target, &bytes).await?;
            println!("{} Saved {} bytes to {}", "✓".green().bold(), bytes.len(), target);
        }
        other if other.starts_with('/') => {
            eprintln!("{} Unknown command: {}", "✗".red().bold(), other.red());
        }
        _ => {
            chat.send_text(line).await?;
        }
    }
    Ok(true)
}

async fn render(chat: &ChatSyncHandle, update: ViewUpdate) {
    match update {
        ViewUpdate::Notice(notice) => {
            let text = match notice.level {
                NoticeLevel::Info => notice.text.normal(),
                NoticeLevel::Warning => notice.text.yellow(),
                NoticeLevel::Error => notice.text.red().bold(),
            };
            println!("{} {}", "!".yellow().bold(), text);
        }
        ViewUpdate::Connection(status) => {
            let label = match status.state {
                LinkState::Connected => "● live".green(),
                LinkState::Connecting => "◌ connecting".yellow(),
                LinkState::Idle | LinkState::Disconnected => "○ offline".red(),
                LinkState::Closed => "○ closed".dimmed(),
            };
            let fallback = if status.fallback { " (polling)" } else { "" };
            println!("[{}{}]", label, fallback.dimmed());
        }
        ViewUpdate::ChatList => {
            if let Ok(view) = chat.snapshot().await {
                print_chat_list(&view);
            }
        }
        ViewUpdate::Conversation(_) => {
            if let Ok(view) = chat.snapshot().await {
                print_conversation(&view);
            }
        }
    }
}

fn print_chat_list(view: &ChatView) {
    println!("{} ({} unread)", "Chats".bold(), view.total_unread);
    for conv in view.conversations.iter().take(15) {
        let marker = if view.open.as_ref() == Some(&conv.id) { "›" } else { " " };
        let unread = if conv.unread > 0 {
            format!(" ({})", conv.unread).green().bold().to_string()
        } else {
            String::new()
        };
        let preview = conv
            .preview
            .as_ref()
            .map(|p| match p.status_icon() {
                Some(icon) => format!("{} {}", icon, p.text),
                None => p.text.clone(),
            })
            .unwrap_or_default();
        println!(
            "{} {}{}  {}  {}",
            marker,
            conv.name.cyan(),
            unread,
            preview.dimmed(),
            conv.id.as_str().dimmed()
        );
    }
}

fn print_conversation(view: &ChatView) {
    let Some(open) = &view.open else {
        println!("{}", "(no conversation open)".dimmed());
        return;
    };
    let title = view
        .conversation(open)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| open.phone().to_string());
    println!("── {} ──", title.bold());
    if !view.messages_loaded && view.messages.is_empty() {
        println!("{}", "loading…".dimmed());
        return;
    }

    let today = Local::now().date_naive();
    // Only the tail fits on a terminal
    let start = view.messages.len().saturating_sub(20);
    for item in render_items(&view.messages[start..], &Local) {
        match item {
            RenderItem::DateSeparator(day) => {
                println!("{}", format!("   · {} ·", separator_label(day, today)).dimmed());
            }
            RenderItem::Message(msg) => {
                let time = msg.timestamp.with_timezone(&Local).format("%H:%M");
                let body = msg.content.preview_text();
                match msg.direction {
                    Direction::Inbound => println!("  {} {}", time.to_string().dimmed(), body),
                    Direction::Outbound => {
                        let status = if msg.send_failed {
                            format!("✗ failed, /retry {}", msg.id).red().to_string()
                        } else {
                            msg.status.icon().to_string()
                        };
                        println!("  {} {} {}", time.to_string().dimmed(), body.blue(), status);
                    }
                }
            }
        }
    }
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "ogg" | "opus" => "audio/ogg",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
