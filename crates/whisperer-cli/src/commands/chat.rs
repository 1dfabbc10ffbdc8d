use std::io::Write;

use anyhow::Result;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use whisperer_client::{ChatLog, ChatMessage, ClientError, Conversation, MessageRole, Route};

use crate::cli::{ChatArgs, OutputFormat};
use crate::client::AppContext;
use crate::output::{print_json, print_table, print_warning};

pub async fn chat(ctx: &AppContext, args: &ChatArgs) -> Result<()> {
    let (token, user) = ctx.require(Route::Chat).await?;
    let mut log = ChatLog::new();

    if let Some(message) = &args.message {
        let reply = send(ctx, &token, &mut log, message).await;
        if ctx.format == OutputFormat::Json {
            return print_json(&reply);
        }
        print_message(&reply);
        return Ok(());
    }

    println!(
        "Chatting as {}. Commands: {}",
        user.name.cyan(),
        "/new /list /open <n> /rename <n> <title> /delete <n> /quit".dimmed()
    );
    log.start_conversation();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".green().bold());
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match Command::parse(line) {
            Command::Quit => break,
            Command::New => {
                log.start_conversation();
                println!("Started a new conversation.");
            }
            Command::List => list(&log),
            Command::Open(n) => match nth(&log, n).map(|c| c.id) {
                Some(id) if log.select(id) => show_conversation(&log),
                _ => print_warning(&format!("No conversation #{n}")),
            },
            Command::Rename(n, title) => match nth(&log, n).map(|c| c.id) {
                Some(id) if log.rename(id, title) => println!("Renamed #{n}."),
                _ => print_warning(&format!("No conversation #{n}")),
            },
            Command::Delete(n) => match nth(&log, n).map(|c| c.id) {
                Some(id) if log.delete(id) => {
                    println!("Deleted #{n}.");
                    if log.active().is_none() {
                        log.start_conversation();
                    }
                }
                _ => print_warning(&format!("No conversation #{n}")),
            },
            Command::Unknown(cmd) => print_warning(&format!("Unknown command: {cmd}")),
            Command::Message(text) => {
                let reply = send(ctx, &token, &mut log, text).await;
                print_message(&reply);
            }
        }
    }
    Ok(())
}

async fn send(ctx: &AppContext, token: &str, log: &mut ChatLog, text: &str) -> ChatMessage {
    log.push_user_message(text);
    match ctx.api.send_chat(token, text).await {
        Ok(reply) => log.push_reply(Ok(reply)),
        Err(err) => {
            tracing::warn!(category = %err.category(), error = %err, "chat request failed");
            if matches!(err, ClientError::QuotaExceeded { .. }) {
                print_warning("You have used up your monthly token budget.");
            }
            log.push_reply(Err(&err))
        }
    }
}

fn print_message(message: &ChatMessage) {
    match message.role {
        MessageRole::User => println!("{} {}", "you:".bold(), message.content),
        MessageRole::Assistant => println!("{} {}", "whisperer:".cyan().bold(), message.content),
    }
}

fn list(log: &ChatLog) {
    if log.conversations().is_empty() {
        println!("No conversations yet.");
        return;
    }
    let active = log.active().map(|c| c.id);
    print_table(
        &["#", "Title", "Messages", ""],
        log.conversations().iter().enumerate().map(|(i, c)| {
            vec![
                (i + 1).to_string(),
                c.title.clone(),
                c.messages.len().to_string(),
                if Some(c.id) == active { "*".to_string() } else { String::new() },
            ]
        }),
    );
}

fn show_conversation(log: &ChatLog) {
    if let Some(conv) = log.active() {
        println!("{}", conv.title.bold());
        conv.messages.iter().for_each(print_message);
    }
}

/// Conversation number `n` as shown by `/list`, counting from 1.
fn nth(log: &ChatLog, n: usize) -> Option<&Conversation> {
    n.checked_sub(1).and_then(|i| log.conversations().get(i))
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Quit,
    New,
    List,
    Open(usize),
    Rename(usize, &'a str),
    Delete(usize),
    Unknown(&'a str),
    Message(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Message(line);
        };
        let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));
        let arg = arg.trim();
        let index = || arg.split_whitespace().next().and_then(|n| n.parse().ok());
        match name {
            "quit" | "exit" => Self::Quit,
            "new" => Self::New,
            "list" => Self::List,
            "open" => index().map_or(Self::Unknown(line), Self::Open),
            "delete" => index().map_or(Self::Unknown(line), Self::Delete),
            "rename" => match arg.split_once(' ') {
                Some((n, title)) if !title.trim().is_empty() => n
                    .parse()
                    .map_or(Self::Unknown(line), |n| Self::Rename(n, title.trim())),
                _ => Self::Unknown(line),
            },
            _ => Self::Unknown(line),
        }
    }
}
