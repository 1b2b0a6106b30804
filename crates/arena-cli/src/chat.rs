//! Interactive chat loop

use std::sync::Arc;

use anyhow::{Context, Result};
use coordination::{ArenaSession, SessionError, Theme};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

use crate::render::{format_message, spawn_observer, wait_rendered, Palette};

const HELP: &str = "\
Commands:
  /history        show the whole conversation
  /clear          delete the history (asks first)
  /theme [mode]   dark, light, or toggle when omitted
  /logout         forget your name and leave
  /quit           leave the arena
Anything else is sent to every responder.";

/// A parsed line of input
#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Send(&'a str),
    History,
    Clear,
    Theme(Option<&'a str>),
    Logout,
    Quit,
    Help,
    Unknown(&'a str),
    Blank,
}

impl<'a> Input<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Blank;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Send(line);
        };

        let mut parts = command.split_whitespace();
        match parts.next().unwrap_or_default() {
            "history" => Self::History,
            "clear" => Self::Clear,
            "theme" => Self::Theme(parts.next()),
            "logout" => Self::Logout,
            "quit" | "exit" => Self::Quit,
            "help" | "?" => Self::Help,
            other => Self::Unknown(other),
        }
    }
}

type InputLines = Lines<BufReader<Stdin>>;

/// Run the chat loop until the user quits or stdin closes
pub async fn run(session: Arc<ArenaSession>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if session.current_user().is_none() && !prompt_login(&session, &mut lines).await? {
        return Ok(());
    }

    let _sync = session.spawn_sync();
    let (observer, rendered) = spawn_observer(&session);

    let user = session.current_user().unwrap_or_default();
    println!(
        "Welcome to the arena, {user}. {} responders are ready: {}",
        session.registry().len(),
        session
            .registry()
            .iter()
            .map(|r| r.display_name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Type /help for commands.");
    print_history(&session);

    loop {
        prompt("> ").await?;
        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };

        match Input::parse(&line) {
            Input::Blank => {}
            Input::Send(query) => match session.send(query).await {
                Ok(_) => wait_rendered(&rendered).await,
                Err(SessionError::NotLoggedIn) => {
                    println!("You are logged out.");
                    break;
                }
                Err(e) => println!("{e}"),
            },
            Input::History => print_history(&session),
            Input::Clear => {
                let confirmed = confirm(&mut lines, "Delete ALL chat history in the arena?").await?;
                if session.clear_history(|| confirmed) {
                    println!("History cleared.");
                }
            }
            Input::Theme(mode) => match apply_theme(&session, mode) {
                Ok(theme) => println!("Theme set to {theme}."),
                Err(e) => println!("{e}"),
            },
            Input::Logout => {
                session.logout();
                println!("Logged out. Your history is kept.");
                break;
            }
            Input::Quit => break,
            Input::Help => println!("{HELP}"),
            Input::Unknown(command) => println!("Unknown command /{command}. Type /help."),
        }
    }

    observer.abort();
    Ok(())
}

/// Ask for a name until one is accepted. Returns false if input ended.
async fn prompt_login(session: &ArenaSession, lines: &mut InputLines) -> Result<bool> {
    loop {
        prompt("Your name: ").await?;
        let Some(name) = lines.next_line().await.context("Failed to read input")? else {
            return Ok(false);
        };
        match session.login(&name) {
            Ok(_) => return Ok(true),
            Err(e) => println!("{e}"),
        }
    }
}

pub fn apply_theme(session: &ArenaSession, mode: Option<&str>) -> Result<Theme, SessionError> {
    match mode {
        None | Some("toggle") => Ok(session.toggle_theme()),
        Some(mode) => {
            let theme = mode.parse::<Theme>()?;
            session.set_theme(theme);
            Ok(theme)
        }
    }
}

pub fn print_history(session: &ArenaSession) {
    let palette = Palette::for_theme(session.theme());
    for message in session.history().load_all() {
        println!("{}", format_message(&message, session.registry(), palette));
    }
}

async fn confirm(lines: &mut InputLines, question: &str) -> Result<bool> {
    prompt(&format!("{question} [y/N] ")).await?;
    let answer = lines.next_line().await.context("Failed to read input")?;
    Ok(matches!(
        answer.as_deref().map(str::trim),
        Some("y") | Some("Y") | Some("yes")
    ))
}

async fn prompt(text: &str) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}
