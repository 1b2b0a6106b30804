//! `arena` - terminal front end for the multi-persona chat arena

mod chat;
mod render;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use coordination::{ArenaConfig, ArenaSession, EventBus, FileStore, Storage};
use tracing::info;

use crate::render::{spawn_observer, wait_rendered};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to an arena TOML config (defaults and environment otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding user, history and theme (overrides ARENA_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive chat (default)
    Chat,
    /// Send one message to every responder and print the replies
    Ask {
        /// Message text
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Print the stored conversation
    History {
        /// Print raw JSON instead of formatted lines
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Delete the whole conversation
    Clear {
        /// Skip the confirmation prompt
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Set the display name used for your messages
    Login { name: String },
    /// Forget the display name; history is kept
    Logout,
    /// Show or change the color theme
    Theme {
        #[arg(value_enum)]
        mode: Option<ThemeMode>,
    },
    /// Run the provider proxy (POST /api/openai, /api/gemini, /api/grok)
    Serve {
        /// Listen address (overrides ARENA_PROXY_ADDR)
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ThemeMode {
    Dark,
    Light,
    Toggle,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Chat);

    // The proxy logs requests; interactive commands keep stderr quiet.
    let default_filter = if matches!(command, Command::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config =
        ArenaConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    match command {
        Command::Serve { addr } => serve(&config, addr).await,
        Command::Chat => chat::run(open_session(&config)?).await,
        Command::Ask { query } => ask(open_session(&config)?, &query.join(" ")).await,
        Command::History { json } => {
            let session = open_session(&config)?;
            if json {
                let history = session.history().load_all();
                println!("{}", serde_json::to_string_pretty(&history)?);
            } else {
                chat::print_history(&session);
            }
            Ok(())
        }
        Command::Clear { yes } => {
            let session = open_session(&config)?;
            let confirmed = yes || confirm_blocking("Delete ALL chat history in the arena?")?;
            if session.clear_history(|| confirmed) {
                println!("History cleared.");
            } else {
                println!("Nothing deleted.");
            }
            Ok(())
        }
        Command::Login { name } => {
            let session = open_session(&config)?;
            if !session.login(&name)?.is_persisted() {
                eprintln!("warning: name could not be saved and will be forgotten on exit");
            }
            println!("Logged in as {}.", name.trim());
            Ok(())
        }
        Command::Logout => {
            open_session(&config)?.logout();
            println!("Logged out.");
            Ok(())
        }
        Command::Theme { mode } => {
            let session = open_session(&config)?;
            let theme = match mode {
                None => session.theme(),
                Some(ThemeMode::Toggle) => chat::apply_theme(&session, None)?,
                Some(ThemeMode::Dark) => chat::apply_theme(&session, Some("dark"))?,
                Some(ThemeMode::Light) => chat::apply_theme(&session, Some("light"))?,
            };
            println!("Theme: {theme}");
            Ok(())
        }
    }
}

/// Open a session over the configured data directory
fn open_session(config: &ArenaConfig) -> Result<Arc<ArenaSession>> {
    let store = FileStore::open(config.data_dir.clone()).with_context(|| {
        format!("Failed to open data directory {}", config.data_dir.display())
    })?;
    let storage = Storage::new(Arc::new(store), EventBus::new().shared()).shared();
    let registry = config
        .build_registry()
        .context("Failed to build responder roster")?;

    info!(
        data_dir = %config.data_dir.display(),
        transport = %config.transport,
        "Opening arena session"
    );
    Ok(Arc::new(ArenaSession::open(config, registry, storage)))
}

async fn ask(session: Arc<ArenaSession>, query: &str) -> Result<()> {
    if session.current_user().is_none() {
        bail!("Not logged in. Run `arena login <name>` first.");
    }

    let (observer, rendered) = spawn_observer(&session);
    let report = session.send(query).await?;
    wait_rendered(&rendered).await;
    observer.abort();

    if !report.all_succeeded() {
        eprintln!("{} of {} responders fell back", report.failures.len(), report.messages.len());
    }
    Ok(())
}

async fn serve(config: &ArenaConfig, addr: Option<SocketAddr>) -> Result<()> {
    let addr = match addr {
        Some(addr) => addr,
        None => config
            .proxy_addr
            .parse()
            .with_context(|| format!("Invalid proxy address {}", config.proxy_addr))?,
    };

    coordination::proxy::serve(addr, config.proxy_state())
        .await
        .with_context(|| format!("Proxy server on {addr} failed"))
}

fn confirm_blocking(question: &str) -> Result<bool> {
    use std::io::{BufRead, Write};

    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{format_message, Palette};
    use coordination::{Message, Theme};
    use tempfile::TempDir;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["arena", "ask", "why", "is", "the", "sky", "blue"]).unwrap();
        match args.command {
            Some(Command::Ask { query }) => assert_eq!(query.join(" "), "why is the sky blue"),
            other => panic!("unexpected command: {other:?}"),
        }

        let args = Args::try_parse_from(["arena", "clear", "--yes", "--data-dir", "/tmp/x"]).unwrap();
        assert!(matches!(args.command, Some(Command::Clear { yes: true })));
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/x")));

        assert!(Args::try_parse_from(["arena", "theme", "sepia"]).is_err());
        assert!(Args::try_parse_from(["arena"]).unwrap().command.is_none());
    }

    #[test]
    fn test_session_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let config = ArenaConfig {
            data_dir: dir.path().join("data"),
            ..ArenaConfig::default()
        };

        let session = open_session(&config).unwrap();
        session.login("alice").unwrap();
        session
            .history()
            .append(vec![Message::from_user("alice", "persisted line", 1_000)]);
        drop(session);

        let reopened = open_session(&config).unwrap();
        assert_eq!(reopened.current_user().as_deref(), Some("alice"));

        let history = reopened.history().load_all();
        assert_eq!(history.len(), 1);
        let line = format_message(&history[0], reopened.registry(), Palette::for_theme(Theme::Dark));
        assert!(line.contains("[A] "));
        assert!(line.contains("persisted line"));
    }
}
