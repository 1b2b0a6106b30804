//! Terminal rendering driven by session events
//!
//! The observer is the only place side effects like the bell happen; the
//! session itself only publishes events.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use coordination::{
    ArenaEvent, ArenaSession, EventBusExt, EventFilter, Message, ResponderRegistry,
    ResponderStatus, StorageKey, Theme,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Longest wait for the observer to confirm a rendered batch
pub const RENDER_WAIT: Duration = Duration::from_secs(5);

const RESET: &str = "\x1b[0m";
const BELL: &str = "\x07";

/// ANSI styles for one theme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub sender: &'static str,
    pub debate: &'static str,
    pub dim: &'static str,
}

impl Palette {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                sender: "\x1b[1;96m",
                debate: "\x1b[93m",
                dim: "\x1b[90m",
            },
            Theme::Light => Self {
                sender: "\x1b[1;34m",
                debate: "\x1b[31m",
                dim: "\x1b[2m",
            },
        }
    }
}

/// Local wall-clock `HH:MM` for a millisecond timestamp
pub fn format_time(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}

/// Avatar initial: the responder's configured initial, else the sender's first letter
pub fn avatar(message: &Message, registry: &ResponderRegistry) -> String {
    message
        .responder_id
        .as_deref()
        .and_then(|id| registry.get(id))
        .or_else(|| registry.find_by_display_name(&message.sender))
        .map(|r| r.initial.clone())
        .unwrap_or_else(|| {
            message
                .sender
                .chars()
                .next()
                .map(|c| c.to_uppercase().to_string())
                .unwrap_or_else(|| "?".to_string())
        })
}

/// Render one message, with its debate line when annotated
pub fn format_message(message: &Message, registry: &ResponderRegistry, palette: Palette) -> String {
    let mut out = format!(
        "{dim}{time}{RESET} [{initial}] {sender}{name}{RESET}: {text}",
        dim = palette.dim,
        time = format_time(message.timestamp),
        initial = avatar(message, registry),
        sender = palette.sender,
        name = message.sender,
        text = message.text,
    );
    if let Some(note) = &message.annotation {
        out.push_str(&format!("\n        {}DEBATE:{RESET} {note}", palette.debate));
    }
    out
}

/// Background task printing events for `session`.
///
/// The returned [`Notify`] fires once each time a dispatch from this session
/// has been fully rendered.
pub fn spawn_observer(session: &Arc<ArenaSession>) -> (JoinHandle<()>, Arc<Notify>) {
    let rendered = Arc::new(Notify::new());
    let mut events = session.storage().bus().subscribe_filtered(EventFilter::new());
    let registry = session.registry().clone();
    let tab_id = session.tab_id().to_string();
    let mut palette = Palette::for_theme(session.theme());
    let done = rendered.clone();

    let handle = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Renderer fell behind");
                    // The completion event may be among the skipped ones.
                    done.notify_one();
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let own = event.origin() == tab_id;

            match event {
                ArenaEvent::ResponderStatus {
                    responder_id,
                    status,
                    ..
                } if own => {
                    let name = registry
                        .get(&responder_id)
                        .map_or(responder_id.as_str(), |r| r.display_name.as_str());
                    match status {
                        ResponderStatus::Thinking => {
                            println!("{}  {name} is thinking...{RESET}", palette.dim)
                        }
                        ResponderStatus::Idle => println!("{}  {name} is done{RESET}", palette.dim),
                    }
                }
                ArenaEvent::MessagesAppended { messages, .. } if own => {
                    for message in &messages {
                        println!("{}", format_message(message, &registry, palette));
                    }
                    if messages.iter().any(|m| m.is_fresh) {
                        print!("{BELL}");
                    }
                    let _ = std::io::stdout().flush();
                }
                ArenaEvent::DispatchCompleted { failures, .. } if own => {
                    if !failures.is_empty() {
                        println!(
                            "{}  fallback replies used for: {}{RESET}",
                            palette.dim,
                            failures.join(", ")
                        );
                    }
                    done.notify_one();
                }
                ArenaEvent::ThemeChanged { theme, .. } => {
                    if let Ok(theme) = theme.parse::<Theme>() {
                        palette = Palette::for_theme(theme);
                    }
                }
                ArenaEvent::HistoryCleared { .. } if !own => {
                    println!("{}  history was cleared in another tab{RESET}", palette.dim);
                }
                ArenaEvent::StorageChanged {
                    key: StorageKey::ChatHistory,
                    ..
                } if !own => {
                    println!("{}  history updated in another tab{RESET}", palette.dim);
                }
                _ => {}
            }
        }
    });

    (handle, rendered)
}

/// Wait until the observer confirms a rendered batch, at most [`RENDER_WAIT`]
pub async fn wait_rendered(rendered: &Notify) {
    if tokio::time::timeout(RENDER_WAIT, rendered.notified())
        .await
        .is_err()
    {
        tracing::warn!(wait = ?RENDER_WAIT, "Renderer did not confirm the batch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::{Responder, ResponderClient, ResponderError, ResponderSpec};

    struct Silent;

    #[async_trait::async_trait]
    impl ResponderClient for Silent {
        async fn call(&self, _query: &str, _persona: &str) -> Result<String, ResponderError> {
            Ok(String::new())
        }
    }

    fn registry() -> ResponderRegistry {
        let responders: Vec<Responder> = ResponderSpec::reference_roster()
            .into_iter()
            .map(|spec| spec.into_responder(Arc::new(Silent)))
            .collect();
        ResponderRegistry::new(responders).unwrap()
    }

    #[test]
    fn test_time_is_hours_and_minutes() {
        let time = format_time(1_700_000_000_000);
        assert_eq!(time.len(), 5);
        assert_eq!(&time[2..3], ":");
        assert!(time.chars().filter(|c| *c != ':').all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_avatar_resolution() {
        let registry = registry();
        let grok = Message::from_responder("grok", "Grok", "yo", 1, 0);
        assert_eq!(avatar(&grok, &registry), "K");

        let legacy = Message::from_user("Gemini", "entry without responder id", 1);
        assert_eq!(avatar(&legacy, &registry), "G");

        let user = Message::from_user("alice", "hi", 1);
        assert_eq!(avatar(&user, &registry), "A");
    }

    #[test]
    fn test_debate_line_only_when_annotated() {
        let registry = registry();
        let palette = Palette::for_theme(Theme::Light);
        let mut message = Message::from_responder("chatgpt", "ChatGPT", "formal reply", 1, 0);
        assert!(!format_message(&message, &registry, palette).contains("DEBATE:"));

        message.annotate("Grok gave a different answer.");
        let rendered = format_message(&message, &registry, palette);
        assert!(rendered.contains("[C]"));
        assert!(rendered.contains("DEBATE:"));
        assert!(rendered.ends_with("Grok gave a different answer."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_wait_is_bounded() {
        let rendered = Notify::new();
        let start = tokio::time::Instant::now();
        wait_rendered(&rendered).await;
        assert_eq!(start.elapsed(), RENDER_WAIT);

        rendered.notify_one();
        let start = tokio::time::Instant::now();
        wait_rendered(&rendered).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
