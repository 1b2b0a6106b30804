//! Dispatch coordinator - fans one query out to every responder
//!
//! All responder calls are started together and awaited as one barrier. Each
//! call is isolated: an error or timeout degrades that responder's reply to
//! its fallback text and never fails the batch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::events::{ArenaEvent, ResponderStatus, SharedEventBus, TabId};
use crate::history::Message;
use crate::registry::Responder;
use crate::responder::ResponderError;

/// Default per-responder timeout
pub const DEFAULT_RESPONDER_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the dispatch coordinator
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Upper bound on a single responder call; `None` waits indefinitely
    pub responder_timeout: Option<Duration>,
}

impl DispatchConfig {
    /// Build from a timeout in seconds, where 0 disables the timeout
    pub fn from_timeout_secs(secs: u64) -> Self {
        Self {
            responder_timeout: (secs > 0).then(|| Duration::from_secs(secs)),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            responder_timeout: Some(DEFAULT_RESPONDER_TIMEOUT),
        }
    }
}

/// Outcome of one dispatch batch
#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// Logical arrival instant shared by the batch
    pub batch_timestamp: i64,
    /// One message per responder, in registration order
    pub messages: Vec<Message>,
    /// Ids of responders whose reply was replaced by their fallback
    pub failures: Vec<String>,
}

impl DispatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of messages carrying a divergence note
    pub fn annotated(&self) -> usize {
        self.messages.iter().filter(|m| m.annotation.is_some()).count()
    }
}

/// Shared reference to DispatchCoordinator
pub type SharedDispatchCoordinator = Arc<DispatchCoordinator>;

/// Issues one request per responder and collects the batch
pub struct DispatchCoordinator {
    event_bus: SharedEventBus,
    origin: TabId,
    config: DispatchConfig,
}

impl DispatchCoordinator {
    /// Create a coordinator whose status events are attributed to `origin`
    pub fn new(event_bus: SharedEventBus, origin: impl Into<TabId>, config: DispatchConfig) -> Self {
        Self {
            event_bus,
            origin: origin.into(),
            config,
        }
    }

    /// Create a shared reference to this coordinator
    pub fn shared(self) -> SharedDispatchCoordinator {
        Arc::new(self)
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Dispatch `query` and return one message per responder
    pub async fn dispatch(
        &self,
        query: &str,
        responders: &[Responder],
        history: &[Message],
        batch_timestamp: i64,
    ) -> Vec<Message> {
        self.dispatch_with_report(query, responders, history, batch_timestamp)
            .await
            .messages
    }

    /// Dispatch `query` and report which responders fell back.
    ///
    /// `history` is the conversation so far. Responders currently answer
    /// from the query and persona alone.
    pub async fn dispatch_with_report(
        &self,
        query: &str,
        responders: &[Responder],
        history: &[Message],
        batch_timestamp: i64,
    ) -> DispatchReport {
        let start = Instant::now();
        debug!(
            responders = responders.len(),
            history_len = history.len(),
            batch_timestamp,
            "Dispatching query"
        );

        let calls = responders.iter().map(|responder| async move {
            self.publish_status(&responder.id, ResponderStatus::Thinking);
            let outcome = self.ask(responder, query).await;
            self.publish_status(&responder.id, ResponderStatus::Idle);
            outcome
        });
        let outcomes = join_all(calls).await;

        let mut failures = Vec::new();
        let messages: Vec<Message> = responders
            .iter()
            .zip(outcomes)
            .enumerate()
            .map(|(index, (responder, outcome))| {
                let text = match outcome {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!(responder = %responder.id, error = %e, "Responder failed, using fallback");
                        failures.push(responder.id.clone());
                        responder.fallback_reply.clone()
                    }
                };
                Message::from_responder(
                    &responder.id,
                    &responder.display_name,
                    text,
                    batch_timestamp,
                    index,
                )
            })
            .collect();

        info!(
            responders = responders.len(),
            failed = failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Dispatch complete"
        );

        DispatchReport {
            batch_timestamp,
            messages,
            failures,
        }
    }

    async fn ask(&self, responder: &Responder, query: &str) -> Result<String, ResponderError> {
        let call = responder.endpoint.call(query, &responder.persona);
        match self.config.responder_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ResponderError::TimedOut(limit))?,
            None => call.await,
        }
    }

    fn publish_status(&self, responder_id: &str, status: ResponderStatus) {
        self.event_bus.publish(ArenaEvent::ResponderStatus {
            origin: self.origin.clone(),
            responder_id: responder_id.to_string(),
            status,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::responder::{MockResponderClient, ResponderClient};
    use async_trait::async_trait;

    struct DelayedResponder {
        delay: Duration,
        reply: &'static str,
    }

    #[async_trait]
    impl ResponderClient for DelayedResponder {
        async fn call(&self, _query: &str, _persona: &str) -> Result<String, ResponderError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.reply.to_string())
        }
    }

    fn responder(id: &str, endpoint: Arc<dyn ResponderClient>) -> Responder {
        Responder {
            id: id.to_string(),
            display_name: id.to_uppercase(),
            persona: format!("[{id}]"),
            fallback_reply: format!("{id} is unavailable"),
            initial: id[..1].to_uppercase(),
            endpoint,
        }
    }

    fn coordinator(timeout: Option<Duration>) -> (SharedEventBus, DispatchCoordinator) {
        let bus = EventBus::new().shared();
        let coordinator = DispatchCoordinator::new(
            bus.clone(),
            "tab-1",
            DispatchConfig {
                responder_timeout: timeout,
            },
        );
        (bus, coordinator)
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_follows_registration_order() {
        let (_, coordinator) = coordinator(None);
        let responders = vec![
            responder(
                "slow",
                Arc::new(DelayedResponder {
                    delay: Duration::from_millis(500),
                    reply: "slow reply",
                }),
            ),
            responder(
                "fast",
                Arc::new(DelayedResponder {
                    delay: Duration::from_millis(10),
                    reply: "fast reply",
                }),
            ),
        ];

        let start = tokio::time::Instant::now();
        let messages = coordinator.dispatch("q", &responders, &[], 1_000).await;

        // Calls run concurrently, so the batch takes as long as the slowest.
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert_eq!(messages[0].text, "slow reply");
        assert_eq!(messages[0].id, "1000-slow");
        assert_eq!(messages[0].timestamp, 1_000);
        assert_eq!(messages[1].text, "fast reply");
        assert_eq!(messages[1].timestamp, 1_001);
    }

    #[tokio::test]
    async fn test_failure_degrades_to_fallback() {
        let (_, coordinator) = coordinator(None);

        let mut ok = MockResponderClient::new();
        ok.expect_call()
            .withf(|query, persona| query.to_string() == "hello" && persona.to_string() == "[ok]")
            .times(1)
            .returning(|_, _| Ok("fine".to_string()));
        let mut broken = MockResponderClient::new();
        broken
            .expect_call()
            .times(1)
            .returning(|_, _| Err(ResponderError::Transport("refused".into())));

        let responders = vec![responder("ok", Arc::new(ok)), responder("broken", Arc::new(broken))];
        let report = coordinator
            .dispatch_with_report("hello", &responders, &[], 5)
            .await;

        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[0].text, "fine");
        assert_eq!(report.messages[1].text, "broken is unavailable");
        assert_eq!(report.failures, vec!["broken"]);
        assert!(!report.all_succeeded());
        assert!(report.messages.iter().all(|m| m.is_fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_uses_fallback() {
        let (_, coordinator) = coordinator(Some(Duration::from_secs(1)));
        let responders = vec![responder(
            "hung",
            Arc::new(DelayedResponder {
                delay: Duration::from_secs(30),
                reply: "too late",
            }),
        )];

        let report = coordinator
            .dispatch_with_report("q", &responders, &[], 0)
            .await;
        assert_eq!(report.messages[0].text, "hung is unavailable");
        assert_eq!(report.failures, vec!["hung"]);
    }

    #[tokio::test]
    async fn test_status_side_channel() {
        let (bus, coordinator) = coordinator(None);
        let mut rx = bus.subscribe();

        let mut mock = MockResponderClient::new();
        mock.expect_call().returning(|_, _| Ok("x".to_string()));
        let responders = vec![responder("solo", Arc::new(mock))];

        coordinator.dispatch("q", &responders, &[], 0).await;

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ArenaEvent::ResponderStatus {
                origin,
                responder_id,
                status,
                ..
            } = event
            {
                assert_eq!(origin, "tab-1");
                assert_eq!(responder_id, "solo");
                statuses.push(status);
            }
        }
        assert_eq!(statuses, vec![ResponderStatus::Thinking, ResponderStatus::Idle]);
    }

    #[test]
    fn test_zero_timeout_disables() {
        assert!(DispatchConfig::from_timeout_secs(0).responder_timeout.is_none());
        assert_eq!(
            DispatchConfig::from_timeout_secs(5).responder_timeout,
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            DispatchConfig::default().responder_timeout,
            Some(DEFAULT_RESPONDER_TIMEOUT)
        );
    }
}
