//! Where refresh outcomes are reported.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::model::RefreshOutcome;

/// Receives one report per attempted refresh. Reporting is best effort:
/// implementations log their own failures and never fail the caller.
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn report(&self, outcome: &RefreshOutcome);
}

/// Writes outcomes to the log.
#[derive(Debug, Clone, Default)]
pub struct LogSink;

#[async_trait]
impl OutcomeSink for LogSink {
    async fn report(&self, outcome: &RefreshOutcome) {
        if outcome.success {
            log::info!("[Refresh] {}", outcome.summary());
        } else {
            log::warn!("[Refresh] {}", outcome.summary());
        }
    }
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

/// Posts `{ "content": <summary> }` to a chat webhook (Discord format).
#[derive(Debug, Clone)]
pub struct WebhookSink {
    url: String,
    http: Client,
}

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Self::with_timeout(url, WEBHOOK_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { url: url.into(), http })
    }
}

#[async_trait]
impl OutcomeSink for WebhookSink {
    async fn report(&self, outcome: &RefreshOutcome) {
        let content = outcome.summary();
        let result = self
            .http
            .post(&self.url)
            .json(&WebhookMessage { content: &content })
            .send()
            .await
            .and_then(|res| res.error_for_status());

        if let Err(e) = result {
            log::warn!("[Refresh] failed to notify webhook: {e}");
        }
    }
}

/// Keeps every outcome in memory. Cloning shares the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    outcomes: Arc<Mutex<Vec<RefreshOutcome>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<RefreshOutcome> {
        self.outcomes.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn failures(&self) -> Vec<RefreshOutcome> {
        self.outcomes().into_iter().filter(|o| !o.success).collect()
    }
}

#[async_trait]
impl OutcomeSink for MemorySink {
    async fn report(&self, outcome: &RefreshOutcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push(outcome.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Location;

    #[tokio::test]
    async fn memory_sink_shares_buffer_between_clones() {
        let sink = MemorySink::new();
        let handle = sink.clone();

        sink.report(&RefreshOutcome::succeeded(&Location::named("Corfu"), 8)).await;
        sink.report(&RefreshOutcome::failed(&Location::named("Thessaloniki"), "boom")).await;

        assert_eq!(handle.outcomes().len(), 2);
        assert_eq!(handle.failures().len(), 1);
        assert_eq!(handle.failures()[0].location, "Thessaloniki");
    }

    #[test]
    fn webhook_body_has_content_field() {
        let body = serde_json::to_value(WebhookMessage { content: "Corfu ok" }).unwrap();
        assert_eq!(body, serde_json::json!({ "content": "Corfu ok" }));
    }

    #[tokio::test]
    async fn unreachable_webhook_does_not_fail_caller() {
        let sink = WebhookSink::new("http://127.0.0.1:9/webhook").unwrap();
        sink.report(&RefreshOutcome::succeeded(&Location::named("Corfu"), 8)).await;
    }

    #[tokio::test]
    async fn silent_webhook_is_abandoned_after_timeout() {
        // accepts connections through the backlog but never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/webhook", listener.local_addr().unwrap());
        let sink = WebhookSink::with_timeout(url, Duration::from_millis(200)).unwrap();

        let outcome = RefreshOutcome::succeeded(&Location::named("Corfu"), 8);
        let report = sink.report(&outcome);
        tokio::time::timeout(Duration::from_secs(3), report)
            .await
            .expect("webhook request must time out");
        drop(listener);
    }
}
