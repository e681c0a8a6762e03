/// Notifier
///
/// Multi-channel alert dispatch with per-(channel, key) rate limiting and a
/// single normalized severity→color/priority mapping (the original system's
/// two orchestrators disagreed on this mapping; this is the reconciled one,
/// see DESIGN.md Open Question #5).
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, warn};

const HISTORY_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Slack,
    Email,
    Sms,
    Webhook,
    Pagerduty,
    Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Normative color/priority mapping per §4.3.
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Critical => "red",
            Severity::High => "orange",
            Severity::Medium => "yellow",
            Severity::Low => "green",
            Severity::Info => "green",
        }
    }

    pub fn priority(&self) -> &'static str {
        match self {
            Severity::Critical | Severity::High => "high",
            Severity::Medium => "normal",
            Severity::Low | Severity::Info => "low",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub subject: String,
    pub body: String,
    pub severity: Severity,
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRecord {
    pub alert_id: String,
    pub channel: Channel,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

/// Per-(channel, key) sliding window rate limiter: prune expired entries,
/// then permit iff the remaining count is zero.
#[derive(Default)]
struct RateLimiter {
    windows: HashMap<(Channel, String), VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    fn allow(&mut self, channel: Channel, key: &str, suppress: chrono::Duration) -> bool {
        let now = Utc::now();
        let entry = self
            .windows
            .entry((channel, key.to_string()))
            .or_insert_with(VecDeque::new);

        while let Some(front) = entry.front() {
            if now.signed_duration_since(*front) >= suppress {
                entry.pop_front();
            } else {
                break;
            }
        }

        if entry.is_empty() {
            entry.push_back(now);
            true
        } else {
            false
        }
    }
}

/// A channel adapter. `slack`/`webhook` are backed by real HTTP dispatch;
/// `dashboard` feeds the in-process broadcast consumed by the websocket
/// surface; `email`/`sms`/`pagerduty` record intent without an actual
/// SMTP/Twilio/PagerDuty client, since wiring one is infrastructure-specific.
#[async_trait::async_trait]
pub trait ChannelAdapter: Send + Sync {
    async fn dispatch(&self, message: &NotificationMessage) -> Result<(), String>;
}

pub struct SlackAdapter {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl SlackAdapter {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl ChannelAdapter for SlackAdapter {
    async fn dispatch(&self, message: &NotificationMessage) -> Result<(), String> {
        let Some(url) = &self.webhook_url else {
            warn!("slack webhook url not configured, dropping notification");
            return Ok(());
        };

        let payload = serde_json::json!({
            "text": message.subject,
            "attachments": [{
                "color": message.severity.color(),
                "fields": message.fields.iter().map(|(k, v)| serde_json::json!({
                    "title": k, "value": v, "short": true
                })).collect::<Vec<_>>(),
                "footer": message.body,
                "ts": Utc::now().timestamp(),
            }]
        });

        self.client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

pub struct WebhookAdapter {
    url: Option<String>,
    client: reqwest::Client,
}

impl WebhookAdapter {
    pub fn new(url: Option<String>) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl ChannelAdapter for WebhookAdapter {
    async fn dispatch(&self, message: &NotificationMessage) -> Result<(), String> {
        let Some(url) = &self.url else {
            return Ok(());
        };
        let payload = serde_json::json!({
            "alert": message.fields,
            "message": message.body,
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Adapter for channels whose real delivery mechanism is infrastructure
/// specific (email MTA, SMS gateway, PagerDuty API). Records success so the
/// rate limiter and delivery history still behave correctly.
pub struct RecordingAdapter;

#[async_trait::async_trait]
impl ChannelAdapter for RecordingAdapter {
    async fn dispatch(&self, _message: &NotificationMessage) -> Result<(), String> {
        Ok(())
    }
}

/// Broadcasts notifications in-process for the ambient websocket surface.
pub struct DashboardAdapter {
    sender: tokio::sync::broadcast::Sender<NotificationMessage>,
}

impl DashboardAdapter {
    pub fn new(sender: tokio::sync::broadcast::Sender<NotificationMessage>) -> Self {
        Self { sender }
    }
}

#[async_trait::async_trait]
impl ChannelAdapter for DashboardAdapter {
    async fn dispatch(&self, message: &NotificationMessage) -> Result<(), String> {
        let _ = self.sender.send(message.clone());
        Ok(())
    }
}

pub struct Notifier {
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
    limiter: Mutex<RateLimiter>,
    history: Mutex<VecDeque<DeliveryRecord>>,
}

impl Notifier {
    pub fn new(adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>) -> Self {
        Self {
            adapters,
            limiter: Mutex::new(RateLimiter::default()),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Dispatches `message` to `channels` for the given rate-limit `key`
    /// (conventionally `rule_id`), skipping any channel still inside its
    /// suppression window. Channels dispatch concurrently so a slow or
    /// hanging adapter never delays the others.
    pub async fn send(
        &self,
        alert_id: &str,
        key: &str,
        suppress: chrono::Duration,
        message: NotificationMessage,
        channels: &[Channel],
    ) {
        let allowed_channels: Vec<Channel> = {
            let mut limiter = self.limiter.lock().await;
            channels
                .iter()
                .filter(|channel| limiter.allow(**channel, key, suppress))
                .copied()
                .collect()
        };

        let dispatches = allowed_channels.into_iter().map(|channel| {
            let message = message.clone();
            async move {
                let result = match self.adapters.get(&channel) {
                    Some(adapter) => adapter.dispatch(&message).await,
                    None => Err(format!("no adapter registered for {:?}", channel)),
                };
                if let Err(ref e) = result {
                    error!("notification dispatch failed on {:?}: {}", channel, e);
                }
                DeliveryRecord {
                    alert_id: alert_id.to_string(),
                    channel,
                    timestamp: Utc::now(),
                    success: result.is_ok(),
                    error: result.err(),
                }
            }
        });

        for record in join_all(dispatches).await {
            self.record(record).await;
        }
    }

    async fn record(&self, record: DeliveryRecord) {
        let mut history = self.history.lock().await;
        history.push_back(record);
        while history.len() > HISTORY_CAPACITY {
            history.pop_front();
        }
    }

    pub async fn history_snapshot(&self) -> Vec<DeliveryRecord> {
        self.history.lock().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAdapter(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl ChannelAdapter for CountingAdapter {
        async fn dispatch(&self, _message: &NotificationMessage) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn message() -> NotificationMessage {
        NotificationMessage {
            subject: "high cpu".into(),
            body: "cpu at 95%".into(),
            severity: Severity::High,
            fields: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn rate_limits_repeated_sends_within_window() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut adapters: HashMap<Channel, Arc<dyn ChannelAdapter>> = HashMap::new();
        adapters.insert(Channel::Slack, Arc::new(CountingAdapter(count.clone())));
        let notifier = Notifier::new(adapters);

        notifier
            .send("a1", "rule-1", chrono::Duration::seconds(60), message(), &[Channel::Slack])
            .await;
        notifier
            .send("a1", "rule-1", chrono::Duration::seconds(60), message(), &[Channel::Slack])
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_are_independent() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut adapters: HashMap<Channel, Arc<dyn ChannelAdapter>> = HashMap::new();
        adapters.insert(Channel::Slack, Arc::new(CountingAdapter(count.clone())));
        let notifier = Notifier::new(adapters);

        notifier
            .send("a1", "rule-1", chrono::Duration::seconds(60), message(), &[Channel::Slack])
            .await;
        notifier
            .send("a2", "rule-2", chrono::Duration::seconds(60), message(), &[Channel::Slack])
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    struct SlowAdapter(std::time::Duration);

    #[async_trait::async_trait]
    impl ChannelAdapter for SlowAdapter {
        async fn dispatch(&self, _message: &NotificationMessage) -> Result<(), String> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn channels_dispatch_concurrently_not_sequentially() {
        let mut adapters: HashMap<Channel, Arc<dyn ChannelAdapter>> = HashMap::new();
        adapters.insert(Channel::Slack, Arc::new(SlowAdapter(std::time::Duration::from_millis(150))));
        adapters.insert(Channel::Webhook, Arc::new(SlowAdapter(std::time::Duration::from_millis(150))));
        let notifier = Notifier::new(adapters);

        let start = std::time::Instant::now();
        notifier
            .send(
                "a1",
                "rule-1",
                chrono::Duration::seconds(60),
                message(),
                &[Channel::Slack, Channel::Webhook],
            )
            .await;
        let elapsed = start.elapsed();

        assert!(elapsed < std::time::Duration::from_millis(280), "elapsed {:?} suggests sequential dispatch", elapsed);
        assert_eq!(notifier.history_snapshot().await.len(), 2);
    }

    #[test]
    fn severity_color_mapping_is_normative() {
        assert_eq!(Severity::Critical.color(), "red");
        assert_eq!(Severity::High.color(), "orange");
        assert_eq!(Severity::Medium.color(), "yellow");
        assert_eq!(Severity::Low.color(), "green");
        assert_eq!(Severity::Info.color(), "green");
    }
}
