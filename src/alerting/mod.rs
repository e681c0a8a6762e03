/// Alert Orchestrator
///
/// Rule evaluation, dynamic thresholds, correlation, and rate-limited
/// multi-channel notification. Grounded on `alert_orchestrator.py`.
pub mod correlation;
pub mod threshold;

pub use crate::platform::notifier::Severity;

use crate::platform::clock::RunningFlag;
use crate::platform::notifier::{Channel, NotificationMessage, Notifier};
use crate::platform::sink::{MetricSink, Point};
use chrono::{DateTime, Duration, Utc};
use correlation::CorrelationEngine;
use md5::{Digest, Md5};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use threshold::{MetricHistory, ThresholdCalculator};
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{error, info};

const ACTIVE_ALERT_TTL_HOURS: i64 = 24;
const HISTORY_CAPACITY: usize = 50_000;
const EQUALITY_TOLERANCE: f64 = 1e-3;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("unknown rule: {0}")]
    UnknownRule(String),
}

pub type AlertResult<T> = Result<T, AlertError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Operator {
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => value > threshold,
            Operator::Ge => value >= threshold,
            Operator::Lt => value < threshold,
            Operator::Le => value <= threshold,
            Operator::Eq => (value - threshold).abs() < EQUALITY_TOLERANCE,
            Operator::Ne => (value - threshold).abs() >= EQUALITY_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Suppressed,
}

#[derive(Debug, Clone)]
pub struct EscalationStep {
    pub level: u32,
    pub threshold: f64,
    pub duration: chrono::Duration,
    pub severity: Severity,
}

#[derive(Debug, Clone)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub metric_name: String,
    pub operator: Operator,
    pub threshold: f64,
    pub severity: Severity,
    /// Seconds the condition must hold before firing (not separately tracked
    /// below; each evaluation already reflects the latest observed value).
    pub sustain_duration: chrono::Duration,
    pub evaluation_interval: std::time::Duration,
    pub dynamic_threshold: bool,
    /// Minimum interval between notifications for this rule, per channel.
    pub suppress_duration: chrono::Duration,
    pub notification_channels: Vec<Channel>,
    pub escalation_steps: Vec<EscalationStep>,
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub source_metric: String,
    pub source_value: f64,
    pub effective_threshold: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub correlation_group: String,
    pub escalation_level: u32,
    pub metadata: HashMap<String, String>,
}

fn hash8(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())[..8].to_string()
}

fn metadata_hash(metadata: &HashMap<String, String>) -> String {
    let mut keys: Vec<&String> = metadata.keys().collect();
    keys.sort();
    let joined = keys
        .iter()
        .map(|k| format!("{}={}", k, metadata[*k]))
        .collect::<Vec<_>>()
        .join("|");
    hash8(&joined)
}

pub struct AlertOrchestrator {
    rules: RwLock<HashMap<String, AlertRule>>,
    active: RwLock<HashMap<(String, String), Alert>>,
    history: RwLock<VecDeque<Alert>>,
    metric_history: RwLock<MetricHistory>,
    threshold_calc: RwLock<ThresholdCalculator>,
    sink: Arc<dyn MetricSink>,
    notifier: Arc<Notifier>,
}

impl AlertOrchestrator {
    pub fn new(sink: Arc<dyn MetricSink>, notifier: Arc<Notifier>) -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
            active: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            metric_history: RwLock::new(MetricHistory::default()),
            threshold_calc: RwLock::new(ThresholdCalculator::default()),
            sink,
            notifier,
        }
    }

    pub async fn load_rule(&self, rule: AlertRule) {
        self.rules.write().await.insert(rule.id.clone(), rule);
    }

    pub async fn load_default_rules(&self) {
        for rule in default_rules() {
            self.load_rule(rule).await;
        }
    }

    pub async fn active_alerts_snapshot(&self) -> Vec<Alert> {
        self.active.read().await.values().cloned().collect()
    }

    pub async fn history_snapshot(&self) -> Vec<Alert> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Evaluates one observed metric reading against every matching rule.
    /// Errors from a single rule never abort evaluation of the rest.
    pub async fn observe(&self, metric_name: &str, value: f64, metadata: HashMap<String, String>) {
        self.metric_history
            .write()
            .await
            .record(metric_name, value, Utc::now());

        let rules: Vec<AlertRule> = {
            let rules = self.rules.read().await;
            rules
                .values()
                .filter(|r| metric_name == r.metric_name || metric_name.starts_with(&r.metric_name))
                .cloned()
                .collect()
        };

        for rule in rules {
            if let Err(e) = self.evaluate_rule(&rule, metric_name, value, &metadata).await {
                error!("alert evaluation failed for rule {}: {}", rule.id, e);
            }
        }
    }

    async fn evaluate_rule(
        &self,
        rule: &AlertRule,
        metric_name: &str,
        value: f64,
        metadata: &HashMap<String, String>,
    ) -> AlertResult<()> {
        let effective_threshold = if rule.dynamic_threshold {
            let history = self.metric_history.read().await;
            let mut calc = self.threshold_calc.write().await;
            calc.effective_threshold(&history, metric_name, rule.operator, rule.threshold, 2.0)
        } else {
            rule.threshold
        };

        let breached = rule.operator.check(value, effective_threshold);
        let host = metadata.get("host").cloned().unwrap_or_else(|| "unknown".to_string());
        let key = (rule.id.clone(), host);

        let existing = self.active.read().await.get(&key).cloned();

        match (breached, existing) {
            (true, Some(mut alert)) => {
                alert.last_seen = Utc::now();
                alert.source_value = value;
                self.maybe_escalate(rule, &mut alert).await;
                self.active.write().await.insert(key, alert);
                Ok(())
            }
            (true, None) => {
                self.create_alert(rule, metric_name, value, effective_threshold, metadata.clone())
                    .await
            }
            (false, Some(alert)) => {
                self.resolve_alert(&key, alert).await;
                Ok(())
            }
            (false, None) => Ok(()),
        }
    }

    async fn create_alert(
        &self,
        rule: &AlertRule,
        metric_name: &str,
        value: f64,
        effective_threshold: f64,
        metadata: HashMap<String, String>,
    ) -> AlertResult<()> {
        let now = Utc::now();
        let id = format!(
            "alert-{}-{}-{}",
            rule.id,
            now.timestamp(),
            metadata_hash(&metadata)
        );

        let mut alert = Alert {
            id: id.clone(),
            rule_id: rule.id.clone(),
            title: rule.name.clone(),
            description: format!(
                "{} breached threshold: {} {:?} {}",
                metric_name, value, rule.operator, effective_threshold
            ),
            severity: rule.severity,
            status: AlertStatus::Active,
            source_metric: metric_name.to_string(),
            source_value: value,
            effective_threshold,
            first_seen: now,
            last_seen: now,
            acknowledged_at: None,
            resolved_at: None,
            correlation_group: String::new(),
            escalation_level: 0,
            metadata: metadata.clone(),
        };

        let group = {
            let active = self.active.read().await;
            let refs: Vec<&Alert> = active.values().collect();
            CorrelationEngine::assign_group(&alert, &refs)
        };
        alert.correlation_group = group;

        let host = metadata.get("host").cloned().unwrap_or_else(|| "unknown".to_string());
        let key = (rule.id.clone(), host);
        self.active.write().await.insert(key, alert.clone());
        self.push_history(alert.clone()).await;

        self.sink
            .write_points(vec![Point::new("alerts")
                .tag("rule_id", rule.id.clone())
                .tag("severity", format!("{:?}", rule.severity))
                .field("value", value)
                .field("threshold", effective_threshold)])
            .await;

        self.notify(rule, &alert).await;
        Ok(())
    }

    async fn maybe_escalate(&self, rule: &AlertRule, alert: &mut Alert) {
        let mut steps: Vec<&EscalationStep> = rule.escalation_steps.iter().collect();
        steps.sort_by_key(|s| s.level);

        for step in steps {
            if step.level <= alert.escalation_level {
                continue;
            }
            let sustained_for = Utc::now().signed_duration_since(alert.first_seen);
            if alert.source_value.is_finite()
                && rule.operator.check(alert.source_value, step.threshold)
                && sustained_for >= step.duration
            {
                alert.escalation_level = step.level;
                alert.severity = step.severity;
                self.notify(rule, alert).await;
            }
        }
    }

    async fn resolve_alert(&self, key: &(String, String), mut alert: Alert) {
        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(Utc::now());
        self.active.write().await.remove(key);
        self.push_history(alert).await;
    }

    async fn push_history(&self, alert: Alert) {
        let mut history = self.history.write().await;
        history.push_back(alert);
        while history.len() > HISTORY_CAPACITY {
            history.pop_front();
        }
    }

    async fn notify(&self, rule: &AlertRule, alert: &Alert) {
        let mut fields = alert.metadata.clone();
        fields.insert("metric".to_string(), alert.source_metric.clone());
        fields.insert("value".to_string(), alert.source_value.to_string());

        let message = NotificationMessage {
            subject: alert.title.clone(),
            body: alert.description.clone(),
            severity: alert.severity,
            fields,
        };

        let channels = if rule.notification_channels.is_empty() {
            vec![Channel::Slack]
        } else {
            rule.notification_channels.clone()
        };

        self.notifier
            .send(&alert.id, &rule.id, rule.suppress_duration, message, &channels)
            .await;
    }

    /// Acknowledges an active alert for (rule_id, host), if present.
    pub async fn acknowledge(&self, rule_id: &str, host: &str) {
        let key = (rule_id.to_string(), host.to_string());
        if let Some(alert) = self.active.write().await.get_mut(&key) {
            alert.status = AlertStatus::Acknowledged;
            alert.acknowledged_at = Some(Utc::now());
        }
    }

    /// Hourly sweep evicting resolved alerts older than 24h from history.
    pub async fn sweep_history(&self) {
        let cutoff = Utc::now() - Duration::hours(ACTIVE_ALERT_TTL_HOURS);
        let mut history = self.history.write().await;
        history.retain(|a| match a.resolved_at {
            Some(resolved) => resolved >= cutoff,
            None => true,
        });
    }

    /// Runs the periodic sweep loop until `running` is cleared.
    pub async fn run_sweep_loop(self: Arc<Self>, running: RunningFlag) {
        let mut ticker = interval(std::time::Duration::from_secs(3600));
        info!("alert history sweep loop started");
        while running.is_running() {
            ticker.tick().await;
            self.sweep_history().await;
        }
    }

    /// Reads each loaded rule's metric over the trailing `window` and feeds
    /// every point through `observe`, so rules evaluate against live data
    /// written by collaborators outside this orchestrator rather than only
    /// reacting to direct `observe` calls. Re-observing a point already seen
    /// on a prior tick is harmless: `observe` only refreshes the keyed active
    /// alert or resolves it, it never double-creates one.
    pub async fn evaluate_recent_metrics(&self, window: std::time::Duration) {
        let metric_names: Vec<String> = {
            let rules = self.rules.read().await;
            let mut names: Vec<String> = rules.values().map(|r| r.metric_name.clone()).collect();
            names.sort();
            names.dedup();
            names
        };

        for metric_name in metric_names {
            let points = self.sink.query_recent(&metric_name, window).await;
            for point in points {
                let Some(value) = point.fields.get("value").and_then(|v| v.as_f64()) else {
                    continue;
                };
                self.observe(&metric_name, value, point.tags.clone()).await;
            }
        }
    }

    /// Runs the periodic rule-evaluation loop until `running` is cleared.
    pub async fn run_evaluation_loop(
        self: Arc<Self>,
        running: RunningFlag,
        period: std::time::Duration,
        window: std::time::Duration,
    ) {
        let mut ticker = interval(period);
        info!("alert evaluation loop started");
        while running.is_running() {
            ticker.tick().await;
            self.evaluate_recent_metrics(window).await;
        }
    }
}

/// Seeded default rule set, matching this ecosystem's conventional baseline
/// (§4.4.8). These are production defaults, not test fixtures.
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule {
            id: "high_cpu_usage".to_string(),
            name: "High CPU Usage".to_string(),
            metric_name: "cpu_usage_percent".to_string(),
            operator: Operator::Gt,
            threshold: 90.0,
            severity: Severity::High,
            sustain_duration: Duration::seconds(0),
            evaluation_interval: std::time::Duration::from_secs(60),
            dynamic_threshold: true,
            suppress_duration: Duration::seconds(300),
            notification_channels: vec![Channel::Slack],
            escalation_steps: vec![],
        },
        AlertRule {
            id: "high_memory_usage".to_string(),
            name: "High Memory Usage".to_string(),
            metric_name: "memory_usage_percent".to_string(),
            operator: Operator::Gt,
            threshold: 85.0,
            severity: Severity::High,
            sustain_duration: Duration::seconds(0),
            evaluation_interval: std::time::Duration::from_secs(60),
            dynamic_threshold: true,
            suppress_duration: Duration::seconds(300),
            notification_channels: vec![Channel::Slack],
            escalation_steps: vec![],
        },
        AlertRule {
            id: "disk_space_low".to_string(),
            name: "Disk Space Low".to_string(),
            metric_name: "disk_usage_percent".to_string(),
            operator: Operator::Gt,
            threshold: 90.0,
            severity: Severity::Critical,
            sustain_duration: Duration::seconds(0),
            evaluation_interval: std::time::Duration::from_secs(60),
            dynamic_threshold: false,
            suppress_duration: Duration::seconds(600),
            notification_channels: vec![Channel::Slack, Channel::Webhook],
            escalation_steps: vec![],
        },
        AlertRule {
            id: "service_down".to_string(),
            name: "Service Down".to_string(),
            metric_name: "service_up".to_string(),
            operator: Operator::Eq,
            threshold: 0.0,
            severity: Severity::Critical,
            sustain_duration: Duration::seconds(0),
            evaluation_interval: std::time::Duration::from_secs(30),
            dynamic_threshold: false,
            suppress_duration: Duration::seconds(60),
            notification_channels: vec![Channel::Slack, Channel::Pagerduty],
            escalation_steps: vec![],
        },
        AlertRule {
            id: "high_network_latency".to_string(),
            name: "High Network Latency".to_string(),
            metric_name: "network_latency_ms".to_string(),
            operator: Operator::Gt,
            threshold: 500.0,
            severity: Severity::Medium,
            sustain_duration: Duration::seconds(0),
            evaluation_interval: std::time::Duration::from_secs(60),
            dynamic_threshold: true,
            suppress_duration: Duration::seconds(300),
            notification_channels: vec![Channel::Slack],
            escalation_steps: vec![],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::notifier::ChannelAdapter;
    use crate::platform::sink::SqliteSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAdapter(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl ChannelAdapter for CountingAdapter {
        async fn dispatch(&self, _message: &NotificationMessage) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn harness() -> (Arc<AlertOrchestrator>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let mut adapters: HashMap<Channel, Arc<dyn crate::platform::notifier::ChannelAdapter>> =
            HashMap::new();
        adapters.insert(Channel::Slack, Arc::new(CountingAdapter(count.clone())));
        let notifier = Arc::new(Notifier::new(adapters));
        let sink = SqliteSink::noop();
        let orchestrator = Arc::new(AlertOrchestrator::new(sink, notifier));
        orchestrator.load_default_rules().await;
        (orchestrator, count)
    }

    #[tokio::test]
    async fn static_threshold_breach_creates_one_alert_and_notifies() {
        let (orchestrator, count) = harness().await;
        let mut metadata = HashMap::new();
        metadata.insert("host".to_string(), "h1".to_string());

        for value in [50.0, 60.0, 85.0] {
            orchestrator
                .observe("disk_usage_percent", value, metadata.clone())
                .await;
        }

        let active = orchestrator.active_alerts_snapshot().await;
        assert_eq!(active.len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limit_suppresses_repeated_breach_notifications() {
        let (orchestrator, count) = harness().await;
        let mut metadata = HashMap::new();
        metadata.insert("host".to_string(), "h1".to_string());

        orchestrator.observe("disk_usage_percent", 95.0, metadata.clone()).await;
        orchestrator.observe("disk_usage_percent", 96.0, metadata.clone()).await;

        assert_eq!(orchestrator.active_alerts_snapshot().await.len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolving_clears_the_active_alert() {
        let (orchestrator, _count) = harness().await;
        let mut metadata = HashMap::new();
        metadata.insert("host".to_string(), "h1".to_string());

        orchestrator.observe("disk_usage_percent", 95.0, metadata.clone()).await;
        assert_eq!(orchestrator.active_alerts_snapshot().await.len(), 1);

        orchestrator.observe("disk_usage_percent", 10.0, metadata.clone()).await;
        assert_eq!(orchestrator.active_alerts_snapshot().await.len(), 0);
    }

    #[tokio::test]
    async fn correlated_alerts_share_a_group() {
        let (orchestrator, _count) = harness().await;
        let mut metadata = HashMap::new();
        metadata.insert("host".to_string(), "h1".to_string());
        metadata.insert("service".to_string(), "web".to_string());

        orchestrator.observe("disk_usage_percent", 95.0, metadata.clone()).await;
        orchestrator.observe("network_latency_ms", 900.0, metadata.clone()).await;

        let active = orchestrator.active_alerts_snapshot().await;
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].correlation_group, active[1].correlation_group);
    }

    #[test]
    fn operator_equality_uses_tolerance() {
        assert!(Operator::Eq.check(0.0005, 0.0));
        assert!(!Operator::Eq.check(0.01, 0.0));
    }

    #[tokio::test]
    async fn evaluation_loop_fires_from_points_written_by_another_collaborator() {
        use crate::platform::sink::Point;

        let count = Arc::new(AtomicUsize::new(0));
        let mut adapters: HashMap<Channel, Arc<dyn crate::platform::notifier::ChannelAdapter>> =
            HashMap::new();
        adapters.insert(Channel::Slack, Arc::new(CountingAdapter(count.clone())));
        let notifier = Arc::new(Notifier::new(adapters));

        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        let sink = SqliteSink::new(pool).await;
        sink.write_points(vec![Point::new("disk_usage_percent")
            .tag("host", "h1")
            .field("value", 95.0)])
            .await;

        let orchestrator = AlertOrchestrator::new(sink, notifier);
        orchestrator.load_default_rules().await;
        orchestrator
            .evaluate_recent_metrics(std::time::Duration::from_secs(3600))
            .await;

        let active = orchestrator.active_alerts_snapshot().await;
        assert_eq!(active.len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
