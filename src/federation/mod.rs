/// Federation Orchestrator
///
/// Multi-node metric aggregation, cross-site alert propagation, node
/// health tracking. Grounded on `federation_orchestrator.py`.
pub mod aggregator;
pub mod health;
pub mod prometheus;

use crate::alerting::Alert;
use crate::platform::sink::{MetricSink, Point};
use aggregator::{AggregationMethod, Contribution};
use chrono::{DateTime, Utc};
use health::{HealthHistory, HealthSample};
use md5::{Digest, Md5};
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Error, Debug)]
pub enum FederationError {
    #[error("node unreachable: {0}")]
    NodeUnreachable(String),
    #[error("sync conflict with node {0}")]
    SyncConflict(String),
    #[error("request error: {0}")]
    Request(String),
}

pub type FederationResult<T> = Result<T, FederationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Primary,
    Secondary,
    Edge,
    Cloud,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Online,
    Offline,
    Degraded,
    Maintenance,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct FederationNode {
    pub id: String,
    pub node_type: NodeType,
    pub status: NodeStatus,
    pub endpoint: String,
    pub bearer_token: Option<String>,
    pub capabilities: Vec<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub metrics_endpoints: Vec<String>,
    pub priority: u32,
}

#[derive(Debug, Clone)]
pub struct GlobalMetric {
    pub name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub contributing_nodes: Vec<String>,
    pub method: AggregationMethod,
    pub labels: HashMap<String, String>,
    pub confidence: f64,
}

pub struct FederationOrchestrator {
    nodes: RwLock<HashMap<String, FederationNode>>,
    histories: RwLock<HashMap<String, HealthHistory>>,
    aggregation_rules: HashMap<String, AggregationMethod>,
    propagated_fingerprints: RwLock<HashSet<String>>,
    client: Client,
    sink: Arc<dyn MetricSink>,
}

impl FederationOrchestrator {
    pub fn new(nodes: Vec<FederationNode>, sink: Arc<dyn MetricSink>) -> Self {
        let map = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        Self {
            nodes: RwLock::new(map),
            histories: RwLock::new(HashMap::new()),
            aggregation_rules: aggregator::default_aggregation_rules(),
            propagated_fingerprints: RwLock::new(HashSet::new()),
            client: Client::new(),
            sink,
        }
    }

    pub async fn node_snapshot(&self) -> Vec<FederationNode> {
        self.nodes.read().await.values().cloned().collect()
    }

    /// Probes every node's health and metrics-availability, recording
    /// rolling history and updating status/last_seen.
    pub async fn check_all_nodes(&self) {
        let node_ids: Vec<String> = self.nodes.read().await.keys().cloned().collect();
        for id in node_ids {
            self.check_node(&id).await;
        }
    }

    async fn check_node(&self, node_id: &str) {
        let (endpoint, bearer, metrics_endpoints) = {
            let nodes = self.nodes.read().await;
            let Some(node) = nodes.get(node_id) else { return };
            (node.endpoint.clone(), node.bearer_token.clone(), node.metrics_endpoints.clone())
        };

        let (status, response_time_ms) =
            health::probe_health(&self.client, &endpoint, bearer.as_deref()).await;
        let metrics_available = health::probe_metrics_available(&self.client, &metrics_endpoints).await;

        {
            let mut nodes = self.nodes.write().await;
            if let Some(node) = nodes.get_mut(node_id) {
                node.status = status;
                node.last_seen = Some(Utc::now());
            }
        }

        {
            let mut histories = self.histories.write().await;
            let history = histories.entry(node_id.to_string()).or_default();
            history.push(HealthSample { timestamp: Utc::now(), status, response_time_ms });
        }

        self.sink
            .write_points(vec![Point::new("federation_node_health")
                .tag("node", node_id.to_string())
                .field("status", format!("{:?}", status))
                .field("metrics_available", metrics_available)
                .field("response_time_ms", response_time_ms as f64)])
            .await;
    }

    pub async fn node_uptime_percent(&self, node_id: &str) -> f64 {
        self.histories
            .read()
            .await
            .get(node_id)
            .map(|h| h.uptime_percent())
            .unwrap_or(0.0)
    }

    /// Polls every online node's declared metrics endpoints and aggregates
    /// per §4.7.2, returning one `GlobalMetric` per configured rule that has
    /// at least one contributor.
    pub async fn aggregate_metrics(&self) -> Vec<GlobalMetric> {
        let nodes: Vec<FederationNode> = {
            let nodes = self.nodes.read().await;
            nodes.values().filter(|n| n.status == NodeStatus::Online).cloned().collect()
        };

        let mut samples_by_metric: HashMap<String, Vec<Contribution>> = HashMap::new();

        for node in &nodes {
            for endpoint in &node.metrics_endpoints {
                let Ok(response) = self.client.get(endpoint).send().await else {
                    continue;
                };
                let Ok(body) = response.text().await else { continue };

                let samples = if endpoint.contains("/api/v1/query") {
                    prometheus::parse_instant_query(&body)
                } else {
                    prometheus::parse_exposition(&body)
                };

                for sample in samples {
                    if !self.aggregation_rules.contains_key(&sample.metric_name) {
                        continue;
                    }
                    samples_by_metric.entry(sample.metric_name.clone()).or_default().push(Contribution {
                        node_id: node.id.clone(),
                        value: sample.value,
                        weight: 1.0,
                        labels: sample.labels,
                    });
                }
            }
        }

        let mut results = Vec::new();
        for (metric_name, contributions) in samples_by_metric {
            let Some(&method) = self.aggregation_rules.get(&metric_name) else { continue };
            let aggregated = aggregator::aggregate(method, &contributions);
            results.push(GlobalMetric {
                name: metric_name,
                value: aggregated.value,
                timestamp: Utc::now(),
                contributing_nodes: aggregated.contributing_nodes,
                method,
                labels: aggregated.labels,
                confidence: aggregated.confidence,
            });
        }
        results
    }

    /// Probes every node's health on a fixed interval until `running` is
    /// cleared, matching the container health loop's shape.
    pub async fn run_health_loop(self: Arc<Self>, running: crate::platform::clock::RunningFlag, period: std::time::Duration) {
        let mut ticker = tokio::time::interval(period);
        while running.is_running() {
            ticker.tick().await;
            self.check_all_nodes().await;
        }
    }

    /// Drives cross-site propagation on a fixed interval: every currently
    /// active alert from `alerting` is offered to `propagate_alert`, which
    /// applies the eligibility filter and fingerprint dedup itself.
    pub async fn run_propagation_loop(
        self: Arc<Self>,
        alerting: Arc<crate::alerting::AlertOrchestrator>,
        running: crate::platform::clock::RunningFlag,
        period: std::time::Duration,
    ) {
        let mut ticker = tokio::time::interval(period);
        while running.is_running() {
            ticker.tick().await;
            for alert in alerting.active_alerts_snapshot().await {
                self.propagate_alert(&alert).await;
            }
        }
    }

    fn fingerprint(alert: &Alert) -> String {
        let mut parts = Vec::new();
        for key in ["alertname", "instance", "job", "service"] {
            if let Some(value) = alert.metadata.get(key) {
                parts.push(format!("{}={}", key, value));
            } else if key == "alertname" {
                parts.push(format!("alertname={}", alert.title));
            }
        }
        let joined = parts.join("|");
        let mut hasher = Md5::new();
        hasher.update(joined.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn should_propagate(alert: &Alert) -> bool {
        use crate::platform::notifier::Severity;
        let severity_ok = matches!(alert.severity, Severity::Critical | Severity::High | Severity::Medium);
        let instance_ok = alert
            .metadata
            .get("instance")
            .map(|i| !i.starts_with("localhost"))
            .unwrap_or(true);
        let has_service_or_job = alert.metadata.contains_key("service") || alert.metadata.contains_key("job");
        severity_ok && instance_ok && has_service_or_job
    }

    /// Propagates `alert` to every other node's ingestion endpoint, unless
    /// already propagated (by fingerprint) or ineligible per §4.7.3. A
    /// per-peer failure is logged and counted, never aborts the fan-out.
    pub async fn propagate_alert(&self, alert: &Alert) {
        if !Self::should_propagate(alert) {
            return;
        }

        let fingerprint = Self::fingerprint(alert);
        {
            let mut seen = self.propagated_fingerprints.write().await;
            if !seen.insert(fingerprint) {
                return;
            }
        }

        let nodes: Vec<FederationNode> = self.nodes.read().await.values().cloned().collect();
        let mut failures = 0u32;

        for node in nodes {
            let url = format!("{}/api/v1/alerts/sync", node.endpoint.trim_end_matches('/'));
            let mut request = self.client.post(&url).json(&serde_json::json!({
                "id": alert.id,
                "title": alert.title,
                "severity": format!("{:?}", alert.severity),
                "metadata": alert.metadata,
            }));
            if let Some(token) = &node.bearer_token {
                request = request.bearer_auth(token);
            }

            if let Err(e) = request.send().await {
                failures += 1;
                warn!("alert propagation to node {} failed: {}", node.id, e);
            }
        }

        if failures > 0 {
            self.sink
                .write_points(vec![Point::new("federation_propagation_failures")
                    .field("count", failures as f64)])
                .await;
        }
    }

    /// Fetches each declared data type from `source` and pushes it to every
    /// target's sync endpoint. A 409 is recorded as a conflict, not a
    /// failure, and does not abort remaining data types or targets.
    pub async fn sync_node_data(
        &self,
        source: &FederationNode,
        targets: &[FederationNode],
        data_types: &[String],
    ) -> Vec<FederationResult<()>> {
        let mut results = Vec::new();

        for data_type in data_types {
            let fetch_url = format!(
                "{}/api/v1/{}",
                source.endpoint.trim_end_matches('/'),
                data_type
            );
            let payload = match self.client.get(&fetch_url).send().await {
                Ok(response) => response.json::<serde_json::Value>().await.ok(),
                Err(_) => None,
            };
            let Some(payload) = payload else {
                results.push(Err(FederationError::NodeUnreachable(source.id.clone())));
                continue;
            };

            for target in targets {
                let sync_url = format!(
                    "{}/api/v1/{}/sync",
                    target.endpoint.trim_end_matches('/'),
                    data_type
                );
                let outcome = self.client.post(&sync_url).json(&payload).send().await;
                match outcome {
                    Ok(response) if response.status().as_u16() == 409 => {
                        results.push(Err(FederationError::SyncConflict(target.id.clone())));
                    }
                    Ok(response) if response.status().is_success() => {
                        results.push(Ok(()));
                    }
                    Ok(response) => {
                        results.push(Err(FederationError::Request(format!(
                            "status {}",
                            response.status()
                        ))));
                    }
                    Err(e) => {
                        results.push(Err(FederationError::Request(e.to_string())));
                    }
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::AlertStatus;
    use crate::platform::notifier::Severity;
    use crate::platform::sink::SqliteSink;

    fn alert_with(metadata: HashMap<String, String>, severity: Severity) -> Alert {
        Alert {
            id: "a1".to_string(),
            rule_id: "r1".to_string(),
            title: "title".to_string(),
            description: "desc".to_string(),
            severity,
            status: AlertStatus::Active,
            source_metric: "cpu_usage_percent".to_string(),
            source_value: 95.0,
            effective_threshold: 90.0,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            acknowledged_at: None,
            resolved_at: None,
            correlation_group: "corr-1".to_string(),
            escalation_level: 0,
            metadata,
        }
    }

    #[test]
    fn propagation_requires_service_or_job_and_non_localhost_instance() {
        let mut metadata = HashMap::new();
        metadata.insert("service".to_string(), "web".to_string());
        metadata.insert("instance".to_string(), "10.0.0.1".to_string());
        assert!(FederationOrchestrator::should_propagate(&alert_with(metadata, Severity::Critical)));

        let mut localhost_metadata = HashMap::new();
        localhost_metadata.insert("service".to_string(), "web".to_string());
        localhost_metadata.insert("instance".to_string(), "localhost:9090".to_string());
        assert!(!FederationOrchestrator::should_propagate(&alert_with(localhost_metadata, Severity::Critical)));

        let no_service_metadata = HashMap::new();
        assert!(!FederationOrchestrator::should_propagate(&alert_with(no_service_metadata, Severity::Critical)));
    }

    #[test]
    fn propagation_excludes_low_and_info_severity() {
        let mut metadata = HashMap::new();
        metadata.insert("job".to_string(), "batch".to_string());
        assert!(!FederationOrchestrator::should_propagate(&alert_with(metadata, Severity::Low)));
    }

    #[tokio::test]
    async fn node_uptime_defaults_to_zero_without_history() {
        let orchestrator = FederationOrchestrator::new(vec![], SqliteSink::noop());
        assert_eq!(orchestrator.node_uptime_percent("unknown").await, 0.0);
    }

    #[tokio::test]
    async fn propagate_alert_posts_to_every_peer_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/alerts/sync")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let node = FederationNode {
            id: "peer-1".to_string(),
            node_type: NodeType::Secondary,
            status: NodeStatus::Online,
            endpoint: server.url(),
            bearer_token: None,
            capabilities: vec![],
            last_seen: None,
            metrics_endpoints: vec![],
            priority: 0,
        };
        let orchestrator = FederationOrchestrator::new(vec![node], SqliteSink::noop());

        let mut metadata = HashMap::new();
        metadata.insert("service".to_string(), "web".to_string());
        metadata.insert("instance".to_string(), "10.0.0.1".to_string());
        let alert = alert_with(metadata, Severity::Critical);

        orchestrator.propagate_alert(&alert).await;
        orchestrator.propagate_alert(&alert).await;

        mock.assert_async().await;
    }
}
