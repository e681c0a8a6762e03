/// Node health probing.
use super::NodeStatus;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::collections::VecDeque;
use std::time::Duration;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);
const METRICS_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct HealthSample {
    pub timestamp: DateTime<Utc>,
    pub status: NodeStatus,
    pub response_time_ms: u64,
}

#[derive(Debug, Default)]
pub struct HealthHistory {
    samples: VecDeque<HealthSample>,
}

impl HealthHistory {
    pub fn push(&mut self, sample: HealthSample) {
        self.samples.push_back(sample);
        while self.samples.len() > HISTORY_CAPACITY {
            self.samples.pop_front();
        }
    }

    pub fn uptime_percent(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let online = self
            .samples
            .iter()
            .filter(|s| matches!(s.status, NodeStatus::Online))
            .count();
        online as f64 / self.samples.len() as f64 * 100.0
    }

    pub fn average_response_time_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: u64 = self.samples.iter().map(|s| s.response_time_ms).sum();
        total as f64 / self.samples.len() as f64
    }
}

/// Probes `<endpoint>/health` with a 10s timeout and classifies the result.
pub async fn probe_health(client: &Client, endpoint: &str, bearer: Option<&str>) -> (NodeStatus, u64) {
    let start = std::time::Instant::now();
    let url = format!("{}/health", endpoint.trim_end_matches('/'));
    let mut request = client.get(&url).timeout(HEALTH_TIMEOUT);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }

    let status = match request.send().await {
        Ok(response) if response.status().is_success() => {
            match response.json::<serde_json::Value>().await {
                Ok(body) => body
                    .get("status")
                    .and_then(|v| v.as_str())
                    .and_then(parse_status)
                    .unwrap_or(NodeStatus::Online),
                Err(_) => NodeStatus::Online,
            }
        }
        Ok(response) => {
            tracing::warn!("node health probe returned status {}", response.status());
            NodeStatus::Degraded
        }
        Err(_) => NodeStatus::Offline,
    };

    (status, start.elapsed().as_millis() as u64)
}

fn parse_status(value: &str) -> Option<NodeStatus> {
    match value {
        "online" => Some(NodeStatus::Online),
        "offline" => Some(NodeStatus::Offline),
        "degraded" => Some(NodeStatus::Degraded),
        "maintenance" => Some(NodeStatus::Maintenance),
        _ => None,
    }
}

/// Probes each declared metrics endpoint with a 5s timeout; true iff any
/// responds 200 with a non-empty body.
pub async fn probe_metrics_available(client: &Client, endpoints: &[String]) -> bool {
    for endpoint in endpoints {
        let result = client.get(endpoint).timeout(METRICS_PROBE_TIMEOUT).send().await;
        if let Ok(response) = result {
            if response.status().is_success() {
                if let Ok(body) = response.text().await {
                    if !body.trim().is_empty() {
                        return true;
                    }
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_percent_counts_online_samples() {
        let mut history = HealthHistory::default();
        history.push(HealthSample { timestamp: Utc::now(), status: NodeStatus::Online, response_time_ms: 10 });
        history.push(HealthSample { timestamp: Utc::now(), status: NodeStatus::Offline, response_time_ms: 10 });
        assert_eq!(history.uptime_percent(), 50.0);
    }

    #[test]
    fn empty_history_has_zero_uptime() {
        assert_eq!(HealthHistory::default().uptime_percent(), 0.0);
    }

    #[test]
    fn parses_known_status_strings() {
        assert!(matches!(parse_status("online"), Some(NodeStatus::Online)));
        assert!(parse_status("bogus").is_none());
    }
}
