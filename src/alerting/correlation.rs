/// Correlation Engine
///
/// Groups related alerts under a shared correlation id. Grounded on
/// `alert_orchestrator.py`'s `AlertCorrelator`.
use super::Alert;
use chrono::Duration;
use md5::{Digest, Md5};

const CORRELATION_WINDOW_SECONDS: i64 = 5 * 60;

pub struct CorrelationEngine;

impl CorrelationEngine {
    /// Determines the correlation group for `new_alert` given the set of
    /// currently active alerts, evaluated in order: service match, host
    /// match, metric-family match, else mint a fresh group.
    pub fn assign_group(new_alert: &Alert, active: &[&Alert]) -> String {
        let window = Duration::seconds(CORRELATION_WINDOW_SECONDS);

        for candidate in active {
            if (new_alert.first_seen - candidate.first_seen).abs() <= window {
                if let (Some(a), Some(b)) = (
                    new_alert.metadata.get("service"),
                    candidate.metadata.get("service"),
                ) {
                    if a == b {
                        return candidate.correlation_group.clone();
                    }
                }
            }
        }

        for candidate in active {
            if (new_alert.first_seen - candidate.first_seen).abs() <= window {
                if let (Some(a), Some(b)) = (
                    new_alert.metadata.get("host"),
                    candidate.metadata.get("host"),
                ) {
                    if a == b {
                        return candidate.correlation_group.clone();
                    }
                }
            }
        }

        for candidate in active {
            let family_a = new_alert.source_metric.split('_').next().unwrap_or("");
            let family_b = candidate.source_metric.split('_').next().unwrap_or("");
            if !family_a.is_empty() && family_a == family_b {
                return candidate.correlation_group.clone();
            }
        }

        let mut hasher = Md5::new();
        hasher.update(new_alert.id.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        format!("corr-{}-{}", new_alert.first_seen.timestamp(), &digest[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::{AlertStatus, Severity};
    use chrono::Utc;
    use std::collections::HashMap;

    fn make_alert(id: &str, service: &str, metric: &str, group: &str) -> Alert {
        let mut metadata = HashMap::new();
        metadata.insert("service".to_string(), service.to_string());
        Alert {
            id: id.to_string(),
            rule_id: "rule-1".to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            severity: Severity::High,
            status: AlertStatus::Active,
            source_metric: metric.to_string(),
            source_value: 0.0,
            effective_threshold: 0.0,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            acknowledged_at: None,
            resolved_at: None,
            correlation_group: group.to_string(),
            escalation_level: 0,
            metadata,
        }
    }

    #[test]
    fn reuses_group_for_matching_service() {
        let existing = make_alert("a1", "web", "cpu_usage_percent", "corr-existing");
        let fresh = make_alert("a2", "web", "memory_usage_percent", "corr-new");
        let group = CorrelationEngine::assign_group(&fresh, &[&existing]);
        assert_eq!(group, "corr-existing");
    }

    #[test]
    fn mints_fresh_group_when_nothing_matches() {
        let existing = make_alert("a1", "db", "disk_usage_percent", "corr-existing");
        let fresh = make_alert("a2", "web", "network_latency_ms", "corr-new");
        let group = CorrelationEngine::assign_group(&fresh, &[&existing]);
        assert!(group.starts_with("corr-"));
        assert_ne!(group, "corr-existing");
    }
}
