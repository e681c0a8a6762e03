/// Dynamic Threshold Calculator
///
/// Derives an effective threshold from recent metric history, clamped so it
/// never loosens the rule's static safety floor. Grounded on
/// `alert_orchestrator.py`'s `DynamicThresholdCalculator`.
use super::Operator;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};

const HISTORY_CAPACITY: usize = 1000;
const CACHE_TTL_SECONDS: i64 = 300;
const LOOKBACK_HOURS: i64 = 1;
const MIN_POINTS_IN_LOOKBACK: usize = 10;
const FALLBACK_POINT_COUNT: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct HistoryPoint {
    pub time: DateTime<Utc>,
    pub value: f64,
}

/// Bounded, oldest-evicting ring buffer of observed values per metric.
#[derive(Default)]
pub struct MetricHistory {
    series: HashMap<String, VecDeque<HistoryPoint>>,
}

impl MetricHistory {
    pub fn record(&mut self, metric: &str, value: f64, time: DateTime<Utc>) {
        let buf = self.series.entry(metric.to_string()).or_insert_with(VecDeque::new);
        buf.push_back(HistoryPoint { time, value });
        while buf.len() > HISTORY_CAPACITY {
            buf.pop_front();
        }
    }

    fn points_since(&self, metric: &str, since: DateTime<Utc>) -> Vec<f64> {
        self.series
            .get(metric)
            .map(|buf| buf.iter().filter(|p| p.time >= since).map(|p| p.value).collect())
            .unwrap_or_default()
    }

    fn last_n(&self, metric: &str, n: usize) -> Vec<f64> {
        self.series
            .get(metric)
            .map(|buf| buf.iter().rev().take(n).map(|p| p.value).collect())
            .unwrap_or_default()
    }
}

fn mean_stddev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    (mean, variance.sqrt())
}

#[derive(Clone, Copy)]
struct CacheEntry {
    computed_at: DateTime<Utc>,
    value: f64,
}

#[derive(Default)]
pub struct ThresholdCalculator {
    cache: HashMap<(String, String, String, String), CacheEntry>,
}

impl ThresholdCalculator {
    /// Computes the effective threshold for `metric` under `op` with static
    /// floor `base` and `sensitivity`, consulting `history` and a 300s cache.
    pub fn effective_threshold(
        &mut self,
        history: &MetricHistory,
        metric: &str,
        op: Operator,
        base: f64,
        sensitivity: f64,
    ) -> f64 {
        let key = (
            metric.to_string(),
            format!("{:?}", op),
            format!("{}", base),
            format!("{}", sensitivity),
        );
        let now = Utc::now();

        if let Some(entry) = self.cache.get(&key) {
            if now.signed_duration_since(entry.computed_at).num_seconds() < CACHE_TTL_SECONDS {
                return entry.value;
            }
        }

        let since = now - Duration::hours(LOOKBACK_HOURS);
        let mut points = history.points_since(metric, since);
        if points.len() < MIN_POINTS_IN_LOOKBACK {
            points = history.last_n(metric, FALLBACK_POINT_COUNT);
        }

        let effective = if points.is_empty() {
            base
        } else {
            let (mean, stddev) = mean_stddev(&points);
            match op {
                Operator::Gt | Operator::Ge => {
                    let dynamic = mean + sensitivity * stddev;
                    base.max(dynamic)
                }
                Operator::Lt | Operator::Le => {
                    let dynamic = mean - sensitivity * stddev;
                    base.min(dynamic)
                }
                Operator::Eq | Operator::Ne => base,
            }
        };

        self.cache.insert(
            key,
            CacheEntry {
                computed_at: now,
                value: effective,
            },
        );
        effective
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_static_threshold_with_sparse_history() {
        let history = MetricHistory::default();
        let mut calc = ThresholdCalculator::default();
        let effective = calc.effective_threshold(&history, "cpu_usage_percent", Operator::Gt, 80.0, 2.0);
        assert_eq!(effective, 80.0);
    }

    #[test]
    fn dynamic_threshold_never_loosens_gt_floor() {
        let mut history = MetricHistory::default();
        for _ in 0..25 {
            history.record("cpu_usage_percent", 10.0, Utc::now());
        }
        let mut calc = ThresholdCalculator::default();
        let effective = calc.effective_threshold(&history, "cpu_usage_percent", Operator::Gt, 80.0, 2.0);
        assert_eq!(effective, 80.0);
    }

    #[test]
    fn dynamic_threshold_can_tighten_above_mean() {
        let mut history = MetricHistory::default();
        for i in 0..30 {
            history.record("cpu_usage_percent", 85.0 + i as f64 * 0.1, Utc::now());
        }
        let mut calc = ThresholdCalculator::default();
        let effective = calc.effective_threshold(&history, "cpu_usage_percent", Operator::Gt, 80.0, 1.0);
        assert!(effective >= 80.0);
    }

    #[test]
    fn lt_threshold_never_rises_above_floor() {
        let mut history = MetricHistory::default();
        for _ in 0..20 {
            history.record("disk_free_percent", 50.0, Utc::now());
        }
        let mut calc = ThresholdCalculator::default();
        let effective = calc.effective_threshold(&history, "disk_free_percent", Operator::Lt, 10.0, 2.0);
        assert!(effective <= 10.0);
    }
}
