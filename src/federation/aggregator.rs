/// Metric aggregation across federation nodes.
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMethod {
    Sum,
    Average,
    Min,
    Max,
    Count,
    P95,
    WeightedAverage,
}

#[derive(Debug, Clone)]
pub struct Contribution {
    pub node_id: String,
    pub value: f64,
    pub weight: f64,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct AggregationResult {
    pub value: f64,
    pub confidence: f64,
    pub contributing_nodes: Vec<String>,
    pub labels: HashMap<String, String>,
}

/// Aggregates `contributions` per `method`, per §4.7.2's exact formulas.
pub fn aggregate(method: AggregationMethod, contributions: &[Contribution]) -> AggregationResult {
    let n = contributions.len();
    let contributing_nodes: Vec<String> = contributions.iter().map(|c| c.node_id.clone()).collect();
    let labels = merge_labels(contributions);

    if n == 0 {
        return AggregationResult {
            value: 0.0,
            confidence: 0.0,
            contributing_nodes,
            labels,
        };
    }

    let (value, confidence) = match method {
        AggregationMethod::Sum => {
            let sum: f64 = contributions.iter().map(|c| c.value).sum();
            (sum, (n as f64 / 5.0).min(1.0))
        }
        AggregationMethod::Average => {
            let sum: f64 = contributions.iter().map(|c| c.value).sum();
            (sum / n as f64, (n as f64 / 3.0).min(1.0))
        }
        AggregationMethod::Min => (
            contributions.iter().map(|c| c.value).fold(f64::INFINITY, f64::min),
            1.0,
        ),
        AggregationMethod::Max => (
            contributions.iter().map(|c| c.value).fold(f64::NEG_INFINITY, f64::max),
            1.0,
        ),
        AggregationMethod::Count => (n as f64, 1.0),
        AggregationMethod::P95 => {
            let mut values: Vec<f64> = contributions.iter().map(|c| c.value).collect();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let idx = ((0.95 * n as f64).floor() as usize).min(n - 1);
            (values[idx], (n as f64 / 10.0).min(1.0))
        }
        AggregationMethod::WeightedAverage => {
            let weight_sum: f64 = contributions.iter().map(|c| c.weight).sum();
            if weight_sum == 0.0 {
                return AggregationResult {
                    value: 0.0,
                    confidence: 0.0,
                    contributing_nodes,
                    labels,
                };
            }
            let weighted_sum: f64 = contributions.iter().map(|c| c.weight * c.value).sum();
            (weighted_sum / weight_sum, (n as f64 / 3.0).min(1.0))
        }
    };

    AggregationResult { value, confidence, contributing_nodes, labels }
}

/// Retains only label keys present in every contribution; a key with
/// multiple distinct values is replaced with `"multiple[k]"`.
fn merge_labels(contributions: &[Contribution]) -> HashMap<String, String> {
    let mut merged = HashMap::new();
    let Some(first) = contributions.first() else {
        return merged;
    };

    for key in first.labels.keys() {
        if !contributions.iter().all(|c| c.labels.contains_key(key)) {
            continue;
        }
        let distinct: std::collections::HashSet<&String> =
            contributions.iter().filter_map(|c| c.labels.get(key)).collect();
        if distinct.len() == 1 {
            merged.insert(key.clone(), (*distinct.iter().next().unwrap()).clone());
        } else {
            merged.insert(key.clone(), format!("multiple[{}]", distinct.len()));
        }
    }
    merged
}

pub fn default_aggregation_rules() -> HashMap<String, AggregationMethod> {
    [
        ("cpu_usage_percent", AggregationMethod::WeightedAverage),
        ("memory_usage_percent", AggregationMethod::WeightedAverage),
        ("disk_usage_percent", AggregationMethod::Max),
        ("network_bytes_total", AggregationMethod::Sum),
        ("http_requests_total", AggregationMethod::Sum),
        ("response_time_seconds", AggregationMethod::P95),
        ("error_rate", AggregationMethod::Average),
        ("uptime_seconds", AggregationMethod::Min),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contribution(node: &str, value: f64, weight: f64) -> Contribution {
        Contribution {
            node_id: node.to_string(),
            value,
            weight,
            labels: HashMap::new(),
        }
    }

    #[test]
    fn p95_matches_scenario_s6() {
        let contributions: Vec<Contribution> = (1..=20)
            .map(|i| contribution(&format!("n{}", i), i as f64, 1.0))
            .collect();
        let result = aggregate(AggregationMethod::P95, &contributions);
        assert_eq!(result.value, 20.0);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn weighted_average_zero_weight_returns_zero_confidence() {
        let contributions = vec![contribution("n1", 10.0, 0.0), contribution("n2", 20.0, 0.0)];
        let result = aggregate(AggregationMethod::WeightedAverage, &contributions);
        assert_eq!(result.value, 0.0);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn sum_confidence_caps_at_one() {
        let contributions: Vec<Contribution> = (0..10).map(|i| contribution(&format!("n{}", i), 1.0, 1.0)).collect();
        let result = aggregate(AggregationMethod::Sum, &contributions);
        assert_eq!(result.value, 10.0);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn label_merge_marks_multiple_distinct_values() {
        let mut a = contribution("n1", 1.0, 1.0);
        a.labels.insert("region".to_string(), "us".to_string());
        let mut b = contribution("n2", 2.0, 1.0);
        b.labels.insert("region".to_string(), "eu".to_string());
        let result = aggregate(AggregationMethod::Sum, &[a, b]);
        assert_eq!(result.labels.get("region").map(String::as_str), Some("multiple[2]"));
    }

    #[test]
    fn empty_contributions_yield_zero_confidence() {
        let result = aggregate(AggregationMethod::Sum, &[]);
        assert_eq!(result.confidence, 0.0);
    }
}
