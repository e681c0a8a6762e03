/// Prometheus exposition and instant-query parsing.
///
/// Both parsers are best-effort: unparseable lines/entries are skipped,
/// never fatal, matching the federation metrics collection contract.
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Sample {
    pub metric_name: String,
    pub value: f64,
    pub labels: HashMap<String, String>,
}

/// Parses Prometheus text exposition format, skipping comments and any
/// line that fails to parse as `name{labels} value`.
pub fn parse_exposition(body: &str) -> Vec<Sample> {
    let mut samples = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(sample) = parse_exposition_line(line) {
            samples.push(sample);
        }
    }
    samples
}

fn parse_exposition_line(line: &str) -> Option<Sample> {
    let (name_and_labels, value_str) = line.rsplit_once(' ')?;
    let value: f64 = value_str.trim().parse().ok()?;

    if let Some(brace_start) = name_and_labels.find('{') {
        let metric_name = name_and_labels[..brace_start].to_string();
        let brace_end = name_and_labels.rfind('}')?;
        let labels = parse_label_set(&name_and_labels[brace_start + 1..brace_end]);
        Some(Sample { metric_name, value, labels })
    } else {
        Some(Sample {
            metric_name: name_and_labels.trim().to_string(),
            value,
            labels: HashMap::new(),
        })
    }
}

fn parse_label_set(raw: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        if let Some((key, value)) = pair.split_once('=') {
            let value = value.trim().trim_matches('"');
            labels.insert(key.trim().to_string(), value.to_string());
        }
    }
    labels
}

/// Parses a Prometheus instant-query JSON response:
/// `{"data": {"result": [{"metric": {...}, "value": [ts, "123.4"]}, ...]}}`.
pub fn parse_instant_query(body: &str) -> Vec<Sample> {
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) else {
        return Vec::new();
    };

    let Some(results) = parsed
        .get("data")
        .and_then(|d| d.get("result"))
        .and_then(|r| r.as_array())
    else {
        return Vec::new();
    };

    let mut samples = Vec::new();
    for entry in results {
        let Some(metric) = entry.get("metric").and_then(|m| m.as_object()) else {
            continue;
        };
        let Some(value_pair) = entry.get("value").and_then(|v| v.as_array()) else {
            continue;
        };
        let Some(value_str) = value_pair.get(1).and_then(|v| v.as_str()) else {
            continue;
        };
        let Ok(value) = value_str.parse::<f64>() else {
            continue;
        };

        let metric_name = metric
            .get("__name__")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let labels = metric
            .iter()
            .filter(|(k, _)| *k != "__name__")
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();

        samples.push(Sample { metric_name, value, labels });
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_exposition_line() {
        let body = "cpu_usage_percent 42.5\n";
        let samples = parse_exposition(body);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].metric_name, "cpu_usage_percent");
        assert_eq!(samples[0].value, 42.5);
    }

    #[test]
    fn parses_labeled_exposition_line_and_skips_comments() {
        let body = "# HELP cpu_usage_percent docs\ncpu_usage_percent{host=\"h1\"} 11.0\n";
        let samples = parse_exposition(body);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].labels.get("host").map(String::as_str), Some("h1"));
    }

    #[test]
    fn skips_unparseable_lines() {
        let body = "not a valid line at all\ncpu_usage_percent 5\n";
        let samples = parse_exposition(body);
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn parses_instant_query_response() {
        let body = r#"{"data":{"result":[{"metric":{"__name__":"up","instance":"h1"},"value":[123,"1"]}]}}"#;
        let samples = parse_instant_query(body);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].metric_name, "up");
        assert_eq!(samples[0].value, 1.0);
    }

    #[test]
    fn instant_query_malformed_body_returns_empty() {
        assert!(parse_instant_query("not json").is_empty());
    }
}
