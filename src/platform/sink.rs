/// Metric Sink
///
/// Append-only, best-effort time-series writer. Orchestrators never hold a
/// raw database client; they write points and query recent windows through
/// this collaborator. Failures never propagate — the sink degrades to a
/// no-op and counts the failure instead.
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Point {
    pub measurement: String,
    pub tags: HashMap<String, String>,
    pub fields: HashMap<String, Value>,
    pub time: DateTime<Utc>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: HashMap::new(),
            fields: HashMap::new(),
            time: Utc::now(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn write_points(&self, points: Vec<Point>);
    async fn query_recent(&self, measurement: &str, window: std::time::Duration) -> Vec<Point>;
    fn dropped_count(&self) -> u64;
}

/// SQLite-backed sink. Points are stored in a single wide table
/// (`metric_points`) keyed by measurement, with tags/fields serialized as
/// JSON, mirroring the line-protocol point shape the original contract used.
pub struct SqliteSink {
    pool: Option<SqlitePool>,
    dropped: AtomicU64,
}

impl SqliteSink {
    /// Bootstraps the backing table. On failure, the sink downgrades to
    /// no-op mode with a warning rather than returning an error to the
    /// caller — startup must not fail because the TSDB is unreachable.
    pub async fn new(pool: SqlitePool) -> Arc<Self> {
        match sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metric_points (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                measurement TEXT NOT NULL,
                tags TEXT NOT NULL,
                fields TEXT NOT NULL,
                time DATETIME NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        {
            Ok(_) => Arc::new(Self {
                pool: Some(pool),
                dropped: AtomicU64::new(0),
            }),
            Err(e) => {
                warn!("metric sink bootstrap failed, degrading to no-op: {}", e);
                Arc::new(Self {
                    pool: None,
                    dropped: AtomicU64::new(0),
                })
            }
        }
    }

    pub fn noop() -> Arc<Self> {
        Arc::new(Self {
            pool: None,
            dropped: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl MetricSink for SqliteSink {
    async fn write_points(&self, points: Vec<Point>) {
        let Some(pool) = &self.pool else {
            self.dropped.fetch_add(points.len() as u64, Ordering::Relaxed);
            return;
        };

        for point in points {
            let tags = serde_json::to_string(&point.tags).unwrap_or_default();
            let fields = serde_json::to_string(&point.fields).unwrap_or_default();
            let result = sqlx::query(
                "INSERT INTO metric_points (measurement, tags, fields, time) VALUES (?, ?, ?, ?)",
            )
            .bind(&point.measurement)
            .bind(&tags)
            .bind(&fields)
            .bind(point.time.to_rfc3339())
            .execute(pool)
            .await;

            if result.is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn query_recent(&self, measurement: &str, window: std::time::Duration) -> Vec<Point> {
        let Some(pool) = &self.pool else {
            return Vec::new();
        };

        let cutoff = Utc::now()
            - ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::seconds(0));

        let rows = sqlx::query_as::<_, (String, String, String, String)>(
            "SELECT measurement, tags, fields, time FROM metric_points WHERE measurement = ? AND time >= ? ORDER BY time ASC",
        )
        .bind(measurement)
        .bind(cutoff.to_rfc3339())
        .fetch_all(pool)
        .await
        .unwrap_or_default();

        rows.into_iter()
            .filter_map(|(measurement, tags, fields, time)| {
                let tags: HashMap<String, String> = serde_json::from_str(&tags).ok()?;
                let fields: HashMap<String, Value> = serde_json::from_str(&fields).ok()?;
                let time = DateTime::parse_from_rfc3339(&time).ok()?.with_timezone(&Utc);
                Some(Point {
                    measurement,
                    tags,
                    fields,
                    time,
                })
            })
            .collect()
    }

    fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_sink_counts_drops_instead_of_failing() {
        let sink = SqliteSink::noop();
        sink.write_points(vec![Point::new("cpu_usage_percent")]).await;
        assert_eq!(sink.dropped_count(), 1);
        assert!(sink
            .query_recent("cpu_usage_percent", std::time::Duration::from_secs(60))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn round_trips_a_written_point() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let sink = SqliteSink::new(pool).await;
        let point = Point::new("cpu_usage_percent")
            .tag("host", "h1")
            .field("value", 91.2);
        sink.write_points(vec![point]).await;

        let recent = sink
            .query_recent("cpu_usage_percent", std::time::Duration::from_secs(3600))
            .await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].tags.get("host").map(String::as_str), Some("h1"));
    }
}
