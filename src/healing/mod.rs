/// Self-Healing Orchestrator
///
/// Health classification, bounded recovery attempts, and scheduled
/// maintenance tasks. Grounded on `maintenance_orchestrator.py`.
pub mod container;

use crate::platform::clock::{MaintenanceSchedule, RunningFlag};
use crate::platform::notifier::{Channel, NotificationMessage, Notifier, Severity};
use crate::platform::sink::{MetricSink, Point};
use chrono::{DateTime, Utc};
use container::{ContainerCollaborator, ServiceStatus};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{info, warn};

const MAX_RECOVERY_ATTEMPTS: u32 = 3;
const MAX_TASKS_PER_CYCLE: usize = 5;

#[derive(Error, Debug)]
pub enum HealingError {
    #[error("container collaborator error: {0}")]
    Container(#[from] container::ContainerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct ServiceHealthRecord {
    pub name: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    pub issues: Vec<String>,
    pub recovery_attempts: u32,
    pub last_recovery: Option<DateTime<Utc>>,
    pub restart_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    Start,
    Restart,
    RestartLongWait,
    KillThenStart,
}

fn classify(status: &ServiceStatus) -> (HealthStatus, Vec<String>) {
    let mut issues = Vec::new();

    if !status.running {
        issues.push("not running".to_string());
        return (HealthStatus::Critical, issues);
    }
    if !status.healthy {
        issues.push("health check failed".to_string());
        return (HealthStatus::Critical, issues);
    }
    if status.restarting {
        issues.push("restarting".to_string());
        return (HealthStatus::Warning, issues);
    }
    if status.memory_percent > 95.0 {
        issues.push("memory".to_string());
        return (HealthStatus::Critical, issues);
    }
    if status.memory_percent > 85.0 {
        issues.push("memory".to_string());
        return (HealthStatus::Warning, issues);
    }
    if status.restart_count > 5 {
        issues.push("restart_count".to_string());
        return (HealthStatus::Warning, issues);
    }

    (HealthStatus::Healthy, issues)
}

fn choose_strategy(issues: &[String]) -> Option<RecoveryStrategy> {
    if issues.iter().any(|i| i.contains("not running")) {
        return Some(RecoveryStrategy::Start);
    }
    if issues.iter().any(|i| i.contains("health check failed")) {
        return Some(RecoveryStrategy::Restart);
    }
    if issues.iter().any(|i| i.contains("memory")) {
        return Some(RecoveryStrategy::RestartLongWait);
    }
    if issues.iter().any(|i| i.contains("restarting")) {
        return Some(RecoveryStrategy::KillThenStart);
    }
    None
}

#[derive(Debug, Clone)]
pub struct MaintenanceTask {
    pub name: &'static str,
    pub priority: u32,
}

fn routine_tasks() -> Vec<MaintenanceTask> {
    vec![
        MaintenanceTask { name: "docker_cleanup", priority: 5 },
        MaintenanceTask { name: "log_rotation", priority: 4 },
        MaintenanceTask { name: "health_validation", priority: 3 },
        MaintenanceTask { name: "config_backup", priority: 2 },
        MaintenanceTask { name: "security_updates_check", priority: 1 },
        MaintenanceTask { name: "certificate_renewal_check", priority: 1 },
    ]
}

/// Retention configuration for the `log_rotation` and `config_backup`
/// maintenance tasks.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub log_roots: Vec<PathBuf>,
    pub log_retention_days: i64,
    pub backups_root: PathBuf,
    pub backup_retention_days: i64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            log_roots: vec![PathBuf::from("/var/log")],
            log_retention_days: 30,
            backups_root: PathBuf::from("backups"),
            backup_retention_days: 7,
        }
    }
}

impl MaintenanceConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        let log_roots = std::env::var("MAINTENANCE_LOG_ROOTS")
            .ok()
            .map(|v| v.split(',').map(PathBuf::from).collect())
            .unwrap_or(default.log_roots);
        let backups_root = std::env::var("MAINTENANCE_BACKUPS_ROOT")
            .map(PathBuf::from)
            .unwrap_or(default.backups_root);
        Self {
            log_roots,
            log_retention_days: crate::platform::config::env_var("MAINTENANCE_LOG_RETENTION_DAYS", default.log_retention_days),
            backups_root,
            backup_retention_days: crate::platform::config::env_var("MAINTENANCE_BACKUP_RETENTION_DAYS", default.backup_retention_days),
        }
    }
}

/// Removes `*.log*` files under `roots` whose mtime is older than
/// `retention_days`. Unreadable files and directories are skipped silently.
fn rotate_logs(roots: &[PathBuf], retention_days: i64) -> bool {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);
    let mut ok = true;
    for root in roots {
        if remove_old_logs(root, cutoff).is_err() {
            ok = false;
        }
    }
    ok
}

fn remove_old_logs(dir: &Path, cutoff: DateTime<Utc>) -> std::io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let _ = remove_old_logs(&path, cutoff);
            continue;
        }
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.contains(".log"));
        if !is_log {
            continue;
        }
        let Ok(metadata) = entry.metadata() else { continue };
        let Ok(modified) = metadata.modified() else { continue };
        if DateTime::<Utc>::from(modified) < cutoff {
            let _ = std::fs::remove_file(&path);
        }
    }
    Ok(())
}

/// Removes directories directly under `root` whose mtime is older than
/// `retention_days`. A missing `root` is not an error: nothing to clean yet.
fn cleanup_old_backups(root: &Path, retention_days: i64) -> bool {
    if !root.is_dir() {
        return true;
    }
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return false,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Ok(metadata) = entry.metadata() else { continue };
        let Ok(modified) = metadata.modified() else { continue };
        if DateTime::<Utc>::from(modified) < cutoff {
            let _ = std::fs::remove_dir_all(&path);
        }
    }
    true
}

pub struct SelfHealingOrchestrator {
    collaborator: Arc<dyn ContainerCollaborator>,
    health: RwLock<HashMap<String, ServiceHealthRecord>>,
    blacklist: RwLock<HashSet<String>>,
    critical_services: HashSet<String>,
    schedule: MaintenanceSchedule,
    maintenance: MaintenanceConfig,
    sink: Arc<dyn MetricSink>,
    notifier: Arc<Notifier>,
}

impl SelfHealingOrchestrator {
    pub fn new(
        collaborator: Arc<dyn ContainerCollaborator>,
        critical_services: HashSet<String>,
        sink: Arc<dyn MetricSink>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self::with_maintenance_config(collaborator, critical_services, sink, notifier, MaintenanceConfig::default())
    }

    pub fn with_maintenance_config(
        collaborator: Arc<dyn ContainerCollaborator>,
        critical_services: HashSet<String>,
        sink: Arc<dyn MetricSink>,
        notifier: Arc<Notifier>,
        maintenance: MaintenanceConfig,
    ) -> Self {
        Self {
            collaborator,
            health: RwLock::new(HashMap::new()),
            blacklist: RwLock::new(HashSet::new()),
            critical_services,
            schedule: MaintenanceSchedule::default_windows(),
            maintenance,
            sink,
            notifier,
        }
    }

    pub async fn health_snapshot(&self) -> Vec<ServiceHealthRecord> {
        self.health.read().await.values().cloned().collect()
    }

    /// One health-check + recovery tick across every discovered service.
    pub async fn tick(&self) -> Result<(), HealingError> {
        let services = self.collaborator.list_services().await?;

        for service in services {
            let (status, issues) = classify(&service);
            let now = Utc::now();

            let mut health = self.health.write().await;
            let record = health.entry(service.name.clone()).or_insert_with(|| ServiceHealthRecord {
                name: service.name.clone(),
                status: HealthStatus::Unknown,
                last_check: now,
                issues: Vec::new(),
                recovery_attempts: 0,
                last_recovery: None,
                restart_count: service.restart_count,
            });
            record.status = status;
            record.last_check = now;
            record.issues = issues.clone();
            record.restart_count = service.restart_count;
            drop(health);

            self.sink
                .write_points(vec![Point::new("service_health")
                    .tag("service", service.name.clone())
                    .field("status", format!("{:?}", status))])
                .await;

            if matches!(status, HealthStatus::Critical | HealthStatus::Warning) && !issues.is_empty()
            {
                self.maybe_recover(&service.name, &issues).await;
            }
        }
        Ok(())
    }

    async fn maybe_recover(&self, service: &str, issues: &[String]) {
        if self.blacklist.read().await.contains(service) {
            return;
        }

        let Some(strategy) = choose_strategy(issues) else {
            return;
        };

        let result = self.apply_strategy(service, strategy).await;
        let mut health = self.health.write().await;
        let record = match health.get_mut(service) {
            Some(r) => r,
            None => return,
        };

        match result {
            Ok(()) => {
                record.recovery_attempts = 0;
                record.last_recovery = Some(Utc::now());
                if self.critical_services.contains(service) {
                    drop(health);
                    self.notify_recovery(service, true).await;
                }
            }
            Err(e) => {
                record.recovery_attempts += 1;
                warn!("recovery failed for {}: {}", service, e);
                let attempts = record.recovery_attempts;
                let is_critical = self.critical_services.contains(service);
                drop(health);

                if attempts >= MAX_RECOVERY_ATTEMPTS {
                    self.blacklist.write().await.insert(service.to_string());
                }
                if is_critical {
                    self.notify_recovery(service, false).await;
                }
            }
        }
    }

    async fn apply_strategy(
        &self,
        service: &str,
        strategy: RecoveryStrategy,
    ) -> Result<(), container::ContainerError> {
        match strategy {
            RecoveryStrategy::Start => self.collaborator.start(service).await,
            RecoveryStrategy::Restart | RecoveryStrategy::RestartLongWait => {
                self.collaborator.restart(service).await
            }
            RecoveryStrategy::KillThenStart => {
                self.collaborator.kill(service).await?;
                self.collaborator.start(service).await
            }
        }
    }

    async fn notify_recovery(&self, service: &str, success: bool) {
        let mut fields = HashMap::new();
        fields.insert("service".to_string(), service.to_string());

        let message = NotificationMessage {
            subject: format!(
                "{} recovery for {}",
                if success { "Successful" } else { "Failed" },
                service
            ),
            body: format!("Self-healing {} for critical service {}", if success { "succeeded" } else { "failed" }, service),
            severity: if success { Severity::Info } else { Severity::Critical },
            fields,
        };

        self.notifier
            .send(
                &format!("healing-{}", service),
                &format!("healing-{}", service),
                chrono::Duration::seconds(0),
                message,
                &[Channel::Slack],
            )
            .await;
    }

    pub fn in_maintenance_window(&self) -> bool {
        self.schedule.in_window_now()
    }

    /// Runs up to `MAX_TASKS_PER_CYCLE` routine tasks, ordered by descending
    /// priority, and records each task's success to the sink.
    pub async fn run_maintenance_cycle(&self) {
        if !self.in_maintenance_window() {
            return;
        }

        let mut tasks = routine_tasks();
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority));

        for task in tasks.into_iter().take(MAX_TASKS_PER_CYCLE) {
            let success = self.run_task(&task).await;
            self.sink
                .write_points(vec![Point::new("maintenance_tasks")
                    .tag("task", task.name.to_string())
                    .field("success", success)])
                .await;
        }
    }

    async fn run_task(&self, task: &MaintenanceTask) -> bool {
        info!("running maintenance task: {}", task.name);
        match task.name {
            "log_rotation" => {
                let roots = self.maintenance.log_roots.clone();
                let retention = self.maintenance.log_retention_days;
                tokio::task::spawn_blocking(move || rotate_logs(&roots, retention))
                    .await
                    .unwrap_or(false)
            }
            "config_backup" => {
                let root = self.maintenance.backups_root.clone();
                let retention = self.maintenance.backup_retention_days;
                tokio::task::spawn_blocking(move || cleanup_old_backups(&root, retention))
                    .await
                    .unwrap_or(false)
            }
            _ => true,
        }
    }

    pub async fn run_health_loop(self: Arc<Self>, running: RunningFlag, period: std::time::Duration) {
        let mut ticker = interval(period);
        while running.is_running() {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                warn!("self-healing tick failed: {}", e);
            }
        }
    }

    pub async fn run_maintenance_loop(self: Arc<Self>, running: RunningFlag) {
        let mut ticker = interval(std::time::Duration::from_secs(60));
        while running.is_running() {
            ticker.tick().await;
            self.run_maintenance_cycle().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::notifier::ChannelAdapter;
    use crate::platform::sink::SqliteSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysFailCollaborator;

    #[async_trait::async_trait]
    impl ContainerCollaborator for AlwaysFailCollaborator {
        async fn list_services(&self) -> Result<Vec<ServiceStatus>, container::ContainerError> {
            Ok(vec![ServiceStatus {
                name: "svc-x".to_string(),
                running: false,
                restarting: false,
                healthy: false,
                memory_percent: 0.0,
                restart_count: 0,
            }])
        }
        async fn start(&self, _service: &str) -> Result<(), container::ContainerError> {
            Err(container::ContainerError::Command("boom".to_string()))
        }
        async fn stop(&self, _service: &str) -> Result<(), container::ContainerError> {
            Ok(())
        }
        async fn restart(&self, _service: &str) -> Result<(), container::ContainerError> {
            Err(container::ContainerError::Command("boom".to_string()))
        }
        async fn kill(&self, _service: &str) -> Result<(), container::ContainerError> {
            Ok(())
        }
    }

    struct CountingAdapter(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl ChannelAdapter for CountingAdapter {
        async fn dispatch(&self, _message: &NotificationMessage) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn classify_orders_not_running_above_everything() {
        let status = ServiceStatus {
            name: "a".to_string(),
            running: false,
            restarting: true,
            healthy: false,
            memory_percent: 99.0,
            restart_count: 10,
        };
        let (health, issues) = classify(&status);
        assert_eq!(health, HealthStatus::Critical);
        assert_eq!(issues, vec!["not running".to_string()]);
    }

    #[test]
    fn strategy_selection_matches_issue_priority() {
        assert_eq!(
            choose_strategy(&["not running".to_string()]),
            Some(RecoveryStrategy::Start)
        );
        assert_eq!(
            choose_strategy(&["memory".to_string()]),
            Some(RecoveryStrategy::RestartLongWait)
        );
    }

    #[tokio::test]
    async fn recovery_blacklists_after_max_attempts() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut adapters: HashMap<Channel, Arc<dyn ChannelAdapter>> = HashMap::new();
        adapters.insert(Channel::Slack, Arc::new(CountingAdapter(count.clone())));
        let notifier = Arc::new(Notifier::new(adapters));
        let sink = SqliteSink::noop();

        let mut critical = HashSet::new();
        critical.insert("svc-x".to_string());

        let orchestrator = SelfHealingOrchestrator::new(
            Arc::new(AlwaysFailCollaborator),
            critical,
            sink,
            notifier,
        );

        for _ in 0..5 {
            orchestrator.tick().await.unwrap();
        }

        assert!(orchestrator.blacklist.read().await.contains("svc-x"));
        let health = orchestrator.health_snapshot().await;
        assert_eq!(health[0].recovery_attempts, MAX_RECOVERY_ATTEMPTS);
        // exactly 3 failure notifications, none after blacklisting
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn rotate_logs_removes_only_stale_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let old_log = dir.path().join("app.log.1");
        let fresh_log = dir.path().join("app.log");
        let unrelated = dir.path().join("notes.txt");
        std::fs::write(&old_log, b"old").unwrap();
        std::fs::write(&fresh_log, b"fresh").unwrap();
        std::fs::write(&unrelated, b"keep").unwrap();

        let ancient = std::time::SystemTime::now() - std::time::Duration::from_secs(60 * 24 * 60 * 60);
        filetime_touch(&old_log, ancient);

        assert!(rotate_logs(&[dir.path().to_path_buf()], 30));
        assert!(!old_log.exists());
        assert!(fresh_log.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn cleanup_old_backups_removes_only_stale_directories() {
        let dir = tempfile::tempdir().unwrap();
        let old_backup = dir.path().join("maintenance_backup_old");
        let fresh_backup = dir.path().join("maintenance_backup_new");
        std::fs::create_dir(&old_backup).unwrap();
        std::fs::create_dir(&fresh_backup).unwrap();

        let ancient = std::time::SystemTime::now() - std::time::Duration::from_secs(14 * 24 * 60 * 60);
        filetime_touch(&old_backup, ancient);

        assert!(cleanup_old_backups(dir.path(), 7));
        assert!(!old_backup.exists());
        assert!(fresh_backup.exists());
    }

    #[test]
    fn cleanup_old_backups_tolerates_missing_root() {
        assert!(cleanup_old_backups(std::path::Path::new("/nonexistent/backups/root"), 7));
    }

    /// Backdates a path's mtime without pulling in a filetime crate: reopens
    /// the file/dir and rewrites it through a symlink-free `set_modified`
    /// on its metadata via `std::fs::File`.
    fn filetime_touch(path: &std::path::Path, time: std::time::SystemTime) {
        let file = std::fs::File::open(path).unwrap();
        file.set_modified(time).unwrap();
    }
}
