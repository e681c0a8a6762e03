/// Backup Orchestrator
///
/// Scheduled backup targets, storage placement, verification, retention.
/// Grounded on `backup_orchestrator.py`, reusing the external-command
/// interface (`platform::command`) the Container Collaborator also uses.
pub mod pipeline;
pub mod storage;

use crate::platform::config::env_var;
use crate::platform::notifier::{Channel, NotificationMessage, Notifier, Severity};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use storage::StorageLocation;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("command failed: {0}")]
    Command(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("configuration error: {0}")]
    Config(String),
}

pub type BackupResult<T> = Result<T, BackupError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupType {
    Full,
    Incremental,
    Differential,
    Snapshot,
    Database,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    Daily7Weekly4Monthly12,
    Daily30Weekly8Monthly6,
    Hourly24Daily7Weekly4,
}

impl RetentionPolicy {
    /// Advisory keep-count; a real calendar-bucket retention scheme may
    /// refine this further.
    pub fn keep_count(&self) -> usize {
        match self {
            RetentionPolicy::Daily7Weekly4Monthly12 => 7,
            RetentionPolicy::Daily30Weekly8Monthly6 => 30,
            RetentionPolicy::Hourly24Daily7Weekly4 => 24,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackupTarget {
    pub id: String,
    pub source_paths: Vec<String>,
    pub backup_type: BackupType,
    pub retention: RetentionPolicy,
    pub compress: bool,
    pub exclude_patterns: Vec<String>,
    pub pre_commands: Vec<String>,
    pub post_commands: Vec<String>,
    pub priority: u32,
    pub database_dump_command: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct BackupOperation {
    pub id: String,
    pub target_id: String,
    pub status: OperationStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub source_bytes: u64,
    pub backup_bytes: u64,
    pub file_count: u64,
    pub artifact_path: Option<PathBuf>,
    pub checksum: Option<String>,
    pub verified: Option<bool>,
    pub error: Option<String>,
}

impl BackupOperation {
    fn new(target_id: &str) -> Self {
        Self {
            id: format!("bkp-{}-{}", target_id, Utc::now().timestamp_nanos_opt().unwrap_or_default()),
            target_id: target_id.to_string(),
            status: OperationStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            source_bytes: 0,
            backup_bytes: 0,
            file_count: 0,
            artifact_path: None,
            checksum: None,
            verified: None,
            error: None,
        }
    }

    pub fn compression_ratio(&self) -> f64 {
        if self.source_bytes == 0 {
            return 0.0;
        }
        self.backup_bytes as f64 / self.source_bytes as f64
    }
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub root: PathBuf,
    pub verify: bool,
    pub config_dir: String,
    pub tsdb_data_dir: String,
    pub sqlite_db_path: String,
    pub dashboard_config_dir: String,
    pub audit_log_dir: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/backups/sentinel-orch"),
            verify: true,
            config_dir: "/etc/sentinel-orch".to_string(),
            tsdb_data_dir: "/var/lib/sentinel-orch/tsdb".to_string(),
            sqlite_db_path: "/var/lib/sentinel-orch/sentinel.db".to_string(),
            dashboard_config_dir: "/etc/sentinel-orch/dashboard".to_string(),
            audit_log_dir: "/var/log/sentinel-orch/audit".to_string(),
        }
    }
}

impl BackupConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            root: env_var("BACKUP_ROOT", default.root.to_string_lossy().to_string()).into(),
            verify: env_var("BACKUP_VERIFY", default.verify),
            config_dir: env_var("BACKUP_CONFIG_DIR", default.config_dir),
            tsdb_data_dir: env_var("BACKUP_TSDB_DIR", default.tsdb_data_dir),
            sqlite_db_path: env_var("BACKUP_SQLITE_PATH", default.sqlite_db_path),
            dashboard_config_dir: env_var("BACKUP_DASHBOARD_CONFIG_DIR", default.dashboard_config_dir),
            audit_log_dir: env_var("BACKUP_AUDIT_LOG_DIR", default.audit_log_dir),
        }
    }
}

/// Seeds default targets the same way default alert rules are seeded:
/// source paths come from configuration, never hardcoded into the
/// seeding logic itself.
pub fn default_targets(config: &BackupConfig) -> Vec<BackupTarget> {
    vec![
        BackupTarget {
            id: "system_config".to_string(),
            source_paths: vec![config.config_dir.clone()],
            backup_type: BackupType::Full,
            retention: RetentionPolicy::Daily30Weekly8Monthly6,
            compress: true,
            exclude_patterns: vec!["*.tmp".to_string()],
            pre_commands: vec![],
            post_commands: vec![],
            priority: 1,
            database_dump_command: None,
        },
        BackupTarget {
            id: "tsdb_data".to_string(),
            source_paths: vec![config.tsdb_data_dir.clone()],
            backup_type: BackupType::Snapshot,
            retention: RetentionPolicy::Daily7Weekly4Monthly12,
            compress: true,
            exclude_patterns: vec![],
            pre_commands: vec![],
            post_commands: vec![],
            priority: 2,
            database_dump_command: None,
        },
        BackupTarget {
            id: "relational_db".to_string(),
            source_paths: vec![config.sqlite_db_path.clone()],
            backup_type: BackupType::Database,
            retention: RetentionPolicy::Daily7Weekly4Monthly12,
            compress: true,
            exclude_patterns: vec![],
            pre_commands: vec![],
            post_commands: vec![],
            priority: 3,
            database_dump_command: Some(format!("sqlite3 {} .dump", config.sqlite_db_path)),
        },
        BackupTarget {
            id: "dashboard_config".to_string(),
            source_paths: vec![config.dashboard_config_dir.clone()],
            backup_type: BackupType::Full,
            retention: RetentionPolicy::Daily30Weekly8Monthly6,
            compress: true,
            exclude_patterns: vec![],
            pre_commands: vec![],
            post_commands: vec![],
            priority: 4,
            database_dump_command: None,
        },
        BackupTarget {
            id: "audit_logs".to_string(),
            source_paths: vec![config.audit_log_dir.clone()],
            backup_type: BackupType::Incremental,
            retention: RetentionPolicy::Hourly24Daily7Weekly4,
            compress: true,
            exclude_patterns: vec![],
            pre_commands: vec![],
            post_commands: vec![],
            priority: 5,
            database_dump_command: None,
        },
    ]
}

pub struct BackupOrchestrator {
    config: BackupConfig,
    targets: Vec<BackupTarget>,
    locations: Vec<StorageLocation>,
    operations: Mutex<HashMap<String, VecDeque<BackupOperation>>>,
    in_progress: Mutex<HashSet<String>>,
    notifier: Arc<Notifier>,
}

const OPERATION_HISTORY_CAP: usize = 200;

impl BackupOrchestrator {
    pub fn new(
        config: BackupConfig,
        targets: Vec<BackupTarget>,
        locations: Vec<StorageLocation>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            config,
            targets,
            locations,
            operations: Mutex::new(HashMap::new()),
            in_progress: Mutex::new(HashSet::new()),
            notifier,
        }
    }

    pub fn targets(&self) -> &[BackupTarget] {
        &self.targets
    }

    pub async fn history_snapshot(&self, target_id: &str) -> Vec<BackupOperation> {
        self.operations
            .lock()
            .await
            .get(target_id)
            .map(|ops| ops.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Enqueues any target whose last completed operation is absent or
    /// older than 24 hours, then drains sequentially. Targets already
    /// running are skipped, enforcing per-target mutual exclusion.
    pub async fn run_due_backups(&self) {
        let mut due: Vec<&BackupTarget> = Vec::new();
        for target in &self.targets {
            if self.is_due(&target.id).await {
                due.push(target);
            }
        }
        due.sort_by_key(|t| t.priority);

        for target in due {
            if self.in_progress.lock().await.contains(&target.id) {
                continue;
            }
            self.run_backup(target).await;
        }
    }

    /// Runs `run_due_backups` on a fixed interval until `running` is cleared.
    pub async fn run_backup_loop(self: Arc<Self>, running: crate::platform::clock::RunningFlag, period: std::time::Duration) {
        let mut ticker = tokio::time::interval(period);
        info!("backup scheduler loop started");
        while running.is_running() {
            ticker.tick().await;
            self.run_due_backups().await;
        }
    }

    async fn is_due(&self, target_id: &str) -> bool {
        let operations = self.operations.lock().await;
        match operations.get(target_id).and_then(|ops| {
            ops.iter()
                .rev()
                .find(|op| op.status == OperationStatus::Completed)
        }) {
            None => true,
            Some(op) => Utc::now().signed_duration_since(op.started_at) >= chrono::Duration::hours(24),
        }
    }

    pub async fn run_backup(&self, target: &BackupTarget) -> BackupOperation {
        self.in_progress.lock().await.insert(target.id.clone());
        let mut operation = BackupOperation::new(&target.id);

        let result = self.execute(target, &mut operation).await;
        operation.finished_at = Some(Utc::now());

        match result {
            Ok(()) => {
                operation.status = OperationStatus::Completed;
                info!("backup completed for target {}", target.id);
            }
            Err(e) => {
                operation.status = OperationStatus::Failed;
                operation.error = Some(e.to_string());
                error!("backup failed for target {}: {}", target.id, e);
            }
        }

        self.notify(target, &operation).await;
        self.push_history(target.id.clone(), operation.clone()).await;
        self.cleanup_target(target).await;
        self.in_progress.lock().await.remove(&target.id);
        operation
    }

    async fn execute(&self, target: &BackupTarget, operation: &mut BackupOperation) -> BackupResult<()> {
        operation.status = OperationStatus::Running;

        pipeline::run_hooks(&target.pre_commands).await;

        let (source_bytes, file_count) = pipeline::estimate_size(&target.source_paths);
        operation.source_bytes = source_bytes;
        operation.file_count = file_count;

        let location = storage::select_location(&self.locations, source_bytes)
            .map(|l| l.root.clone())
            .unwrap_or_else(|| self.config.root.clone());
        let dest = storage::artifact_path(&location, &target.id, backup_type_label(target.backup_type));

        pipeline::create_archive(target, &dest).await?;

        let backup_bytes = std::fs::metadata(&dest).map(|m| m.len()).unwrap_or(0);
        operation.backup_bytes = backup_bytes;

        let checksum = pipeline::checksum_file(&dest)?;
        operation.checksum = Some(checksum.clone());
        operation.artifact_path = Some(dest.clone());

        if self.config.verify {
            let verified = pipeline::verify_archive(&dest, &checksum).await;
            operation.verified = Some(verified);
            if !verified {
                return Err(BackupError::Io("archive verification failed".to_string()));
            }
        }

        pipeline::run_hooks(&target.post_commands).await;
        Ok(())
    }

    async fn cleanup_target(&self, target: &BackupTarget) {
        let mut operations = self.operations.lock().await;
        let Some(history) = operations.get_mut(&target.id) else {
            return;
        };
        let keep = target.retention.keep_count();
        let completed: Vec<usize> = history
            .iter()
            .enumerate()
            .filter(|(_, op)| op.status == OperationStatus::Completed)
            .map(|(i, _)| i)
            .collect();
        if completed.len() <= keep {
            return;
        }
        let to_remove = completed.len() - keep;
        for &idx in completed.iter().take(to_remove) {
            if let Some(op) = history.get(idx) {
                if let Some(path) = &op.artifact_path {
                    if let Err(e) = std::fs::remove_file(path) {
                        warn!("failed to remove expired backup artifact {:?}: {}", path, e);
                    }
                }
            }
        }
    }

    async fn push_history(&self, target_id: String, operation: BackupOperation) {
        let mut operations = self.operations.lock().await;
        let entry = operations.entry(target_id).or_insert_with(VecDeque::new);
        entry.push_back(operation);
        while entry.len() > OPERATION_HISTORY_CAP {
            entry.pop_front();
        }
    }

    async fn notify(&self, target: &BackupTarget, operation: &BackupOperation) {
        let success = operation.status == OperationStatus::Completed;
        let mut fields = HashMap::new();
        fields.insert("target".to_string(), target.id.clone());
        fields.insert("bytes".to_string(), operation.backup_bytes.to_string());

        let message = NotificationMessage {
            subject: format!("Backup {} for {}", if success { "succeeded" } else { "failed" }, target.id),
            body: operation
                .error
                .clone()
                .unwrap_or_else(|| format!("{} files, {} bytes", operation.file_count, operation.backup_bytes)),
            severity: if success { Severity::Info } else { Severity::High },
            fields,
        };

        self.notifier
            .send(
                &operation.id,
                &format!("backup-{}", target.id),
                chrono::Duration::hours(1),
                message,
                &[Channel::Slack],
            )
            .await;
    }
}

fn backup_type_label(backup_type: BackupType) -> &'static str {
    match backup_type {
        BackupType::Full => "full",
        BackupType::Incremental => "incremental",
        BackupType::Differential => "differential",
        BackupType::Snapshot => "snapshot",
        BackupType::Database => "db",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::notifier::ChannelAdapter;
    use storage::StorageKind;

    struct NullAdapter;
    #[async_trait::async_trait]
    impl ChannelAdapter for NullAdapter {
        async fn dispatch(&self, _message: &NotificationMessage) -> Result<(), String> {
            Ok(())
        }
    }

    fn notifier() -> Arc<Notifier> {
        let mut adapters: HashMap<Channel, Arc<dyn ChannelAdapter>> = HashMap::new();
        adapters.insert(Channel::Slack, Arc::new(NullAdapter));
        Arc::new(Notifier::new(adapters))
    }

    #[test]
    fn retention_keep_counts_match_policy() {
        assert_eq!(RetentionPolicy::Daily7Weekly4Monthly12.keep_count(), 7);
        assert_eq!(RetentionPolicy::Daily30Weekly8Monthly6.keep_count(), 30);
        assert_eq!(RetentionPolicy::Hourly24Daily7Weekly4.keep_count(), 24);
    }

    #[test]
    fn default_targets_are_config_driven_not_hardcoded() {
        let config = BackupConfig {
            config_dir: "/custom/config".to_string(),
            ..BackupConfig::default()
        };
        let targets = default_targets(&config);
        let system = targets.iter().find(|t| t.id == "system_config").unwrap();
        assert_eq!(system.source_paths, vec!["/custom/config".to_string()]);
    }

    #[tokio::test]
    async fn is_due_true_when_no_history() {
        let config = BackupConfig::default();
        let orchestrator = BackupOrchestrator::new(config, vec![], vec![], notifier());
        assert!(orchestrator.is_due("never-run").await);
    }

    #[tokio::test]
    async fn cleanup_respects_retention_keep_count() {
        let config = BackupConfig::default();
        let orchestrator = BackupOrchestrator::new(config, vec![], vec![], notifier());
        let target = BackupTarget {
            id: "t1".to_string(),
            source_paths: vec![],
            backup_type: BackupType::Full,
            retention: RetentionPolicy::Daily7Weekly4Monthly12,
            compress: true,
            exclude_patterns: vec![],
            pre_commands: vec![],
            post_commands: vec![],
            priority: 1,
            database_dump_command: None,
        };

        for _ in 0..10 {
            let mut op = BackupOperation::new(&target.id);
            op.status = OperationStatus::Completed;
            orchestrator.push_history(target.id.clone(), op).await;
        }
        orchestrator.cleanup_target(&target).await;

        let history = orchestrator.history_snapshot(&target.id).await;
        let completed = history.iter().filter(|o| o.status == OperationStatus::Completed).count();
        assert_eq!(completed, 7);
    }

    #[test]
    fn storage_location_kind_compiles() {
        let _ = StorageKind::Cloud;
    }
}
