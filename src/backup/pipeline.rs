/// Backup execution pipeline: size estimation, archive creation,
/// checksum/integrity verification, pre/post commands.
use super::{BackupTarget, BackupType};
use crate::platform::command;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

const TAR_TIMEOUT: Duration = Duration::from_secs(300);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub source_bytes: u64,
    pub backup_bytes: u64,
    pub file_count: u64,
    pub checksum: String,
    pub verified: bool,
}

/// Best-effort recursive size estimate. Unreadable entries are skipped
/// rather than aborting the estimate.
pub fn estimate_size(paths: &[String]) -> (u64, u64) {
    let mut total = 0u64;
    let mut count = 0u64;
    for root in paths {
        let walker = walkdir_sizes(Path::new(root));
        total += walker.0;
        count += walker.1;
    }
    (total, count)
}

fn walkdir_sizes(path: &Path) -> (u64, u64) {
    let mut total = 0u64;
    let mut count = 0u64;
    let Ok(metadata) = std::fs::metadata(path) else {
        return (0, 0);
    };
    if metadata.is_file() {
        return (metadata.len(), 1);
    }
    if metadata.is_dir() {
        let Ok(entries) = std::fs::read_dir(path) else {
            return (0, 0);
        };
        for entry in entries.flatten() {
            let (sub_total, sub_count) = walkdir_sizes(&entry.path());
            total += sub_total;
            count += sub_count;
        }
    }
    (total, count)
}

/// Runs any configured pre/post commands. Failures are logged, never
/// propagated — this stage must not abort the backup.
pub async fn run_hooks(commands: &[String]) {
    for cmd_line in commands {
        let mut parts = cmd_line.split_whitespace();
        let Some(program) = parts.next() else { continue };
        let args: Vec<&str> = parts.collect();
        if let Err(e) = command::run(program, &args, COMMAND_TIMEOUT).await {
            tracing::warn!("backup hook command failed: {}", e);
        }
    }
}

/// Runs `tar -czf <dest> <sources...>` for filesystem targets, or a
/// database-specific dump command for database targets, through the
/// shared external-command interface.
pub async fn create_archive(
    target: &BackupTarget,
    dest: &Path,
) -> Result<(), super::BackupError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| super::BackupError::Io(e.to_string()))?;
    }

    match target.backup_type {
        BackupType::Database => {
            let dump_command = target
                .database_dump_command
                .as_deref()
                .ok_or_else(|| super::BackupError::Config("no dump command configured".to_string()))?;
            let mut parts = dump_command.split_whitespace();
            let program = parts
                .next()
                .ok_or_else(|| super::BackupError::Config("empty dump command".to_string()))?;
            let mut args: Vec<&str> = parts.collect();
            let dest_str = dest.to_string_lossy();
            args.push(dest_str.as_ref());
            command::run(program, &args, TAR_TIMEOUT)
                .await
                .map_err(|e| super::BackupError::Command(e.to_string()))?;
        }
        _ => {
            let dest_str = dest.to_string_lossy().to_string();
            let mut args = vec!["-czf".to_string(), dest_str];
            for exclude in &target.exclude_patterns {
                args.push(format!("--exclude={}", exclude));
            }
            args.extend(target.source_paths.iter().cloned());
            let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
            command::run("tar", &args_ref, TAR_TIMEOUT)
                .await
                .map_err(|e| super::BackupError::Command(e.to_string()))?;
        }
    }
    Ok(())
}

pub fn checksum_file(path: &Path) -> Result<String, super::BackupError> {
    let bytes = std::fs::read(path).map_err(|e| super::BackupError::Io(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verification: recompute the checksum and test archive integrity via
/// `tar -tzf`. Both must succeed.
pub async fn verify_archive(path: &Path, expected_checksum: &str) -> bool {
    let recomputed = match checksum_file(path) {
        Ok(c) => c,
        Err(_) => return false,
    };
    if recomputed != expected_checksum {
        return false;
    }

    let path_str = path.to_string_lossy().to_string();
    command::run("tar", &["-tzf", &path_str], TAR_TIMEOUT)
        .await
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_size_skips_missing_paths() {
        let (total, count) = estimate_size(&["/nonexistent/path/xyz".to_string()]);
        assert_eq!(total, 0);
        assert_eq!(count, 0);
    }

    #[test]
    fn checksum_is_deterministic() {
        let dir = std::env::temp_dir().join("backup_pipeline_test_checksum");
        std::fs::write(&dir, b"hello world").unwrap();
        let a = checksum_file(&dir).unwrap();
        let b = checksum_file(&dir).unwrap();
        assert_eq!(a, b);
        std::fs::remove_file(&dir).ok();
    }
}
