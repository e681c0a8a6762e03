/// Storage location selection and backup path layout.
use chrono::Utc;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum StorageKind {
    Local,
    Network,
    Cloud,
}

#[derive(Debug, Clone)]
pub struct StorageLocation {
    pub name: String,
    pub kind: StorageKind,
    pub root: PathBuf,
    /// Ascending priority; lower is tried first.
    pub priority: u32,
    /// Free space in bytes, as reported by whatever probes this location.
    pub free_bytes: u64,
}

/// Picks the first location (by ascending priority) with free space at
/// least 1.2x the estimated backup size. Falls back to the lowest-priority
/// location with a warning if none qualifies.
pub fn select_location<'a>(
    locations: &'a [StorageLocation],
    estimated_size: u64,
) -> Option<&'a StorageLocation> {
    let mut sorted: Vec<&StorageLocation> = locations.iter().collect();
    sorted.sort_by_key(|l| l.priority);

    let required = (estimated_size as f64 * 1.2) as u64;
    for location in &sorted {
        if location.free_bytes >= required {
            return Some(location);
        }
    }

    if let Some(fallback) = sorted.first() {
        tracing::warn!(
            "no storage location has sufficient free space for estimated size {}, falling back to {}",
            estimated_size,
            fallback.name
        );
    }
    sorted.into_iter().next()
}

/// Builds the canonical artifact path:
/// `<root>/<target_id>/<YYYY>/<MM>/<DD>/<target_id>_<type>_<YYYYMMDD_HHMMSS>.tar.gz`
pub fn artifact_path(root: &std::path::Path, target_id: &str, backup_type: &str) -> PathBuf {
    let now = Utc::now();
    root.join(target_id)
        .join(format!("{:04}", now.format("%Y")))
        .join(format!("{:02}", now.format("%m")))
        .join(format!("{:02}", now.format("%d")))
        .join(format!(
            "{}_{}_{}.tar.gz",
            target_id,
            backup_type,
            now.format("%Y%m%d_%H%M%S")
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(name: &str, priority: u32, free_bytes: u64) -> StorageLocation {
        StorageLocation {
            name: name.to_string(),
            kind: StorageKind::Local,
            root: PathBuf::from("/tmp"),
            priority,
            free_bytes,
        }
    }

    #[test]
    fn picks_first_qualifying_location_by_priority() {
        let locations = vec![
            location("primary", 1, 100),
            location("secondary", 2, 10_000),
        ];
        let chosen = select_location(&locations, 1000).unwrap();
        assert_eq!(chosen.name, "secondary");
    }

    #[test]
    fn falls_back_to_lowest_priority_when_none_qualify() {
        let locations = vec![location("primary", 1, 10), location("secondary", 2, 20)];
        let chosen = select_location(&locations, 1_000_000).unwrap();
        assert_eq!(chosen.name, "primary");
    }

    #[test]
    fn artifact_path_matches_layout() {
        let path = artifact_path(std::path::Path::new("/backups"), "tsdb", "full");
        let s = path.to_string_lossy();
        assert!(s.starts_with("/backups/tsdb/"));
        assert!(s.contains("tsdb_full_"));
        assert!(s.ends_with(".tar.gz"));
    }
}
