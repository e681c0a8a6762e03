/// Secrets access: secret-file-per-name convention with an environment
/// variable fallback, matching this ecosystem's established secrets helper.
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct SecretsConfig {
    pub root: PathBuf,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            root: std::env::var("SECRETS_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/run/secrets")),
        }
    }
}

/// Reads `<secrets_root>/<name>` if present, else falls back to the named
/// environment variable. Returns `None` if neither source has a value.
pub fn read_secret(config: &SecretsConfig, name: &str, env_fallback: &str) -> Option<String> {
    let path = config.root.join(name);
    if let Ok(contents) = std::fs::read_to_string(&path) {
        let trimmed = contents.trim().to_string();
        if !trimmed.is_empty() {
            return Some(trimmed);
        }
    }
    std::env::var(env_fallback).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_env_when_file_missing() {
        std::env::set_var("TEST_SECRET_FALLBACK", "from-env");
        let config = SecretsConfig {
            root: PathBuf::from("/nonexistent/secrets/root/for/tests"),
        };
        let value = read_secret(&config, "does_not_exist", "TEST_SECRET_FALLBACK");
        assert_eq!(value.as_deref(), Some("from-env"));
        std::env::remove_var("TEST_SECRET_FALLBACK");
    }

    #[test]
    fn returns_none_when_neither_source_present() {
        std::env::remove_var("TEST_SECRET_ABSENT");
        let config = SecretsConfig {
            root: PathBuf::from("/nonexistent/secrets/root/for/tests"),
        };
        assert!(read_secret(&config, "missing", "TEST_SECRET_ABSENT").is_none());
    }
}
