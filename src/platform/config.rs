/// Shared configuration plumbing.
///
/// Every subsystem config struct in this codebase implements both `Default`
/// and `from_env()`, reading `std::env::var(...).ok().and_then(|v|
/// v.parse().ok()).unwrap_or(default)` — the idiom already established by
/// `db::DbConfig` and `scheduler::SchedulerConfig` in the teacher repo. This
/// module holds the one config shared by every orchestrator: how to reach
/// the notification channels.
use crate::platform::secrets::SecretsConfig;

pub fn env_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn env_var_opt<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub slack_webhook_url: Option<String>,
    pub generic_webhook_url: Option<String>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            slack_webhook_url: None,
            generic_webhook_url: None,
        }
    }
}

impl NotifierConfig {
    pub fn from_env(secrets: &SecretsConfig) -> Self {
        Self {
            slack_webhook_url: crate::platform::secrets::read_secret(
                secrets,
                "slack_webhook_url",
                "SLACK_WEBHOOK_URL",
            ),
            generic_webhook_url: std::env::var("GENERIC_WEBHOOK_URL").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_parses_or_falls_back() {
        std::env::remove_var("PLATFORM_TEST_KEY");
        assert_eq!(env_var("PLATFORM_TEST_KEY", 42u32), 42);
        std::env::set_var("PLATFORM_TEST_KEY", "7");
        assert_eq!(env_var("PLATFORM_TEST_KEY", 42u32), 7);
        std::env::remove_var("PLATFORM_TEST_KEY");
    }

    #[test]
    fn notifier_config_defaults_to_none() {
        let config = NotifierConfig::default();
        assert!(config.slack_webhook_url.is_none());
    }
}
