/// Platform Module
///
/// Shared runtime substrate for all orchestrators: clock/scheduling, the
/// metric sink, the notifier, secrets access, and the external command
/// interface. Orchestrators depend on this module only, never on each
/// other, avoiding the cyclic-import shape the original system used.
pub mod clock;
pub mod command;
pub mod config;
pub mod notifier;
pub mod secrets;
pub mod sink;

use thiserror::Error;

/// Platform-level error taxonomy shared by the ambient collaborators.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("sink error: {0}")]
    Sink(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("command error: {0}")]
    Command(String),

    #[error("secret not found: {0}")]
    SecretMissing(String),
}

pub type PlatformResult<T> = Result<T, PlatformError>;
