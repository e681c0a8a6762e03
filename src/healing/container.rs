/// Container Collaborator
///
/// Read-only service listing plus start/stop/restart/kill operations. The
/// CLI-backed implementation shells out through the shared external command
/// interface (`platform::command`), the same mechanism the Backup
/// Orchestrator uses for `tar`/dump tools. Grounded on the
/// `ProtocolAdapter` trait-at-the-seam shape in `core/protocols/base.rs`.
use crate::platform::command;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("container command failed: {0}")]
    Command(String),

    #[error("service not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub name: String,
    pub running: bool,
    pub restarting: bool,
    pub healthy: bool,
    pub memory_percent: f64,
    pub restart_count: u32,
}

#[async_trait]
pub trait ContainerCollaborator: Send + Sync {
    async fn list_services(&self) -> Result<Vec<ServiceStatus>, ContainerError>;
    async fn start(&self, service: &str) -> Result<(), ContainerError>;
    async fn stop(&self, service: &str) -> Result<(), ContainerError>;
    async fn restart(&self, service: &str) -> Result<(), ContainerError>;
    async fn kill(&self, service: &str) -> Result<(), ContainerError>;
}

const CONTAINER_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Shells out to the configured container runtime CLI (default `docker`).
pub struct CliContainerCollaborator {
    runtime: String,
}

impl CliContainerCollaborator {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
        }
    }
}

#[async_trait]
impl ContainerCollaborator for CliContainerCollaborator {
    async fn list_services(&self) -> Result<Vec<ServiceStatus>, ContainerError> {
        let output = command::run(
            &self.runtime,
            &["ps", "--format", "{{.Names}}|{{.Status}}"],
            CONTAINER_COMMAND_TIMEOUT,
        )
        .await
        .map_err(|e| ContainerError::Command(e.to_string()))?;

        Ok(output
            .stdout
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(2, '|');
                let name = parts.next()?.to_string();
                let status_text = parts.next().unwrap_or("").to_lowercase();
                Some(ServiceStatus {
                    name,
                    running: status_text.contains("up"),
                    restarting: status_text.contains("restarting"),
                    healthy: !status_text.contains("unhealthy"),
                    memory_percent: 0.0,
                    restart_count: 0,
                })
            })
            .collect())
    }

    async fn start(&self, service: &str) -> Result<(), ContainerError> {
        command::run(&self.runtime, &["start", service], CONTAINER_COMMAND_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|e| ContainerError::Command(e.to_string()))
    }

    async fn stop(&self, service: &str) -> Result<(), ContainerError> {
        command::run(&self.runtime, &["stop", service], CONTAINER_COMMAND_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|e| ContainerError::Command(e.to_string()))
    }

    async fn restart(&self, service: &str) -> Result<(), ContainerError> {
        command::run(&self.runtime, &["restart", service], CONTAINER_COMMAND_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|e| ContainerError::Command(e.to_string()))
    }

    async fn kill(&self, service: &str) -> Result<(), ContainerError> {
        command::run(&self.runtime, &["kill", service], CONTAINER_COMMAND_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|e| ContainerError::Command(e.to_string()))
    }
}

/// Deterministic in-memory fake used throughout the test suite.
pub struct FakeContainerCollaborator {
    services: Mutex<HashMap<String, ServiceStatus>>,
}

impl FakeContainerCollaborator {
    pub fn new(services: Vec<ServiceStatus>) -> Self {
        let map = services.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self {
            services: Mutex::new(map),
        }
    }
}

#[async_trait]
impl ContainerCollaborator for FakeContainerCollaborator {
    async fn list_services(&self) -> Result<Vec<ServiceStatus>, ContainerError> {
        Ok(self.services.lock().unwrap().values().cloned().collect())
    }

    async fn start(&self, service: &str) -> Result<(), ContainerError> {
        let mut services = self.services.lock().unwrap();
        let entry = services
            .get_mut(service)
            .ok_or_else(|| ContainerError::NotFound(service.to_string()))?;
        entry.running = true;
        entry.restarting = false;
        Ok(())
    }

    async fn stop(&self, service: &str) -> Result<(), ContainerError> {
        let mut services = self.services.lock().unwrap();
        let entry = services
            .get_mut(service)
            .ok_or_else(|| ContainerError::NotFound(service.to_string()))?;
        entry.running = false;
        Ok(())
    }

    async fn restart(&self, service: &str) -> Result<(), ContainerError> {
        let mut services = self.services.lock().unwrap();
        let entry = services
            .get_mut(service)
            .ok_or_else(|| ContainerError::NotFound(service.to_string()))?;
        entry.restarting = false;
        entry.running = true;
        entry.healthy = true;
        entry.restart_count += 1;
        Ok(())
    }

    async fn kill(&self, service: &str) -> Result<(), ContainerError> {
        let mut services = self.services.lock().unwrap();
        let entry = services
            .get_mut(service)
            .ok_or_else(|| ContainerError::NotFound(service.to_string()))?;
        entry.running = false;
        entry.restarting = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_restart_resets_health_and_bumps_count() {
        let fake = FakeContainerCollaborator::new(vec![ServiceStatus {
            name: "svc-a".to_string(),
            running: false,
            restarting: true,
            healthy: false,
            memory_percent: 50.0,
            restart_count: 2,
        }]);

        fake.restart("svc-a").await.unwrap();
        let status = fake.list_services().await.unwrap();
        assert!(status[0].running);
        assert!(status[0].healthy);
        assert_eq!(status[0].restart_count, 3);
    }

    #[tokio::test]
    async fn unknown_service_errors() {
        let fake = FakeContainerCollaborator::new(vec![]);
        assert!(fake.start("ghost").await.is_err());
    }
}
