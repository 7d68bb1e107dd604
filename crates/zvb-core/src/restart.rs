//! Staged restart of the services that read the restored configuration.

use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use tokio::{process::Command, time::Instant};
use tracing::{error, info, warn};

use crate::{errors::Error, Result};

/// Port for the OS service manager.
#[async_trait]
pub trait ServiceManager: Send + Sync {
    async fn restart(&self, unit: &str) -> Result<()>;

    /// Readiness probe. `Err` means the manager cannot tell.
    async fn is_active(&self, unit: &str) -> Result<bool>;
}

/// `systemctl` backed service manager.
#[derive(Clone, Debug)]
pub struct Systemctl {
    program: PathBuf,
}

impl Default for Systemctl {
    fn default() -> Self {
        Self {
            program: PathBuf::from("systemctl"),
        }
    }
}

#[async_trait]
impl ServiceManager for Systemctl {
    async fn restart(&self, unit: &str) -> Result<()> {
        let out = Command::new(&self.program)
            .arg("restart")
            .arg(unit)
            .output()
            .await
            .map_err(|e| Error::External(format!("failed to run systemctl: {e}")))?;

        if out.status.success() {
            return Ok(());
        }

        let mut output = String::from_utf8_lossy(&out.stdout).to_string();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        Err(Error::External(format!(
            "systemctl restart {unit} failed ({}): {}",
            out.status,
            output.trim()
        )))
    }

    async fn is_active(&self, unit: &str) -> Result<bool> {
        let status = Command::new(&self.program)
            .arg("is-active")
            .arg("--quiet")
            .arg(unit)
            .status()
            .await
            .map_err(|e| Error::External(format!("failed to run systemctl: {e}")))?;
        Ok(status.success())
    }
}

#[derive(Clone, Debug)]
pub struct RestartStep {
    pub unit: String,
    /// Fixed wait used when readiness cannot be probed.
    pub settle: Duration,
}

impl RestartStep {
    pub fn new(unit: impl Into<String>, settle: Duration) -> Self {
        Self {
            unit: unit.into(),
            settle,
        }
    }
}

/// Ordered restart: each unit must be up before the next one reads the config.
#[derive(Clone, Debug)]
pub struct RestartPlan {
    pub steps: Vec<RestartStep>,
    pub readiness_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for RestartPlan {
    /// API first, then the VPN core, then the bot itself.
    fn default() -> Self {
        Self {
            steps: vec![
                RestartStep::new("zivpn-api", Duration::from_secs(1)),
                RestartStep::new("zivpn", Duration::from_secs(2)),
                RestartStep::new("zivpn-bot", Duration::ZERO),
            ],
            readiness_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
    /// No readiness signal; the settle delay was used instead.
    Settled,
    /// Last step or failed restart: nothing to wait for.
    NotChecked,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepOutcome {
    pub unit: String,
    pub restarted: std::result::Result<(), String>,
    pub readiness: Readiness,
}

impl RestartPlan {
    /// Run every step in order. A failed step is logged and never blocks the next.
    pub async fn run(&self, services: &dyn ServiceManager) -> Vec<StepOutcome> {
        let mut outcomes = Vec::with_capacity(self.steps.len());
        let last = self.steps.len().saturating_sub(1);

        for (idx, step) in self.steps.iter().enumerate() {
            let restarted = match services.restart(&step.unit).await {
                Ok(()) => {
                    info!(unit = %step.unit, "service restarted");
                    Ok(())
                }
                Err(e) => {
                    error!(unit = %step.unit, error = %e, "service restart failed");
                    Err(e.to_string())
                }
            };

            let readiness = if idx == last {
                Readiness::NotChecked
            } else if restarted.is_err() {
                tokio::time::sleep(step.settle).await;
                Readiness::NotChecked
            } else {
                self.wait_ready(services, step).await
            };

            outcomes.push(StepOutcome {
                unit: step.unit.clone(),
                restarted,
                readiness,
            });
        }

        outcomes
    }

    async fn wait_ready(&self, services: &dyn ServiceManager, step: &RestartStep) -> Readiness {
        let deadline = Instant::now() + self.readiness_timeout;
        loop {
            match services.is_active(&step.unit).await {
                Ok(true) => return Readiness::Ready,
                Ok(false) if Instant::now() >= deadline => {
                    warn!(unit = %step.unit, "service not active before timeout, continuing");
                    return Readiness::TimedOut;
                }
                Ok(false) => tokio::time::sleep(self.poll_interval).await,
                Err(e) => {
                    warn!(unit = %step.unit, error = %e, "readiness unknown, using settle delay");
                    tokio::time::sleep(step.settle).await;
                    return Readiness::Settled;
                }
            }
        }
    }
}
