use std::{future::Future, sync::Arc, time::Duration};

use thymelab_process::HealthStatus;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::actuator::ActuatorClient;
use crate::error::ActuatorError;

/// Retry budget of one readiness cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 30,
        }
    }
}

impl PollPolicy {
    fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// A single readiness check against the worker.
pub trait HealthProbe: Send + Sync {
    fn check(&self) -> impl Future<Output = Result<(), ActuatorError>> + Send;
}

impl HealthProbe for ActuatorClient {
    fn check(&self) -> impl Future<Output = Result<(), ActuatorError>> + Send {
        self.health()
    }
}

/// Receives the terminal result of a cycle: `Ready` or `Unreachable`.
pub trait ReadinessListener: Send + Sync {
    fn on_readiness(&self, status: HealthStatus);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready { attempts: u32 },
    Unreachable { attempts: u32 },
    /// Cancelled mid-cycle; listeners were not told anything.
    Cancelled { attempts: u32 },
}

pub struct HealthPoller<P> {
    probe: P,
    policy: PollPolicy,
    listener: Arc<dyn ReadinessListener>,
    status: watch::Sender<HealthStatus>,
}

impl<P: HealthProbe> HealthPoller<P> {
    pub fn new(probe: P, policy: PollPolicy, listener: Arc<dyn ReadinessListener>) -> Self {
        let (status, _) = watch::channel(HealthStatus::Unknown);
        Self {
            probe,
            policy,
            listener,
            status,
        }
    }

    /// Follows the cycle's status; the last value stays readable after the
    /// poller is gone.
    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.status.subscribe()
    }

    fn cancelled(&self, attempts: u32) -> PollOutcome {
        tracing::debug!(attempts, "health check cancelled");
        self.status.send_replace(HealthStatus::Unknown);
        PollOutcome::Cancelled { attempts }
    }

    /// Polls until the first healthy answer, the attempt budget runs out, or
    /// `cancel` fires. There is no sleep after the final attempt.
    pub async fn poll_until_ready(&self, cancel: &CancellationToken) -> PollOutcome {
        let max = self.policy.max_attempts;
        self.status.send_replace(HealthStatus::Checking);

        for attempt in 1..=max {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(attempt - 1),
                r = self.probe.check() => r,
            };

            let progress = format!("{attempt}/{max}");
            match result {
                Ok(()) => {
                    tracing::info!(attempts = attempt, "worker is ready");
                    self.status.send_replace(HealthStatus::Ready);
                    self.listener.on_readiness(HealthStatus::Ready);
                    return PollOutcome::Ready { attempts: attempt };
                }
                Err(err) if err.is_connect() => {
                    tracing::debug!(attempt = %progress, "server not yet ready");
                }
                Err(ActuatorError::UnexpectedStatus { status }) => {
                    tracing::debug!(attempt = %progress, status, "health check failed");
                }
                Err(err) => {
                    tracing::error!(attempt = %progress, error = %err, "health check error");
                }
            }

            if attempt < max {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return self.cancelled(attempt),
                    _ = tokio::time::sleep(self.policy.interval) => {}
                }
            }
        }

        tracing::error!(
            "health check timed out after {} seconds",
            self.policy.budget().as_secs()
        );
        self.status.send_replace(HealthStatus::Unreachable);
        self.listener.on_readiness(HealthStatus::Unreachable);
        PollOutcome::Unreachable { attempts: max }
    }
}
