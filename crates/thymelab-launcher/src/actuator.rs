use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::command::LOGGER_NAMESPACE;
use crate::error::ActuatorError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const HEALTH_READ_TIMEOUT: Duration = Duration::from_secs(1);
const INFO_TIMEOUT: Duration = Duration::from_secs(2);
const LEVEL_TIMEOUT: Duration = Duration::from_secs(5);

const METRIC_MEMORY_USED: &str = "jvm.memory.used";
const METRIC_CPU_USAGE: &str = "process.cpu.usage";
const METRIC_LIVE_THREADS: &str = "jvm.threads.live";

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
}

#[derive(Debug, Deserialize)]
struct MetricBody {
    #[serde(default)]
    measurements: Vec<Measurement>,
}

#[derive(Debug, Deserialize)]
struct Measurement {
    value: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoggerLevelBody<'a> {
    configured_level: &'a str,
}

/// Point-in-time view of the worker; every field is fetched independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuntimeInfo {
    pub status: Option<String>,
    pub memory_used_mb: Option<f64>,
    pub cpu_usage_percent: Option<f64>,
    pub live_threads: Option<u64>,
}

/// HTTP client for the worker's Spring Boot actuator endpoints.
#[derive(Debug, Clone)]
pub struct ActuatorClient {
    http: reqwest::Client,
    // Readiness probes give up on a slow answer much sooner.
    probe: reqwest::Client,
    base_url: String,
}

impl ActuatorClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ActuatorError> {
        let builder = || {
            reqwest::Client::builder()
                .user_agent(concat!("thymelab-launcher/", env!("CARGO_PKG_VERSION")))
                .connect_timeout(CONNECT_TIMEOUT)
        };
        let http = builder().build().map_err(ActuatorError::Client)?;
        let probe = builder()
            .read_timeout(HEALTH_READ_TIMEOUT)
            .build()
            .map_err(ActuatorError::Client)?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            probe,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<reqwest::Response, ActuatorError> {
        self.http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| ActuatorError::Transport {
                url: url.to_string(),
                source,
            })
    }

    /// One readiness probe. Only HTTP 200 counts as healthy; connect and
    /// read are each bounded at one second.
    pub async fn health(&self) -> Result<(), ActuatorError> {
        let url = self.url("/actuator/health");
        let resp = self
            .probe
            .get(&url)
            .send()
            .await
            .map_err(|source| ActuatorError::Transport {
                url: url.clone(),
                source,
            })?;
        if resp.status() != StatusCode::OK {
            return Err(ActuatorError::UnexpectedStatus {
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    /// Changes the worker's application logger level at runtime.
    pub async fn set_log_level(&self, level: &str) -> Result<(), ActuatorError> {
        let url = self.url(&format!("/actuator/loggers/{LOGGER_NAMESPACE}"));
        let resp = self
            .http
            .post(&url)
            .timeout(LEVEL_TIMEOUT)
            .json(&LoggerLevelBody {
                configured_level: level,
            })
            .send()
            .await
            .map_err(|source| ActuatorError::Transport {
                url: url.clone(),
                source,
            })?;

        match resp.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            other => Err(ActuatorError::UnexpectedStatus {
                status: other.as_u16(),
            }),
        }
    }

    /// Fire-and-forget form of [`set_log_level`](Self::set_log_level):
    /// failures end up in the log, never with the caller.
    pub async fn push_log_level(self, level: String) {
        match self.set_log_level(&level).await {
            Ok(()) => tracing::info!(%level, "worker log level changed"),
            Err(err) => tracing::error!(%level, error = %err, "failed to change worker log level"),
        }
    }

    async fn health_status(&self) -> Result<String, ActuatorError> {
        let url = self.url("/actuator/health");
        // A DOWN worker answers 503 with the same body shape.
        let resp = self.get(&url, INFO_TIMEOUT).await?;
        let body = resp
            .json::<HealthBody>()
            .await
            .map_err(|e| ActuatorError::Decode {
                url: url.clone(),
                message: e.to_string(),
            })?;
        Ok(body.status)
    }

    async fn metric(&self, name: &str) -> Result<f64, ActuatorError> {
        let url = self.url(&format!("/actuator/metrics/{name}"));
        let resp = self.get(&url, INFO_TIMEOUT).await?;
        if resp.status() != StatusCode::OK {
            return Err(ActuatorError::UnexpectedStatus {
                status: resp.status().as_u16(),
            });
        }
        let body = resp
            .json::<MetricBody>()
            .await
            .map_err(|e| ActuatorError::Decode {
                url: url.clone(),
                message: e.to_string(),
            })?;
        body.measurements
            .first()
            .map(|m| m.value)
            .ok_or_else(|| ActuatorError::Decode {
                url,
                message: "no measurements".to_string(),
            })
    }

    pub async fn runtime_info(&self) -> RuntimeInfo {
        let (status, memory, cpu, threads) = tokio::join!(
            self.health_status(),
            self.metric(METRIC_MEMORY_USED),
            self.metric(METRIC_CPU_USAGE),
            self.metric(METRIC_LIVE_THREADS),
        );

        RuntimeInfo {
            status: ok_or_log("health", status),
            memory_used_mb: ok_or_log(METRIC_MEMORY_USED, memory).map(|b| b / (1024.0 * 1024.0)),
            cpu_usage_percent: ok_or_log(METRIC_CPU_USAGE, cpu).map(|v| v * 100.0),
            live_threads: ok_or_log(METRIC_LIVE_THREADS, threads).map(|v| v.max(0.0) as u64),
        }
    }
}

fn ok_or_log<T>(what: &str, res: Result<T, ActuatorError>) -> Option<T> {
    match res {
        Ok(v) => Some(v),
        Err(err) => {
            tracing::debug!(what, error = %err, "runtime info field unavailable");
            None
        }
    }
}
