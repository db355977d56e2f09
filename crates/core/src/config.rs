use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GateConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limiter: RateLimiterConfig,
    pub policy: PolicyConfig,
    pub audit: AuditConfig,
    pub manifest: ManifestConfig,
    pub executor: ExecutorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time an open circuit waits before admitting trial calls.
    pub recovery_timeout_ms: u64,
    /// Trial calls admitted while half-open.
    pub half_open_max_calls: u32,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            half_open_max_calls: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Tokens added per second.
    pub rate_per_second: f64,
    /// Bucket capacity.
    pub bucket_size: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            rate_per_second: 10.0,
            bucket_size: 50.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PolicyConfig {
    /// Directory holding one `<tenant>.json` policy document per tenant.
    pub policy_dir: PathBuf,
    /// Confidence threshold stamped on every execution context.
    pub default_confidence_threshold: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            policy_dir: PathBuf::from("./policies"),
            default_confidence_threshold: 0.7,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuditConfig {
    pub audit_dir: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            audit_dir: PathBuf::from("./audit_logs"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ManifestConfig {
    pub manifest_path: PathBuf,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from("./manifest/conversions.jsonl"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Deadline for a single executor call. Unset means no deadline.
    pub call_timeout_ms: Option<u64>,
}

impl ExecutorConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: false,
        }
    }
}

impl GateConfig {
    pub fn load() -> Result<Self> {
        let env = std::env::var("OPGATE_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map OPGATE__RATE_LIMITER__BUCKET_SIZE=100 to rate_limiter.bucket_size
            .add_source(Environment::with_prefix("OPGATE").separator("__"))
            .build()
            .map_err(|e| Error::config(e.to_string()))?;

        let cfg: Self = s
            .try_deserialize()
            .map_err(|e| Error::config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(Error::config("circuit_breaker.failure_threshold must be > 0"));
        }
        if self.circuit_breaker.half_open_max_calls == 0 {
            return Err(Error::config("circuit_breaker.half_open_max_calls must be > 0"));
        }
        if !(self.rate_limiter.rate_per_second > 0.0) {
            return Err(Error::config("rate_limiter.rate_per_second must be > 0"));
        }
        if !(self.rate_limiter.bucket_size > 0.0) {
            return Err(Error::config("rate_limiter.bucket_size must be > 0"));
        }
        Ok(())
    }
}
