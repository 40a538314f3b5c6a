//! Configuration loading and validation for the frontend service.
//!
//! All values are read from environment variables exactly once at startup.
//! The resulting [`Config`] is never mutated afterwards.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Value a feature toggle must hold to be switched on.
const TOGGLE_ON: &str = "1";

/// Validated frontend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Host to bind. Empty means all interfaces.
    #[serde(default)]
    pub listen_addr: String,

    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public base URL. Passed through untouched.
    #[serde(default)]
    pub base_url: String,

    /// `"1"` enables span export to the collector.
    #[serde(default)]
    pub enable_tracing: String,

    /// OTLP/gRPC collector address (`host:port` or a full URL).
    #[serde(default)]
    pub collector_service_addr: String,

    /// `"1"` starts the profiler bootstrap.
    #[serde(default)]
    pub enable_profiler: String,

    /// `host:port` of the profiling agent backend.
    #[serde(default)]
    pub profiler_endpoint: String,

    /// `"1"` registers `/_healthz`.
    #[serde(default = "default_enable_healthz")]
    pub enable_healthz: String,

    /// `"true"` or `"1"` hands every client the same session id.
    #[serde(default)]
    pub enable_single_shared_session: String,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> u16 {
    8080
}
fn default_enable_healthz() -> String {
    TOGGLE_ON.into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        Self::from_environment(config::Environment::default())
    }

    /// Empty variables count as unset so they fall back to the defaults.
    fn from_environment(env: config::Environment) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(env.ignore_empty(true))
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("PORT must be a non-zero TCP port");
        }
        if self.log_level.trim().is_empty() {
            anyhow::bail!("LOG_LEVEL must not be empty");
        }
        Ok(())
    }

    /// `host:port` string handed to the listener.
    pub fn bind_addr(&self) -> String {
        let host = self.listen_addr.trim();
        let host = if host.is_empty() { "0.0.0.0" } else { host };
        format!("{host}:{}", self.port)
    }

    pub fn tracing_enabled(&self) -> bool {
        self.enable_tracing == TOGGLE_ON
    }

    pub fn profiler_enabled(&self) -> bool {
        self.enable_profiler == TOGGLE_ON
    }

    pub fn healthz_enabled(&self) -> bool {
        self.enable_healthz == TOGGLE_ON
    }

    pub fn shared_session(&self) -> bool {
        matches!(
            self.enable_single_shared_session.to_ascii_lowercase().as_str(),
            "true" | TOGGLE_ON
        )
    }

    /// Collector address, or `None` when unset.
    pub fn collector(&self) -> Option<&str> {
        non_empty(&self.collector_service_addr)
    }

    /// Profiler agent endpoint, or `None` when unset.
    pub fn profiler_agent(&self) -> Option<&str> {
        non_empty(&self.profiler_endpoint)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let v = value.trim();
    (!v.is_empty()).then_some(v)
}
