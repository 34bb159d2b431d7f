//! Environment-derived bridge configuration (spec §6.4, §9).

use std::time::Duration;

/// Preferred port environment variable.
const ENV_PORT_PREFERRED: &str = "CHROME_MCP_PORT";
/// Legacy port environment variable, honoured if the preferred one is unset.
const ENV_PORT_LEGACY: &str = "MCP_HTTP_PORT";
/// Fallback port when neither environment variable is set.
const DEFAULT_PORT: u16 = 12306;

/// Host address is constant per spec §6.4; never configurable.
pub const HOST: &str = "127.0.0.1";

const ENV_IDLE_CUTOFF_SECS: &str = "CHROME_MCP_IDLE_CUTOFF_SECS";
const ENV_SWEEP_INTERVAL_SECS: &str = "CHROME_MCP_SWEEP_INTERVAL_SECS";
const DEFAULT_IDLE_CUTOFF: Duration = Duration::from_secs(60 * 60);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Bridge-wide runtime configuration, derived from the environment at
/// startup.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// TCP port the HTTP/websocket listener binds to.
    pub port: u16,
    /// Idle cutoff after which an instance record is evicted (spec §4.2).
    pub idle_cutoff: Duration,
    /// Interval at which the registry eviction sweep runs.
    pub sweep_interval: Duration,
    /// Websocket upgrade path for extension instances (spec §4.4 default `/ws`).
    pub ws_path: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            idle_cutoff: DEFAULT_IDLE_CUTOFF,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            ws_path: "/ws".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Build configuration from the process environment.
    ///
    /// On success, both `CHROME_MCP_PORT` and `MCP_HTTP_PORT` are set
    /// in-process to the resolved port, per spec §6.4 ("on successful bind,
    /// both variables are set to the actual port" — resolved here at
    /// construction time; the bind itself cannot fail due to a bad port
    /// value because parsing already validated it).
    pub fn from_env() -> Self {
        let port = std::env::var(ENV_PORT_PREFERRED)
            .ok()
            .or_else(|| std::env::var(ENV_PORT_LEGACY).ok())
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let idle_cutoff = std::env::var(ENV_IDLE_CUTOFF_SECS)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_IDLE_CUTOFF);

        let sweep_interval = std::env::var(ENV_SWEEP_INTERVAL_SECS)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL);

        Self {
            port,
            idle_cutoff,
            sweep_interval,
            ws_path: "/ws".to_string(),
        }
    }

    /// Publish the resolved port back into the process environment under
    /// both the preferred and legacy variable names, per spec §6.4.
    ///
    /// # Safety
    ///
    /// Mutating the process environment is inherently racy with respect to
    /// other threads reading it; this is called once, synchronously,
    /// before any other task is spawned, mirroring how the source process
    /// publishes its resolved port at startup.
    pub fn publish_resolved_port(&self) {
        // SAFETY: called once during single-threaded startup, before the
        // async runtime spawns any task that could read these variables.
        unsafe {
            std::env::set_var(ENV_PORT_PREFERRED, self.port.to_string());
            std::env::set_var(ENV_PORT_LEGACY, self.port.to_string());
        }
    }

    /// Bind address combining the constant host with the resolved port.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{HOST}:{}", self.port)
    }
}
