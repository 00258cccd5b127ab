/*!
 * Runtime Configuration
 *
 * Tunables for the supervisor and the build orchestrator. Defaults come from
 * `core::limits`; `from_env` applies `DEVFLEET_*` overrides on top.
 */

use super::limits::*;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Supervisor configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Time allowed for a graceful stop before escalating to kill
    pub stop_timeout: Duration,
    /// Time allowed for the exit to be observed after a kill
    pub kill_grace: Duration,
    /// Lines retained per process log buffer
    pub log_capacity: usize,
    /// Program used to run native components (`<program> run <entrypoint>`)
    pub native_toolchain: String,
    /// Program used to run bundled components (`<program> run dev`)
    pub script_runner: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            kill_grace: DEFAULT_KILL_GRACE,
            log_capacity: DEFAULT_LOG_CAPACITY,
            native_toolchain: DEFAULT_NATIVE_TOOLCHAIN.to_string(),
            script_runner: DEFAULT_SCRIPT_RUNNER.to_string(),
        }
    }
}

impl SupervisorConfig {
    #[must_use]
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    #[must_use]
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_native_toolchain(mut self, program: impl Into<String>) -> Self {
        self.native_toolchain = program.into();
        self
    }

    #[must_use]
    pub fn with_script_runner(mut self, program: impl Into<String>) -> Self {
        self.script_runner = program.into();
        self
    }

    /// Defaults overridden by environment variables
    ///
    /// - DEVFLEET_STOP_TIMEOUT_MS
    /// - DEVFLEET_KILL_GRACE_MS
    /// - DEVFLEET_LOG_CAPACITY
    /// - DEVFLEET_NATIVE_TOOLCHAIN
    /// - DEVFLEET_SCRIPT_RUNNER
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_parse::<u64>("DEVFLEET_STOP_TIMEOUT_MS") {
            config.stop_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("DEVFLEET_KILL_GRACE_MS") {
            config.kill_grace = Duration::from_millis(ms);
        }
        if let Some(capacity) = env_parse::<usize>("DEVFLEET_LOG_CAPACITY") {
            config.log_capacity = capacity.max(1);
        }
        if let Ok(program) = std::env::var("DEVFLEET_NATIVE_TOOLCHAIN") {
            if !program.trim().is_empty() {
                config.native_toolchain = program;
            }
        }
        if let Ok(program) = std::env::var("DEVFLEET_SCRIPT_RUNNER") {
            if !program.trim().is_empty() {
                config.script_runner = program;
            }
        }
        config
    }
}

/// Build orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Maximum number of projects building at once
    pub max_parallel: usize,
    /// Upper bound for `build_fleet`; `None` leaves it to the caller's token
    pub fleet_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            fleet_timeout: Some(DEFAULT_FLEET_TIMEOUT),
        }
    }
}

impl OrchestratorConfig {
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    #[must_use]
    pub fn with_fleet_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fleet_timeout = timeout;
        self
    }

    /// Defaults overridden by environment variables
    ///
    /// - DEVFLEET_MAX_PARALLEL
    /// - DEVFLEET_FLEET_TIMEOUT_SECS (0 disables the bound)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_parse::<usize>("DEVFLEET_MAX_PARALLEL") {
            config.max_parallel = n.max(1);
        }
        if let Some(secs) = env_parse::<u64>("DEVFLEET_FLEET_TIMEOUT_SECS") {
            config.fleet_timeout = match secs {
                0 => None,
                s => Some(Duration::from_secs(s)),
            };
        }
        config
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevfleetConfig {
    pub supervisor: SupervisorConfig,
    pub orchestrator: OrchestratorConfig,
}

impl DevfleetConfig {
    pub fn from_env() -> Self {
        Self {
            supervisor: SupervisorConfig::from_env(),
            orchestrator: OrchestratorConfig::from_env(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key = key, value = %raw, "Ignoring unparsable configuration value");
            None
        }
    }
}
