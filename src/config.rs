//! Engine configuration.
//!
//! [`EngineConfig`] carries the knobs the execution loop and controller
//! consult: timeouts, concurrency fan-out, retention, buffer sizes. The
//! defaults suit tests and embedded use; deployments override via the
//! builder methods or `FLOWGRID_*` environment variables through
//! [`EngineConfig::from_env`].

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Per-node handler timeout. A handler exceeding it fails its step.
    pub node_timeout: Duration,
    /// Optional whole-run deadline; `None` means no run-level timeout.
    pub run_timeout: Option<Duration>,
    /// Maximum number of node handlers in flight at once.
    pub max_concurrency: usize,
    /// How long a terminal run stays queryable before eviction.
    pub retention_window: Duration,
    /// Broadcast buffer capacity per run's status hub.
    pub event_buffer_capacity: usize,
    /// Bounded log ring capacity per step and for the run log.
    pub log_capacity: usize,
}

impl EngineConfig {
    pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
    pub const DEFAULT_RETENTION_WINDOW: Duration = Duration::from_secs(300);
    pub const DEFAULT_EVENT_BUFFER_CAPACITY: usize = 256;
    pub const DEFAULT_LOG_CAPACITY: usize = 100;

    /// Defaults, then `FLOWGRID_*` environment overrides (a `.env` file is
    /// honored). Unparseable values fall back to the default silently.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Some(secs) = env_u64("FLOWGRID_NODE_TIMEOUT_SECS") {
            config.node_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("FLOWGRID_RUN_TIMEOUT_SECS") {
            config.run_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(n) = env_u64("FLOWGRID_MAX_CONCURRENCY") {
            config.max_concurrency = (n as usize).max(1);
        }
        if let Some(secs) = env_u64("FLOWGRID_RETENTION_SECS") {
            config.retention_window = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("FLOWGRID_EVENT_BUFFER") {
            config.event_buffer_capacity = (n as usize).max(1);
        }
        if let Some(n) = env_u64("FLOWGRID_LOG_CAPACITY") {
            config.log_capacity = (n as usize).max(1);
        }
        config
    }

    #[must_use]
    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_retention_window(mut self, window: Duration) -> Self {
        self.retention_window = window;
        self
    }

    #[must_use]
    pub fn with_event_buffer_capacity(mut self, capacity: usize) -> Self {
        self.event_buffer_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity.max(1);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_timeout: Self::DEFAULT_NODE_TIMEOUT,
            run_timeout: None,
            max_concurrency: Self::DEFAULT_MAX_CONCURRENCY,
            retention_window: Self::DEFAULT_RETENTION_WINDOW,
            event_buffer_capacity: Self::DEFAULT_EVENT_BUFFER_CAPACITY,
            log_capacity: Self::DEFAULT_LOG_CAPACITY,
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_zero_concurrency() {
        let config = EngineConfig::default().with_max_concurrency(0);
        assert_eq!(config.max_concurrency, 1);
    }

    #[test]
    fn defaults_have_no_run_timeout() {
        let config = EngineConfig::default();
        assert!(config.run_timeout.is_none());
        assert_eq!(config.node_timeout, EngineConfig::DEFAULT_NODE_TIMEOUT);
    }
}
