use std::time::Duration;

/// Runtime tuning knobs shared by the store, managers and handlers.
///
/// Every field has a production-safe default; `from_env` applies
/// `TASKLINK_*` environment overrides on top for deployments that do not
/// construct the config programmatically.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How long a task record survives in the store without a write.
    /// Refreshed on every `put`/mutation. Coarser than, and independent
    /// of, the agent invocation deadline.
    pub task_ttl: Duration,
    /// Deadline wrapped around every external agent-capability
    /// invocation; on expiry the task fails with a timeout kind.
    pub invoke_timeout: Duration,
    /// Bounded change-history length kept by a run's state manager.
    pub state_history_cap: usize,
    /// Bounded retries for store reads before surfacing
    /// `StoreUnavailable`. Writes are never silently retried.
    pub store_read_retries: u32,
    /// Backoff between store read retries, doubled per attempt.
    pub store_retry_backoff: Duration,
    /// Hard cap on the `limit` parameter of task listings.
    pub max_list_limit: usize,
    /// Allow reads to fail open (missing record instead of an error)
    /// when an external store backend is degraded.
    pub degraded_reads: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            task_ttl: Duration::from_secs(24 * 60 * 60),
            invoke_timeout: Duration::from_secs(120),
            state_history_cap: 100,
            store_read_retries: 3,
            store_retry_backoff: Duration::from_millis(50),
            max_list_limit: 1000,
            degraded_reads: false,
        }
    }
}

impl RuntimeConfig {
    /// Defaults with `TASKLINK_*` environment overrides applied.
    /// Unparseable values are ignored with a warning rather than
    /// failing startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = read_env_u64("TASKLINK_TASK_TTL_SECS") {
            config.task_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = read_env_u64("TASKLINK_INVOKE_TIMEOUT_SECS") {
            config.invoke_timeout = Duration::from_secs(secs);
        }
        if let Some(cap) = read_env_u64("TASKLINK_STATE_HISTORY_CAP") {
            config.state_history_cap = cap as usize;
        }
        if let Some(retries) = read_env_u64("TASKLINK_STORE_READ_RETRIES") {
            config.store_read_retries = retries as u32;
        }
        if let Ok(value) = std::env::var("TASKLINK_DEGRADED_READS") {
            config.degraded_reads = value == "1" || value.eq_ignore_ascii_case("true");
        }
        config
    }
}

fn read_env_u64(key: &str) -> Option<u64> {
    let value = std::env::var(key).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Ignoring unparseable {key}={value}");
            None
        }
    }
}
