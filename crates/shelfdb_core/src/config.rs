//! Engine configuration.

/// Largest integer a key generator may hand out (2^53).
pub const DEFAULT_KEY_GENERATOR_LIMIT: u64 = 1 << 53;

/// Configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct Config {
    /// Idle executor turns a running transaction with an empty request
    /// queue may wait before it is aborted with a timeout error.
    pub idle_timeout_ticks: u32,

    /// Generated keys above this value fail with a constraint error.
    pub key_generator_limit: u64,

    /// Maximum number of tasks a single run of the executor may process.
    pub max_turns_per_run: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            idle_timeout_ticks: 5,
            key_generator_limit: DEFAULT_KEY_GENERATOR_LIMIT,
            max_turns_per_run: 1_000_000,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the idle grace window in executor turns.
    #[must_use]
    pub const fn idle_timeout_ticks(mut self, ticks: u32) -> Self {
        self.idle_timeout_ticks = ticks;
        self
    }

    /// Sets the upper limit for generated keys.
    #[must_use]
    pub const fn key_generator_limit(mut self, limit: u64) -> Self {
        self.key_generator_limit = limit;
        self
    }

    /// Sets the task budget for one executor run.
    #[must_use]
    pub const fn max_turns_per_run(mut self, turns: u64) -> Self {
        self.max_turns_per_run = turns;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.idle_timeout_ticks, 5);
        assert_eq!(config.key_generator_limit, 9_007_199_254_740_992);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .idle_timeout_ticks(2)
            .key_generator_limit(10)
            .max_turns_per_run(100);

        assert_eq!(config.idle_timeout_ticks, 2);
        assert_eq!(config.key_generator_limit, 10);
        assert_eq!(config.max_turns_per_run, 100);
    }
}
