#![forbid(unsafe_code)]

//! Stress run configuration, loaded from the environment.
//!
//! | Variable                | Field            | Default |
//! |-------------------------|------------------|---------|
//! | `SIGNET_STRESS_THREADS` | `threads`        | 4       |
//! | `SIGNET_STRESS_OPS`     | `ops_per_thread` | 1000    |
//! | `SIGNET_STRESS_SEED`    | `seed`           | [`DEFAULT_SEED`] |
//! | `SIGNET_TEST_SEED`      | `seed` fallback  |         |
//! | `SIGNET_DETERMINISTIC`  | `deterministic`  | false   |

/// Seed used when neither seed variable is set.
pub const DEFAULT_SEED: u64 = 0x5167_0E7D;

/// Errors raised while building or validating a [`StressConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarnessError {
    /// An environment variable was set to something unparsable.
    InvalidEnv { key: String, value: String },
    /// The run was configured with no worker threads.
    ZeroThreads,
    /// All operation weights are zero, so no operation can be chosen.
    ZeroWeights,
}

impl std::fmt::Display for HarnessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEnv { key, value } => {
                write!(f, "invalid value '{value}' for {key}")
            }
            Self::ZeroThreads => write!(f, "stress run needs at least one thread"),
            Self::ZeroWeights => write!(f, "operation weights sum to zero"),
        }
    }
}

impl std::error::Error for HarnessError {}

/// Parameters for one stress run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressConfig {
    /// Worker threads sharing the event.
    pub threads: usize,
    /// Operations each worker performs.
    pub ops_per_thread: usize,
    /// Base seed; each worker derives its own stream from it.
    pub seed: u64,
    /// Relative weight of connect operations.
    pub connect_weight: u32,
    /// Relative weight of disconnect operations.
    pub disconnect_weight: u32,
    /// Relative weight of trigger operations.
    pub trigger_weight: u32,
    /// Stable run id (no pid or wall clock) for reproducible logs.
    pub deterministic: bool,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            ops_per_thread: 1000,
            seed: DEFAULT_SEED,
            connect_weight: 4,
            disconnect_weight: 3,
            trigger_weight: 3,
            deterministic: false,
        }
    }
}

impl StressConfig {
    /// Load from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment.
    pub fn from_env_with<F>(lookup: F) -> Result<Self, HarnessError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let threads = parse_var(&lookup, "SIGNET_STRESS_THREADS")?.unwrap_or(defaults.threads);
        let ops_per_thread =
            parse_var(&lookup, "SIGNET_STRESS_OPS")?.unwrap_or(defaults.ops_per_thread);
        let seed = match parse_var(&lookup, "SIGNET_STRESS_SEED")? {
            Some(seed) => seed,
            None => parse_var(&lookup, "SIGNET_TEST_SEED")?.unwrap_or(defaults.seed),
        };
        let deterministic = flag_var(&lookup, "SIGNET_DETERMINISTIC");

        let config = Self {
            threads,
            ops_per_thread,
            seed,
            deterministic,
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the worker thread count.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the per-thread operation count.
    #[must_use]
    pub fn with_ops_per_thread(mut self, ops: usize) -> Self {
        self.ops_per_thread = ops;
        self
    }

    /// Set the base seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set connect / disconnect / trigger weights.
    #[must_use]
    pub fn with_weights(mut self, connect: u32, disconnect: u32, trigger: u32) -> Self {
        self.connect_weight = connect;
        self.disconnect_weight = disconnect;
        self.trigger_weight = trigger;
        self
    }

    /// Enable or disable deterministic run ids.
    #[must_use]
    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    /// Reject configurations a run cannot execute.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.threads == 0 {
            return Err(HarnessError::ZeroThreads);
        }
        if self.total_weight() == 0 {
            return Err(HarnessError::ZeroWeights);
        }
        Ok(())
    }

    pub(crate) fn total_weight(&self) -> u64 {
        u64::from(self.connect_weight)
            + u64::from(self.disconnect_weight)
            + u64::from(self.trigger_weight)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, HarnessError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse() {
            Ok(value) => Ok(Some(value)),
            Err(_) => Err(HarnessError::InvalidEnv {
                key: key.to_string(),
                value: raw,
            }),
        },
    }
}

fn flag_var<F>(lookup: &F, key: &str) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    matches!(lookup(key).as_deref(), Some("1" | "true" | "TRUE"))
}
