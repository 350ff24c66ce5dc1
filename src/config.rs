//! TOML configuration for the test bench.
//!
//! Every section has defaults, so an empty file (or no file at all) is a valid
//! configuration. Command-line flags override what is loaded here.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::device::{DeviceError, FailurePolicy, DEFAULT_SAMPLING_INTERVAL_MS, MAX_FLUCTUATION_RANGE};

/// Environment variable naming the config file to load.
pub const CONFIG_ENV: &str = "SENSORBENCH_CONFIG";

/// Config file picked up from the working directory when the env var is unset.
pub const LOCAL_CONFIG: &str = "sensorbench.toml";

/// Accepted number of samples per run.
pub const SAMPLE_COUNT_RANGE: std::ops::RangeInclusive<u32> = 5..=20;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BenchConfig {
    /// Load and validate configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try, in order: the file named by `SENSORBENCH_CONFIG`, `./sensorbench.toml`,
    /// then compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %format!("{:#}", e),
                        "SENSORBENCH_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %format!("{:#}", e),
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if !SAMPLE_COUNT_RANGE.contains(&self.sampling.sample_count) {
            bail!(
                "sampling.sample_count must be between {} and {}, got {}",
                SAMPLE_COUNT_RANGE.start(),
                SAMPLE_COUNT_RANGE.end(),
                self.sampling.sample_count
            );
        }
        if self.sampling.interval_ms == 0 {
            bail!("sampling.interval_ms must be positive");
        }
        if let Some(f) = self.simulation.fluctuation_range {
            if !f.is_finite() || !(0.0..=MAX_FLUCTUATION_RANGE).contains(&f) {
                bail!(
                    "simulation.fluctuation_range must be between 0 and {:e}, got {}",
                    MAX_FLUCTUATION_RANGE,
                    f
                );
            }
        }
        self.simulation.failure_policy()?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration")
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Run pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Samples per run, 5 to 20.
    pub sample_count: u32,
    /// Delay between consecutive samples, in milliseconds.
    pub interval_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_count: 10,
            interval_ms: DEFAULT_SAMPLING_INTERVAL_MS,
        }
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Behaviour of the simulated devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Probability that a connection attempt fails.
    pub connect_failure_rate: f64,
    /// Probability that a single sample fails with a communication error.
    pub communication_failure_rate: f64,
    /// Overrides the variant's default fluctuation range when set.
    pub fluctuation_range: Option<f64>,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let policy = FailurePolicy::default();
        Self {
            connect_failure_rate: policy.connect_failure_rate(),
            communication_failure_rate: policy.communication_failure_rate(),
            fluctuation_range: None,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn failure_policy(&self) -> Result<FailurePolicy, DeviceError> {
        FailurePolicy::new(self.connect_failure_rate, self.communication_failure_rate)
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory result files are written to and history is read from.
    pub results_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
    /// Append log output to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}
