use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// Widest λ bin accepted; coarser requests are narrowed to keep the λ path resolved.
pub const MAX_LAMBDA_BIN_WIDTH: f64 = 0.1;

/// Energy evaluations between refreshes of the free-energy table.
pub const F_LAMBDA_UPDATE_INTERVAL: u64 = 10;

/// Table refreshes between printed free-energy tables.
pub const F_LAMBDA_PRINT_INTERVAL: u64 = 10;

const DEFAULT_PRINT_FREQUENCY: u64 = 100;
const DEFAULT_SAVE_FREQUENCY: u64 = 1000;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// How walkers share their observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncMode {
    /// Every walker blocks in a collective gather each count interval.
    #[default]
    #[serde(rename = "sync")]
    Synchronous,
    /// Walkers fire observations at every peer; a background thread records them.
    #[serde(rename = "async")]
    Asynchronous,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizationConfig {
    /// Steps between minimizations along the walk.
    pub frequency: u64,
    /// Minimizations only happen once λ has reached this value.
    pub lambda_cutoff: f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            frequency: 10_000,
            lambda_cutoff: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OsrwConfig {
    /// Kelvin.
    pub temperature: f64,
    /// Picoseconds.
    pub time_step: f64,
    pub lambda_bin_width: f64,
    pub flambda_bin_width: f64,
    pub bias_cutoff: usize,
    /// kcal/mol per count.
    pub bias_magnitude: f64,
    pub count_interval: u64,
    pub theta_mass: f64,
    pub theta_friction: f64,
    pub print_frequency: u64,
    pub save_frequency: u64,
    pub equilibration_steps: u64,
    pub seed: u64,
    pub sync_mode: SyncMode,
    pub histogram_file: Option<PathBuf>,
    pub lambda_file: Option<PathBuf>,
    pub optimization: OptimizationConfig,
}

#[derive(Default)]
pub struct OsrwConfigBuilder {
    temperature: Option<f64>,
    time_step_fs: Option<f64>,
    lambda_bin_width: Option<f64>,
    flambda_bin_width: Option<f64>,
    bias_cutoff: Option<usize>,
    bias_magnitude: Option<f64>,
    count_interval: Option<u64>,
    theta_mass: Option<f64>,
    theta_friction: Option<f64>,
    print_interval: Option<f64>,
    save_interval: Option<f64>,
    print_frequency: Option<u64>,
    save_frequency: Option<u64>,
    equilibration_steps: Option<u64>,
    seed: Option<u64>,
    sync_mode: Option<SyncMode>,
    histogram_file: Option<PathBuf>,
    lambda_file: Option<PathBuf>,
    optimization: Option<OptimizationConfig>,
}

impl OsrwConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = Some(kelvin);
        self
    }
    /// Integration time step in femtoseconds.
    pub fn time_step(mut self, femtoseconds: f64) -> Self {
        self.time_step_fs = Some(femtoseconds);
        self
    }
    pub fn lambda_bin_width(mut self, width: f64) -> Self {
        self.lambda_bin_width = Some(width);
        self
    }
    pub fn flambda_bin_width(mut self, width: f64) -> Self {
        self.flambda_bin_width = Some(width);
        self
    }
    pub fn bias_cutoff(mut self, bins: usize) -> Self {
        self.bias_cutoff = Some(bins);
        self
    }
    pub fn bias_magnitude(mut self, kcal_mol: f64) -> Self {
        self.bias_magnitude = Some(kcal_mol);
        self
    }
    pub fn count_interval(mut self, steps: u64) -> Self {
        self.count_interval = Some(steps);
        self
    }
    pub fn theta_mass(mut self, mass: f64) -> Self {
        self.theta_mass = Some(mass);
        self
    }
    pub fn theta_friction(mut self, friction: f64) -> Self {
        self.theta_friction = Some(friction);
        self
    }
    /// Simulated time between status lines, in picoseconds.
    pub fn print_interval(mut self, picoseconds: f64) -> Self {
        self.print_interval = Some(picoseconds);
        self
    }
    /// Simulated time between restart files, in picoseconds.
    pub fn save_interval(mut self, picoseconds: f64) -> Self {
        self.save_interval = Some(picoseconds);
        self
    }
    /// Steps between status lines. Takes precedence over [`print_interval`](Self::print_interval).
    pub fn print_frequency(mut self, steps: u64) -> Self {
        self.print_frequency = Some(steps);
        self
    }
    /// Steps between restart files. Takes precedence over [`save_interval`](Self::save_interval).
    pub fn save_frequency(mut self, steps: u64) -> Self {
        self.save_frequency = Some(steps);
        self
    }
    pub fn equilibration_steps(mut self, steps: u64) -> Self {
        self.equilibration_steps = Some(steps);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = Some(mode);
        self
    }
    pub fn histogram_file(mut self, path: PathBuf) -> Self {
        self.histogram_file = Some(path);
        self
    }
    pub fn lambda_file(mut self, path: PathBuf) -> Self {
        self.lambda_file = Some(path);
        self
    }
    pub fn optimization(mut self, optimization: OptimizationConfig) -> Self {
        self.optimization = Some(optimization);
        self
    }

    pub fn build(self) -> Result<OsrwConfig, ConfigError> {
        let temperature = self
            .temperature
            .ok_or(ConfigError::MissingParameter("temperature"))?;
        require_positive("temperature", temperature)?;
        let time_step_fs = self
            .time_step_fs
            .ok_or(ConfigError::MissingParameter("time_step"))?;
        require_positive("time_step", time_step_fs)?;
        let time_step = time_step_fs * 0.001;

        let mut lambda_bin_width = self.lambda_bin_width.unwrap_or(0.005);
        require_positive("lambda_bin_width", lambda_bin_width)?;
        if lambda_bin_width > MAX_LAMBDA_BIN_WIDTH {
            warn!(
                "Lambda bin width {} is too coarse; using {}.",
                lambda_bin_width, MAX_LAMBDA_BIN_WIDTH
            );
            lambda_bin_width = MAX_LAMBDA_BIN_WIDTH;
        }
        let flambda_bin_width = self.flambda_bin_width.unwrap_or(2.0);
        require_positive("flambda_bin_width", flambda_bin_width)?;

        let bias_magnitude = self.bias_magnitude.unwrap_or(0.005);
        if !bias_magnitude.is_finite() || bias_magnitude < 0.0 {
            return Err(invalid("bias_magnitude", "must be finite and non-negative"));
        }
        let count_interval = self.count_interval.unwrap_or(10);
        if count_interval == 0 {
            return Err(invalid("count_interval", "must be greater than 0"));
        }
        let theta_mass = self.theta_mass.unwrap_or(1.0e-18);
        require_positive("theta_mass", theta_mass)?;
        let theta_friction = self.theta_friction.unwrap_or(1.0e-19);
        if !theta_friction.is_finite() || theta_friction < 0.0 {
            return Err(invalid("theta_friction", "must be finite and non-negative"));
        }

        let print_frequency = resolve_frequency(
            "print_frequency",
            self.print_frequency,
            self.print_interval,
            time_step,
            DEFAULT_PRINT_FREQUENCY,
        )?;
        let save_frequency = resolve_frequency(
            "save_frequency",
            self.save_frequency,
            self.save_interval,
            time_step,
            DEFAULT_SAVE_FREQUENCY,
        )?;

        let optimization = self.optimization.unwrap_or_default();
        if optimization.frequency == 0 {
            return Err(invalid("optimization.frequency", "must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&optimization.lambda_cutoff) {
            return Err(invalid("optimization.lambda_cutoff", "must lie in [0, 1]"));
        }

        Ok(OsrwConfig {
            temperature,
            time_step,
            lambda_bin_width,
            flambda_bin_width,
            bias_cutoff: self.bias_cutoff.unwrap_or(5),
            bias_magnitude,
            count_interval,
            theta_mass,
            theta_friction,
            print_frequency,
            save_frequency,
            equilibration_steps: self.equilibration_steps.unwrap_or(0),
            seed: self.seed.unwrap_or(0),
            sync_mode: self.sync_mode.unwrap_or_default(),
            histogram_file: self.histogram_file,
            lambda_file: self.lambda_file,
            optimization,
        })
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.to_string(),
    }
}

fn require_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: format!("must be positive (got {value})"),
        })
    }
}

/// An explicit step count wins; otherwise an interval at least one time step long is
/// converted to steps; otherwise the default applies.
fn resolve_frequency(
    name: &'static str,
    steps: Option<u64>,
    interval: Option<f64>,
    time_step: f64,
    default: u64,
) -> Result<u64, ConfigError> {
    let frequency = match (steps, interval) {
        (Some(steps), _) => steps,
        (None, Some(interval)) if interval >= time_step => (interval / time_step) as u64,
        _ => default,
    };
    if frequency == 0 {
        return Err(invalid(name, "must be greater than 0"));
    }
    Ok(frequency)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> OsrwConfigBuilder {
        OsrwConfigBuilder::new().temperature(300.0).time_step(1.0)
    }

    #[test]
    fn build_applies_documented_defaults() {
        let config = minimal().build().unwrap();

        assert_eq!(config.time_step, 0.001);
        assert_eq!(config.lambda_bin_width, 0.005);
        assert_eq!(config.flambda_bin_width, 2.0);
        assert_eq!(config.bias_cutoff, 5);
        assert_eq!(config.bias_magnitude, 0.005);
        assert_eq!(config.count_interval, 10);
        assert_eq!(config.theta_mass, 1.0e-18);
        assert_eq!(config.theta_friction, 1.0e-19);
        assert_eq!(config.print_frequency, 100);
        assert_eq!(config.save_frequency, 1000);
        assert_eq!(config.seed, 0);
        assert_eq!(config.sync_mode, SyncMode::Synchronous);
        assert!(config.histogram_file.is_none());
    }

    #[test]
    fn build_fails_without_required_parameters() {
        let missing_temperature = OsrwConfigBuilder::new().time_step(1.0).build();
        assert_eq!(
            missing_temperature.unwrap_err(),
            ConfigError::MissingParameter("temperature")
        );

        let missing_step = OsrwConfigBuilder::new().temperature(300.0).build();
        assert_eq!(
            missing_step.unwrap_err(),
            ConfigError::MissingParameter("time_step")
        );
    }

    #[test]
    fn coarse_lambda_bins_are_clamped() {
        let config = minimal().lambda_bin_width(0.25).build().unwrap();
        assert_eq!(config.lambda_bin_width, MAX_LAMBDA_BIN_WIDTH);
    }

    #[test]
    fn intervals_are_converted_to_step_frequencies() {
        let config = minimal()
            .time_step(2.0)
            .print_interval(0.5)
            .save_interval(10.0)
            .build()
            .unwrap();
        assert_eq!(config.print_frequency, 250);
        assert_eq!(config.save_frequency, 5000);

        let too_short = minimal().print_interval(0.0001).build().unwrap();
        assert_eq!(too_short.print_frequency, 100);

        let explicit = minimal().print_interval(1.0).print_frequency(7).build().unwrap();
        assert_eq!(explicit.print_frequency, 7);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            minimal().count_interval(0).build(),
            Err(ConfigError::InvalidParameter {
                name: "count_interval",
                ..
            })
        ));
        assert!(matches!(
            minimal().temperature(-1.0).build(),
            Err(ConfigError::InvalidParameter {
                name: "temperature",
                ..
            })
        ));
        assert!(matches!(
            minimal().flambda_bin_width(0.0).build(),
            Err(ConfigError::InvalidParameter {
                name: "flambda_bin_width",
                ..
            })
        ));
        assert!(matches!(
            minimal()
                .optimization(OptimizationConfig {
                    frequency: 10,
                    lambda_cutoff: 1.5
                })
                .build(),
            Err(ConfigError::InvalidParameter {
                name: "optimization.lambda_cutoff",
                ..
            })
        ));
    }
}
