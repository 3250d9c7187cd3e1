use crate::error::{CliError, Result};
use osrw::engine::config::SyncMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    /// Kelvin.
    pub temperature: Option<f64>,
    /// Femtoseconds.
    pub time_step: Option<f64>,
    pub seed: Option<u64>,
    pub model: Option<FileModelConfig>,
    pub osrw: Option<FileOsrwConfig>,
    pub walk: Option<FileWalkConfig>,
    pub optimization: Option<FileOptimizationConfig>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileModelConfig {
    pub k0: Option<f64>,
    pub k1: Option<f64>,
    pub center0: Option<Vec<f64>>,
    pub center1: Option<Vec<f64>>,
    pub offset: Option<f64>,
    pub initial_lambda: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileOsrwConfig {
    pub lambda_bias_cutoff: Option<usize>,
    pub bias_gaussian_mag: Option<f64>,
    pub lambda_bin_width: Option<f64>,
    pub flambda_bin_width: Option<f64>,
    pub count_interval: Option<u64>,
    pub theta_mass: Option<f64>,
    pub theta_friction: Option<f64>,
    /// Picoseconds.
    pub print_interval: Option<f64>,
    pub print_frequency: Option<u64>,
    /// Picoseconds.
    pub save_interval: Option<f64>,
    pub save_frequency: Option<u64>,
    pub equilibration_steps: Option<u64>,
    pub mode: Option<SyncMode>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileWalkConfig {
    pub steps: Option<u64>,
    pub walkers: Option<usize>,
    /// Å²/ps.
    pub diffusion: Option<f64>,
    pub initial_coordinates: Option<Vec<f64>>,
    pub histogram_file: Option<PathBuf>,
    pub lambda_prefix: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileOptimizationConfig {
    pub frequency: Option<u64>,
    pub lambda_cutoff: Option<f64>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn from_file_reads_kebab_case_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(
            &path,
            r#"
            temperature = 310.0
            time-step = 2.0

            [model]
            k0 = 2.0
            center0 = [0.0, 1.0]
            initial-lambda = 0.1

            [osrw]
            lambda-bias-cutoff = 3
            bias-gaussian-mag = 0.01
            mode = "async"

            [walk]
            walkers = 4
            lambda-prefix = "out/walker"
            "#,
        )
        .unwrap();

        let config = FileConfig::from_file(&path).unwrap();

        assert_eq!(config.temperature, Some(310.0));
        assert_eq!(config.time_step, Some(2.0));
        let model = config.model.unwrap();
        assert_eq!(model.center0, Some(vec![0.0, 1.0]));
        assert_eq!(model.initial_lambda, Some(0.1));
        let osrw = config.osrw.unwrap();
        assert_eq!(osrw.lambda_bias_cutoff, Some(3));
        assert_eq!(osrw.mode, Some(SyncMode::Asynchronous));
        let walk = config.walk.unwrap();
        assert_eq!(walk.walkers, Some(4));
        assert_eq!(walk.lambda_prefix, Some(PathBuf::from("out/walker")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[osrw]\nbias-magnitude = 0.1\n").unwrap();

        let result = FileConfig::from_file(&path);

        assert!(matches!(result, Err(CliError::FileParsing { .. })));
    }
}
