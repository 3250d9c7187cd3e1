use crate::core::bias::GaussianBias;
use crate::core::free_energy::FreeEnergyProfile;
use crate::core::io::{HistogramFile, RestartFile};
use crate::engine::error::EngineError;
use std::path::Path;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct ProfileReport {
    pub temperature: f64,
    pub lambda_bins: usize,
    pub flambda_bins: usize,
    pub min_flambda: f64,
    pub max_flambda: f64,
    pub profile: FreeEnergyProfile,
}

impl ProfileReport {
    pub fn free_energy(&self) -> f64 {
        self.profile.free_energy()
    }

    pub fn total_counts(&self) -> u64 {
        self.profile.total_counts()
    }
}

/// Recomputes the free-energy profile stored in a histogram restart file.
///
/// The file's own temperature is used unless `temperature` overrides it.
#[instrument(skip_all, name = "profile_workflow")]
pub fn run(path: &Path, temperature: Option<f64>) -> Result<ProfileReport, EngineError> {
    let restart = HistogramFile::read_from_path(path).map_err(|source| EngineError::Restart {
        path: path.to_path_buf(),
        source,
    })?;
    let temperature = temperature.unwrap_or(restart.temperature);
    if !temperature.is_finite() || temperature <= 0.0 {
        return Err(EngineError::Initialization(format!(
            "temperature must be positive (got {temperature})"
        )));
    }

    let histogram = &restart.histogram;
    let bias = GaussianBias::new(restart.bias_magnitude, restart.bias_cutoff);
    let profile = FreeEnergyProfile::compute(histogram, &bias, temperature);
    info!(
        "Histogram {} holds {} counts over {} lambda bins; free energy {:.4} kcal/mol at {} K.",
        path.display(),
        profile.total_counts(),
        histogram.lambda_bins(),
        profile.free_energy(),
        temperature
    );

    Ok(ProfileReport {
        temperature,
        lambda_bins: histogram.lambda_bins(),
        flambda_bins: histogram.flambda_bins(),
        min_flambda: histogram.min_flambda(),
        max_flambda: histogram.max_flambda(),
        profile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::histogram::Histogram;
    use crate::core::io::HistogramRestart;
    use tempfile::tempdir;

    fn restart() -> HistogramRestart {
        let histogram = Histogram::new(5, 5, -5.0, 2.0);
        for (lambda, flambda) in [(0.0, 2.5), (0.25, 2.5), (0.5, 0.5), (0.75, 2.5), (1.0, 2.5)] {
            histogram.increment(lambda, flambda);
        }
        HistogramRestart {
            temperature: 300.0,
            theta_mass: 1.0e-18,
            theta_friction: 1.0e-19,
            bias_magnitude: 0.005,
            bias_cutoff: 0,
            count_interval: 10,
            histogram,
        }
    }

    #[test]
    fn profile_matches_direct_integration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("osrw.his");
        let original = restart();
        HistogramFile::write_to_path(&original, &path).unwrap();

        let report = run(&path, None).unwrap();

        let expected =
            FreeEnergyProfile::compute(&original.histogram, &GaussianBias::new(0.005, 0), 300.0);
        assert_eq!(report.profile, expected);
        assert_eq!(report.temperature, 300.0);
        assert_eq!(report.total_counts(), 5);
        assert_eq!((report.lambda_bins, report.flambda_bins), (5, 5));
        assert_eq!((report.min_flambda, report.max_flambda), (-5.0, 5.0));
        // Bins 0, 1, 3, 4 sit at F_λ = 2 and bin 2 at F_λ = 0.
        assert!((report.free_energy() - 2.0 * (0.125 + 0.25 + 0.25 + 0.125)).abs() < 1e-9);
    }

    #[test]
    fn temperature_override_is_used() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("osrw.his");
        HistogramFile::write_to_path(&restart(), &path).unwrap();

        let report = run(&path, Some(350.0)).unwrap();

        assert_eq!(report.temperature, 350.0);
        assert!(matches!(
            run(&path, Some(-1.0)),
            Err(EngineError::Initialization(_))
        ));
    }

    #[test]
    fn missing_file_is_a_restart_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.his");

        let err = run(&path, None).unwrap_err();

        assert!(matches!(err, EngineError::Restart { path: p, .. } if p == path));
    }
}
