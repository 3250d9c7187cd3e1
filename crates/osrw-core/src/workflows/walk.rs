use crate::core::free_energy::{FreeEnergyProfile, GAS_CONSTANT};
use crate::core::potential::{LambdaPotential, Potential};
use crate::engine::config::{OsrwConfig, SyncMode};
use crate::engine::error::EngineError;
use crate::engine::osrw::OsrwEngine;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::walkers::{LocalWorld, WalkerComm};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Upper bound on the wait for asynchronous observations still in flight after a walk.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct WalkSettings {
    pub walkers: usize,
    pub steps: u64,
    /// Diffusion coefficient of the coordinates (Å²/ps).
    pub diffusion: f64,
    /// Starting coordinates shared by every walker. Empty means all zeros.
    pub initial_coordinates: Vec<f64>,
    /// Walker `r` keeps its lambda restart file at `<prefix>-<r>.lam`.
    pub lambda_prefix: Option<PathBuf>,
}

impl Default for WalkSettings {
    fn default() -> Self {
        Self {
            walkers: 1,
            steps: 1000,
            diffusion: 1.0,
            initial_coordinates: Vec::new(),
            lambda_prefix: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalkerSummary {
    pub rank: usize,
    pub final_lambda: f64,
    pub final_energy: f64,
    pub energy_count: i64,
}

#[derive(Debug, Clone)]
pub struct WalkSummary {
    pub walkers: Vec<WalkerSummary>,
    /// Counts in the root walker's kernel.
    pub total_counts: u64,
    pub free_energy: f64,
    pub profile: FreeEnergyProfile,
}

/// Runs `settings.steps` steps of OSRW-biased Brownian dynamics on every walker.
///
/// Each walker gets its own copy of `model`, its own engine and its own thread; the
/// walkers share observations through an in-process [`LocalWorld`]. Walker `r` seeds
/// its λ particle with `config.seed + r`. Step progress comes from the root walker; every
/// walker reports its status each `print_frequency` steps.
#[instrument(skip_all, name = "walk_workflow")]
pub fn run<P>(
    config: &OsrwConfig,
    model: &P,
    settings: &WalkSettings,
    reporter: &ProgressReporter,
) -> Result<WalkSummary, EngineError>
where
    P: LambdaPotential + Clone + Send,
{
    // === Phase 0: Validation and engine construction ===
    reporter.report(Progress::PhaseStart {
        name: "Setup".to_string(),
    });
    if settings.walkers == 0 {
        return Err(EngineError::Initialization(
            "at least one walker is required".to_string(),
        ));
    }
    if !settings.diffusion.is_finite() || settings.diffusion <= 0.0 {
        return Err(EngineError::Initialization(format!(
            "diffusion coefficient must be positive (got {})",
            settings.diffusion
        )));
    }
    let n = model.number_of_variables();
    let coordinates = if settings.initial_coordinates.is_empty() {
        vec![0.0; n]
    } else if settings.initial_coordinates.len() == n {
        settings.initial_coordinates.clone()
    } else {
        return Err(EngineError::DimensionMismatch {
            expected: n,
            found: settings.initial_coordinates.len(),
        });
    };

    let mut engines = Vec::with_capacity(settings.walkers);
    for endpoint in LocalWorld::new(settings.walkers) {
        let rank = endpoint.rank();
        let mut walker_config = config.clone();
        walker_config.seed = config.seed.wrapping_add(rank as u64);
        walker_config.lambda_file = settings
            .lambda_prefix
            .as_deref()
            .map(|prefix| lambda_file_for_rank(prefix, rank));
        let engine = OsrwEngine::builder(model.clone(), walker_config)
            .with_comm(Arc::new(endpoint))
            .build()?;
        engines.push(engine);
    }
    info!(
        "Prepared {} walker(s) over {} variable(s).",
        settings.walkers, n
    );
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Biased dynamics ===
    reporter.report(Progress::PhaseStart {
        name: "Sampling".to_string(),
    });
    reporter.report(Progress::TaskStart {
        total: settings.steps,
    });
    let finished = thread::scope(|scope| {
        let handles: Vec<_> = engines
            .into_iter()
            .map(|engine| {
                let coordinates = coordinates.clone();
                scope.spawn(move || walk(engine, coordinates, settings, reporter))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| EngineError::Internal("a walker thread panicked".to_string()))
            })
            .collect::<Result<Vec<_>, _>>()
    })?;
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    if config.sync_mode == SyncMode::Asynchronous {
        let published = finished
            .iter()
            .map(|(engine, _)| engine.shared_observations())
            .sum();
        drain_receivers(&finished, published);
    }

    // === Phase 2: Final restart files and free energy ===
    reporter.report(Progress::PhaseStart {
        name: "Analysis".to_string(),
    });
    let mut walkers = Vec::with_capacity(finished.len());
    let mut root = None;
    for (engine, final_energy) in finished {
        if let Err(e) = engine.write_restart_files() {
            warn!("Could not write final restart files: {}", e);
        }
        walkers.push(WalkerSummary {
            rank: engine.rank(),
            final_lambda: engine.lambda(),
            final_energy,
            energy_count: engine.energy_count(),
        });
        if engine.rank() == 0 {
            root = Some(engine);
        }
    }
    let mut root =
        root.ok_or_else(|| EngineError::Internal("the root walker went missing".to_string()))?;
    let free_energy = root.update_free_energy(true);
    reporter.report(Progress::Message(format!(
        "ΔG = {:.4} kcal/mol from {} counts",
        free_energy,
        root.store().total_counts()
    )));
    reporter.report(Progress::PhaseFinish);

    info!(
        "Walk complete: {} steps on {} walker(s), free energy {:.4} kcal/mol.",
        settings.steps,
        walkers.len(),
        free_energy
    );
    Ok(WalkSummary {
        walkers,
        total_counts: root.store().total_counts(),
        free_energy,
        profile: root.profile().clone(),
    })
}

/// Waits until every walker's receiver has recorded `published` observations, so the
/// final kernels include everything sent during the walk.
fn drain_receivers<P: LambdaPotential>(finished: &[(OsrwEngine<P>, f64)], published: u64) {
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    for (engine, _) in finished {
        while engine
            .received_observations()
            .is_some_and(|received| received < published)
        {
            if Instant::now() >= deadline {
                warn!(
                    "Walker {} recorded {:?} of {} observations before the drain timed out.",
                    engine.rank(),
                    engine.received_observations(),
                    published
                );
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

/// Per-rank lambda restart path derived from a shared prefix.
pub fn lambda_file_for_rank(prefix: &Path, rank: usize) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(format!("-{rank}.lam"));
    PathBuf::from(name)
}

fn walk<P: LambdaPotential>(
    mut engine: OsrwEngine<P>,
    mut x: Vec<f64>,
    settings: &WalkSettings,
    reporter: &ProgressReporter,
) -> (OsrwEngine<P>, f64) {
    let rank = engine.rank();
    let config = engine.config();
    let kt = GAS_CONSTANT * config.temperature;
    let mobility = settings.diffusion * config.time_step / kt;
    let noise = (2.0 * settings.diffusion * config.time_step).sqrt();
    let print_frequency = config.print_frequency;
    let mut rng = StdRng::seed_from_u64(config.seed.rotate_left(32));

    let mut gradient = vec![0.0; x.len()];
    let mut energy = 0.0;
    for step in 1..=settings.steps {
        energy = engine.energy_and_gradient(&x, &mut gradient);
        brownian_step(&mut x, &gradient, mobility, noise, &mut rng);

        if rank == 0 {
            reporter.report(Progress::TaskIncrement { amount: 1 });
        }
        if step % print_frequency == 0 {
            reporter.report(Progress::WalkerStatus {
                rank,
                lambda: engine.lambda(),
                free_energy: engine.free_energy(),
            });
        }
    }
    (engine, energy)
}

/// One overdamped Langevin step: `x += -(D·dt/kT)·∇U + sqrt(2·D·dt)·ξ`.
fn brownian_step<R: Rng>(x: &mut [f64], gradient: &[f64], mobility: f64, noise: f64, rng: &mut R) {
    for (xi, gi) in x.iter_mut().zip(gradient) {
        let xi_noise: f64 = rng.sample(StandardNormal);
        *xi += -mobility * gi + noise * xi_noise;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::{LambdaFile, RestartFile};
    use crate::core::model::HarmonicLambdaModel;
    use crate::core::potential::LambdaInterface;
    use crate::engine::config::OsrwConfigBuilder;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn config() -> OsrwConfig {
        OsrwConfigBuilder::new()
            .temperature(300.0)
            .time_step(1.0)
            .count_interval(1)
            .print_frequency(50)
            .seed(3)
            .build()
            .unwrap()
    }

    fn model() -> HarmonicLambdaModel {
        let mut model = HarmonicLambdaModel::new(1.0, 2.0, vec![0.0, 0.0], vec![0.5, 0.0], 1.0);
        model.set_lambda(0.5);
        model
    }

    #[test]
    fn synchronous_walkers_share_one_kernel() {
        let settings = WalkSettings {
            walkers: 2,
            steps: 200,
            ..WalkSettings::default()
        };

        let summary = run(&config(), &model(), &settings, &ProgressReporter::new()).unwrap();

        // Steps 1..=199 of the engine counter are active on each walker.
        assert_eq!(summary.total_counts, 2 * 199);
        assert_eq!(summary.walkers.len(), 2);
        for walker in &summary.walkers {
            assert_eq!(walker.energy_count, 199);
            assert!((0.0..=1.0).contains(&walker.final_lambda));
            assert!(walker.final_energy.is_finite());
        }
        assert!(summary.free_energy.is_finite());
        assert_eq!(summary.profile.total_counts(), summary.total_counts);
    }

    #[test]
    fn asynchronous_walk_completes() {
        let mut config = config();
        config.sync_mode = SyncMode::Asynchronous;
        let settings = WalkSettings {
            walkers: 3,
            steps: 100,
            ..WalkSettings::default()
        };

        let summary = run(&config, &model(), &settings, &ProgressReporter::new()).unwrap();

        assert_eq!(summary.walkers.len(), 3);
        assert!(summary.walkers.iter().all(|w| w.energy_count == 99));
        // Every active step of every walker reaches the root walker's kernel.
        assert_eq!(summary.total_counts, 3 * 99);
        assert_eq!(summary.profile.total_counts(), 3 * 99);
    }

    #[test]
    fn steps_are_counted_once_and_every_walker_reports_status() {
        let increments = Mutex::new(0u64);
        let statuses = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| match event {
            Progress::TaskIncrement { amount } => *increments.lock().unwrap() += amount,
            Progress::WalkerStatus { rank, lambda, .. } => {
                assert!((0.0..=1.0).contains(&lambda));
                statuses.lock().unwrap().push(rank);
            }
            _ => {}
        }));
        let settings = WalkSettings {
            walkers: 2,
            steps: 120,
            ..WalkSettings::default()
        };

        run(&config(), &model(), &settings, &reporter).unwrap();
        drop(reporter);

        assert_eq!(increments.into_inner().unwrap(), 120);
        let mut statuses = statuses.into_inner().unwrap();
        statuses.sort_unstable();
        assert_eq!(statuses, vec![0, 0, 1, 1]);
    }

    #[test]
    fn every_walker_writes_its_own_lambda_file() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("walk");
        let settings = WalkSettings {
            walkers: 2,
            steps: 20,
            lambda_prefix: Some(prefix.clone()),
            ..WalkSettings::default()
        };

        let summary = run(&config(), &model(), &settings, &ProgressReporter::new()).unwrap();

        for walker in &summary.walkers {
            let path = lambda_file_for_rank(&prefix, walker.rank);
            let restart = LambdaFile::read_from_path(&path).unwrap();
            assert_eq!(restart.steps_taken, 19);
            assert!((restart.lambda - walker.final_lambda).abs() < 1e-8);
        }
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let zero_walkers = WalkSettings {
            walkers: 0,
            ..WalkSettings::default()
        };
        assert!(matches!(
            run(&config(), &model(), &zero_walkers, &ProgressReporter::new()),
            Err(EngineError::Initialization(_))
        ));

        let wrong_dimension = WalkSettings {
            initial_coordinates: vec![0.0; 3],
            ..WalkSettings::default()
        };
        assert!(matches!(
            run(&config(), &model(), &wrong_dimension, &ProgressReporter::new()),
            Err(EngineError::DimensionMismatch {
                expected: 2,
                found: 3
            })
        ));
    }

    #[test]
    fn lambda_file_names_carry_the_rank() {
        let path = lambda_file_for_rank(Path::new("/tmp/run/osrw"), 3);
        assert_eq!(path, PathBuf::from("/tmp/run/osrw-3.lam"));
    }
}
