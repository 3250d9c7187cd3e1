use super::config::{F_LAMBDA_PRINT_INTERVAL, F_LAMBDA_UPDATE_INTERVAL, OsrwConfig, SyncMode};
use super::error::EngineError;
use super::hooks::{OptimizationHook, TraversalHook, TraversalTracker};
use super::lambda_particle::{LambdaParticle, LangevinParameters};
use super::store::HistogramStore;
use super::walkers::{AsyncReceiver, LocalWorld, Observation, WalkerComm};
use crate::core::bias::GaussianBias;
use crate::core::free_energy::FreeEnergyProfile;
use crate::core::histogram::Histogram;
use crate::core::io::{
    HistogramFile, HistogramRestart, LambdaFile, LambdaRestart, RestartError, RestartFile,
};
use crate::core::potential::{EnergyTermState, LambdaPotential, Potential};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Orthogonal space random walk bias wrapped around a λ-dependent potential.
///
/// Each call to [`energy_and_gradient`](Potential::energy_and_gradient) is one step of
/// the walk: the underlying energy is biased by the Gaussian recursion kernel and by the
/// negative of the free energy accumulated so far, the current `(λ, F_λ)` observation is
/// shared with the other walkers every `count_interval` steps, and the λ particle is
/// advanced by one Langevin step.
pub struct OsrwEngine<P: LambdaPotential> {
    potential: P,
    config: OsrwConfig,
    store: Arc<HistogramStore>,
    comm: Arc<dyn WalkerComm>,
    receiver: Option<AsyncReceiver>,
    particle: LambdaParticle,
    profile: FreeEnergyProfile,
    energy_count: i64,
    shared_observations: u64,
    f_lambda_updates: u64,
    propagate_lambda: bool,
    equilibration_remaining: u64,
    state: EnergyTermState,
    d_e_d_lambda: f64,
    d2_e_d_lambda2: f64,
    total_energy: f64,
    d_e_d_x_d_l: Vec<f64>,
    optimizer: Option<Box<dyn OptimizationHook>>,
    lowest_minimum: Option<f64>,
    traversal: Option<(Box<dyn TraversalHook>, TraversalTracker)>,
}

pub struct OsrwEngineBuilder<P: LambdaPotential> {
    potential: P,
    config: OsrwConfig,
    comm: Option<Arc<dyn WalkerComm>>,
    optimizer: Option<Box<dyn OptimizationHook>>,
    traversal: Option<Box<dyn TraversalHook>>,
}

impl<P: LambdaPotential> OsrwEngineBuilder<P> {
    pub fn new(potential: P, config: OsrwConfig) -> Self {
        Self {
            potential,
            config,
            comm: None,
            optimizer: None,
            traversal: None,
        }
    }

    /// Connects the engine to other walkers. Without a transport the engine runs as a
    /// single walker.
    pub fn with_comm(mut self, comm: Arc<dyn WalkerComm>) -> Self {
        self.comm = Some(comm);
        self
    }

    pub fn with_optimization_hook(mut self, hook: Box<dyn OptimizationHook>) -> Self {
        self.optimizer = Some(hook);
        self
    }

    pub fn with_traversal_hook(mut self, hook: Box<dyn TraversalHook>) -> Self {
        self.traversal = Some(hook);
        self
    }

    /// Creates the engine, resuming from restart files when they exist.
    ///
    /// Unreadable restart files are reported and ignored; the run then starts from an
    /// empty histogram or from the collaborator's current λ.
    pub fn build(self) -> Result<OsrwEngine<P>, EngineError> {
        let Self {
            mut potential,
            mut config,
            comm,
            optimizer,
            traversal,
        } = self;

        let comm = comm.unwrap_or_else(|| Arc::new(LocalWorld::single()));
        if comm.rank() >= comm.size() {
            return Err(EngineError::Initialization(format!(
                "walker rank {} is outside a world of {} walkers",
                comm.rank(),
                comm.size()
            )));
        }

        let restart = config
            .histogram_file
            .as_deref()
            .and_then(|path| load_restart::<HistogramFile>(path, "histogram"));
        let resumed_histogram = restart.is_some();
        let histogram = match restart {
            Some(restart) => {
                config.temperature = restart.temperature;
                config.theta_mass = restart.theta_mass;
                config.theta_friction = restart.theta_friction;
                config.bias_magnitude = restart.bias_magnitude;
                config.bias_cutoff = restart.bias_cutoff;
                config.count_interval = restart.count_interval.max(1) as u64;
                restart.histogram
            }
            None => Histogram::from_bin_widths(config.lambda_bin_width, config.flambda_bin_width),
        };
        config.lambda_bin_width = histogram.lambda_width();

        let mut lambda = potential.lambda();
        if !(0.0..=1.0).contains(&lambda) {
            return Err(EngineError::Initialization(format!(
                "the potential starts at lambda {lambda}, outside [0, 1]"
            )));
        }
        let mut half_theta_velocity = 0.0;
        let mut energy_count = -1;
        if let Some(restart) = config
            .lambda_file
            .as_deref()
            .and_then(|path| load_restart::<LambdaFile>(path, "lambda"))
        {
            lambda = restart.lambda;
            half_theta_velocity = restart.half_theta_velocity;
            energy_count = restart.steps_taken.max(-1);
        }

        let mut particle = LambdaParticle::new(
            lambda,
            LangevinParameters {
                mass: config.theta_mass,
                friction: config.theta_friction,
                temperature: config.temperature,
                time_step: config.time_step,
            },
            config.seed,
        );
        particle.set_half_theta_velocity(half_theta_velocity);
        potential.set_lambda(lambda);

        let store = Arc::new(HistogramStore::new(
            histogram,
            GaussianBias::new(config.bias_magnitude, config.bias_cutoff),
            config.temperature,
        ));

        let receiver = match config.sync_mode {
            SyncMode::Asynchronous => Some(
                AsyncReceiver::spawn(Arc::clone(&comm), Arc::clone(&store)).map_err(|e| {
                    EngineError::Initialization(format!("could not start receiver thread: {e}"))
                })?,
            ),
            SyncMode::Synchronous => None,
        };

        info!("Orthogonal Space Random Walk Parameters");
        info!(
            "Gaussian Bias Magnitude:        {:6.5} (kcal/mole)",
            config.bias_magnitude
        );
        info!(
            "Gaussian Bias Cutoff:           {:6} bins",
            config.bias_cutoff
        );
        info!(
            "Walker {} of {} ({:?}), starting at lambda {:.4}.",
            comm.rank(),
            comm.size(),
            config.sync_mode,
            lambda
        );

        let profile = if resumed_histogram {
            let profile = store.free_energy_profile();
            profile.log_table();
            log_free_energy(&profile);
            profile
        } else {
            store.with_histogram(FreeEnergyProfile::empty)
        };

        let n = potential.number_of_variables();
        let equilibration_remaining = config.equilibration_steps;
        Ok(OsrwEngine {
            potential,
            config,
            store,
            comm,
            receiver,
            particle,
            profile,
            energy_count,
            shared_observations: 0,
            f_lambda_updates: 0,
            propagate_lambda: true,
            equilibration_remaining,
            state: EnergyTermState::Both,
            d_e_d_lambda: 0.0,
            d2_e_d_lambda2: 0.0,
            total_energy: 0.0,
            d_e_d_x_d_l: vec![0.0; n],
            optimizer,
            lowest_minimum: None,
            traversal: traversal.map(|hook| (hook, TraversalTracker::new())),
        })
    }
}

fn load_restart<F: RestartFile<Error = RestartError>>(path: &Path, kind: &str) -> Option<F::Data> {
    if !path.exists() {
        debug!("No OSRW {} restart file at {}.", kind, path.display());
        return None;
    }
    match F::read_from_path(path) {
        Ok(data) => {
            info!("Continuing OSRW {} from {}.", kind, path.display());
            Some(data)
        }
        Err(e) => {
            warn!(
                "Invalid OSRW {} restart file {}; it will be ignored: {}",
                kind,
                path.display(),
                e
            );
            None
        }
    }
}

fn log_free_energy(profile: &FreeEnergyProfile) {
    info!(
        "The free energy is {:12.4} kcal/mol from {} counts.",
        profile.free_energy(),
        profile.total_counts()
    );
}

impl<P: LambdaPotential> OsrwEngine<P> {
    pub fn builder(potential: P, config: OsrwConfig) -> OsrwEngineBuilder<P> {
        OsrwEngineBuilder::new(potential, config)
    }

    #[inline]
    pub fn lambda(&self) -> f64 {
        self.particle.lambda()
    }

    /// dE/dλ of the biased surface from the last evaluation.
    #[inline]
    pub fn total_d_e_d_lambda(&self) -> f64 {
        self.d_e_d_lambda
    }

    /// d²E/dλ² of the underlying potential from the last evaluation.
    #[inline]
    pub fn d2_e_d_lambda2(&self) -> f64 {
        self.d2_e_d_lambda2
    }

    #[inline]
    pub fn total_energy(&self) -> f64 {
        self.total_energy
    }

    /// Free energy from the most recently refreshed table.
    pub fn free_energy(&self) -> f64 {
        self.profile.free_energy()
    }

    pub fn profile(&self) -> &FreeEnergyProfile {
        &self.profile
    }

    pub fn store(&self) -> &Arc<HistogramStore> {
        &self.store
    }

    pub fn config(&self) -> &OsrwConfig {
        &self.config
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Energy evaluations taken while λ was propagating, starting from -1.
    pub fn energy_count(&self) -> i64 {
        self.energy_count
    }

    pub fn half_theta_velocity(&self) -> f64 {
        self.particle.half_theta_velocity()
    }

    pub fn potential(&self) -> &P {
        &self.potential
    }

    /// Observations this walker has published, one per count interval.
    pub fn shared_observations(&self) -> u64 {
        self.shared_observations
    }

    /// Observations recorded by the asynchronous receiver, if one is running.
    pub fn received_observations(&self) -> Option<u64> {
        self.receiver.as_ref().map(AsyncReceiver::received)
    }

    /// # Panics
    ///
    /// Panics if `lambda` lies outside [0, 1].
    pub fn set_lambda(&mut self, lambda: f64) {
        self.particle.set_lambda(lambda);
        self.potential.set_lambda(lambda);
    }

    pub fn set_theta_mass(&mut self, mass: f64) {
        self.config.theta_mass = mass;
        self.particle.set_mass(mass);
    }

    pub fn set_theta_friction(&mut self, friction: f64) {
        self.config.theta_friction = friction;
        self.particle.set_friction(friction);
    }

    /// Gaussian bias height in kcal/mol per count.
    pub fn set_bias_magnitude(&mut self, magnitude: f64) {
        self.config.bias_magnitude = magnitude;
        self.store.set_bias_magnitude(magnitude);
    }

    /// Steps between observations. Zero is rejected and the current interval kept.
    pub fn set_count_interval(&mut self, count_interval: u64) {
        if count_interval > 0 {
            self.config.count_interval = count_interval;
        } else {
            info!("OSRW count interval must be greater than 0.");
        }
    }

    /// While disabled, λ is frozen and no observations are made; the bias still applies.
    pub fn set_propagate_lambda(&mut self, propagate: bool) {
        self.propagate_lambda = propagate;
    }

    /// Writes the histogram (rank 0 only) and this walker's lambda restart file.
    pub fn write_restart_files(&self) -> Result<(), EngineError> {
        if self.comm.rank() == 0 {
            if let Some(path) = &self.config.histogram_file {
                let restart = HistogramRestart {
                    temperature: self.config.temperature,
                    theta_mass: self.config.theta_mass,
                    theta_friction: self.config.theta_friction,
                    bias_magnitude: self.config.bias_magnitude,
                    bias_cutoff: self.config.bias_cutoff,
                    count_interval: self.config.count_interval as usize,
                    histogram: self.store.snapshot(),
                };
                HistogramFile::write_to_path(&restart, path).map_err(|source| {
                    EngineError::Restart {
                        path: path.clone(),
                        source,
                    }
                })?;
                info!("Wrote OSRW histogram restart file to {}.", path.display());
            }
        }
        if let Some(path) = &self.config.lambda_file {
            let restart = LambdaRestart {
                lambda: self.particle.lambda(),
                half_theta_velocity: self.particle.half_theta_velocity(),
                steps_taken: self.energy_count,
            };
            LambdaFile::write_to_path(&restart, path).map_err(|source| EngineError::Restart {
                path: path.clone(),
                source,
            })?;
            info!("Wrote OSRW lambda restart file to {}.", path.display());
        }
        Ok(())
    }

    /// Recomputes the free-energy table from the current counts.
    pub fn update_free_energy(&mut self, print: bool) -> f64 {
        self.profile = self.store.free_energy_profile();
        if print {
            self.profile.log_table();
        }
        log_free_energy(&self.profile);
        self.profile.free_energy()
    }

    /// Returns `true` if λ moves on this step, consuming one equilibration step otherwise.
    fn begin_step(&mut self) -> bool {
        if !self.propagate_lambda {
            return false;
        }
        if self.equilibration_remaining > 0 {
            self.equilibration_remaining -= 1;
            return false;
        }
        self.energy_count += 1;
        true
    }

    fn exchange(&mut self, observation: Observation) {
        self.shared_observations += 1;
        match self.config.sync_mode {
            SyncMode::Synchronous => match self.comm.all_gather(observation) {
                Ok(observations) => self.store.record_all(&observations),
                Err(e) => error!("Multi-walker OSRW all-gather failed: {}", e),
            },
            SyncMode::Asynchronous => {
                for peer in 0..self.comm.size() {
                    if let Err(e) = self.comm.send(peer, observation) {
                        error!("Asynchronous multi-walker OSRW send failed: {}", e);
                    }
                }
            }
        }
    }

    fn run_hooks(&mut self, coordinates: &[f64], lambda: f64, step: u64) {
        if let Some(optimizer) = self.optimizer.as_mut() {
            if step % self.config.optimization.frequency == 0
                && lambda >= self.config.optimization.lambda_cutoff
            {
                match optimizer.optimize(coordinates, lambda) {
                    Ok(energy) => {
                        debug!("Minimized energy {:.6} at lambda {:.4}.", energy, lambda);
                        if self.lowest_minimum.is_none_or(|lowest| energy < lowest) {
                            self.lowest_minimum = Some(energy);
                            info!(
                                "New minimum energy {:.6} kcal/mol at lambda {:.4} (step {}).",
                                energy, lambda, step
                            );
                            optimizer.on_new_minimum(energy, lambda, step);
                        }
                    }
                    Err(e) => warn!("Optimization along the walk failed: {}", e),
                }
            }
        }

        if let Some((hook, tracker)) = self.traversal.as_mut() {
            if let Some(traversal) = tracker.update(lambda) {
                info!("Lambda traversal {:?} completed at step {}.", traversal, step);
                hook.on_traversal(traversal, step, coordinates);
            }
        }
    }
}

impl<P: LambdaPotential> Potential for OsrwEngine<P> {
    fn energy_and_gradient(&mut self, x: &[f64], gradient: &mut [f64]) -> f64 {
        if self.state == EnergyTermState::Fast {
            return self.potential.energy_and_gradient(x, gradient);
        }

        let propagating = self.begin_step();
        let active = propagating && self.energy_count > 0;
        let step = self.energy_count.max(0) as u64;

        let energy = self.potential.energy_and_gradient(x, gradient);
        let d_e_d_u = self.potential.d_e_d_l();
        self.d2_e_d_lambda2 = self.potential.d2_e_d_l2();
        let lambda = self.particle.lambda();

        let kernel = self.store.evaluate_bias(lambda, d_e_d_u);
        let mut d_e_d_lambda = d_e_d_u + kernel.d_lambda + kernel.d_flambda * self.d2_e_d_lambda2;

        self.d_e_d_x_d_l.fill(0.0);
        self.potential.d_e_d_x_d_l(&mut self.d_e_d_x_d_l);
        for (g, mixed) in gradient.iter_mut().zip(&self.d_e_d_x_d_l) {
            *g += kernel.d_flambda * mixed;
        }

        if active {
            if step % F_LAMBDA_UPDATE_INTERVAL == 0 {
                self.f_lambda_updates += 1;
                let print = self.f_lambda_updates % F_LAMBDA_PRINT_INTERVAL == 0;
                self.update_free_energy(print);
            }
            if step % self.config.save_frequency == 0 {
                if let Err(e) = self.write_restart_files() {
                    warn!("Exception writing OSRW restart files: {}", e);
                }
            }
        }

        let (free_energy_bias, free_energy_slope) = self.profile.bias_energy(lambda);
        let bias_energy = kernel.energy + free_energy_bias;
        d_e_d_lambda += free_energy_slope;
        self.d_e_d_lambda = d_e_d_lambda;

        debug!(
            "Bias Energy {:16.8}  OSRW Potential {:16.8} (kcal/mole)",
            bias_energy,
            energy + bias_energy
        );
        if !propagating {
            debug!("Lambda held at L={:6.4} F_L={:10.4}.", lambda, d_e_d_u);
        }

        if active {
            if step % self.config.print_frequency == 0 {
                let lambda_bin = self.store.with_histogram(|h| h.lambda_bin(lambda));
                info!(
                    "L={:6.4} ({:3}) F_LU={:10.4} F_LB={:10.4} F_L={:10.4}",
                    lambda,
                    lambda_bin,
                    d_e_d_u,
                    d_e_d_lambda - d_e_d_u,
                    d_e_d_lambda
                );
            }
            if step % self.config.count_interval == 0 {
                self.exchange(Observation::new(lambda, d_e_d_u));
            }
            self.run_hooks(x, lambda, step);
        }

        if propagating {
            let new_lambda = self.particle.propagate(d_e_d_lambda);
            self.potential.set_lambda(new_lambda);
        }

        self.total_energy = energy + bias_energy;
        self.total_energy
    }

    fn number_of_variables(&self) -> usize {
        self.potential.number_of_variables()
    }

    fn set_energy_term_state(&mut self, state: EnergyTermState) {
        self.state = state;
        self.potential.set_energy_term_state(state);
    }
}
