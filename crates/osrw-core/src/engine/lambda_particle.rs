use crate::core::free_energy::GAS_CONSTANT;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use std::f64::consts::PI;

/// Converts the random force between kcal/mol and the internal units of θ dynamics.
pub fn random_convert() -> f64 {
    4.184_f64.sqrt() / 1.0e10
}

/// Langevin parameters of the θ particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LangevinParameters {
    pub mass: f64,
    pub friction: f64,
    pub temperature: f64,
    /// Picoseconds.
    pub time_step: f64,
}

/// The auxiliary particle that carries λ.
///
/// λ is driven through θ with `λ = sin²θ`, which keeps it inside [0, 1] without any
/// boundary handling.
#[derive(Debug, Clone)]
pub struct LambdaParticle {
    lambda: f64,
    theta: f64,
    half_theta_velocity: f64,
    parameters: LangevinParameters,
    rng: StdRng,
}

impl LambdaParticle {
    /// # Panics
    ///
    /// Panics if `lambda` lies outside [0, 1].
    pub fn new(lambda: f64, parameters: LangevinParameters, seed: u64) -> Self {
        let mut particle = Self {
            lambda: 0.0,
            theta: 0.0,
            half_theta_velocity: 0.0,
            parameters,
            rng: StdRng::seed_from_u64(seed),
        };
        particle.set_lambda(lambda);
        particle
    }

    #[inline]
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    #[inline]
    pub fn theta(&self) -> f64 {
        self.theta
    }

    #[inline]
    pub fn half_theta_velocity(&self) -> f64 {
        self.half_theta_velocity
    }

    /// # Panics
    ///
    /// Panics if `lambda` lies outside [0, 1].
    pub fn set_lambda(&mut self, lambda: f64) {
        assert!(
            (0.0..=1.0).contains(&lambda),
            "lambda must lie in [0, 1] (got {lambda})"
        );
        self.lambda = lambda;
        self.theta = lambda.sqrt().asin();
    }

    pub fn set_half_theta_velocity(&mut self, velocity: f64) {
        self.half_theta_velocity = velocity;
    }

    pub fn set_mass(&mut self, mass: f64) {
        self.parameters.mass = mass;
    }

    pub fn set_friction(&mut self, friction: f64) {
        self.parameters.friction = friction;
    }

    /// Advances θ by one Langevin step under the force `-dE/dλ` and returns the new λ.
    pub fn propagate(&mut self, d_e_d_lambda: f64) -> f64 {
        let LangevinParameters {
            mass,
            friction,
            temperature,
            time_step: dt,
        } = self.parameters;
        let convert = random_convert();

        let rt2 = 2.0 * GAS_CONSTANT * temperature * friction / dt;
        let gaussian: f64 = StandardNormal.sample(&mut self.rng);
        let random_force = rt2.sqrt() * gaussian / convert;
        let d_e_d_theta = -d_e_d_lambda * (2.0 * self.theta).sin();

        self.half_theta_velocity = (self.half_theta_velocity * (2.0 * mass - friction * dt)
            + convert * convert * 2.0 * dt * (d_e_d_theta + random_force))
            / (2.0 * mass + friction * dt);
        self.theta += dt * self.half_theta_velocity;

        if self.theta > PI {
            self.theta -= 2.0 * PI;
        } else if self.theta <= -PI {
            self.theta += 2.0 * PI;
        }

        let sin_theta = self.theta.sin();
        self.lambda = sin_theta * sin_theta;
        self.lambda
    }
}
