/// Which group of energy terms a multiple-time-step integrator is asking for.
///
/// Only the `Fast` state is treated specially by the biasing engine: the bias is a slow
/// term and is skipped entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnergyTermState {
    Fast,
    Slow,
    #[default]
    Both,
}

/// A potential energy surface over a flat vector of coordinates.
pub trait Potential {
    /// Energy at `x`. `gradient` is overwritten with dE/dx and must have
    /// [`number_of_variables`](Potential::number_of_variables) elements.
    fn energy_and_gradient(&mut self, x: &[f64], gradient: &mut [f64]) -> f64;

    fn number_of_variables(&self) -> usize;

    fn set_energy_term_state(&mut self, _state: EnergyTermState) {}
}

/// Derivatives of a potential with respect to the alchemical coordinate λ.
///
/// The values describe the most recent call to
/// [`Potential::energy_and_gradient`].
pub trait LambdaInterface {
    fn lambda(&self) -> f64;

    fn set_lambda(&mut self, lambda: f64);

    /// dE/dλ.
    fn d_e_d_l(&self) -> f64;

    /// d²E/dλ².
    fn d2_e_d_l2(&self) -> f64;

    /// Writes d²E/dxdλ into `out`.
    fn d_e_d_x_d_l(&self, out: &mut [f64]);
}

/// A λ-dependent potential that the biasing engine can wrap.
pub trait LambdaPotential: Potential + LambdaInterface {}

impl<T: Potential + LambdaInterface + ?Sized> LambdaPotential for T {}
