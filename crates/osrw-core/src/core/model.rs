use super::free_energy::GAS_CONSTANT;
use super::potential::{EnergyTermState, LambdaInterface, Potential};

/// Two harmonic wells joined by a linear alchemical path.
///
/// `U(x, λ) = (1 - λ) · ½k₀|x - a|² + λ · (½k₁|x - b|² + ΔU)`
///
/// The end states are analytic, so the free-energy difference between them is known in
/// closed form (see [`exact_free_energy`](Self::exact_free_energy)). The λ derivatives
/// returned through [`LambdaInterface`] belong to the last evaluated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonicLambdaModel {
    k0: f64,
    k1: f64,
    center0: Vec<f64>,
    center1: Vec<f64>,
    offset: f64,
    lambda: f64,
    d_e_d_l: f64,
    d_e_d_x_d_l: Vec<f64>,
    state: EnergyTermState,
}

impl HarmonicLambdaModel {
    /// Creates a model over `center0.len()` variables.
    ///
    /// # Panics
    ///
    /// Panics if the centers differ in length or a force constant is not positive.
    pub fn new(k0: f64, k1: f64, center0: Vec<f64>, center1: Vec<f64>, offset: f64) -> Self {
        assert_eq!(
            center0.len(),
            center1.len(),
            "both wells must have the same dimension"
        );
        assert!(k0 > 0.0 && k1 > 0.0, "force constants must be positive");
        let n = center0.len();
        Self {
            k0,
            k1,
            center0,
            center1,
            offset,
            lambda: 0.0,
            d_e_d_l: 0.0,
            d_e_d_x_d_l: vec![0.0; n],
            state: EnergyTermState::Both,
        }
    }

    /// A one-dimensional model with both wells at the origin.
    pub fn one_dimensional(k0: f64, k1: f64, offset: f64) -> Self {
        Self::new(k0, k1, vec![0.0], vec![0.0], offset)
    }

    /// `ΔG = G(λ=1) - G(λ=0) = ΔU + (n/2)·RT·ln(k₁/k₀)`.
    pub fn exact_free_energy(&self, temperature: f64) -> f64 {
        let n = self.center0.len() as f64;
        self.offset + 0.5 * n * GAS_CONSTANT * temperature * (self.k1 / self.k0).ln()
    }

    pub fn energy_term_state(&self) -> EnergyTermState {
        self.state
    }

    fn well_energies(&self, x: &[f64]) -> (f64, f64) {
        let mut r0 = 0.0;
        let mut r1 = 0.0;
        for ((xi, a), b) in x.iter().zip(&self.center0).zip(&self.center1) {
            r0 += (xi - a) * (xi - a);
            r1 += (xi - b) * (xi - b);
        }
        (0.5 * self.k0 * r0, 0.5 * self.k1 * r1 + self.offset)
    }
}

impl Potential for HarmonicLambdaModel {
    fn energy_and_gradient(&mut self, x: &[f64], gradient: &mut [f64]) -> f64 {
        let (u0, u1) = self.well_energies(x);
        let lambda = self.lambda;
        for (i, xi) in x.iter().enumerate() {
            let g0 = self.k0 * (xi - self.center0[i]);
            let g1 = self.k1 * (xi - self.center1[i]);
            gradient[i] = (1.0 - lambda) * g0 + lambda * g1;
            self.d_e_d_x_d_l[i] = g1 - g0;
        }
        self.d_e_d_l = u1 - u0;
        (1.0 - lambda) * u0 + lambda * u1
    }

    fn number_of_variables(&self) -> usize {
        self.center0.len()
    }

    fn set_energy_term_state(&mut self, state: EnergyTermState) {
        self.state = state;
    }
}

impl LambdaInterface for HarmonicLambdaModel {
    fn lambda(&self) -> f64 {
        self.lambda
    }

    fn set_lambda(&mut self, lambda: f64) {
        self.lambda = lambda;
    }

    fn d_e_d_l(&self) -> f64 {
        self.d_e_d_l
    }

    fn d2_e_d_l2(&self) -> f64 {
        0.0
    }

    fn d_e_d_x_d_l(&self, out: &mut [f64]) {
        out.copy_from_slice(&self.d_e_d_x_d_l);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn two_dimensional_model() -> HarmonicLambdaModel {
        HarmonicLambdaModel::new(2.0, 8.0, vec![0.0, 1.0], vec![1.0, -1.0], 3.0)
    }

    #[test]
    fn end_states_reduce_to_single_wells() {
        let mut model = two_dimensional_model();
        let x = [0.5, 0.0];
        let mut gradient = [0.0; 2];

        model.set_lambda(0.0);
        let e0 = model.energy_and_gradient(&x, &mut gradient);
        assert!(f64_approx_equal(e0, 0.5 * 2.0 * (0.25 + 1.0)));
        assert!(f64_approx_equal(gradient[0], 1.0));
        assert!(f64_approx_equal(gradient[1], -2.0));

        model.set_lambda(1.0);
        let e1 = model.energy_and_gradient(&x, &mut gradient);
        assert!(f64_approx_equal(e1, 0.5 * 8.0 * (0.25 + 1.0) + 3.0));
        assert!(f64_approx_equal(gradient[0], -4.0));
        assert!(f64_approx_equal(gradient[1], 8.0));
    }

    #[test]
    fn lambda_derivatives_match_finite_differences() {
        let mut model = two_dimensional_model();
        let x = [0.3, 0.2];
        let mut gradient = [0.0; 2];
        let h = 1e-6;

        model.set_lambda(0.4 + h);
        let plus = model.energy_and_gradient(&x, &mut gradient);
        let grad_plus = gradient;
        model.set_lambda(0.4 - h);
        let minus = model.energy_and_gradient(&x, &mut gradient);
        let grad_minus = gradient;
        model.set_lambda(0.4);
        model.energy_and_gradient(&x, &mut gradient);

        assert!((model.d_e_d_l() - (plus - minus) / (2.0 * h)).abs() < 1e-6);
        assert_eq!(model.d2_e_d_l2(), 0.0);
        let mut mixed = [0.0; 2];
        model.d_e_d_x_d_l(&mut mixed);
        for i in 0..2 {
            let numeric = (grad_plus[i] - grad_minus[i]) / (2.0 * h);
            assert!((mixed[i] - numeric).abs() < 1e-6);
        }
    }

    #[test]
    fn exact_free_energy_adds_entropic_term() {
        let model = HarmonicLambdaModel::one_dimensional(1.0, 4.0, 2.0);
        let expected = 2.0 + 0.5 * GAS_CONSTANT * 300.0 * 4.0_f64.ln();
        assert!(f64_approx_equal(model.exact_free_energy(300.0), expected));

        let flat = HarmonicLambdaModel::one_dimensional(5.0, 5.0, -1.5);
        assert!(f64_approx_equal(flat.exact_free_energy(300.0), -1.5));
    }

    #[test]
    fn set_energy_term_state_is_recorded() {
        let mut model = HarmonicLambdaModel::one_dimensional(1.0, 1.0, 0.0);
        assert_eq!(model.energy_term_state(), EnergyTermState::Both);
        model.set_energy_term_state(EnergyTermState::Fast);
        assert_eq!(model.energy_term_state(), EnergyTermState::Fast);
        assert_eq!(model.number_of_variables(), 1);
    }
}
