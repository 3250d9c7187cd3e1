use super::walkers::Observation;
use crate::core::bias::{BiasSample, GaussianBias};
use crate::core::free_energy::FreeEnergyProfile;
use crate::core::histogram::{Growth, Histogram};
use parking_lot::RwLock;
use tracing::{trace, warn};

/// Relative disagreement in ΔG tolerated across a histogram growth.
const GROWTH_TOLERANCE: f64 = 1e-9;

/// Shared recursion kernel of one walker, safe to update from several threads.
///
/// Increments and reads take the read lock: cell updates are atomic, and a bias
/// evaluation may see some concurrent increments and miss others. Only growth of the
/// F_λ axis takes the write lock.
pub struct HistogramStore {
    histogram: RwLock<Histogram>,
    bias: RwLock<GaussianBias>,
    temperature: f64,
}

impl HistogramStore {
    pub fn new(histogram: Histogram, bias: GaussianBias, temperature: f64) -> Self {
        Self {
            histogram: RwLock::new(histogram),
            bias: RwLock::new(bias),
            temperature,
        }
    }

    #[inline]
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn bias(&self) -> GaussianBias {
        *self.bias.read()
    }

    pub fn set_bias_magnitude(&self, magnitude: f64) {
        self.bias.write().magnitude = magnitude;
    }

    /// Runs `f` with shared access to the histogram.
    pub fn with_histogram<R>(&self, f: impl FnOnce(&Histogram) -> R) -> R {
        f(&self.histogram.read())
    }

    /// Owned copy of the current grid.
    pub fn snapshot(&self) -> Histogram {
        self.histogram.read().clone()
    }

    pub fn total_counts(&self) -> u64 {
        self.histogram.read().total_counts()
    }

    /// Grows the F_λ axis, if needed, so that `flambda` falls inside the grid.
    ///
    /// # Panics
    ///
    /// Panics if the free energy changes across the growth, which would mean counts were
    /// lost or moved.
    pub fn ensure_capacity(&self, flambda: f64) -> Option<Growth> {
        if self.histogram.read().covers(flambda) {
            return None;
        }
        let bias = self.bias();
        let mut histogram = self.histogram.write();
        if histogram.covers(flambda) {
            return None;
        }

        let before = FreeEnergyProfile::compute(&histogram, &bias, self.temperature).free_energy();
        let growth = histogram.grow_to_cover(flambda);
        if growth.is_some() {
            let after =
                FreeEnergyProfile::compute(&histogram, &bias, self.temperature).free_energy();
            let scale = before.abs().max(after.abs()).max(1.0);
            assert!(
                (after - before).abs() <= GROWTH_TOLERANCE * scale,
                "histogram growth changed the free energy from {before} to {after}"
            );
        }
        growth
    }

    /// Adds one count for an observation that already lies inside the grid.
    pub fn increment(&self, observation: Observation) {
        self.histogram
            .read()
            .increment(observation.lambda, observation.flambda);
    }

    /// Grows the grid if needed and adds one count. Non-finite observations, and those
    /// that would grow the grid past [`MAX_CELLS`](crate::core::histogram::MAX_CELLS),
    /// are dropped.
    pub fn record(&self, observation: Observation) {
        if !self.is_recordable(&observation) {
            warn_unrecordable(&observation);
            return;
        }
        self.ensure_capacity(observation.flambda);
        self.increment(observation);
    }

    /// Records a batch of observations, growing the grid once for the extremes.
    pub fn record_all(&self, observations: &[Observation]) {
        let (accepted, rejected): (Vec<Observation>, Vec<Observation>) =
            observations.iter().partition(|o| self.is_recordable(o));
        for observation in &rejected {
            warn_unrecordable(observation);
        }
        let Some(min) = accepted.iter().map(|o| o.flambda).reduce(f64::min) else {
            return;
        };
        let max = accepted
            .iter()
            .map(|o| o.flambda)
            .fold(f64::NEG_INFINITY, f64::max);
        self.ensure_capacity(min);
        self.ensure_capacity(max);
        for observation in accepted {
            self.increment(observation);
        }
        trace!("Recorded {} walker observation(s).", observations.len());
    }

    pub fn evaluate_bias(&self, lambda: f64, flambda: f64) -> BiasSample {
        let bias = self.bias();
        bias.evaluate(&self.histogram.read(), lambda, flambda)
    }

    pub fn free_energy_profile(&self) -> FreeEnergyProfile {
        let bias = self.bias();
        FreeEnergyProfile::compute(&self.histogram.read(), &bias, self.temperature)
    }

    fn is_recordable(&self, observation: &Observation) -> bool {
        observation.lambda.is_finite() && self.histogram.read().can_cover(observation.flambda)
    }
}

fn warn_unrecordable(observation: &Observation) {
    warn!(
        "Ignoring OSRW observation L={} F_L={} outside the recordable range.",
        observation.lambda, observation.flambda
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn store() -> HistogramStore {
        HistogramStore::new(Histogram::new(11, 21, -21.0, 2.0), GaussianBias::default(), 300.0)
    }

    #[test]
    fn record_grows_the_grid_and_counts_the_observation() {
        let store = store();
        store.record(Observation::new(0.5, 10.0));
        store.record(Observation::new(0.2, 1.0));

        store.record(Observation::new(0.5, 500.0));

        assert_eq!(store.total_counts(), 3);
        store.with_histogram(|histogram| {
            assert!(histogram.covers(500.0));
            assert_eq!(histogram.count(5, histogram.flambda_bin(500.0)), 1);
            assert_eq!(histogram.count(5, histogram.flambda_bin(10.0)), 1);
        });
    }

    #[test]
    fn growth_preserves_the_free_energy() {
        let store = store();
        for (lambda, flambda) in [(0.0, -3.0), (0.3, 4.0), (0.3, 5.0), (0.8, -10.0), (1.0, 20.0)]
        {
            store.record(Observation::new(lambda, flambda));
        }
        let before = store.free_energy_profile().free_energy();

        assert!(matches!(
            store.ensure_capacity(-777.0),
            Some(Growth::Low { .. })
        ));
        assert!(matches!(
            store.ensure_capacity(900.0),
            Some(Growth::High { .. })
        ));

        let after = store.free_energy_profile().free_energy();
        assert!((after - before).abs() < 1e-9 * before.abs().max(1.0));
        assert_eq!(store.total_counts(), 5);
    }

    #[test]
    fn record_all_grows_for_both_extremes() {
        let store = store();

        store.record_all(&[
            Observation::new(0.1, -300.0),
            Observation::new(0.9, 300.0),
            Observation::new(0.5, f64::NAN),
        ]);

        assert_eq!(store.total_counts(), 2);
        store.with_histogram(|histogram| {
            assert!(histogram.covers(-300.0));
            assert!(histogram.covers(300.0));
        });
    }

    #[test]
    fn non_finite_observations_are_dropped() {
        let store = store();

        store.record(Observation::new(0.5, f64::INFINITY));
        store.record(Observation::new(f64::NAN, 1.0));

        assert_eq!(store.total_counts(), 0);
    }

    #[test]
    fn extreme_observations_neither_grow_the_grid_nor_bias() {
        let store = store();
        store.record(Observation::new(0.5, 1.0));

        store.record(Observation::new(0.5, 1.0e20));
        store.record_all(&[Observation::new(0.5, -1.0e20), Observation::new(0.5, 3.0)]);

        assert_eq!(store.total_counts(), 2);
        store.with_histogram(|histogram| assert_eq!(histogram.flambda_bins(), 21));
        assert_eq!(store.evaluate_bias(0.5, 1.0e20), BiasSample::default());
        assert_eq!(store.evaluate_bias(0.5, -1.0e20), BiasSample::default());
    }

    #[test]
    fn concurrent_records_are_all_counted() {
        let store = Arc::new(store());

        thread::scope(|scope| {
            for t in 0..4 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for i in 0..250 {
                        let flambda = if i % 50 == 0 {
                            (t as f64 + 1.0) * 150.0 * if t % 2 == 0 { 1.0 } else { -1.0 }
                        } else {
                            (i % 7) as f64
                        };
                        store.record(Observation::new(i as f64 / 250.0, flambda));
                    }
                });
            }
        });

        assert_eq!(store.total_counts(), 1000);
    }

    #[test]
    fn bias_magnitude_changes_apply_to_later_evaluations() {
        let store = store();
        store.record(Observation::new(0.5, 1.0));
        let before = store.evaluate_bias(0.5, 1.0).energy;

        store.set_bias_magnitude(0.01);

        let after = store.evaluate_bias(0.5, 1.0).energy;
        assert!((after - 2.0 * before).abs() < 1e-12);
        assert_eq!(store.bias().magnitude, 0.01);
    }
}
