use super::bias::GaussianBias;
use super::histogram::Histogram;
use serde::Serialize;
use std::io::Write;
use tracing::info;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Gas constant in kcal/mol/K.
pub const GAS_CONSTANT: f64 = 1.9872066e-3;

/// Thermodynamic-integration summary of one λ bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LambdaBinSummary {
    pub counts: u64,
    pub lambda_lower: f64,
    pub lambda_upper: f64,
    pub flambda_lower: f64,
    pub flambda_upper: f64,
    pub mean_flambda: f64,
    pub delta_g: f64,
    pub cumulative_g: f64,
}

/// Free energy along λ estimated from the recursion kernel.
///
/// `f_lambda[i]` is the Boltzmann-reweighted ensemble average of F_λ in λ bin `i`; the
/// cumulative free energy is its integral with half-width end bins.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeEnergyProfile {
    dl: f64,
    f_lambda: Vec<f64>,
    bins: Vec<LambdaBinSummary>,
    free_energy: f64,
    total_counts: u64,
}

struct RowEstimate {
    mean_flambda: f64,
    counts: u64,
    flambda_range: (f64, f64),
}

impl FreeEnergyProfile {
    /// A profile with `F_λ = 0` everywhere, used before any counts are available.
    pub fn empty(histogram: &Histogram) -> Self {
        let empty = Histogram::new(
            histogram.lambda_bins(),
            1,
            histogram.min_flambda(),
            histogram.flambda_width(),
        );
        Self::compute(&empty, &GaussianBias::default(), 1.0)
    }

    /// Integrates the ensemble-averaged F_λ of every λ bin.
    ///
    /// The weights `exp(kernel / RT)` use the bias itself evaluated at each bin center.
    pub fn compute(histogram: &Histogram, bias: &GaussianBias, temperature: f64) -> Self {
        let lambda_bins = histogram.lambda_bins();
        let rt = GAS_CONSTANT * temperature;

        #[cfg(not(feature = "parallel"))]
        let rows: Vec<RowEstimate> = (0..lambda_bins)
            .map(|i| estimate_row(histogram, bias, rt, i))
            .collect();

        #[cfg(feature = "parallel")]
        let rows: Vec<RowEstimate> = (0..lambda_bins)
            .into_par_iter()
            .map(|i| estimate_row(histogram, bias, rt, i))
            .collect();

        let dl = histogram.lambda_width();
        let mut free_energy = 0.0;
        let mut total_counts = 0;
        let mut f_lambda = Vec::with_capacity(lambda_bins);
        let mut bins = Vec::with_capacity(lambda_bins);

        for (i, row) in rows.into_iter().enumerate() {
            let width = if i == 0 || i == lambda_bins - 1 {
                dl / 2.0
            } else {
                dl
            };
            let delta_g = row.mean_flambda * width;
            free_energy += delta_g;
            total_counts += row.counts;

            let lambda_lower = (i as f64 * dl - dl / 2.0).max(0.0);
            let lambda_upper = (i as f64 * dl + dl / 2.0).min(1.0);
            f_lambda.push(row.mean_flambda);
            bins.push(LambdaBinSummary {
                counts: row.counts,
                lambda_lower,
                lambda_upper,
                flambda_lower: row.flambda_range.0,
                flambda_upper: row.flambda_range.1,
                mean_flambda: row.mean_flambda,
                delta_g,
                cumulative_g: free_energy,
            });
        }

        Self {
            dl,
            f_lambda,
            bins,
            free_energy,
            total_counts,
        }
    }

    /// Cumulative free energy from λ = 0 to λ = 1 (kcal/mol).
    #[inline]
    pub fn free_energy(&self) -> f64 {
        self.free_energy
    }

    #[inline]
    pub fn total_counts(&self) -> u64 {
        self.total_counts
    }

    pub fn f_lambda(&self) -> &[f64] {
        &self.f_lambda
    }

    pub fn bins(&self) -> &[LambdaBinSummary] {
        &self.bins
    }

    /// Bias energy that cancels the free energy accumulated up to `lambda`, and its
    /// λ-derivative.
    ///
    /// `F_λ` is linearly interpolated between bin centers and integrated from 0; the
    /// last segment ends exactly at `lambda`.
    pub fn bias_energy(&self, lambda: f64) -> (f64, f64) {
        let mut integral = 0.0;
        let mut slope = 0.0;
        for i0 in 0..self.f_lambda.len().saturating_sub(1) {
            let l0 = i0 as f64 * self.dl;
            let mut l1 = l0 + self.dl;
            let fl0 = self.f_lambda[i0];
            let delta_fl = self.f_lambda[i0 + 1] - fl0;

            let done = lambda <= l1;
            if done {
                l1 = lambda;
            }
            integral += fl0 * l1 + delta_fl * l1 * (0.5 * l1 - l0) / self.dl;
            integral -= fl0 * l0 + delta_fl * l0 * (-0.5 * l0) / self.dl;
            if done {
                slope = fl0 + (l1 - l0) * delta_fl / self.dl;
                break;
            }
        }
        (-integral, -slope)
    }

    /// Logs the per-bin table in the classic OSRW layout.
    pub fn log_table(&self) {
        info!(" Count   Lambda Bins    F_Lambda Bins   <   F_L  >       dG        G");
        for bin in &self.bins {
            info!(
                " {:6}  {:5.3} {:5.3}   {:7.1} {:7.1}   {:8.3}  {:8.3} {:8.3}",
                bin.counts,
                bin.lambda_lower,
                bin.lambda_upper,
                bin.flambda_lower,
                bin.flambda_upper,
                bin.mean_flambda,
                bin.delta_g,
                bin.cumulative_g
            );
        }
    }

    /// Writes the per-bin table as CSV with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for bin in &self.bins {
            csv_writer.serialize(bin)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

fn estimate_row(histogram: &Histogram, bias: &GaussianBias, rt: f64, i: usize) -> RowEstimate {
    let Some((lower, upper)) = histogram.occupied_range(i) else {
        return RowEstimate {
            mean_flambda: 0.0,
            counts: 0,
            flambda_range: (0.0, 0.0),
        };
    };

    let mut ensemble_average = 0.0;
    let mut partition_function = 0.0;
    let mut counts = 0;
    for j in lower..=upper {
        let flambda = histogram.flambda_center(j as isize);
        let weight = (bias.kernel_at_bin(histogram, i, j) / rt).exp();
        ensemble_average += flambda * weight;
        partition_function += weight;
        counts += histogram.count(i, j) as u64;
    }

    let df = histogram.flambda_width();
    RowEstimate {
        mean_flambda: ensemble_average / partition_function,
        counts,
        flambda_range: (
            histogram.min_flambda() + lower as f64 * df,
            histogram.min_flambda() + (upper + 1) as f64 * df,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn empty_histogram_has_zero_free_energy() {
        let histogram = Histogram::new(11, 21, -21.0, 2.0);
        let profile = FreeEnergyProfile::compute(&histogram, &GaussianBias::default(), 300.0);

        assert_eq!(profile.free_energy(), 0.0);
        assert_eq!(profile.total_counts(), 0);
        assert!(profile.f_lambda().iter().all(|&f| f == 0.0));
        assert_eq!(profile, FreeEnergyProfile::empty(&histogram));
    }

    #[test]
    fn single_count_row_reports_its_bin_center() {
        let histogram = Histogram::new(5, 5, -5.0, 2.0);
        histogram.increment(0.5, 2.5);
        let profile = FreeEnergyProfile::compute(&histogram, &GaussianBias::default(), 300.0);

        assert!(f64_approx_equal(profile.f_lambda()[2], 2.0));
        assert!(f64_approx_equal(profile.free_energy(), 2.0 * 0.25));
        let bin = profile.bins()[2];
        assert_eq!(bin.counts, 1);
        assert_eq!((bin.flambda_lower, bin.flambda_upper), (1.0, 3.0));
        assert_eq!((bin.lambda_lower, bin.lambda_upper), (0.375, 0.625));
    }

    #[test]
    fn end_bins_contribute_half_width() {
        let histogram = Histogram::new(5, 5, -5.0, 2.0);
        histogram.increment(0.0, 2.5);
        histogram.increment(1.0, 2.5);
        let profile = FreeEnergyProfile::compute(&histogram, &GaussianBias::default(), 300.0);

        assert!(f64_approx_equal(profile.free_energy(), 2.0 * 0.125 * 2.0));
        assert_eq!(profile.bins()[0].lambda_lower, 0.0);
        assert_eq!(profile.bins()[4].lambda_upper, 1.0);
    }

    #[test]
    fn reweighting_favours_heavily_biased_bins() {
        let histogram = Histogram::new(5, 5, -5.0, 2.0);
        for _ in 0..50 {
            histogram.increment(0.5, 2.5);
        }
        histogram.increment(0.5, -2.5);
        let profile = FreeEnergyProfile::compute(&histogram, &GaussianBias::new(0.05, 5), 300.0);

        // Equal weighting would give 0.0; the bias on the crowded bin pulls the mean up.
        assert!(profile.f_lambda()[2] > 0.0);
        assert!(profile.f_lambda()[2] < 2.0);
    }

    #[test]
    fn bias_energy_integrates_constant_flambda_linearly() {
        let histogram = Histogram::new(5, 5, -5.0, 2.0);
        for lambda in [0.0, 0.25, 0.5, 0.75, 1.0] {
            histogram.increment(lambda, 2.5);
        }
        let profile = FreeEnergyProfile::compute(&histogram, &GaussianBias::new(0.005, 0), 300.0);

        for lambda in [0.0, 0.1, 0.3, 0.5, 0.9, 1.0] {
            let (energy, slope) = profile.bias_energy(lambda);
            assert!(f64_approx_equal(energy, -2.0 * lambda));
            assert!(f64_approx_equal(slope, -2.0));
        }
    }

    #[test]
    fn bias_energy_interpolates_linear_flambda() {
        let histogram = Histogram::new(5, 101, -101.0, 2.0);
        // F_λ centers 0, 10, 20, 30, 40 at the five bin centers.
        for (i, lambda) in [0.0, 0.25, 0.5, 0.75, 1.0].iter().enumerate() {
            histogram.increment(*lambda, 10.0 * i as f64 + 0.5);
        }
        let profile = FreeEnergyProfile::compute(&histogram, &GaussianBias::new(0.005, 0), 300.0);
        assert!(f64_approx_equal(profile.f_lambda()[3], 30.0));

        // F(λ) = 40λ, so the integral to λ is 20λ².
        for lambda in [0.1, 0.4, 0.6, 1.0] {
            let (energy, slope) = profile.bias_energy(lambda);
            assert!(f64_approx_equal(energy, -20.0 * lambda * lambda));
            assert!(f64_approx_equal(slope, -40.0 * lambda));
        }
    }

    #[test]
    fn write_csv_emits_header_and_one_row_per_bin() {
        let histogram = Histogram::new(5, 5, -5.0, 2.0);
        histogram.increment(0.5, 2.5);
        let profile = FreeEnergyProfile::compute(&histogram, &GaussianBias::default(), 300.0);

        let mut buffer = Vec::new();
        profile.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("counts,lambda_lower,lambda_upper"));
        assert!(lines[3].starts_with("1,"));
    }
}
