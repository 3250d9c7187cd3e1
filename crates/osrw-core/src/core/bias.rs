use super::histogram::Histogram;

/// Value and partial derivatives of the Gaussian-sum bias at one (λ, F_λ) point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BiasSample {
    pub energy: f64,
    pub d_lambda: f64,
    pub d_flambda: f64,
}

/// Metadynamics-style bias built from the recursion kernel.
///
/// Every occupied cell within `cutoff` bins of the query contributes a 2-D Gaussian of
/// height `magnitude` per count, with standard deviations of two bin widths along each
/// axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianBias {
    pub magnitude: f64,
    pub cutoff: usize,
}

impl Default for GaussianBias {
    fn default() -> Self {
        Self {
            magnitude: 0.005,
            cutoff: 5,
        }
    }
}

impl GaussianBias {
    pub fn new(magnitude: f64, cutoff: usize) -> Self {
        Self { magnitude, cutoff }
    }

    /// Bias energy and its derivatives with respect to λ and F_λ.
    ///
    /// λ centers past either end are mirrored back into the grid; F_λ centers outside the
    /// grid hold no counts and are skipped.
    pub fn evaluate(&self, histogram: &Histogram, lambda: f64, flambda: f64) -> BiasSample {
        let cutoff = self.cutoff as isize;
        let lambda_bin = histogram.lambda_bin(lambda) as isize;
        let flambda_bin = histogram.flambda_bin_unchecked(flambda);
        let fl_bins = histogram.flambda_bins() as isize;
        if flambda_bin.saturating_add(cutoff) < 0 || flambda_bin.saturating_sub(cutoff) >= fl_bins
        {
            return BiasSample::default();
        }
        let (ls2, fls2) = self.variances(histogram);

        let mut sample = BiasSample::default();
        for il in -cutoff..=cutoff {
            let lcenter = lambda_bin + il;
            let delta_l = lambda - histogram.lambda_center(lcenter);
            let (row, mirror) = histogram.mirror_lambda_bin(lcenter);
            let lambda_gaussian = (-delta_l * delta_l / (2.0 * ls2)).exp();

            for ifl in -cutoff..=cutoff {
                let fcenter = flambda_bin + ifl;
                if fcenter < 0 || fcenter >= fl_bins {
                    continue;
                }
                let weight = mirror * histogram.count(row, fcenter as usize) as f64;
                if weight == 0.0 {
                    continue;
                }
                let delta_fl = flambda - histogram.flambda_center(fcenter);
                let term = weight
                    * self.magnitude
                    * lambda_gaussian
                    * (-delta_fl * delta_fl / (2.0 * fls2)).exp();
                sample.energy += term;
                sample.d_lambda -= delta_l / ls2 * term;
                sample.d_flambda -= delta_fl / fls2 * term;
            }
        }
        sample
    }

    /// Bias energy evaluated at the center of bin (`lambda_bin`, `flambda_bin`).
    pub fn kernel_at_bin(
        &self,
        histogram: &Histogram,
        lambda_bin: usize,
        flambda_bin: usize,
    ) -> f64 {
        let lambda = histogram.lambda_center(lambda_bin as isize);
        let flambda = histogram.flambda_center(flambda_bin as isize);
        let cutoff = self.cutoff as isize;
        let fl_bins = histogram.flambda_bins() as isize;
        let (ls2, fls2) = self.variances(histogram);

        let mut sum = 0.0;
        for il in -cutoff..=cutoff {
            let lcenter = lambda_bin as isize + il;
            let delta_l = lambda - histogram.lambda_center(lcenter);
            let (row, mirror) = histogram.mirror_lambda_bin(lcenter);
            for ifl in -cutoff..=cutoff {
                let fcenter = flambda_bin as isize + ifl;
                if fcenter < 0 || fcenter >= fl_bins {
                    continue;
                }
                let weight = mirror * histogram.count(row, fcenter as usize) as f64;
                if weight > 0.0 {
                    let delta_fl = flambda - histogram.flambda_center(fcenter);
                    sum += weight
                        * self.magnitude
                        * (-delta_l * delta_l / (2.0 * ls2)).exp()
                        * (-delta_fl * delta_fl / (2.0 * fls2)).exp();
                }
            }
        }
        sum
    }

    #[inline]
    fn variances(&self, histogram: &Histogram) -> (f64, f64) {
        let sigma_l = 2.0 * histogram.lambda_width();
        let sigma_fl = 2.0 * histogram.flambda_width();
        (sigma_l * sigma_l, sigma_fl * sigma_fl)
    }
}
