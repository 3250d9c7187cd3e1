use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::info;

/// Number of F_λ bins allocated for a fresh histogram. The central bin is centered on zero.
pub const INITIAL_FLAMBDA_BINS: usize = 401;

/// Columns are added in blocks of this size whenever an observation falls outside the grid.
pub const GROWTH_BLOCK: usize = 100;

/// Largest grid, in cells, that a restart file or a growth may ask for.
pub const MAX_CELLS: usize = 1 << 26;

/// Describes how the F_λ dimension was extended by [`Histogram::grow_to_cover`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// Columns appended above the previous maximum; existing indices are unchanged.
    High { added: usize },
    /// Columns prepended below the previous minimum; existing indices shift by `offset`.
    Low { offset: usize },
}

/// The recursion kernel: a 2-D grid of visit counts over (λ, F_λ) bins.
///
/// The λ axis is fixed at construction. Bin `i` is centered on `i * dL` so that the
/// first and last bins sit exactly on λ = 0 and λ = 1 and are half as wide as the
/// interior bins. The F_λ axis starts at `min_f` with bins of width `dF` and may only
/// grow.
///
/// Cells are atomic so that increments can proceed through a shared reference while
/// other threads read the grid. Growth requires `&mut self`.
pub struct Histogram {
    lambda_bins: usize,
    dl: f64,
    fl_bins: usize,
    min_f: f64,
    df: f64,
    cells: Vec<AtomicU32>,
}

/// Number of λ bins for a requested bin width: `floor(1 / width)`, bumped to the next
/// odd number so that bins are centered on both end states.
pub fn lambda_bins_for_width(width: f64) -> usize {
    let mut bins = (1.0 / width).floor() as usize;
    if bins % 2 == 0 {
        bins += 1;
    }
    bins.max(3)
}

impl Histogram {
    /// Creates an empty histogram.
    ///
    /// # Panics
    ///
    /// Panics if `lambda_bins < 2`, `fl_bins == 0` or `df` is not strictly positive.
    pub fn new(lambda_bins: usize, fl_bins: usize, min_f: f64, df: f64) -> Self {
        assert!(lambda_bins >= 2, "a histogram needs at least two lambda bins");
        assert!(fl_bins > 0, "a histogram needs at least one F_lambda bin");
        assert!(df > 0.0, "the F_lambda bin width must be positive");
        let cells = (0..lambda_bins * fl_bins)
            .map(|_| AtomicU32::new(0))
            .collect();
        Self {
            lambda_bins,
            dl: 1.0 / (lambda_bins - 1) as f64,
            fl_bins,
            min_f,
            df,
            cells,
        }
    }

    /// Creates an empty histogram from the configured λ and F_λ bin widths, with
    /// [`INITIAL_FLAMBDA_BINS`] columns centered on F_λ = 0.
    pub fn from_bin_widths(lambda_width: f64, flambda_width: f64) -> Self {
        let lambda_bins = lambda_bins_for_width(lambda_width);
        let min_f = -(flambda_width * INITIAL_FLAMBDA_BINS as f64) / 2.0;
        Self::new(lambda_bins, INITIAL_FLAMBDA_BINS, min_f, flambda_width)
    }

    /// Rebuilds a histogram from row-major counts (`lambda_bins` rows of `fl_bins`).
    ///
    /// # Panics
    ///
    /// Panics if `counts.len() != lambda_bins * fl_bins`.
    pub fn from_counts(
        lambda_bins: usize,
        fl_bins: usize,
        min_f: f64,
        df: f64,
        counts: Vec<u32>,
    ) -> Self {
        assert_eq!(
            counts.len(),
            lambda_bins * fl_bins,
            "count table does not match the histogram dimensions"
        );
        let mut histogram = Self::new(lambda_bins, fl_bins, min_f, df);
        histogram.cells = counts.into_iter().map(AtomicU32::new).collect();
        histogram
    }

    #[inline]
    pub fn lambda_bins(&self) -> usize {
        self.lambda_bins
    }

    #[inline]
    pub fn flambda_bins(&self) -> usize {
        self.fl_bins
    }

    /// Width of an interior λ bin.
    #[inline]
    pub fn lambda_width(&self) -> f64 {
        self.dl
    }

    #[inline]
    pub fn flambda_width(&self) -> f64 {
        self.df
    }

    /// Lower edge of the first F_λ bin.
    #[inline]
    pub fn min_flambda(&self) -> f64 {
        self.min_f
    }

    /// Upper edge of the last F_λ bin.
    #[inline]
    pub fn max_flambda(&self) -> f64 {
        self.min_f + self.fl_bins as f64 * self.df
    }

    #[inline]
    pub fn lambda_center(&self, bin: isize) -> f64 {
        bin as f64 * self.dl
    }

    #[inline]
    pub fn flambda_center(&self, bin: isize) -> f64 {
        self.min_f + bin as f64 * self.df + self.df / 2.0
    }

    /// λ bin index, clamped to `[0, lambda_bins - 1]`.
    pub fn lambda_bin(&self, lambda: f64) -> usize {
        let min_lambda = -self.dl / 2.0;
        let bin = ((lambda - min_lambda) / self.dl).floor();
        if bin < 0.0 {
            0
        } else {
            (bin as usize).min(self.lambda_bins - 1)
        }
    }

    /// F_λ bin index without any range check. May be negative or past the last column.
    #[inline]
    pub fn flambda_bin_unchecked(&self, flambda: f64) -> isize {
        ((flambda - self.min_f) / self.df).floor() as isize
    }

    /// F_λ bin index for a value inside the grid. A value exactly on the upper edge
    /// maps to the last bin.
    pub fn flambda_bin(&self, flambda: f64) -> usize {
        let bin = self.flambda_bin_unchecked(flambda);
        debug_assert!(
            bin >= 0 && bin <= self.fl_bins as isize,
            "F_lambda {flambda} lies outside the histogram; call grow_to_cover first"
        );
        bin.clamp(0, self.fl_bins as isize - 1) as usize
    }

    /// Returns `true` if `flambda` lies within `[min_f, max_f]`.
    #[inline]
    pub fn covers(&self, flambda: f64) -> bool {
        flambda >= self.min_f && flambda <= self.max_flambda()
    }

    /// Maps a (possibly out-of-range) λ bin center onto a stored row and its weight.
    ///
    /// The end bins are half width, so their counts are doubled. Centers beyond either
    /// end are reflected back into the grid and carry unit weight.
    pub fn mirror_lambda_bin(&self, center: isize) -> (usize, f64) {
        let last = self.lambda_bins as isize - 1;
        if center == 0 || center == last {
            return (center as usize, 2.0);
        }
        let period = 2 * last;
        let mut row = center.rem_euclid(period);
        if row > last {
            row = period - row;
        }
        (row as usize, 1.0)
    }

    #[inline]
    fn index(&self, lambda_bin: usize, flambda_bin: usize) -> usize {
        lambda_bin * self.fl_bins + flambda_bin
    }

    /// Current count of a cell. Concurrent increments may or may not be visible.
    #[inline]
    pub fn count(&self, lambda_bin: usize, flambda_bin: usize) -> u32 {
        self.cells[self.index(lambda_bin, flambda_bin)].load(Ordering::Relaxed)
    }

    /// Adds one visit to the bin containing (λ, F_λ).
    pub fn increment(&self, lambda: f64, flambda: f64) {
        let i = self.lambda_bin(lambda);
        let j = self.flambda_bin(flambda);
        self.cells[self.index(i, j)].fetch_add(1, Ordering::Relaxed);
    }

    /// Lowest and highest occupied F_λ bin of a λ row.
    pub fn occupied_range(&self, lambda_bin: usize) -> Option<(usize, usize)> {
        let lower = (0..self.fl_bins).find(|&j| self.count(lambda_bin, j) > 0)?;
        let upper = (0..self.fl_bins)
            .rev()
            .find(|&j| self.count(lambda_bin, j) > 0)?;
        Some((lower, upper))
    }

    pub fn row(&self, lambda_bin: usize) -> Vec<u32> {
        (0..self.fl_bins)
            .map(|j| self.count(lambda_bin, j))
            .collect()
    }

    pub fn row_total(&self, lambda_bin: usize) -> u64 {
        (0..self.fl_bins)
            .map(|j| self.count(lambda_bin, j) as u64)
            .sum()
    }

    pub fn total_counts(&self) -> u64 {
        self.cells
            .iter()
            .map(|c| c.load(Ordering::Relaxed) as u64)
            .sum()
    }

    /// Whether covering `flambda` keeps the grid within [`MAX_CELLS`].
    pub fn can_cover(&self, flambda: f64) -> bool {
        if !flambda.is_finite() {
            return false;
        }
        let columns = if flambda > self.max_flambda() {
            ((flambda - self.min_f) / self.df).ceil()
        } else if flambda < self.min_f {
            ((self.max_flambda() - flambda) / self.df).ceil()
        } else {
            return true;
        };
        (columns + GROWTH_BLOCK as f64) * self.lambda_bins as f64 <= MAX_CELLS as f64
    }

    /// Extends the F_λ axis until `flambda` is covered.
    ///
    /// Growth never drops or moves a count relative to its F_λ value: columns added
    /// on the low side shift every existing column by the same offset.
    pub fn grow_to_cover(&mut self, flambda: f64) -> Option<Growth> {
        if !flambda.is_finite() {
            return None;
        }
        if flambda > self.max_flambda() {
            info!(
                "Current F_lambda {:8.2} > maximum histogram size {:8.2}.",
                flambda,
                self.max_flambda()
            );
            let old_bins = self.fl_bins;
            let mut new_bins = old_bins;
            while self.min_f + (new_bins as f64) * self.df < flambda {
                new_bins += GROWTH_BLOCK;
            }
            self.reallocate(new_bins, 0);
            info!(
                "New histogram {:8.2} to {:8.2} with {} bins.",
                self.min_f,
                self.max_flambda(),
                self.fl_bins
            );
            Some(Growth::High {
                added: new_bins - old_bins,
            })
        } else if flambda < self.min_f {
            info!(
                "Current F_lambda {:8.2} < minimum histogram size {:8.2}.",
                flambda, self.min_f
            );
            let mut offset = GROWTH_BLOCK;
            while flambda < self.min_f - (offset as f64) * self.df {
                offset += GROWTH_BLOCK;
            }
            self.reallocate(self.fl_bins + offset, offset);
            self.min_f -= offset as f64 * self.df;
            info!(
                "New histogram {:8.2} to {:8.2} with {} bins.",
                self.min_f,
                self.max_flambda(),
                self.fl_bins
            );
            Some(Growth::Low { offset })
        } else {
            None
        }
    }

    fn reallocate(&mut self, new_bins: usize, offset: usize) {
        let mut cells: Vec<AtomicU32> = (0..self.lambda_bins * new_bins)
            .map(|_| AtomicU32::new(0))
            .collect();
        for i in 0..self.lambda_bins {
            for j in 0..self.fl_bins {
                let count = self.count(i, j);
                *cells[i * new_bins + j + offset].get_mut() = count;
            }
        }
        self.cells = cells;
        self.fl_bins = new_bins;
    }
}

impl Clone for Histogram {
    fn clone(&self) -> Self {
        Self {
            lambda_bins: self.lambda_bins,
            dl: self.dl,
            fl_bins: self.fl_bins,
            min_f: self.min_f,
            df: self.df,
            cells: self
                .cells
                .iter()
                .map(|c| AtomicU32::new(c.load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Histogram")
            .field("lambda_bins", &self.lambda_bins)
            .field("dl", &self.dl)
            .field("fl_bins", &self.fl_bins)
            .field("min_f", &self.min_f)
            .field("df", &self.df)
            .field("total_counts", &self.total_counts())
            .finish()
    }
}

impl PartialEq for Histogram {
    fn eq(&self, other: &Self) -> bool {
        self.lambda_bins == other.lambda_bins
            && self.fl_bins == other.fl_bins
            && self.min_f == other.min_f
            && self.df == other.df
            && self
                .cells
                .iter()
                .zip(&other.cells)
                .all(|(a, b)| a.load(Ordering::Relaxed) == b.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_histogram() -> Histogram {
        // Five λ bins (dL = 0.25) and five F_λ bins of width 2 centered on zero.
        Histogram::new(5, 5, -5.0, 2.0)
    }

    #[test]
    fn lambda_bins_for_width_is_odd_and_covers_end_states() {
        assert_eq!(lambda_bins_for_width(0.005), 201);
        assert_eq!(lambda_bins_for_width(0.25), 5);
        assert_eq!(lambda_bins_for_width(0.1), 11);
        assert_eq!(lambda_bins_for_width(0.3), 3);
    }

    #[test]
    fn from_bin_widths_centers_the_middle_flambda_bin_on_zero() {
        let histogram = Histogram::from_bin_widths(0.005, 2.0);
        assert_eq!(histogram.lambda_bins(), 201);
        assert_eq!(histogram.flambda_bins(), INITIAL_FLAMBDA_BINS);
        assert!((histogram.lambda_width() - 0.005).abs() < 1e-12);
        assert_eq!(histogram.flambda_center(200), 0.0);
    }

    #[test]
    fn lambda_bin_clamps_to_the_grid() {
        let histogram = small_histogram();
        assert_eq!(histogram.lambda_bin(-0.5), 0);
        assert_eq!(histogram.lambda_bin(0.0), 0);
        assert_eq!(histogram.lambda_bin(0.12), 0);
        assert_eq!(histogram.lambda_bin(0.13), 1);
        assert_eq!(histogram.lambda_bin(0.5), 2);
        assert_eq!(histogram.lambda_bin(1.0), 4);
        assert_eq!(histogram.lambda_bin(1.7), 4);
    }

    #[test]
    fn flambda_bin_maps_upper_edge_to_last_bin() {
        let histogram = small_histogram();
        assert_eq!(histogram.flambda_bin(-5.0), 0);
        assert_eq!(histogram.flambda_bin(0.0), 2);
        assert_eq!(histogram.flambda_bin(5.0), 4);
        assert_eq!(histogram.flambda_bin_unchecked(-7.0), -1);
        assert_eq!(histogram.flambda_bin_unchecked(9.5), 7);
    }

    #[test]
    fn mirror_lambda_bin_doubles_edges_and_reflects_outside_centers() {
        let histogram = small_histogram();
        assert_eq!(histogram.mirror_lambda_bin(0), (0, 2.0));
        assert_eq!(histogram.mirror_lambda_bin(4), (4, 2.0));
        assert_eq!(histogram.mirror_lambda_bin(2), (2, 1.0));
        assert_eq!(histogram.mirror_lambda_bin(-1), (1, 1.0));
        assert_eq!(histogram.mirror_lambda_bin(-3), (3, 1.0));
        assert_eq!(histogram.mirror_lambda_bin(5), (3, 1.0));
        assert_eq!(histogram.mirror_lambda_bin(7), (1, 1.0));
    }

    #[test]
    fn increment_adds_one_count_to_the_exact_bin() {
        let histogram = small_histogram();
        histogram.increment(0.5, 0.3);
        histogram.increment(0.5, 0.3);
        histogram.increment(0.0, -4.0);
        assert_eq!(histogram.count(2, 2), 2);
        assert_eq!(histogram.count(0, 0), 1);
        assert_eq!(histogram.total_counts(), 3);
        assert_eq!(histogram.row_total(2), 2);
        assert_eq!(histogram.occupied_range(2), Some((2, 2)));
        assert_eq!(histogram.occupied_range(3), None);
    }

    #[test]
    fn growth_on_high_side_preserves_every_cell() {
        let mut histogram = small_histogram();
        histogram.increment(0.25, -3.0);
        histogram.increment(0.75, 4.5);
        histogram.increment(1.0, 1.0);
        let before = histogram.clone();

        let growth = histogram.grow_to_cover(250.0);

        assert_eq!(growth, Some(Growth::High { added: 200 }));
        assert_eq!(histogram.flambda_bins(), 205);
        assert_eq!(histogram.min_flambda(), -5.0);
        assert!(histogram.covers(250.0));
        assert_eq!(histogram.total_counts(), before.total_counts());
        for i in 0..before.lambda_bins() {
            for j in 0..before.flambda_bins() {
                assert_eq!(histogram.count(i, j), before.count(i, j));
            }
        }
    }

    #[test]
    fn growth_on_low_side_shifts_cells_by_the_offset() {
        let mut histogram = small_histogram();
        histogram.increment(0.0, -4.0);
        histogram.increment(0.5, 0.0);
        histogram.increment(0.5, 0.0);
        let before = histogram.clone();

        let growth = histogram.grow_to_cover(-300.0);

        assert_eq!(growth, Some(Growth::Low { offset: 200 }));
        assert_eq!(histogram.flambda_bins(), 205);
        assert_eq!(histogram.min_flambda(), -405.0);
        assert_eq!(histogram.max_flambda(), before.max_flambda());
        assert_eq!(histogram.total_counts(), before.total_counts());
        for i in 0..before.lambda_bins() {
            for j in 0..before.flambda_bins() {
                assert_eq!(histogram.count(i, j + 200), before.count(i, j));
            }
        }
        assert_eq!(histogram.count(2, histogram.flambda_bin(0.0)), 2);
    }

    #[test]
    fn grow_to_cover_is_a_no_op_inside_the_grid() {
        let mut histogram = small_histogram();
        assert_eq!(histogram.grow_to_cover(4.9), None);
        assert_eq!(histogram.grow_to_cover(f64::NAN), None);
        assert_eq!(histogram.flambda_bins(), 5);
    }

    #[test]
    fn can_cover_bounds_growth_by_the_cell_limit() {
        let histogram = small_histogram();
        assert!(histogram.can_cover(0.0));
        assert!(histogram.can_cover(5_000.0));
        assert!(histogram.can_cover(-5_000.0));
        assert!(!histogram.can_cover(1.0e20));
        assert!(!histogram.can_cover(-1.0e20));
        assert!(!histogram.can_cover(f64::INFINITY));
    }

    #[test]
    fn from_counts_round_trips_through_rows() {
        let counts: Vec<u32> = (0..15).collect();
        let histogram = Histogram::from_counts(3, 5, -5.0, 2.0, counts);
        assert_eq!(histogram.row(1), vec![5, 6, 7, 8, 9]);
        assert_eq!(histogram.total_counts(), 105);
        assert_eq!(histogram.clone(), histogram);
    }
}
