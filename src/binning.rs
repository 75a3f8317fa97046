//! Fixed-width binning of irregularly sampled data.
//!
//! A [`Binning`] assigns every sample of an independent variable `x` to one
//! half-open bin `[edge_i, edge_i+1)`. The edges are computed once and then
//! reused for any number of metric columns, see [`Binning::aggregate`].

use thiserror::Error;

/// Upper limit on the number of bins a single [`Binning`] may allocate.
pub const MAX_N_BINS: usize = 10_000_000;

/// Invalid input passed to the binning routines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidParameter {
    #[error("bin width must be positive and finite, but is {0}")]
    BinWidth(f64),

    #[error("sample set is empty")]
    EmptySamples,

    #[error("x has {n_x} samples, but values has {n_vals}")]
    LengthMismatch { n_x: usize, n_vals: usize },

    #[error("x must be finite, but sample {idx} is {val}")]
    NonFiniteX { idx: usize, val: f64 },

    #[error("bin origin must not exceed min(x) = {x_min}, but is {origin}")]
    Origin { origin: f64, x_min: f64 },

    #[error("number of bins exceeds {}", MAX_N_BINS)]
    TooManyBins,
}

/// Equal-width bins covering `[min(x), max(x)]` and the bin index of each sample.
#[derive(Debug, Clone)]
pub struct Binning {
    edges: Vec<f64>,
    i_bin_vec: Vec<usize>,
}

impl Binning {
    /// Build bins of width `width` starting at `min(x)`.
    ///
    /// The last edge strictly exceeds `max(x)`, so the maximum sample always
    /// falls inside the last bin.
    ///
    /// # Errors
    /// Returns [`InvalidParameter`] if `width` is not positive and finite,
    /// if `x` is empty or contains a non-finite value,
    /// or if more than [`MAX_N_BINS`] bins would be needed.
    pub fn new(x: &[f64], width: f64) -> Result<Self, InvalidParameter> {
        let (x_min, _) = min_max(x)?;
        Self::with_origin(x, width, x_min)
    }

    /// Build bins of width `width` whose first edge is `origin`.
    ///
    /// Same as [`Binning::new`] but with the first edge placed at `origin`
    /// (which must not exceed `min(x)`) instead of at `min(x)`.
    pub fn with_origin(x: &[f64], width: f64, origin: f64) -> Result<Self, InvalidParameter> {
        if !(width > 0.0 && width.is_finite()) {
            return Err(InvalidParameter::BinWidth(width));
        }
        let (x_min, x_max) = min_max(x)?;
        if !(origin <= x_min) {
            return Err(InvalidParameter::Origin { origin, x_min });
        }
        if (x_max - origin) / width >= MAX_N_BINS as f64 {
            return Err(InvalidParameter::TooManyBins);
        }

        let mut edges = vec![origin];
        let mut k = 1;
        loop {
            let edge = origin + k as f64 * width;
            edges.push(edge);
            if edge > x_max {
                break;
            }
            if edges.len() > MAX_N_BINS {
                return Err(InvalidParameter::TooManyBins);
            }
            k += 1;
        }

        // edges[0] <= x < edges[last] holds for every sample,
        // so the partition point lies in 1..edges.len().
        let i_bin_vec = x
            .iter()
            .map(|&val| edges.partition_point(|&edge| edge <= val) - 1)
            .collect();

        Ok(Self { edges, i_bin_vec })
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Bin index of each sample, in input order.
    pub fn bin_indices(&self) -> &[usize] {
        &self.i_bin_vec
    }

    /// Midpoint of each bin.
    pub fn centers(&self) -> Vec<f64> {
        self.edges
            .windows(2)
            .map(|pair| (pair[0] + pair[1]) / 2.0)
            .collect()
    }

    /// Average `values` over each bin.
    ///
    /// `values[j]` belongs to the same sample as `x[j]`. Non-finite values are
    /// excluded from both the sum and the count. A bin without finite values
    /// yields NaN.
    pub fn aggregate(&self, values: &[f64]) -> Result<Vec<f64>, InvalidParameter> {
        let n_x = self.i_bin_vec.len();
        let n_vals = values.len();
        if n_x != n_vals {
            return Err(InvalidParameter::LengthMismatch { n_x, n_vals });
        }

        let n_bins = self.n_bins();
        let mut sums = vec![0.0; n_bins];
        let mut counts = vec![0_usize; n_bins];
        for (&i_bin, &val) in self.i_bin_vec.iter().zip(values) {
            if val.is_finite() {
                sums[i_bin] += val;
                counts[i_bin] += 1;
            }
        }

        Ok(sums
            .into_iter()
            .zip(counts)
            .map(|(sum, count)| {
                if count > 0 {
                    sum / count as f64
                } else {
                    f64::NAN
                }
            })
            .collect())
    }
}

/// Bin `values` over `x` with bins of width `width`.
///
/// Returns the bin centers and the binned averages, both `n_bins` long.
pub fn aggregate(
    x: &[f64],
    values: &[f64],
    width: f64,
) -> Result<(Vec<f64>, Vec<f64>), InvalidParameter> {
    if x.len() != values.len() {
        return Err(InvalidParameter::LengthMismatch {
            n_x: x.len(),
            n_vals: values.len(),
        });
    }
    let binning = Binning::new(x, width)?;
    let binned = binning.aggregate(values)?;
    Ok((binning.centers(), binned))
}

fn min_max(x: &[f64]) -> Result<(f64, f64), InvalidParameter> {
    if x.is_empty() {
        return Err(InvalidParameter::EmptySamples);
    }
    if let Some((idx, &val)) = x.iter().enumerate().find(|(_, val)| !val.is_finite()) {
        return Err(InvalidParameter::NonFiniteX { idx, val });
    }
    let x_min = x.iter().copied().fold(f64::INFINITY, f64::min);
    let x_max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok((x_min, x_max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::relative_deviation;

    fn scattered_samples(n: usize) -> (Vec<f64>, Vec<f64>) {
        let x = (0..n).map(|i| 5.0 + ((i * 37) % 101) as f64 * 0.0131).collect();
        let values = (0..n)
            .map(|i| match i % 7 {
                0 => f64::NAN,
                3 => f64::INFINITY,
                _ => ((i * 13) % 29) as f64,
            })
            .collect();
        (x, values)
    }

    #[test]
    fn averages_consecutive_bins() {
        let x = [1.0, 1.2, 1.4, 1.6];
        let values = [10.0, 20.0, 30.0, 40.0];

        let binning = Binning::new(&x, 0.5).unwrap();
        assert_eq!(binning.edges(), &[1.0, 1.5, 2.0]);

        let (centers, binned) = aggregate(&x, &values, 0.5).unwrap();
        assert_eq!(centers, vec![1.25, 1.75]);
        assert_eq!(binned, vec![20.0, 40.0]);
    }

    #[test]
    fn equal_x_gives_single_bin_and_skips_nan() {
        let x = [1.0, 1.0, 1.0];
        let values = [5.0, f64::NAN, 15.0];

        let binning = Binning::new(&x, 1.0).unwrap();
        assert_eq!(binning.edges(), &[1.0, 2.0]);

        let (centers, binned) = aggregate(&x, &values, 1.0).unwrap();
        assert_eq!(centers, vec![1.5]);
        assert_eq!(binned, vec![10.0]);
    }

    #[test]
    fn empty_bin_is_nan_and_stays_local_after_normalization() {
        let x = [0.0, 0.1, 2.1, 2.2];
        let values = [1.0, 3.0, 5.0, 7.0];

        let (centers, binned) = aggregate(&x, &values, 1.0).unwrap();
        assert_eq!(centers.len(), 3);
        assert_eq!(binned[0], 2.0);
        assert!(binned[1].is_nan());
        assert_eq!(binned[2], 6.0);

        let normalized = relative_deviation(&binned);
        assert_eq!(normalized.len(), 3);
        assert_eq!(normalized[0], -0.5);
        assert!(normalized[1].is_nan());
        assert_eq!(normalized[2], 0.5);
    }

    #[test]
    fn bin_with_only_non_finite_values_is_nan() {
        let x = [0.0, 0.5, 1.5];
        let values = [f64::INFINITY, f64::NEG_INFINITY, 4.0];

        let (_, binned) = aggregate(&x, &values, 1.0).unwrap();
        assert!(binned[0].is_nan());
        assert_eq!(binned[1], 4.0);
    }

    #[test]
    fn rejects_invalid_width() {
        let x = [1.0, 2.0];
        let values = [1.0, 2.0];

        assert_eq!(
            aggregate(&x, &values, 0.0),
            Err(InvalidParameter::BinWidth(0.0))
        );
        assert_eq!(
            aggregate(&x, &values, -0.5),
            Err(InvalidParameter::BinWidth(-0.5))
        );
        assert!(matches!(
            aggregate(&x, &values, f64::NAN),
            Err(InvalidParameter::BinWidth(_))
        ));
        assert!(matches!(
            aggregate(&x, &values, f64::INFINITY),
            Err(InvalidParameter::BinWidth(_))
        ));
    }

    #[test]
    fn rejects_empty_mismatched_and_non_finite_input() {
        assert_eq!(
            aggregate(&[], &[], 1.0),
            Err(InvalidParameter::EmptySamples)
        );
        assert_eq!(
            aggregate(&[1.0, 2.0], &[1.0], 1.0),
            Err(InvalidParameter::LengthMismatch { n_x: 2, n_vals: 1 })
        );
        assert!(matches!(
            aggregate(&[1.0, f64::NAN], &[1.0, 2.0], 1.0),
            Err(InvalidParameter::NonFiniteX { idx: 1, .. })
        ));

        let binning = Binning::new(&[1.0, 2.0], 1.0).unwrap();
        assert_eq!(
            binning.aggregate(&[1.0, 2.0, 3.0]),
            Err(InvalidParameter::LengthMismatch { n_x: 2, n_vals: 3 })
        );
    }

    #[test]
    fn rejects_excessive_bin_count() {
        assert_eq!(
            Binning::new(&[0.0, 1.0], 1e-12).unwrap_err(),
            InvalidParameter::TooManyBins
        );
    }

    #[test]
    fn maximum_falls_in_last_bin_on_exact_multiple() {
        let x = [1.0, 1.25, 1.5];
        let binning = Binning::new(&x, 0.5).unwrap();

        assert_eq!(binning.edges(), &[1.0, 1.5, 2.0]);
        assert_eq!(binning.bin_indices(), &[0, 0, 1]);
        assert!(*binning.edges().last().unwrap() > 1.5);
    }

    #[test]
    fn bin_count_matches_span() {
        let (x, _) = scattered_samples(200);
        let x_min = x.iter().copied().fold(f64::INFINITY, f64::min);
        let x_max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        for width in [0.007, 0.05, 0.3, 2.0] {
            let binning = Binning::new(&x, width).unwrap();
            let exp = ((x_max - x_min) / width).ceil().max(1.0) as usize;
            let n_bins = binning.n_bins();
            assert!(n_bins == exp || n_bins == exp + 1, "width {width}: {n_bins} vs {exp}");
            assert_eq!(binning.centers().len(), n_bins);
            assert_eq!(binning.aggregate(&x).unwrap().len(), n_bins);
        }
    }

    #[test]
    fn every_sample_lies_in_its_bin() {
        let (x, _) = scattered_samples(500);
        let binning = Binning::new(&x, 0.04).unwrap();
        let edges = binning.edges();

        for (&val, &i_bin) in x.iter().zip(binning.bin_indices()) {
            assert!(edges[i_bin] <= val && val < edges[i_bin + 1]);
            let n_containing = edges
                .windows(2)
                .filter(|pair| pair[0] <= val && val < pair[1])
                .count();
            assert_eq!(n_containing, 1);
        }
    }

    #[test]
    fn output_ignores_sample_order() {
        let (x, values) = scattered_samples(300);
        let (centers, binned) = aggregate(&x, &values, 0.1).unwrap();

        let x_rev: Vec<_> = x.iter().rev().copied().collect();
        let values_rev: Vec<_> = values.iter().rev().copied().collect();
        let (centers_rev, binned_rev) = aggregate(&x_rev, &values_rev, 0.1).unwrap();

        assert_eq!(centers, centers_rev);
        for (a, b) in binned.iter().zip(&binned_rev) {
            assert!((a.is_nan() && b.is_nan()) || (a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn repeated_runs_are_bit_identical() {
        let (x, values) = scattered_samples(300);
        let (centers_a, binned_a) = aggregate(&x, &values, 0.1).unwrap();
        let (centers_b, binned_b) = aggregate(&x, &values, 0.1).unwrap();

        let bits = |vals: &[f64]| vals.iter().map(|val| val.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&centers_a), bits(&centers_b));
        assert_eq!(bits(&binned_a), bits(&binned_b));
    }

    #[test]
    fn origin_shifts_edges() {
        let x = [125.0, 130.0, 250.0];
        let binning = Binning::with_origin(&x, 60.0, 120.0).unwrap();

        assert_eq!(binning.edges(), &[120.0, 180.0, 240.0, 300.0]);
        assert_eq!(binning.aggregate(&x).unwrap()[0], 127.5);
        assert!(binning.aggregate(&x).unwrap()[1].is_nan());

        assert!(matches!(
            Binning::with_origin(&x, 60.0, 126.0),
            Err(InvalidParameter::Origin { .. })
        ));
    }
}
