//! NaN-aware summary statistics and series cleanup.
//!
//! Non-finite values (NaN, +inf, -inf) are treated as missing throughout.

pub fn nan_mean(vals: &[f64]) -> f64 {
    let (sum, n_vals) = vals
        .iter()
        .filter(|val| val.is_finite())
        .fold((0.0, 0_usize), |(sum, n_vals), &val| (sum + val, n_vals + 1));
    if n_vals == 0 {
        return f64::NAN;
    }
    sum / n_vals as f64
}

pub fn nan_median(vals: &[f64]) -> f64 {
    let mut finite_vals: Vec<_> = vals.iter().copied().filter(|val| val.is_finite()).collect();
    let n_vals = finite_vals.len();
    if n_vals == 0 {
        return f64::NAN;
    }
    finite_vals.sort_by(f64::total_cmp);
    if n_vals % 2 == 0 {
        (finite_vals[n_vals / 2 - 1] + finite_vals[n_vals / 2]) / 2.0
    } else {
        finite_vals[n_vals / 2]
    }
}

/// Relative deviation of each value from the mean: `(val - mean) / mean`.
///
/// Missing values stay NaN at their own index and do not enter the mean.
pub fn relative_deviation(vals: &[f64]) -> Vec<f64> {
    let mean = nan_mean(vals);
    vals.iter().map(|&val| (val - mean) / mean).collect()
}

/// Replace missing values by linear interpolation between the neighbouring
/// finite values, by position.
///
/// Missing values before the first or after the last finite value become 0.
pub fn fill_non_finite(vals: &[f64]) -> Vec<f64> {
    let mut filled = vals.to_vec();
    let finite_idxs: Vec<_> = (0..vals.len()).filter(|&idx| vals[idx].is_finite()).collect();

    for (idx, val) in filled.iter_mut().enumerate() {
        if val.is_finite() {
            continue;
        }
        let next = finite_idxs.partition_point(|&i_fin| i_fin < idx);
        *val = if next == 0 || next == finite_idxs.len() {
            0.0
        } else {
            let (i_lo, i_hi) = (finite_idxs[next - 1], finite_idxs[next]);
            let (v_lo, v_hi) = (vals[i_lo], vals[i_hi]);
            v_lo + (v_hi - v_lo) * (idx - i_lo) as f64 / (i_hi - i_lo) as f64
        };
    }

    filled
}

/// Element-wise quotient `num / den`; division by zero gives a non-finite value.
pub fn ratio(num: &[f64], den: &[f64]) -> Vec<f64> {
    num.iter().zip(den).map(|(n, d)| n / d).collect()
}
