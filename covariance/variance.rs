use crate::types::VarianceConvention;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;

/// Variance of the non-missing entries of `column`.
///
/// Missing entries are NaN and are skipped. Returns NaN when fewer than
/// `ddof + 1` entries are observed, which marks the feature as undefined for
/// every downstream covariance.
pub fn marginal_variance(column: ArrayView1<'_, f64>, convention: VarianceConvention) -> f64 {
    let mut count = 0usize;
    let mut sum = 0.0f64;
    for &value in column.iter().filter(|value| !value.is_nan()) {
        count += 1;
        sum += value;
    }

    let ddof = convention.ddof();
    if count <= ddof {
        return f64::NAN;
    }

    let mean = sum / count as f64;
    let squared_deviations: f64 = column
        .iter()
        .filter(|value| !value.is_nan())
        .map(|&value| {
            let centered = value - mean;
            centered * centered
        })
        .sum();

    squared_deviations / (count - ddof) as f64
}

/// Marginal variance of every column of `data`.
pub fn marginal_variances(
    data: ArrayView2<'_, f64>,
    convention: VarianceConvention,
    parallel: bool,
) -> Array1<f64> {
    let n_features = data.ncols();
    if parallel {
        let values: Vec<f64> = (0..n_features)
            .into_par_iter()
            .map(|feature| marginal_variance(data.column(feature), convention))
            .collect();
        Array1::from_vec(values)
    } else {
        Array1::from_shape_fn(n_features, |feature| {
            marginal_variance(data.column(feature), convention)
        })
    }
}
