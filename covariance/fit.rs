//! # Covariance assembly
//!
//! Drives the two estimation stages over a dataset and assembles the
//! symmetric result:
//!
//! 1. every marginal variance is computed once and written to the diagonal;
//! 2. every pair `i < j` is solved independently and written to `(i, j)`;
//! 3. the matrix is added to its transpose, which mirrors the upper triangle
//!    and doubles the diagonal, and the diagonal is then halved.
//!
//! Missing entries are NaN. Features with an undefined or zero variance
//! produce NaN in every off-diagonal cell they touch.

use crate::pairwise::pairwise_covariance;
use crate::progress::{FitProgressObserver, FitProgressStage, NoopFitProgress};
use crate::types::FitOptions;
use crate::variance::marginal_variances;
use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView2, ArrayViewD, Axis, CowArray, Ix2};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Pairs solved between two progress notifications.
const PROGRESS_REPORT_INTERVAL: usize = 64;

#[derive(Error, Debug)]
pub enum CovarianceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Estimates the covariance matrix of `data` with default options.
pub fn fit(data: ArrayView2<'_, f64>) -> Result<Array2<f64>, CovarianceError> {
    fit_with_options(data, &FitOptions::default())
}

/// Entry point for arrays of unchecked dimensionality.
pub fn fit_dyn(
    data: ArrayViewD<'_, f64>,
    options: &FitOptions,
) -> Result<Array2<f64>, CovarianceError> {
    let ndim = data.ndim();
    let data = data.into_dimensionality::<Ix2>().map_err(|_| {
        CovarianceError::InvalidInput(format!(
            "expected a two-dimensional table, found {ndim} dimension(s)"
        ))
    })?;
    fit_with_options(data, options)
}

pub fn fit_with_options(
    data: ArrayView2<'_, f64>,
    options: &FitOptions,
) -> Result<Array2<f64>, CovarianceError> {
    fit_with_progress(data, options, &NoopFitProgress)
}

pub fn fit_with_progress<P>(
    data: ArrayView2<'_, f64>,
    options: &FitOptions,
    progress: &P,
) -> Result<Array2<f64>, CovarianceError>
where
    P: FitProgressObserver + ?Sized,
{
    validate(data)?;
    let (n_rows, n_features) = data.dim();

    let prepared: CowArray<'_, f64, Ix2> = if options.center {
        CowArray::from(center_columns(data))
    } else {
        CowArray::from(data)
    };
    let view = prepared.view();

    log::info!(
        "Estimating covariance for {n_rows} rows and {n_features} features ({:?} variance, centering {})",
        options.variance,
        if options.center { "on" } else { "off" }
    );

    progress.on_stage_start(FitProgressStage::MarginalVariances, n_features);
    let variances = marginal_variances(view, options.variance, options.parallel);
    progress.on_stage_advance(FitProgressStage::MarginalVariances, n_features);
    progress.on_stage_finish(FitProgressStage::MarginalVariances);

    let undefined_features = variances.iter().filter(|v| v.is_nan()).count();
    if undefined_features > 0 {
        log::warn!("{undefined_features} feature(s) have no usable observations");
    }

    let pairs: Vec<(usize, usize)> = (0..n_features).tuple_combinations().collect();
    let values = solve_pairs(view, &variances, &pairs, options.parallel, progress);

    let mut upper = Array2::<f64>::zeros((n_features, n_features));
    upper.diag_mut().assign(&variances);
    for (&(i, j), &value) in pairs.iter().zip(values.iter()) {
        upper[[i, j]] = value;
    }

    let mut covariance = &upper + &upper.t();
    covariance.diag_mut().mapv_inplace(|doubled| doubled * 0.5);

    let undefined_pairs = values.iter().filter(|v| v.is_nan()).count();
    if undefined_pairs > 0 {
        log::warn!(
            "{undefined_pairs} of {} feature pair(s) have an undefined covariance",
            pairs.len()
        );
    }

    Ok(covariance)
}

fn validate(data: ArrayView2<'_, f64>) -> Result<(), CovarianceError> {
    if data.ncols() == 0 {
        return Err(CovarianceError::InvalidInput(
            "the table must contain at least one feature".to_string(),
        ));
    }
    if let Some(((row, col), value)) = data.indexed_iter().find(|(_, v)| v.is_infinite()) {
        return Err(CovarianceError::InvalidInput(format!(
            "non-finite value {value} at row {row}, column {col}"
        )));
    }
    Ok(())
}

/// Copy of `data` with each column's observed mean subtracted.
fn center_columns(data: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut centered = data.to_owned();
    for mut column in centered.axis_iter_mut(Axis(1)) {
        let (count, sum) = column
            .iter()
            .filter(|v| !v.is_nan())
            .fold((0usize, 0.0f64), |(count, sum), &v| (count + 1, sum + v));
        if count > 0 {
            let mean = sum / count as f64;
            column.mapv_inplace(|v| v - mean);
        }
    }
    centered
}

fn solve_pairs<P>(
    view: ArrayView2<'_, f64>,
    variances: &Array1<f64>,
    pairs: &[(usize, usize)],
    parallel: bool,
    progress: &P,
) -> Vec<f64>
where
    P: FitProgressObserver + ?Sized,
{
    let stage = FitProgressStage::PairwiseCovariances;
    let total = pairs.len();
    let processed = AtomicUsize::new(0);
    progress.on_stage_start(stage, total);

    let solve = |&(i, j): &(usize, usize)| -> f64 {
        let (s_ii, s_jj) = (variances[i], variances[j]);
        let value = if s_ii != 0.0 && s_jj != 0.0 {
            pairwise_covariance(view.column(i), view.column(j), s_ii, s_jj)
        } else {
            f64::NAN
        };
        if value.is_nan() && s_ii.is_finite() && s_jj.is_finite() {
            log::debug!("Covariance of features {i} and {j} is undefined");
        }

        let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
        if done % PROGRESS_REPORT_INTERVAL == 0 || done == total {
            progress.on_stage_advance(stage, done);
        }
        value
    };

    let values: Vec<f64> = if parallel {
        pairs.par_iter().map(solve).collect()
    } else {
        pairs.iter().map(solve).collect()
    };

    progress.on_stage_finish(stage);
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VarianceConvention;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array3, array};
    use std::sync::Mutex;

    fn centred_complete() -> Array2<f64> {
        array![
            [1.0, 2.0, -0.5],
            [-1.0, -1.0, 1.5],
            [2.0, 1.0, -1.0],
            [-2.0, -2.0, 0.5],
            [0.5, 1.0, 0.0],
            [-0.5, -1.0, -0.5],
        ]
    }

    fn population_covariance(data: &Array2<f64>) -> Array2<f64> {
        let n = data.nrows() as f64;
        let mean = data.mean_axis(Axis(0)).unwrap();
        let centered = data - &mean;
        centered.t().dot(&centered) / n
    }

    fn assert_symmetric(matrix: &Array2<f64>) {
        for i in 0..matrix.nrows() {
            for j in 0..matrix.ncols() {
                let (a, b) = (matrix[[i, j]], matrix[[j, i]]);
                assert!(a.to_bits() == b.to_bits(), "({i}, {j}): {a} vs {b}");
            }
        }
    }

    #[test]
    fn complete_centred_data_matches_the_classical_estimator() {
        let data = centred_complete();
        let expected = population_covariance(&data);
        let estimate = fit(data.view()).unwrap();
        assert_symmetric(&estimate);
        for ((i, j), value) in estimate.indexed_iter() {
            assert_abs_diff_eq!(*value, expected[[i, j]], epsilon = 1e-9);
        }
    }

    #[test]
    fn centring_option_handles_shifted_data() {
        let data = centred_complete();
        let shifted = &data + &array![10.0, -4.0, 250.0];
        let options = FitOptions {
            center: true,
            ..FitOptions::default()
        };
        let expected = population_covariance(&data);
        let estimate = fit_with_options(shifted.view(), &options).unwrap();
        for ((i, j), value) in estimate.indexed_iter() {
            assert_abs_diff_eq!(*value, expected[[i, j]], epsilon = 1e-8);
        }
    }

    #[test]
    fn diagonal_follows_the_variance_convention() {
        let data = centred_complete();
        let options = FitOptions {
            variance: VarianceConvention::Unbiased,
            ..FitOptions::default()
        };
        let estimate = fit_with_options(data.view(), &options).unwrap();
        let n = data.nrows() as f64;
        let expected = population_covariance(&data);
        for i in 0..data.ncols() {
            assert_abs_diff_eq!(
                estimate[[i, i]],
                expected[[i, i]] * n / (n - 1.0),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn all_missing_feature_poisons_its_row_and_column() {
        let mut data = centred_complete();
        data.column_mut(1).fill(f64::NAN);
        let estimate = fit(data.view()).unwrap();
        for k in 0..3 {
            assert!(estimate[[1, k]].is_nan());
            assert!(estimate[[k, 1]].is_nan());
        }
        assert!(estimate[[0, 2]].is_finite());
        assert!(estimate[[0, 0]].is_finite());
        assert!(estimate[[2, 2]].is_finite());
    }

    #[test]
    fn constant_feature_has_zero_variance_and_undefined_covariances() {
        let mut data = centred_complete();
        data.column_mut(2).fill(3.0);
        let estimate = fit(data.view()).unwrap();
        assert_eq!(estimate[[2, 2]], 0.0);
        assert!(estimate[[0, 2]].is_nan());
        assert!(estimate[[2, 1]].is_nan());
        assert!(estimate[[0, 1]].is_finite());
    }

    #[test]
    fn disjoint_observation_patterns_yield_a_sentinel() {
        let nan = f64::NAN;
        let data = array![
            [1.0, nan],
            [-1.0, nan],
            [0.5, nan],
            [nan, 2.0],
            [nan, -2.0],
            [nan, 1.0],
        ];
        let estimate = fit(data.view()).unwrap();
        assert!(estimate[[0, 1]].is_nan());
        assert!(estimate[[1, 0]].is_nan());
        assert!(estimate[[0, 0]].is_finite());
        assert!(estimate[[1, 1]].is_finite());
    }

    #[test]
    fn repeated_and_parallel_fits_are_bit_identical() {
        let nan = f64::NAN;
        let data = array![
            [0.3, nan, -1.2, 0.8],
            [1.7, 0.4, nan, -0.2],
            [-0.9, 2.2, 0.8, nan],
            [nan, -1.1, 0.5, 1.4],
            [-1.1, -1.5, nan, -0.9],
            [0.6, 0.2, -0.4, nan],
            [nan, nan, nan, nan],
        ];
        let sequential = FitOptions {
            parallel: false,
            ..FitOptions::default()
        };
        let first = fit(data.view()).unwrap();
        let second = fit(data.view()).unwrap();
        let third = fit_with_options(data.view(), &sequential).unwrap();
        for ((a, b), c) in first.iter().zip(second.iter()).zip(third.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
            assert_eq!(a.to_bits(), c.to_bits());
        }
        assert_symmetric(&first);
    }

    #[test]
    fn single_feature_returns_its_variance() {
        let data = array![[1.0], [3.0], [f64::NAN], [5.0]];
        let estimate = fit(data.view()).unwrap();
        assert_eq!(estimate.dim(), (1, 1));
        assert_abs_diff_eq!(estimate[[0, 0]], 8.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_table_yields_undefined_entries() {
        let data = Array2::<f64>::zeros((0, 2));
        let estimate = fit(data.view()).unwrap();
        assert!(estimate.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rejects_malformed_input() {
        let no_features = Array2::<f64>::zeros((4, 0));
        assert!(matches!(
            fit(no_features.view()),
            Err(CovarianceError::InvalidInput(_))
        ));

        let infinite = array![[1.0, 2.0], [f64::INFINITY, 0.0]];
        assert!(matches!(
            fit(infinite.view()),
            Err(CovarianceError::InvalidInput(_))
        ));

        let cube = Array3::<f64>::zeros((2, 2, 2));
        assert!(matches!(
            fit_dyn(cube.view().into_dyn(), &FitOptions::default()),
            Err(CovarianceError::InvalidInput(_))
        ));

        let table = centred_complete();
        assert!(fit_dyn(table.view().into_dyn(), &FitOptions::default()).is_ok());
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<(FitProgressStage, &'static str, usize)>>,
    }

    impl FitProgressObserver for RecordingProgress {
        fn on_stage_start(&self, stage: FitProgressStage, total: usize) {
            self.events.lock().unwrap().push((stage, "start", total));
        }
        fn on_stage_advance(&self, stage: FitProgressStage, processed: usize) {
            self.events.lock().unwrap().push((stage, "advance", processed));
        }
        fn on_stage_finish(&self, stage: FitProgressStage) {
            self.events.lock().unwrap().push((stage, "finish", 0));
        }
    }

    #[test]
    fn progress_observer_sees_every_stage() {
        let data = centred_complete();
        let progress = RecordingProgress::default();
        let options = FitOptions {
            parallel: false,
            ..FitOptions::default()
        };
        fit_with_progress(data.view(), &options, &progress).unwrap();

        let events = progress.events.into_inner().unwrap();
        use FitProgressStage::{MarginalVariances, PairwiseCovariances};
        assert_eq!(
            events,
            vec![
                (MarginalVariances, "start", 3),
                (MarginalVariances, "advance", 3),
                (MarginalVariances, "finish", 0),
                (PairwiseCovariances, "start", 3),
                (PairwiseCovariances, "advance", 3),
                (PairwiseCovariances, "finish", 0),
            ]
        );
    }
}
