//! # Pairwise covariance under missing data
//!
//! For a single feature pair the covariance is found as the maximiser of a
//! bivariate-normal profile log-likelihood in which the marginal variances are
//! held at values estimated from every observed entry, and only the jointly
//! observed rows inform the cross term.
//!
//! Setting the derivative of that profile to zero gives a cubic in the
//! covariance `r`:
//!
//! ```text
//! -m·r³ + s12·r² + (m·Sii·Sjj - s22·Sii - s11·Sjj)·r + s12·Sii·Sjj = 0
//! ```
//!
//! where `m` is the number of jointly observed rows and `s11`, `s22`, `s12`
//! are their uncentred second moments. Every root is reduced to its real part
//! and scored with the profile objective; the first best-scoring root wins.

use crate::polynomial::cubic_roots;
use ndarray::ArrayView1;

/// Uncentred second moments over the rows where both features are observed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JointMoments {
    pub count: usize,
    pub s11: f64,
    pub s22: f64,
    pub s12: f64,
}

impl JointMoments {
    pub fn accumulate(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> Self {
        debug_assert_eq!(x.len(), y.len());
        let mut moments = Self::default();

        let rows = x
            .iter()
            .zip(y.iter())
            // Rows missing in both columns carry no information for this pair.
            .filter(|(a, b)| !(a.is_nan() && b.is_nan()))
            .filter(|(a, b)| !a.is_nan() && !b.is_nan());

        for (&a, &b) in rows {
            moments.count += 1;
            moments.s11 += a * a;
            moments.s22 += b * b;
            moments.s12 += a * b;
        }
        moments
    }

    /// Coefficients of the score cubic, highest degree first.
    pub fn score_polynomial(&self, s_ii: f64, s_jj: f64) -> [f64; 4] {
        let m = self.count as f64;
        [
            -m,
            self.s12,
            m * s_ii * s_jj - self.s22 * s_ii - self.s11 * s_jj,
            self.s12 * s_ii * s_jj,
        ]
    }
}

/// Profile log-likelihood of candidate covariance `r`, up to additive constants.
///
/// Candidates with a non-positive conditional residual variance
/// `Sjj - r²/Sii` are infeasible and score `-inf`, as does anything that would
/// divide by a non-positive `Sii` or evaluate to NaN.
pub fn profile_objective(r: f64, moments: &JointMoments, s_ii: f64, s_jj: f64) -> f64 {
    if !(s_ii > 0.0) {
        return f64::NEG_INFINITY;
    }
    let conditional = s_jj - r * r / s_ii;
    if !(conditional > 0.0) {
        return f64::NEG_INFINITY;
    }

    let m = moments.count as f64;
    let residual = s_jj - 2.0 * r / s_ii * moments.s12 + r * r / (s_ii * s_ii) * moments.s11;
    let value = -m * conditional.ln() - residual / conditional;
    if value.is_nan() {
        f64::NEG_INFINITY
    } else {
        value
    }
}

/// Estimated covariance of `x` and `y` given their marginal variances.
///
/// Returns NaN when either variance is undefined or when the score polynomial
/// has no roots (no jointly observed rows). When every root is infeasible the
/// first root is returned.
pub fn pairwise_covariance(
    x: ArrayView1<'_, f64>,
    y: ArrayView1<'_, f64>,
    s_ii: f64,
    s_jj: f64,
) -> f64 {
    if !s_ii.is_finite() || !s_jj.is_finite() {
        return f64::NAN;
    }

    let moments = JointMoments::accumulate(x, y);
    let candidates = cubic_roots(moments.score_polynomial(s_ii, s_jj));

    let mut best: Option<(f64, f64)> = None;
    for candidate in candidates.iter().map(|root| root.re) {
        let score = profile_objective(candidate, &moments, s_ii, s_jj);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((candidate, score)),
        }
    }

    match best {
        Some((candidate, _)) => candidate,
        None => f64::NAN,
    }
}
