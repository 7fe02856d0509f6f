//! Closed-form roots of polynomials up to degree three.
//!
//! Coefficients are given highest degree first. Exact leading zeros lower the
//! degree and exact trailing zeros contribute roots at the origin, which are
//! appended after the non-zero roots. Every root is returned in complex form;
//! callers decide what to do with the imaginary parts.

use num_complex::Complex64;

const NEWTON_POLISH_STEPS: usize = 4;

/// All roots of `c[0]·z³ + c[1]·z² + c[2]·z + c[3]`.
///
/// Returns an empty vector for the zero polynomial, for non-zero constants and
/// when any coefficient is non-finite. The non-zero roots of a true cubic come
/// in Cardano branch order `k = 0, 1, 2`.
///
/// This order is not the one a companion-matrix eigenvalue solver produces, and
/// callers that keep the first of several equally good roots inherit it: for
/// `(z - 1)(z - 2)(z - 3)` the roots arrive as `1, 3, 2`.
pub fn cubic_roots(coefficients: [f64; 4]) -> Vec<Complex64> {
    if coefficients.iter().any(|c| !c.is_finite()) {
        return Vec::new();
    }
    let Some(first) = coefficients.iter().position(|&c| c != 0.0) else {
        return Vec::new();
    };
    let last = match coefficients.iter().rposition(|&c| c != 0.0) {
        Some(last) => last,
        None => first,
    };
    let trimmed = &coefficients[first..=last];
    let zero_roots = coefficients.len() - 1 - last;

    let mut roots = match *trimmed {
        [_] => Vec::new(),
        [a, b] => vec![Complex64::new(-b / a, 0.0)],
        [a, b, c] => quadratic_roots(a, b, c).to_vec(),
        [a, b, c, d] => cardano_roots(a, b, c, d).to_vec(),
        _ => unreachable!("a four-coefficient slice trims to at most four entries"),
    };

    for root in roots.iter_mut() {
        *root = polish(trimmed, *root);
    }
    roots.extend(std::iter::repeat_n(Complex64::new(0.0, 0.0), zero_roots));
    roots
}

fn quadratic_roots(a: f64, b: f64, c: f64) -> [Complex64; 2] {
    let discriminant = Complex64::new(b * b - 4.0 * a * c, 0.0).sqrt();
    let denominator = 2.0 * a;
    [
        (discriminant - b) / denominator,
        (-discriminant - b) / denominator,
    ]
}

fn cardano_roots(a: f64, b: f64, c: f64, d: f64) -> [Complex64; 3] {
    // Normalise to a monic cubic before forming the invariants.
    let b = b / a;
    let c = c / a;
    let d = d / a;

    let delta0 = b * b - 3.0 * c;
    let delta1 = 2.0 * b * b * b - 9.0 * b * c + 27.0 * d;
    let radical = Complex64::new(delta1 * delta1 - 4.0 * delta0 * delta0 * delta0, 0.0).sqrt();

    let plus = ((radical + delta1) * 0.5).cbrt();
    let minus = ((-radical + delta1) * 0.5).cbrt();
    let big_c = if plus.norm() >= minus.norm() {
        plus
    } else {
        minus
    };

    if big_c.norm() == 0.0 {
        let triple = Complex64::new(-b / 3.0, 0.0);
        return [triple; 3];
    }

    let xi = Complex64::new(-0.5, 3.0f64.sqrt() * 0.5);
    let mut rotation = Complex64::new(1.0, 0.0);
    let mut roots = [Complex64::new(0.0, 0.0); 3];
    for root in roots.iter_mut() {
        let branch = big_c * rotation;
        *root = -(branch + delta0 / branch + b) / 3.0;
        rotation *= xi;
    }
    roots
}

/// Value and first derivative at `z` by Horner's scheme.
fn evaluate(coefficients: &[f64], z: Complex64) -> (Complex64, Complex64) {
    let mut value = Complex64::new(0.0, 0.0);
    let mut derivative = Complex64::new(0.0, 0.0);
    for &coefficient in coefficients {
        derivative = derivative * z + value;
        value = value * z + coefficient;
    }
    (value, derivative)
}

/// A few Newton steps, accepted only while the residual shrinks.
fn polish(coefficients: &[f64], root: Complex64) -> Complex64 {
    let mut current = root;
    let (mut residual, mut derivative) = evaluate(coefficients, current);
    for _ in 0..NEWTON_POLISH_STEPS {
        if residual.norm() == 0.0 || derivative.norm() == 0.0 {
            break;
        }
        let candidate = current - residual / derivative;
        let (candidate_residual, candidate_derivative) = evaluate(coefficients, candidate);
        if !(candidate_residual.norm() < residual.norm()) {
            break;
        }
        current = candidate;
        residual = candidate_residual;
        derivative = candidate_derivative;
    }
    current
}
