//! The angular density: the squared modulus of a truncated even-order Legendre expansion,
//! ```math
//! f(x; \vec{c}) = \left| c_0 + c_2 e^{\imath\varphi_2} P_2(x) + c_4 P_4(x) + c_6 P_6(x) \right|^2,
//! \qquad c_0 = \sqrt{1 - \tfrac{1}{5}c_2^2 - \tfrac{1}{9}c_4^2 - \tfrac{1}{13}c_6^2}.
//! ```
//! With this choice of $`c_0`$, $`\int_{-1}^{1} f\,dx = 2`$ for every feasible coefficient vector
//! (and every phase), so $`f`$ is a probability density in $`|\cos\theta| \in [0, 1]`$.
use num::complex::Complex;

use crate::{utils::functions::even_legendre, Float, PI};

/// The number of coefficients of the expansion: $`(c_2, c_4, c_6, \varphi_2)`$.
pub const N_COEFFICIENTS: usize = 4;

/// The names of the coefficients, in order.
pub const COEFFICIENT_NAMES: [&str; N_COEFFICIENTS] = ["c2", "c4", "c6", "phi2"];

/// The index of the phase $`\varphi_2`$ in a coefficient vector.
pub const PHASE_INDEX: usize = 3;

/// The value of $`c_0^2`$ when every other coefficient vanishes.
pub const NORM: Float = 1.0;

/// The weights $`\int_{-1}^{1} P_\ell^2\,dx / 2 = 1/(2\ell+1)`$ for $`\ell = 2, 4, 6`$.
pub const WEIGHTS: [Float; 3] = [1.0 / 5.0, 1.0 / 9.0, 1.0 / 13.0];

/// The normalizing constant term $`c_0`$ for the coefficients $`(c_2, c_4, c_6, \ldots)`$.
///
/// Returns `NaN` if the coefficients are too large to be normalized (negative radicand).
#[inline]
pub fn isotropic_c0(coefficients: &[Float]) -> Float {
    let radicand = NORM
        - coefficients
            .iter()
            .zip(WEIGHTS)
            .map(|(c, w)| w * c * c)
            .sum::<Float>();
    if radicand < 0.0 {
        Float::NAN
    } else {
        radicand.sqrt()
    }
}

/// Whether the coefficients admit a real $`c_0`$.
pub fn is_feasible(coefficients: &[Float]) -> bool {
    !isotropic_c0(coefficients).is_nan()
}

/// Evaluate the angular density at `x` for the coefficients `[c2, c4, c6, phi2]`.
///
/// This never panics: infeasible coefficients (or a short coefficient slice) produce `NaN`,
/// which the fit layer treats as a rejected point.
#[inline]
pub fn legendre_sq(x: Float, coefficients: &[Float]) -> Float {
    if coefficients.len() < N_COEFFICIENTS {
        return Float::NAN;
    }
    let c0 = isotropic_c0(&coefficients[..3]);
    let [p2, p4, p6] = even_legendre(x);
    let phase = Complex::cis(coefficients[PHASE_INDEX]);
    let amplitude =
        phase * (coefficients[0] * p2) + (c0 + coefficients[1] * p4 + coefficients[2] * p6);
    amplitude.norm_sqr()
}

/// Reduce a phase into the canonical interval $`(-\pi, \pi]`$.
///
/// Non-finite phases are returned unchanged.
pub fn canonical_phase(phi: Float) -> Float {
    if !phi.is_finite() {
        return phi;
    }
    let reduced = (phi + PI).rem_euclid(2.0 * PI) - PI;
    if reduced <= -PI {
        reduced + 2.0 * PI
    } else {
        reduced
    }
}

/// An upper bound of [`legendre_sq`] over $`[-1, 1]`$, $`(|c_0| + |c_2| + |c_4| + |c_6|)^2`$
/// (using $`|P_\ell(x)| \le 1`$).
pub fn density_bound(coefficients: &[Float]) -> Float {
    let c0 = isotropic_c0(&coefficients[..coefficients.len().min(3)]);
    let sum = c0.abs()
        + coefficients
            .iter()
            .take(3)
            .map(|c| c.abs())
            .sum::<Float>();
    sum * sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn integrate(coefficients: &[Float]) -> Float {
        // composite Simpson's rule over [-1, 1]
        let n = 2000;
        let h = 2.0 / n as Float;
        let mut sum = legendre_sq(-1.0, coefficients) + legendre_sq(1.0, coefficients);
        for i in 1..n {
            let x = -1.0 + i as Float * h;
            let factor = if i % 2 == 1 { 4.0 } else { 2.0 };
            sum += factor * legendre_sq(x, coefficients);
        }
        sum * h / 3.0
    }

    #[test]
    fn test_zero_coefficients_are_constant() {
        let c = [0.0, 0.0, 0.0, 0.0];
        for i in 0..=20 {
            let x = -1.0 + 0.1 * i as Float;
            assert_relative_eq!(legendre_sq(x, &c), 1.0);
        }
        let c = [0.0, 0.0, 0.0, 1.3];
        assert_relative_eq!(legendre_sq(0.4, &c), 1.0);
    }

    #[test]
    fn test_normalization() {
        assert_relative_eq!(integrate(&[0.0, 0.0, 0.0, 0.0]), 2.0, epsilon = 1e-10);
        assert_relative_eq!(integrate(&[0.5, -0.3, 0.2, 0.0]), 2.0, epsilon = 1e-8);
        assert_relative_eq!(integrate(&[1.0, 0.8, -0.6, 2.1]), 2.0, epsilon = 1e-8);
        assert_relative_eq!(integrate(&[-1.2, 0.0, 0.9, -PI]), 2.0, epsilon = 1e-8);
    }

    #[test]
    fn test_phase_enters_quadrupole_only() {
        let x: Float = 0.3;
        let [p2, p4, _] = even_legendre(x);
        let c = [0.6, 0.4, 0.0, PI / 2.0];
        let c0 = isotropic_c0(&c[..3]);
        // c2 P2 is purely imaginary for phi2 = pi/2
        let expected = (c0 + 0.4 * p4).powi(2) + (0.6 * p2).powi(2);
        assert_relative_eq!(legendre_sq(x, &c), expected, epsilon = 1e-12);
        let flipped = [0.6, 0.4, 0.0, -PI / 2.0];
        assert_relative_eq!(legendre_sq(x, &flipped), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_infeasible_gives_nan() {
        assert!(isotropic_c0(&[3.0, 0.0, 0.0]).is_nan());
        assert!(legendre_sq(0.5, &[3.0, 0.0, 0.0, 0.0]).is_nan());
        assert!(!is_feasible(&[0.0, 3.1, 0.0]));
        assert!(is_feasible(&[1.0, 1.0, 1.0]));
        assert!(legendre_sq(0.5, &[0.0, 0.0]).is_nan());
    }

    #[test]
    fn test_canonical_phase() {
        assert_relative_eq!(canonical_phase(0.5), 0.5);
        assert_relative_eq!(canonical_phase(PI), PI);
        assert_relative_eq!(canonical_phase(-PI), PI);
        assert_relative_eq!(canonical_phase(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(canonical_phase(-5.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(canonical_phase(7.0), 7.0 - 2.0 * PI, epsilon = 1e-12);
        assert!(canonical_phase(Float::NAN).is_nan());
    }

    #[test]
    fn test_density_bound() {
        let c = [0.7, -0.5, 0.3, 1.0];
        let bound = density_bound(&c);
        for i in 0..=200 {
            let x = -1.0 + 0.01 * i as Float;
            assert!(legendre_sq(x, &c) <= bound + 1e-12);
        }
        assert_relative_eq!(density_bound(&[0.0, 0.0, 0.0, 0.0]), 1.0);
    }
}
