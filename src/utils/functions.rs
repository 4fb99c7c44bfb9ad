use crate::Float;

/// The second-order Legendre polynomial, $`P_2(x) = \frac{1}{2}(3x^2 - 1)`$.
#[inline]
pub fn legendre_p2(x: Float) -> Float {
    1.5 * x * x - 0.5
}

/// The fourth-order Legendre polynomial, $`P_4(x) = \frac{1}{8}(35x^4 - 30x^2 + 3)`$.
#[inline]
pub fn legendre_p4(x: Float) -> Float {
    let x2 = x * x;
    4.375 * x2 * x2 - 3.75 * x2 + 0.375
}

/// The sixth-order Legendre polynomial, $`P_6(x) = \frac{1}{16}(231x^6 - 315x^4 + 105x^2 - 5)`$.
#[inline]
pub fn legendre_p6(x: Float) -> Float {
    let x2 = x * x;
    let x4 = x2 * x2;
    14.4375 * x4 * x2 - 19.6875 * x4 + 6.5625 * x2 - 0.3125
}

/// The even Legendre polynomials $`(P_2, P_4, P_6)`$ evaluated at once, sharing the powers of
/// `x`.
#[inline]
pub fn even_legendre(x: Float) -> [Float; 3] {
    let x2 = x * x;
    let x4 = x2 * x2;
    let x6 = x4 * x2;
    [
        1.5 * x2 - 0.5,
        4.375 * x4 - 3.75 * x2 + 0.375,
        14.4375 * x6 - 19.6875 * x4 + 6.5625 * x2 - 0.3125,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_legendre_at_one() {
        assert_relative_eq!(legendre_p2(1.0), 1.0);
        assert_relative_eq!(legendre_p4(1.0), 1.0);
        assert_relative_eq!(legendre_p6(1.0), 1.0);
        assert_relative_eq!(legendre_p2(-1.0), 1.0);
        assert_relative_eq!(legendre_p6(-1.0), 1.0);
    }

    #[test]
    fn test_legendre_at_zero() {
        assert_relative_eq!(legendre_p2(0.0), -0.5);
        assert_relative_eq!(legendre_p4(0.0), 0.375);
        assert_relative_eq!(legendre_p6(0.0), -0.3125);
    }

    #[test]
    fn test_even_legendre_matches_single() {
        for &x in &[-0.9, -0.3, 0.0, 0.25, 0.7, 1.0] {
            let [p2, p4, p6] = even_legendre(x);
            assert_relative_eq!(p2, legendre_p2(x), epsilon = 1e-12);
            assert_relative_eq!(p4, legendre_p4(x), epsilon = 1e-12);
            assert_relative_eq!(p6, legendre_p6(x), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_orthogonality_norms() {
        // Midpoint quadrature of P_l^2 over [-1, 1] approaches 2 / (2l + 1).
        let n = 200_000;
        let dx = 2.0 / n as Float;
        let (mut s2, mut s4, mut s6, mut s24) = (0.0, 0.0, 0.0, 0.0);
        for i in 0..n {
            let x = -1.0 + (i as Float + 0.5) * dx;
            let [p2, p4, p6] = even_legendre(x);
            s2 += p2 * p2 * dx;
            s4 += p4 * p4 * dx;
            s6 += p6 * p6 * dx;
            s24 += p2 * p4 * dx;
        }
        assert_relative_eq!(s2, 2.0 / 5.0, epsilon = 1e-6);
        assert_relative_eq!(s4, 2.0 / 9.0, epsilon = 1e-6);
        assert_relative_eq!(s6, 2.0 / 13.0, epsilon = 1e-6);
        assert_relative_eq!(s24, 0.0, epsilon = 1e-6);
    }
}
