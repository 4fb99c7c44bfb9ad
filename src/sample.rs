use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    basis::{density_bound, is_feasible, legendre_sq, N_COEFFICIENTS},
    AngfitError, AngfitResult, Float,
};

/// An endless, reproducible stream of angular values distributed according to
/// [`legendre_sq`] on $`[-r, r]`$.
///
/// Values are drawn by accept-reject against the constant envelope returned by
/// [`density_bound`], so the acceptance rate drops as the coefficients grow.
///
/// ```
/// use angfit::sample::LegendreSampler;
///
/// let values: Vec<f64> = LegendreSampler::new(&[0.3, 0.0, 0.0, 0.0], 1.0, 42)
///     .unwrap()
///     .take(100)
///     .collect();
/// assert!(values.iter().all(|x| x.abs() <= 1.0));
/// ```
#[derive(Clone, Debug)]
pub struct LegendreSampler {
    coefficients: [Float; N_COEFFICIENTS],
    range: Float,
    bound: Float,
    rng: ChaCha8Rng,
}

impl LegendreSampler {
    /// Construct a sampler for the coefficients `[c2, c4, c6, phi2]` over `[-range, range]`.
    ///
    /// Missing trailing coefficients are taken to be zero.
    ///
    /// # Errors
    ///
    /// Fails with [`AngfitError::Unnormalizable`] if the coefficients do not admit a real
    /// $`c_0`$ (or there are more than four of them), and with
    /// [`AngfitError::InvalidFitRange`] unless `0 < range <= 1`.
    pub fn new(coefficients: &[Float], range: Float, seed: u64) -> AngfitResult<Self> {
        if coefficients.len() > N_COEFFICIENTS
            || !is_feasible(coefficients)
            || coefficients.iter().any(|c| !c.is_finite())
        {
            return Err(AngfitError::Unnormalizable {
                coefficients: coefficients.to_vec(),
            });
        }
        if !(range > 0.0 && range <= 1.0) {
            return Err(AngfitError::InvalidFitRange { range });
        }
        let mut padded = [0.0; N_COEFFICIENTS];
        padded[..coefficients.len()].copy_from_slice(coefficients);
        Ok(Self {
            coefficients: padded,
            range,
            bound: density_bound(&padded),
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// The coefficients being sampled.
    pub fn coefficients(&self) -> &[Float] {
        &self.coefficients
    }

    /// The half-width of the sampled interval.
    pub fn range(&self) -> Float {
        self.range
    }
}

impl Iterator for LegendreSampler {
    type Item = Float;

    fn next(&mut self) -> Option<Float> {
        loop {
            let x = self.rng.gen_range(-self.range..=self.range);
            let u = self.rng.gen::<Float>() * self.bound;
            if u < legendre_sq(x, &self.coefficients) {
                return Some(x);
            }
        }
    }
}
