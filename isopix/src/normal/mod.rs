//! The discrete spherical normal kernel.
//!
//! The density is `f(theta; lambda) ~ exp(-lambda * theta^2)` for the
//! great-circle angle `theta`, with `lambda` in 1/radian^2 (the spherical
//! analogue of the concentration of a von Mises-Fisher distribution:
//! larger lambda, lower diffusivity). It is discretised on a pixelation by
//! normalising over the ring populations, so that the probabilities of all
//! pixels, keyed by their ring distance from the source, sum to one.
//!
//! All per-ring values are precomputed at construction; the propagation
//! hot path is two table lookups per pixel pair.

use crate::pixel::Pixelation;


#[derive(Clone, Debug)]
pub struct Normal {
    lambda: f64,
    /// `exp(-lambda * theta_d^2)`, peak 1 at `d = 0`.
    scaled: Vec<f64>,
    /// Discrete log-probability per ring distance.
    ln_prob: Vec<f64>,
    variance: f64,
}

impl Normal {
    /// Builds the kernel for concentration `lambda` on `pix`.
    pub fn new(lambda: f64, pix: &Pixelation) -> Normal {
        assert!(lambda >= 0.0, "concentration must be non-negative, got {}", lambda);

        let step = pix.ring_step();
        let num = pix.num_rings();

        let mut scaled = Vec::with_capacity(num);
        let mut norm = 0.0;
        let mut second = 0.0;
        for (d, ring) in pix.rings().iter().enumerate() {
            let theta = d as f64 * step;
            let e = (-lambda * theta * theta).exp();
            scaled.push(e);
            norm += ring.len as f64 * e;
            second += ring.len as f64 * e * theta * theta;
        }

        let ln_norm = norm.ln();
        let ln_prob = scaled.iter().map(|e| e.ln() - ln_norm).collect();

        Normal {
            lambda,
            scaled,
            ln_prob,
            variance: second / norm,
        }
    }

    #[inline]
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Probability scaled so that the peak is 1: `f(d) / f(0)`.
    #[inline]
    pub fn scaled_ring(&self, d: usize) -> f64 {
        self.scaled[d]
    }

    /// Discrete log-probability of a pixel at ring distance `d`.
    #[inline]
    pub fn ln_prob_ring(&self, d: usize) -> f64 {
        self.ln_prob[d]
    }

    /// Scaled probability at a great-circle angle, in radians. The ring
    /// variants are the hot path; this one serves callers holding raw
    /// angles.
    #[inline]
    pub fn scaled_angle(&self, theta: f64) -> f64 {
        (-self.lambda * theta * theta).exp()
    }

    /// Log-probability at a great-circle angle, in radians.
    #[inline]
    pub fn ln_prob_angle(&self, theta: f64) -> f64 {
        -self.lambda * theta * theta + self.ln_prob[0]
    }

    /// Variance of the discretised kernel, in radian^2.
    ///
    /// `sqrt(variance)` scaled by the Earth radius is the standard
    /// deviation reported in km/Myr.
    #[inline]
    pub fn variance(&self) -> f64 {
        self.variance
    }
}
