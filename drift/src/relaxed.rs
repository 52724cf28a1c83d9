//! Rate mixtures for the relaxed walk.
//!
//! A continuous rate distribution is discretised into `n` categories of
//! equal probability, each represented by the quantile at the centre of
//! its probability band. The set of distributions is closed: Gamma with
//! equal shape and rate (mean 1) or LogNormal with location 0 (median 1).

use statrs::distribution::{ContinuousCDF, Gamma, LogNormal};

use crate::error::DriftError;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Relaxed {
    /// Gamma(alpha, alpha).
    Gamma { alpha: f64 },
    /// LogNormal(0, sigma).
    LogNormal { sigma: f64 },
}

impl Relaxed {
    /// Parses the `relaxed` option of a walk parameter file.
    pub fn from_option(name: &str, param: f64) -> Result<Relaxed, DriftError> {
        match name.to_lowercase().as_str() {
            "gamma" => {
                if param <= 0.0 {
                    return Err(DriftError::Config(format!(
                        "gamma mixture needs a positive shape, got {}",
                        param
                    )));
                }
                Ok(Relaxed::Gamma { alpha: param })
            }
            "lognormal" => {
                if param <= 0.0 {
                    return Err(DriftError::Config(format!(
                        "lognormal mixture needs a positive sigma, got {}",
                        param
                    )));
                }
                Ok(Relaxed::LogNormal { sigma: param })
            }
            other => Err(DriftError::Config(format!(
                "unknown rate distribution {:?}",
                other
            ))),
        }
    }

    /// The `n` equal-probability quantile centres, in ascending order.
    pub fn quantiles(&self, n: usize) -> Vec<f64> {
        assert!(n >= 1, "a mixture needs at least one category");
        (0..n)
            .map(|i| {
                let p = (i as f64 + 0.5) / n as f64;
                self.quantile(p)
            })
            .collect()
    }

    fn quantile(&self, p: f64) -> f64 {
        match self {
            Relaxed::Gamma { alpha } => Gamma::new(*alpha, *alpha)
                .expect("shape checked at construction")
                .inverse_cdf(p),
            Relaxed::LogNormal { sigma } => LogNormal::new(0.0, *sigma)
                .expect("sigma checked at construction")
                .inverse_cdf(p),
        }
    }
}
