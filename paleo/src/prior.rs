//! Pixel priors keyed by landscape class.
//!
//! The prior weights destination pixels in the diffusion model and doubles
//! as the settlement weight of the basic walk. Classes without an entry
//! have weight 0, which excludes the pixel outright; the log table keeps
//! `-inf` for those so that exclusion survives any log-space sum.

use std::io::BufRead;

use isopix::PixMap;
use vob::Vob;

use crate::tsv::{ReadError, TsvReader};

#[derive(Clone, Debug, Default)]
pub struct PixPrior {
    weight: Vec<f64>,
    ln: Vec<f64>,
}

impl PixPrior {
    pub fn new() -> PixPrior {
        PixPrior::default()
    }

    /// Reads a prior file: columns `class` and `prior` (or `weight`).
    pub fn read<R: BufRead>(r: &mut TsvReader<R>) -> Result<PixPrior, ReadError> {
        let mut prior = PixPrior::new();
        while r.next_row()? {
            let class: u8 = r.parse("class")?;
            let w: f64 = match r.parse("prior") {
                Ok(w) => w,
                Err(ReadError::Header { .. }) => r.parse("weight")?,
                Err(e) => return Err(e),
            };
            if w < 0.0 || !w.is_finite() {
                return Err(ReadError::Field {
                    file: r.file().to_string(),
                    row: r.row(),
                    field: "prior",
                    msg: format!("weight must be finite and non-negative, got {}", w),
                });
            }
            prior.set(class, w);
        }
        Ok(prior)
    }

    pub fn set(&mut self, class: u8, weight: f64) {
        let at = class as usize;
        if at >= self.weight.len() {
            self.weight.resize(at + 1, 0.0);
            self.ln.resize(at + 1, f64::NEG_INFINITY);
        }
        self.weight[at] = weight;
        self.ln[at] = weight.ln();
    }

    /// Weight of `class`; unlisted classes weigh 0.
    #[inline]
    pub fn weight(&self, class: u8) -> f64 {
        self.weight.get(class as usize).cloned().unwrap_or(0.0)
    }

    /// Natural log of the weight, `-inf` for weight 0.
    #[inline]
    pub fn ln(&self, class: u8) -> f64 {
        self.ln
            .get(class as usize)
            .cloned()
            .unwrap_or(f64::NEG_INFINITY)
    }

    /// Mask of the pixels of `stage` with positive prior, sized to the
    /// whole pixelation. Pixels absent from the snapshot are class 0 and
    /// follow that class's weight.
    pub fn valid_mask(&self, stage: &PixMap<u8>, num_pixels: usize) -> Vob {
        let zero_valid = self.weight(0) > 0.0;
        let mut mask = Vob::from_elem(num_pixels, zero_valid);
        for (pixel, class) in stage {
            mask.set(*pixel, self.weight(*class) > 0.0);
        }
        mask
    }

    /// Sum of the prior over every pixel valid at `stage`.
    pub fn mass_over(&self, stage: &PixMap<u8>, num_pixels: usize) -> f64 {
        let zero_w = self.weight(0);
        let mut mass = zero_w * (num_pixels - stage.len()) as f64;
        for class in stage.values() {
            mass += self.weight(*class);
        }
        mass
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn stage() -> PixMap<u8> {
        let mut m: PixMap<u8> = HashMap::default();
        m.insert(0, 1);
        m.insert(1, 2);
        m.insert(2, 0);
        m
    }

    #[test]
    fn zero_weight_is_minus_infinity() {
        let mut p = PixPrior::new();
        p.set(1, 2.0);
        p.set(2, 0.0);
        assert_eq!(p.weight(1), 2.0);
        assert!((p.ln(1) - 2.0_f64.ln()).abs() < 1e-15);
        assert_eq!(p.ln(2), f64::NEG_INFINITY);
        // Unlisted class.
        assert_eq!(p.weight(7), 0.0);
        assert_eq!(p.ln(7), f64::NEG_INFINITY);
    }

    #[test]
    fn mask_and_mass() {
        let mut p = PixPrior::new();
        p.set(1, 1.0);
        p.set(2, 0.5);
        // class 0 has no weight: unmapped pixels are invalid.
        let mask = p.valid_mask(&stage(), 5);
        assert_eq!(mask.get(0), Some(true));
        assert_eq!(mask.get(1), Some(true));
        assert_eq!(mask.get(2), Some(false));
        assert_eq!(mask.get(3), Some(false));
        assert!((p.mass_over(&stage(), 5) - 1.5).abs() < 1e-15);
    }

    #[test]
    fn read_accepts_prior_or_weight_column() {
        let a = "class\tprior\n1\t0.5\n";
        let mut r = TsvReader::new("p.tab".to_string(), a.as_bytes()).unwrap();
        let p = PixPrior::read(&mut r).unwrap();
        assert_eq!(p.weight(1), 0.5);

        let b = "class\tweight\n1\t0.25\n";
        let mut r = TsvReader::new("w.tab".to_string(), b.as_bytes()).unwrap();
        let p = PixPrior::read(&mut r).unwrap();
        assert_eq!(p.weight(1), 0.25);
    }

    #[test]
    fn read_rejects_negative_weight() {
        let a = "class\tprior\n1\t-0.5\n";
        let mut r = TsvReader::new("p.tab".to_string(), a.as_bytes()).unwrap();
        assert!(PixPrior::read(&mut r).is_err());
    }
}
