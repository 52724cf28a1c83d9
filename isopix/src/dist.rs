//! Ring distances, precomputed or on the fly.
//!
//! For small pixelations an `N x N` arena of ring distances is affordable
//! and keeps `cos`/`acos` off the hot path entirely. For larger ones the
//! distance is computed lazily from the cached pixel positions. Both
//! sources round through [`Pixelation::ring_distance`], so conditional
//! likelihoods are bitwise identical either way.

use rayon::prelude::*;

use crate::pixel::Pixelation;

/// A single contiguous arena of pairwise ring distances.
///
/// Distances fit a `u16`: the largest possible value is the number of
/// rings, which is bounded by `u16::MAX` for any usable equator count.
pub struct DistMat {
    len: usize,
    dist: Vec<u16>,
}

impl DistMat {
    /// Fills the arena. Rows are computed in parallel on the global pool;
    /// construction happens once, before any down-pass is running.
    pub fn new(pix: &Pixelation) -> DistMat {
        let len = pix.len();
        let mut dist = vec![0u16; len * len];
        dist.par_chunks_mut(len).enumerate().for_each(|(a, row)| {
            for (b, d) in row.iter_mut().enumerate() {
                *d = pix.ring_distance(a, b) as u16;
            }
        });
        DistMat { len, dist }
    }

    #[inline]
    pub fn ring_distance(&self, a: usize, b: usize) -> usize {
        self.dist[a * self.len + b] as usize
    }
}

/// Where a propagation gets its ring distances from.
#[derive(Clone, Copy)]
pub enum Distancer<'a> {
    Arena(&'a DistMat),
    Lazy(&'a Pixelation),
}

impl<'a> Distancer<'a> {
    #[inline]
    pub fn ring_distance(&self, a: usize, b: usize) -> usize {
        match self {
            Distancer::Arena(m) => m.ring_distance(a, b),
            Distancer::Lazy(pix) => pix.ring_distance(a, b),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arena_matches_lazy() {
        let pix = Pixelation::new(20);
        let mat = DistMat::new(&pix);
        let arena = Distancer::Arena(&mat);
        let lazy = Distancer::Lazy(&pix);

        for a in (0..pix.len()).step_by(5) {
            for b in (0..pix.len()).step_by(7) {
                assert_eq!(arena.ring_distance(a, b), lazy.ring_distance(a, b));
            }
        }
    }
}
