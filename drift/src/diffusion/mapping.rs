//! Stochastic mapping over the diffusion conditionals.
//!
//! After a down-pass, particle trajectories are sampled top-down: a root
//! pixel is drawn from the root conditional (which already carries the
//! landscape prior), and every time stage then draws its destination from
//! the stage conditional times the kernel from the current source times
//! the stage's landscape prior. Crossing into a different rotation frame
//! remaps the running pixel through the old-to-young rotation, weighting
//! collisions by the young prior. Rejection sampling is used against the
//! bracket maximum; an exhausted retry budget drops the whole particle.

use rand::Rng;

use isopix::normal::Normal;

use crate::diffusion::{Conditionals, DiffusionModel};
use crate::stages::StagedTree;
use crate::tree::Tree;

/// Draws before a rejection loop gives up.
const MAX_DRAWS: usize = 100_000;

/// One sampled stage transition. `from` is in the frame of the previous
/// (older) slot's end point remapped into this slot's frame; `to` is in
/// this slot's frame.
#[derive(Clone, Debug)]
pub struct Segment {
    pub slot: usize,
    /// Age of the younger end of the slot, in years.
    pub age: u64,
    pub from: usize,
    pub to: usize,
}

/// One particle: per tree node, its sampled stage transitions (empty for
/// single-slot nodes).
#[derive(Clone, Debug)]
pub struct Particle {
    pub segments: Vec<Vec<Segment>>,
}

impl<'a> DiffusionModel<'a> {
    /// Samples one particle consistent with `conds`. `None` when the
    /// retry budget was exhausted somewhere along the tree.
    pub fn simulate<R: Rng>(
        &self,
        tree: &Tree,
        staged: &StagedTree,
        conds: &Conditionals,
        rng: &mut R,
    ) -> Option<Particle> {
        let mut particle = Particle {
            segments: vec![Vec::new(); tree.len()],
        };

        // Root pick: the conditional at the root's oldest slot carries
        // the prior already.
        let root = tree.root();
        let root_cands: Vec<(usize, f64)> = conds
            .slot(root, 0)
            .iter()
            .map(|(p, v)| (*p, *v))
            .collect();
        let root_pixel = sample_ln(&root_cands, rng)?;

        // Position of the particle at each node's youngest slot.
        let mut at_end: Vec<usize> = vec![0; tree.len()];

        let lambda = conds.lambda();
        for at in tree.pre_order() {
            let source = match tree.node(at).parent {
                None => root_pixel,
                Some(p) => at_end[p],
            };
            let segs = self.simulate_branch(staged, conds, at, source, lambda, rng)?;
            at_end[at] = segs.last().map(|s| s.to).unwrap_or(source);
            particle.segments[at] = segs;
        }
        Some(particle)
    }

    fn simulate_branch<R: Rng>(
        &self,
        staged: &StagedTree,
        conds: &Conditionals,
        at: usize,
        source: usize,
        lambda: f64,
        rng: &mut R,
    ) -> Option<Vec<Segment>> {
        let snode = staged.node(at);
        let mut segments = Vec::with_capacity(snode.slots.len().saturating_sub(1));
        let mut source = source;

        for i in 1..snode.slots.len() {
            let young = &snode.slots[i];
            let old = &snode.slots[i - 1];
            if old.frame != young.frame {
                source = self.remap(source, old.frame, young.frame, rng)?;
            }

            let kernel = Normal::new(lambda / young.duration, self.pix);
            let cands: Vec<(usize, f64)> = conds
                .slot(at, i)
                .iter()
                .map(|(q, v)| {
                    let d = self.dist.ring_distance(source, *q);
                    let w = *v
                        + kernel.ln_prob_ring(d)
                        + self.prior.ln(self.landscape.class(young.frame, *q));
                    (*q, w)
                })
                .collect();
            let to = sample_ln(&cands, rng)?;

            segments.push(Segment {
                slot: i,
                age: young.age,
                from: source,
                to,
            });
            source = to;
        }
        Some(segments)
    }

    /// Remaps a pixel from `old_frame` into `young_frame`; with several
    /// young images, one is picked proportional to its young prior.
    fn remap<R: Rng>(
        &self,
        pixel: usize,
        old_frame: u64,
        young_frame: u64,
        rng: &mut R,
    ) -> Option<usize> {
        let rot = self.rotations.between(old_frame, young_frame)?;
        let images = rot.get(&pixel)?;
        let weights: Vec<f64> = images
            .iter()
            .map(|q| self.prior.weight(self.landscape.class(young_frame, *q)))
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return None;
        }
        let mut draw = rng.gen::<f64>() * total;
        for (q, w) in images.iter().zip(&weights) {
            draw -= w;
            if draw <= 0.0 {
                return Some(*q);
            }
        }
        images.last().cloned()
    }
}

/// Rejection sampling against the max of a log-weight bracket.
pub(crate) fn sample_ln<R: Rng>(cands: &[(usize, f64)], rng: &mut R) -> Option<usize> {
    let max = cands
        .iter()
        .map(|(_, v)| *v)
        .fold(f64::NEG_INFINITY, f64::max);
    if cands.is_empty() || !max.is_finite() {
        return None;
    }
    for _ in 0..MAX_DRAWS {
        let (p, w) = cands[rng.gen_range(0..cands.len())];
        if !w.is_finite() {
            continue;
        }
        if rng.gen::<f64>() < (w - max).exp() {
            return Some(p);
        }
    }
    None
}
