//! Conditioned path sampling for the walk variant.
//!
//! A particle starts at the root with a (category, trait, pixel) draw
//! from the root marginal. Along every branch the rate category is
//! resampled at the branch top from the per-category conditionals at the
//! entry pixel; the trait never changes, as the one-step operator has no
//! trait transition. Within a stage the discrete chain is simulated
//! forward conditioned on the down-pass conditionals: at every step the
//! neighbour is drawn proportional to its one-step probability times the
//! remaining-steps conditional. A stage whose bracket dies is retried
//! with fresh draws a few times before the whole particle is dropped.

use std::collections::HashMap;

use rand::Rng;

use crate::diffusion::mapping::sample_ln;
use crate::stages::StagedTree;
use crate::tree::Tree;
use crate::walk::downpass::WalkConditionals;
use crate::walk::{StageWalk, WalkModel};

/// Fresh attempts at one stage before the particle is declared
/// unsampled.
const STAGE_RETRIES: usize = 10;

/// Draws per rejection loop.
const MAX_DRAWS: usize = 100_000;

/// One stage of a sampled walk trajectory.
#[derive(Clone, Debug)]
pub struct WalkSegment {
    pub slot: usize,
    /// Age of the younger end of the slot, in years.
    pub age: u64,
    pub from: usize,
    pub to: usize,
    /// Trait index into [`WalkConditionals::states`]; the trait is
    /// constant along a lineage, so start and end coincide.
    pub state: usize,
    /// Rate category of the branch this stage belongs to.
    pub cat: usize,
    /// (state, pixel) after every step; entry 0 is the starting point.
    pub path: Vec<(usize, usize)>,
}

#[derive(Clone, Debug)]
pub struct WalkParticle {
    /// Per tree node, its sampled stages (empty for single-slot nodes).
    pub segments: Vec<Vec<WalkSegment>>,
    /// The particle's trait.
    pub state: usize,
    /// Root pixel, in the root slot's frame.
    pub root: usize,
}

/// Samples particles over a finished walk down-pass. Prebuilds the
/// movement chains of every (frame, trait) pair so that drawing many
/// particles stays cheap.
pub struct WalkSampler<'m, 'a> {
    model: &'m WalkModel<'a>,
    tree: &'m Tree,
    staged: &'m StagedTree,
    conds: &'m WalkConditionals,
    walks: HashMap<(u64, usize), StageWalk>,
    /// Root candidates `(cat, state, pixel, ln weight)`.
    root_cands: Vec<(usize, usize, usize, f64)>,
}

impl<'m, 'a> WalkSampler<'m, 'a> {
    pub fn new(
        model: &'m WalkModel<'a>,
        tree: &'m Tree,
        staged: &'m StagedTree,
        conds: &'m WalkConditionals,
    ) -> WalkSampler<'m, 'a> {
        let states = conds.states();
        let mut walks = HashMap::new();
        for snode in staged.nodes() {
            for slot in &snode.slots {
                for t in 0..states.len() {
                    walks
                        .entry((slot.frame, t))
                        .or_insert_with(|| StageWalk::build(model, slot.frame, &states[t]));
                }
            }
        }

        let root = tree.root();
        let root_frame = staged.node(root).slots[0].frame;
        let mut root_cands = Vec::new();
        for k in 0..conds.multipliers().len() {
            for t in 0..states.len() {
                let walk = &walks[&(root_frame, t)];
                for (p, v) in conds.slot(root, 0, k, t).iter().enumerate() {
                    let w = v + walk.ln_prior[p];
                    if w.is_finite() {
                        root_cands.push((k, t, p, w));
                    }
                }
            }
        }

        WalkSampler {
            model,
            tree,
            staged,
            conds,
            walks,
            root_cands,
        }
    }

    /// Draws one particle; `None` when a retry budget was exhausted.
    pub fn particle<R: Rng>(&self, rng: &mut R) -> Option<WalkParticle> {
        let (root_cat, state, root_pixel) = self.pick_root(rng)?;

        let mut particle = WalkParticle {
            segments: vec![Vec::new(); self.tree.len()],
            state,
            root: root_pixel,
        };
        let mut at_end: Vec<usize> = vec![0; self.tree.len()];

        for at in self.tree.pre_order() {
            let entry = match self.tree.node(at).parent {
                None => root_pixel,
                Some(p) => at_end[p],
            };
            let cat = if self.tree.node(at).parent.is_none() {
                root_cat
            } else {
                self.pick_cat(at, state, entry, rng)?
            };
            let segs = self.branch(at, cat, state, entry, rng)?;
            at_end[at] = segs.last().map(|s| s.to).unwrap_or(entry);
            particle.segments[at] = segs;
        }
        Some(particle)
    }

    fn pick_root<R: Rng>(&self, rng: &mut R) -> Option<(usize, usize, usize)> {
        let max = self
            .root_cands
            .iter()
            .map(|(_, _, _, w)| *w)
            .fold(f64::NEG_INFINITY, f64::max);
        if self.root_cands.is_empty() || !max.is_finite() {
            return None;
        }
        for _ in 0..MAX_DRAWS {
            let (k, t, p, w) = self.root_cands[rng.gen_range(0..self.root_cands.len())];
            if rng.gen::<f64>() < (w - max).exp() {
                return Some((k, t, p));
            }
        }
        None
    }

    /// Branch-top category draw at the entry pixel.
    fn pick_cat<R: Rng>(
        &self,
        at: usize,
        state: usize,
        entry: usize,
        rng: &mut R,
    ) -> Option<usize> {
        let cands: Vec<(usize, f64)> = (0..self.conds.multipliers().len())
            .map(|k| (k, self.conds.slot(at, 0, k, state)[entry]))
            .collect();
        sample_ln(&cands, rng)
    }

    fn branch<R: Rng>(
        &self,
        at: usize,
        cat: usize,
        state: usize,
        entry: usize,
        rng: &mut R,
    ) -> Option<Vec<WalkSegment>> {
        let snode = self.staged.node(at);
        let mut segments = Vec::with_capacity(snode.slots.len().saturating_sub(1));
        let mut here = entry;

        for i in 1..snode.slots.len() {
            let young = &snode.slots[i];
            let old = &snode.slots[i - 1];
            if old.frame != young.frame {
                here = self.remap(here, old.frame, young.frame, state, rng)?;
            }

            let walk = &self.walks[&(young.frame, state)];
            let steps = self.conds.steps(at, cat)[i] as usize;

            // Remaining-steps conditionals, in scaled linear space:
            // entry m holds the conditional after m steps.
            let mut remain: Vec<Vec<f64>> = Vec::with_capacity(steps + 1);
            {
                let u0 = self.conds.slot(at, i, cat, state);
                let max = u0.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                if !max.is_finite() {
                    return None;
                }
                remain.push(u0.iter().map(|v| (v - max).exp()).collect());
            }
            for m in 1..=steps {
                let prev = &remain[m - 1];
                let next = propagate_linear_step(self.model, walk, prev);
                remain.push(next);
            }

            let seg = self.stage(at, i, cat, state, here, steps, walk, &remain, rng)?;
            here = seg.to;
            segments.push(seg);
        }
        Some(segments)
    }

    #[allow(clippy::too_many_arguments)]
    fn stage<R: Rng>(
        &self,
        at: usize,
        slot: usize,
        cat: usize,
        state: usize,
        entry: usize,
        steps: usize,
        walk: &StageWalk,
        remain: &[Vec<f64>],
        rng: &mut R,
    ) -> Option<WalkSegment> {
        let age = self.staged.node(at).slots[slot].age;
        'retry: for _ in 0..STAGE_RETRIES {
            let mut here = entry;
            let mut path = vec![(state, here)];
            for j in 0..steps {
                let rem = &remain[steps - 1 - j];
                let hood = self.model.net.neighbors(here);
                let probs = &walk.moves[here];
                let weights: Vec<f64> =
                    hood.iter().zip(probs).map(|(y, pr)| pr * rem[*y]).collect();
                match weighted_pick(&weights, rng) {
                    Some(idx) => {
                        here = hood[idx];
                        path.push((state, here));
                    }
                    None => continue 'retry,
                }
            }
            return Some(WalkSegment {
                slot,
                age,
                from: entry,
                to: here,
                state,
                cat,
                path,
            });
        }
        None
    }

    /// Old-to-young identity remap weighted by the young settlement
    /// prior of the particle's trait.
    fn remap<R: Rng>(
        &self,
        pixel: usize,
        old_frame: u64,
        young_frame: u64,
        state: usize,
        rng: &mut R,
    ) -> Option<usize> {
        let rot = self.model.rotations.between(old_frame, young_frame)?;
        let images = rot.get(&pixel)?;
        let walk = &self.walks[&(young_frame, state)];
        let weights: Vec<f64> = images.iter().map(|q| walk.prior[*q]).collect();
        let idx = weighted_pick(&weights, rng)?;
        Some(images[idx])
    }
}

/// One forward application of the conditional recursion, sequential (the
/// sampler works stage by stage on small vectors).
fn propagate_linear_step(model: &WalkModel, walk: &StageWalk, cur: &[f64]) -> Vec<f64> {
    let mut next = vec![0.0; cur.len()];
    for (p, slot) in next.iter_mut().enumerate() {
        let hood = model.net.neighbors(p);
        let probs = &walk.moves[p];
        let mut acc = 0.0;
        for (nb, pr) in hood.iter().zip(probs) {
            acc += pr * cur[*nb];
        }
        *slot = acc;
    }
    let m = next.iter().cloned().fold(0.0, f64::max);
    if m > 0.0 {
        for x in next.iter_mut() {
            *x /= m;
        }
    }
    next
}

/// Cumulative draw over linear weights; `None` if the mass is zero.
fn weighted_pick<R: Rng>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let total: f64 = weights.iter().sum();
    if !(total > 0.0) {
        return None;
    }
    let mut draw = rng.gen::<f64>() * total;
    for (i, w) in weights.iter().enumerate() {
        draw -= w;
        if draw <= 0.0 && *w > 0.0 {
            return Some(i);
        }
    }
    weights.iter().rposition(|w| *w > 0.0)
}
