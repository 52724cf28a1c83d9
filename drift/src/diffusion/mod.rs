//! The diffusion likelihood engine.
//!
//! Conditional likelihoods are computed bottom-up over the staged tree
//! (Felsenstein pruning with the branches cut at stage boundaries). The
//! transition over each time stage is the discrete spherical normal at
//! `lambda / duration`; crossing a stage boundary with a different
//! rotation frame remaps pixel identities through the young-to-old
//! rotation, keeping the maximum across collisions.
//!
//! Everything is kept in log space at the stage boundaries. Inside a
//! propagation the kernel works in linear space scaled to peak 1, which
//! keeps a single max hoisted out of the sum; if the linear sum
//! underflows to zero the per-pixel max expression takes over, so no
//! finite input ever produces a spurious `-inf`.

use std::collections::HashMap;

use rayon::prelude::*;
use rayon::ThreadPool;

use isopix::dist::Distancer;
use isopix::normal::Normal;
use isopix::pixel::Pixelation;
use isopix::{PixHasher, PixMap};
use paleo::landscape::Landscape;
use paleo::prior::PixPrior;
use paleo::rotation::Rotations;

use crate::error::DriftError;
use crate::ranges::Ranges;
use crate::stages::StagedTree;
use crate::tree::Tree;

pub mod mapping;
#[cfg(test)]
mod test;

/// Pixels per parallel job posted to the worker pool.
const BLOCK: usize = 500;

/// `ln(sum(exp(v)))` over the finite entries of `vals`, with the max
/// subtracted before exponentiation. `-inf` if nothing is finite.
pub fn log_sum_exp<I>(vals: I) -> f64
where
    I: IntoIterator<Item = f64> + Clone,
{
    let max = vals
        .clone()
        .into_iter()
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = vals.into_iter().map(|v| (v - max).exp()).sum();
    sum.ln() + max
}

/// The shared, immutable pieces of a diffusion analysis.
pub struct DiffusionModel<'a> {
    pub pix: &'a Pixelation,
    pub landscape: &'a Landscape,
    pub rotations: &'a Rotations,
    pub prior: &'a PixPrior,
    pub dist: Distancer<'a>,
    pub pool: &'a ThreadPool,
}

/// The product of a down-pass: per node, per time stage, the conditional
/// log-likelihood keyed by pixel id in that stage's frame. At the root's
/// oldest stage the landscape log prior is already added in.
pub struct Conditionals {
    store: Vec<Vec<PixMap<f64>>>,
    lambda: f64,
    log_like: f64,
}

impl Conditionals {
    #[inline]
    pub fn slot(&self, node: usize, slot: usize) -> &PixMap<f64> {
        &self.store[node][slot]
    }

    #[inline]
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// The tree log-likelihood.
    #[inline]
    pub fn log_like(&self) -> f64 {
        self.log_like
    }
}

impl<'a> DiffusionModel<'a> {
    /// Runs the down-pass at concentration `lambda`.
    pub fn down_pass(
        &self,
        tree: &Tree,
        staged: &StagedTree,
        ranges: &Ranges,
        lambda: f64,
    ) -> Result<Conditionals, DriftError> {
        if lambda < 0.0 || !lambda.is_finite() {
            return Err(DriftError::BadLambda { lambda });
        }

        // Kernels are keyed by stage duration; most stages share the few
        // durations the landscape defines.
        let mut kernels: HashMap<u64, Normal> = HashMap::new();

        let mut store: Vec<Vec<PixMap<f64>>> = staged
            .nodes()
            .map(|n| vec![PixMap::default(); n.slots.len()])
            .collect();

        // Arrival scratch is sized to the pixelation and reused across
        // every stage of the pass.
        let mut scratch = Arrival::with_capacity(self.pix.len());

        for at in tree.post_order() {
            let node = tree.node(at);
            let snode = staged.node(at);
            let last = snode.last();

            if node.is_terminal() {
                let taxon = node.taxon.as_deref().unwrap();
                store[at][last] = ranges.ln_normalized(taxon)?;
            } else {
                let product = split_product(&store, &node.children);
                store[at][last] = product;
            }

            for i in (0..last).rev() {
                let young = &snode.slots[i + 1];
                let old = &snode.slots[i];
                let kernel = kernels
                    .entry(young.duration.to_bits())
                    .or_insert_with(|| Normal::new(lambda / young.duration, self.pix));
                let propagated = self.propagate(
                    &store[at][i + 1],
                    kernel,
                    young.frame,
                    old.frame,
                    &mut scratch,
                )?;
                store[at][i] = propagated;
            }
        }

        // Root: weight by the landscape prior and normalise by its mass.
        let root = tree.root();
        let root_frame = staged.node(root).slots[0].frame;
        let root_stage = self.landscape.stage(root_frame).ok_or_else(|| {
            DriftError::Config(format!("no landscape at stage {}", root_frame))
        })?;
        for (p, v) in store[root][0].iter_mut() {
            *v += self.prior.ln(self.landscape.class(root_frame, *p));
        }
        let lse = log_sum_exp(store[root][0].values().cloned());
        let log_like = lse - self.prior.mass_over(root_stage, self.pix.len()).ln();

        Ok(Conditionals {
            store,
            lambda,
            log_like,
        })
    }

    /// Propagates the conditional at the younger end of a time stage to
    /// its older end.
    ///
    /// `src` is keyed in `young_frame`; the result is keyed in
    /// `old_frame`. The arrival mass is weighted by the prior at the
    /// young frame; the old frame only masks (prior 0 excludes).
    fn propagate(
        &self,
        src: &PixMap<f64>,
        kernel: &Normal,
        young_frame: u64,
        old_frame: u64,
        scratch: &mut Arrival,
    ) -> Result<PixMap<f64>, DriftError> {
        self.fill_arrival(scratch, src, young_frame);
        let arrival: &Arrival = scratch;
        if arrival.src.is_empty() || !arrival.max_ln.is_finite() {
            return Ok(PixMap::default());
        }

        // Destinations live in the young frame; the rotation (if any)
        // renames them into the old frame afterwards.
        let rotation = if young_frame == old_frame {
            None
        } else {
            Some(
                self.rotations
                    .between(young_frame, old_frame)
                    .ok_or(DriftError::MissingRotation { age: young_frame })?,
            )
        };

        let dests: Vec<usize> = match rotation {
            None => arrival.src.iter().map(|p| *p as usize).collect(),
            Some(rot) => {
                let mut d: Vec<usize> = rot
                    .iter()
                    .filter(|(_, olds)| {
                        olds.iter().any(|o| {
                            self.prior.weight(self.landscape.class(old_frame, *o)) > 0.0
                        })
                    })
                    .map(|(q, _)| *q)
                    .collect();
                d.sort_unstable();
                d
            }
        };

        let dist = &self.dist;
        let vals: Vec<f64> = self.pool.install(|| {
            dests
                .par_chunks(BLOCK)
                .flat_map(|chunk| {
                    chunk
                        .iter()
                        .map(|q| arrival.gather(*q, kernel, dist))
                        .collect::<Vec<f64>>()
                })
                .collect()
        });

        let mut out: PixMap<f64> =
            HashMap::with_capacity_and_hasher(dests.len(), PixHasher::default());
        match rotation {
            None => {
                for (q, v) in dests.iter().zip(vals) {
                    out.insert(*q, v);
                }
            }
            Some(rot) => {
                // Keep the maximum when several young pixels project onto
                // the same old pixel: a safe envelope, no unnormalised
                // sums across collisions.
                for (q, v) in dests.iter().zip(vals) {
                    for o in &rot[q] {
                        if self.prior.weight(self.landscape.class(old_frame, *o)) <= 0.0 {
                            continue;
                        }
                        let slot = out.entry(*o).or_insert(f64::NEG_INFINITY);
                        if v > *slot {
                            *slot = v;
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Fills the arrival arrays over the valid pixels of `young_frame`.
    fn fill_arrival(&self, a: &mut Arrival, src: &PixMap<f64>, young_frame: u64) {
        a.clear();
        for p in 0..self.pix.len() {
            let w = self.prior.weight(self.landscape.class(young_frame, p));
            if w <= 0.0 {
                continue;
            }
            let ln = match src.get(&p) {
                Some(v) => *v + w.ln(),
                None => f64::NEG_INFINITY,
            };
            a.src.push(p as u32);
            a.weight.push(w);
            a.a_ln.push(ln);
            if ln > a.max_ln {
                a.max_ln = ln;
            }
        }
        if a.max_ln.is_finite() {
            for ln in &a.a_ln {
                a.e.push((ln - a.max_ln).exp());
            }
        }
    }
}

/// Scratch arrays of one propagation, shared read-only by the workers.
struct Arrival {
    /// Valid young pixels.
    src: Vec<u32>,
    /// `exp(a - max)`, peak 1.
    e: Vec<f64>,
    /// `a = logLike + ln(prior)`.
    a_ln: Vec<f64>,
    /// Linear prior weight of each source pixel.
    weight: Vec<f64>,
    max_ln: f64,
}

impl Arrival {
    fn with_capacity(n: usize) -> Arrival {
        Arrival {
            src: Vec::with_capacity(n),
            e: Vec::with_capacity(n),
            a_ln: Vec::with_capacity(n),
            weight: Vec::with_capacity(n),
            max_ln: f64::NEG_INFINITY,
        }
    }

    fn clear(&mut self) {
        self.src.clear();
        self.e.clear();
        self.a_ln.clear();
        self.weight.clear();
        self.max_ln = f64::NEG_INFINITY;
    }

    /// The propagated log conditional at destination `q`.
    fn gather(&self, q: usize, kernel: &Normal, dist: &Distancer) -> f64 {
        let mut sum = 0.0;
        let mut scale = 0.0;
        for i in 0..self.src.len() {
            let d = dist.ring_distance(q, self.src[i] as usize);
            let k = kernel.scaled_ring(d);
            sum += k * self.e[i];
            scale += k * self.weight[i];
        }
        if sum > 0.0 {
            return sum.ln() + self.max_ln - scale.ln();
        }

        // Linear sum underflowed: recover the same quantity from the max
        // of the log expression.
        let ln_peak = kernel.ln_prob_ring(0);
        let mut best = f64::NEG_INFINITY;
        let mut ln_scale_max = f64::NEG_INFINITY;
        for i in 0..self.src.len() {
            let d = dist.ring_distance(q, self.src[i] as usize);
            let ln_k = kernel.ln_prob_ring(d);
            if self.a_ln[i].is_finite() {
                let v = ln_k + self.a_ln[i];
                if v > best {
                    best = v;
                }
            }
            let s = ln_k - ln_peak + self.weight[i].ln();
            if s > ln_scale_max {
                ln_scale_max = s;
            }
        }
        let ln_scale = if scale > 0.0 {
            scale.ln()
        } else {
            let mut s = 0.0;
            for i in 0..self.src.len() {
                let d = dist.ring_distance(q, self.src[i] as usize);
                let ln_k = kernel.ln_prob_ring(d) - ln_peak + self.weight[i].ln();
                s += (ln_k - ln_scale_max).exp();
            }
            s.ln() + ln_scale_max
        };
        best - ln_scale
    }
}

/// Element-wise sum of the children's oldest-stage conditionals; pixels
/// missing from any child are missing from the product.
fn split_product(store: &[Vec<PixMap<f64>>], children: &[usize]) -> PixMap<f64> {
    let mut product = store[children[0]][0].clone();
    for child in &children[1..] {
        let other = &store[*child][0];
        product.retain(|p, _| other.contains_key(p));
        for (p, v) in product.iter_mut() {
            *v += other[p];
        }
    }
    product
}
