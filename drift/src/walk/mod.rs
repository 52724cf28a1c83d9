//! The discrete random-walk variant.
//!
//! Instead of a continuous kernel, lineages take discrete steps on the
//! pixel network. Movement is conditioned on a categorical trait: a
//! settlement weight (per trait and landscape class) governs staying and
//! acts as the pixel prior, a movement weight governs stepping onto a
//! neighbour. A relaxed rate mixture multiplies the per-stage step count
//! by category.
//!
//! The conditional-likelihood pass and the conditioned path sampler live
//! in [`downpass`] and [`mapping`].

use std::io::BufRead;

use rayon::prelude::*;
use rayon::ThreadPool;

use isopix::network::Network;
use isopix::pixel::Pixelation;
use paleo::key::PixKey;
use paleo::landscape::Landscape;
use paleo::rotation::Rotations;
use paleo::tsv::TsvReader;
use paleo::weights::{TraitObs, WeightMatrix};

use crate::error::DriftError;
use crate::relaxed::Relaxed;
use crate::stages::StagedNode;

pub mod downpass;
pub mod mapping;

/// Hard ceiling on the steps a single time stage may take.
pub const MAX_STAGE_STEPS: u32 = 1000;

/// Pixels per parallel job inside a step.
const BLOCK: usize = 500;

/// The recognised walk options.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WalkParams {
    /// Discrete steps per Myr of stage duration.
    pub steps_per_myr: u32,
    /// Number of rate categories.
    pub cats: usize,
    /// Minimum total steps on a terminal branch; the youngest stage is
    /// boosted to meet it.
    pub min_steps: u32,
    pub relaxed: Option<Relaxed>,
}

impl Default for WalkParams {
    fn default() -> WalkParams {
        WalkParams {
            steps_per_myr: 10,
            cats: 1,
            min_steps: 0,
            relaxed: None,
        }
    }
}

impl WalkParams {
    /// Reads a parameter file: columns `key`, `value`. Recognised keys
    /// are `steps`, `cats`, `minsteps`, `relaxed` (a distribution name)
    /// and `param` (its shape or sigma, default 1). Unknown keys are
    /// rejected.
    pub fn read<R: BufRead>(r: &mut TsvReader<R>) -> Result<WalkParams, DriftError> {
        let mut params = WalkParams::default();
        let mut relaxed_name: Option<String> = None;
        let mut relaxed_param = 1.0;
        while r.next_row()? {
            let key = r.field("key")?.to_lowercase();
            match key.as_str() {
                "steps" => params.steps_per_myr = r.parse("value")?,
                "cats" => params.cats = r.parse("value")?,
                "minsteps" => params.min_steps = r.parse("value")?,
                "relaxed" => relaxed_name = Some(r.field("value")?.to_string()),
                "param" => relaxed_param = r.parse("value")?,
                other => {
                    return Err(DriftError::Config(format!(
                        "{}: unknown walk option {:?}",
                        r.file(),
                        other
                    )))
                }
            }
        }
        if let Some(name) = relaxed_name {
            params.relaxed = Some(Relaxed::from_option(&name, relaxed_param)?);
        }
        params.check()?;
        Ok(params)
    }

    pub fn check(&self) -> Result<(), DriftError> {
        if self.steps_per_myr < 1 {
            return Err(DriftError::Config(
                "walk needs at least one step per Myr".to_string(),
            ));
        }
        if self.cats < 1 {
            return Err(DriftError::Config(
                "walk needs at least one rate category".to_string(),
            ));
        }
        if self.cats > 1 && self.relaxed.is_none() {
            return Err(DriftError::Config(
                "more than one rate category needs a rate distribution".to_string(),
            ));
        }
        Ok(())
    }

    /// The category multipliers `c_1..c_K`.
    pub fn multipliers(&self) -> Vec<f64> {
        match self.relaxed {
            Some(r) => r.quantiles(self.cats),
            None => vec![1.0],
        }
    }

    /// Steps taken over a stage of `duration` Myr at multiplier `c`.
    pub fn steps_over(&self, duration: f64, c: f64) -> u32 {
        let raw = (self.steps_per_myr as f64 * duration * c).round();
        if raw < 1.0 {
            1
        } else if raw > MAX_STAGE_STEPS as f64 {
            MAX_STAGE_STEPS
        } else {
            raw as u32
        }
    }

    /// Steps per slot along one branch, indexed like the slots (entry 0
    /// is the transition-free carrier and takes no steps). For terminal
    /// branches the youngest stage is boosted so that the branch total
    /// reaches `min_steps`.
    pub fn branch_steps(&self, snode: &StagedNode, terminal: bool, c: f64) -> Vec<u32> {
        let mut steps = vec![0u32];
        for slot in &snode.slots[1..] {
            steps.push(self.steps_over(slot.duration, c));
        }
        if terminal && steps.len() > 1 {
            let total: u32 = steps.iter().sum();
            if total < self.min_steps {
                let last = steps.len() - 1;
                steps[last] += self.min_steps - total;
            }
        }
        steps
    }
}

/// The shared, immutable pieces of a walk analysis.
pub struct WalkModel<'a> {
    pub pix: &'a Pixelation,
    pub net: &'a Network,
    pub landscape: &'a Landscape,
    pub rotations: &'a Rotations,
    pub key: &'a PixKey,
    pub movement: &'a WeightMatrix,
    pub settlement: &'a WeightMatrix,
    pub traits: &'a TraitObs,
    pub params: WalkParams,
    pub pool: &'a ThreadPool,
}

impl<'a> WalkModel<'a> {
    /// The trait universe, in settlement-matrix order.
    pub fn states(&self) -> Vec<String> {
        self.settlement.states().to_vec()
    }
}

/// The movement chain of one (stage frame, trait state) pair.
pub(crate) struct StageWalk {
    /// Settlement weight per pixel: the walk's pixel prior.
    pub prior: Vec<f64>,
    pub ln_prior: Vec<f64>,
    /// Per pixel, transition probabilities aligned with
    /// `net.neighbors(pixel)`; each row sums to 1.
    pub moves: Vec<Vec<f64>>,
}

impl StageWalk {
    pub fn build(model: &WalkModel, frame: u64, state: &str) -> StageWalk {
        let n = model.pix.len();
        let class = |p: usize| model.landscape.class(frame, p);

        let prior: Vec<f64> = (0..n)
            .map(|p| model.settlement.weight_of_class(state, class(p), model.key))
            .collect();
        let ln_prior = prior.iter().map(|w| w.ln()).collect();

        let moves = (0..n)
            .map(|p| {
                let hood = model.net.neighbors(p);
                let mut w: Vec<f64> = hood
                    .iter()
                    .map(|nb| {
                        if *nb == p {
                            prior[p]
                        } else {
                            model.movement.weight_of_class(state, class(*nb), model.key)
                        }
                    })
                    .collect();
                let peak = w.iter().cloned().fold(0.0, f64::max);
                if peak <= 0.0 {
                    // Nowhere to go and nowhere to stay: the chain parks.
                    let own = hood.iter().position(|nb| *nb == p).unwrap();
                    for x in w.iter_mut() {
                        *x = 0.0;
                    }
                    w[own] = 1.0;
                } else {
                    for x in w.iter_mut() {
                        *x /= peak;
                    }
                }
                let sum: f64 = w.iter().sum();
                for x in w.iter_mut() {
                    *x /= sum;
                }
                w
            })
            .collect();

        StageWalk {
            prior,
            ln_prior,
            moves,
        }
    }
}

/// One discrete step of the conditional-likelihood recursion, in linear
/// space: `next[p] = sum over q in hood(p) of prob(p -> q) * cur[q]`.
/// Pixel blocks run in parallel on `pool`.
pub(crate) fn step_conditionals(
    pool: &ThreadPool,
    net: &Network,
    walk: &StageWalk,
    cur: &[f64],
    next: &mut [f64],
) {
    pool.install(|| {
        next.par_chunks_mut(BLOCK)
            .enumerate()
            .for_each(|(chunk, out)| {
                let base = chunk * BLOCK;
                for (off, slot) in out.iter_mut().enumerate() {
                    let p = base + off;
                    let hood = net.neighbors(p);
                    let probs = &walk.moves[p];
                    let mut acc = 0.0;
                    for (nb, pr) in hood.iter().zip(probs) {
                        acc += pr * cur[*nb];
                    }
                    *slot = acc;
                }
            });
    });
}
