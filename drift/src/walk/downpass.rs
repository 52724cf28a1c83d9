//! Conditional likelihoods for the walk variant.
//!
//! Each rate category propagates independently along a branch; at the
//! branch's oldest slot the categories collapse into one max-normalised
//! log (their equal-probability mean), which is what the split product
//! consumes. Per-category conditionals are kept at every slot so the
//! up-pass can sample a category per branch. `-inf` entries are
//! propagated and masked, never floored.

use std::collections::HashMap;

use rayon::ThreadPool;

use isopix::network::Network;
use isopix::PixMap;

use crate::diffusion::log_sum_exp;
use crate::error::DriftError;
use crate::ranges::Ranges;
use crate::stages::StagedTree;
use crate::tree::Tree;
use crate::walk::{step_conditionals, StageWalk, WalkModel};

/// Per-(node, slot, category, trait) conditional log-likelihoods, dense
/// over the pixelation in the slot's frame.
pub struct WalkConditionals {
    store: Vec<Vec<Vec<Vec<Vec<f64>>>>>,
    /// Steps per slot, per node and category.
    steps: Vec<Vec<Vec<u32>>>,
    states: Vec<String>,
    cats: Vec<f64>,
    log_like: f64,
}

impl WalkConditionals {
    #[inline]
    pub fn slot(&self, node: usize, slot: usize, cat: usize, state: usize) -> &[f64] {
        &self.store[node][slot][cat][state]
    }

    /// Steps per slot of `node` under category `cat` (entry 0 is 0).
    #[inline]
    pub fn steps(&self, node: usize, cat: usize) -> &[u32] {
        &self.steps[node][cat]
    }

    #[inline]
    pub fn states(&self) -> &[String] {
        &self.states
    }

    #[inline]
    pub fn multipliers(&self) -> &[f64] {
        &self.cats
    }

    #[inline]
    pub fn log_like(&self) -> f64 {
        self.log_like
    }
}

impl<'a> WalkModel<'a> {
    /// Runs the walk down-pass.
    pub fn down_pass(
        &self,
        tree: &Tree,
        staged: &StagedTree,
        ranges: &Ranges,
    ) -> Result<WalkConditionals, DriftError> {
        let states = self.states();
        if states.is_empty() {
            return Err(DriftError::Config(
                "settlement matrix defines no trait states".to_string(),
            ));
        }
        for taxon in self.traits.taxa() {
            if tree.terminal(taxon).is_none() {
                return Err(DriftError::UnknownTaxon {
                    taxon: taxon.to_string(),
                    tree: tree.name().to_string(),
                });
            }
        }

        let cats = self.params.multipliers();
        let num_cats = cats.len();
        let num_states = states.len();
        let n = self.pix.len();

        let mut walks: HashMap<(u64, usize), StageWalk> = HashMap::new();
        let mut store: Vec<Vec<Vec<Vec<Vec<f64>>>>> = staged
            .nodes()
            .map(|sn| vec![vec![vec![Vec::new(); num_states]; num_cats]; sn.slots.len()])
            .collect();
        let mut steps: Vec<Vec<Vec<u32>>> = vec![Vec::new(); tree.len()];

        for at in tree.post_order() {
            let node = tree.node(at);
            let snode = staged.node(at);
            let last = snode.last();

            steps[at] = cats
                .iter()
                .map(|c| self.params.branch_steps(snode, node.is_terminal(), *c))
                .collect();

            // Youngest slot: observed range or split product.
            if node.is_terminal() {
                let taxon = node.taxon.as_deref().unwrap();
                let allowed = self.traits.states(taxon).ok_or_else(|| DriftError::NoTraits {
                    taxon: taxon.to_string(),
                })?;
                for state in allowed {
                    if !states.contains(state) {
                        return Err(DriftError::Config(format!(
                            "taxon {:?}: trait {:?} is not in the settlement matrix",
                            taxon, state
                        )));
                    }
                }
                let base = dense_ln(&ranges.ln_normalized(taxon)?, n);
                for k in 0..num_cats {
                    for (t, state) in states.iter().enumerate() {
                        store[at][last][k][t] = if allowed.contains(state) {
                            base.clone()
                        } else {
                            vec![f64::NEG_INFINITY; n]
                        };
                    }
                }
            } else {
                for t in 0..num_states {
                    let mut product = vec![0.0; n];
                    for child in &tree.node(at).children {
                        let mixed = mix_categories(&store[*child][0], t, n);
                        for (slot, v) in product.iter_mut().zip(&mixed) {
                            *slot += v;
                        }
                    }
                    for k in 0..num_cats {
                        store[at][last][k][t] = product.clone();
                    }
                }
            }

            // Propagate youngest to oldest.
            for i in (0..last).rev() {
                let young = snode.slots[i + 1].clone();
                let old = snode.slots[i].clone();
                for k in 0..num_cats {
                    let s = steps[at][k][i + 1];
                    for t in 0..num_states {
                        let walk = stage_walk(&mut walks, self, young.frame, t, &states);
                        let mut v = propagate_ln(
                            self.pool,
                            self.net,
                            walk,
                            &store[at][i + 1][k][t],
                            s,
                        );
                        if old.frame != young.frame {
                            let rot = self
                                .rotations
                                .between(young.frame, old.frame)
                                .ok_or(DriftError::MissingRotation { age: young.frame })?;
                            let old_walk = stage_walk(&mut walks, self, old.frame, t, &states);
                            v = remap_keep_max(rot, &v, &old_walk.prior);
                        }
                        store[at][i][k][t] = v;
                    }
                }
            }
        }

        // Root: mix categories, weight by the walk prior, normalise by
        // its mass over every trait.
        let root = tree.root();
        let root_frame = staged.node(root).slots[0].frame;
        let mut parts: Vec<f64> = Vec::new();
        let mut mass = 0.0;
        for t in 0..num_states {
            let walk = stage_walk(&mut walks, self, root_frame, t, &states);
            let mixed = mix_categories(&store[root][0], t, n);
            for p in 0..n {
                mass += walk.prior[p];
                let v = mixed[p] + walk.ln_prior[p];
                if v.is_finite() {
                    parts.push(v);
                }
            }
        }
        let log_like = if mass > 0.0 {
            log_sum_exp(parts) - mass.ln()
        } else {
            f64::NEG_INFINITY
        };

        Ok(WalkConditionals {
            store,
            steps,
            states,
            cats,
            log_like,
        })
    }
}

fn stage_walk<'w>(
    walks: &'w mut HashMap<(u64, usize), StageWalk>,
    model: &WalkModel,
    frame: u64,
    state: usize,
    states: &[String],
) -> &'w StageWalk {
    walks
        .entry((frame, state))
        .or_insert_with(|| StageWalk::build(model, frame, &states[state]))
}

/// Spreads a sparse log map over a dense vector, `-inf` elsewhere.
fn dense_ln(map: &PixMap<f64>, n: usize) -> Vec<f64> {
    let mut v = vec![f64::NEG_INFINITY; n];
    for (p, val) in map {
        v[*p] = *val;
    }
    v
}

/// The equal-probability category mixture of one trait's conditionals:
/// `ln(mean over categories of exp)` per pixel.
pub(crate) fn mix_categories(slot: &[Vec<Vec<f64>>], state: usize, n: usize) -> Vec<f64> {
    let num_cats = slot.len();
    if num_cats == 1 {
        return slot[0][state].clone();
    }
    let ln_cats = (num_cats as f64).ln();
    (0..n)
        .map(|p| log_sum_exp(slot.iter().map(|cat| cat[state][p]).collect::<Vec<f64>>()) - ln_cats)
        .collect()
}

/// Runs `steps` applications of the one-step conditional recursion in
/// scaled linear space, returning the result in log space.
pub(crate) fn propagate_ln(
    pool: &ThreadPool,
    net: &Network,
    walk: &StageWalk,
    v: &[f64],
    steps: u32,
) -> Vec<f64> {
    let max = v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return vec![f64::NEG_INFINITY; v.len()];
    }
    let mut cur: Vec<f64> = v.iter().map(|x| (x - max).exp()).collect();
    let mut offset = max;
    let mut next = vec![0.0; v.len()];
    for _ in 0..steps {
        step_conditionals(pool, net, walk, &cur, &mut next);
        let m = next.iter().cloned().fold(0.0, f64::max);
        if m <= 0.0 {
            return vec![f64::NEG_INFINITY; v.len()];
        }
        for x in next.iter_mut() {
            *x /= m;
        }
        offset += m.ln();
        std::mem::swap(&mut cur, &mut next);
    }
    cur.iter().map(|x| x.ln() + offset).collect()
}

/// Young-to-old identity remap, keeping the max across collisions and
/// masking old pixels with no settlement weight.
pub(crate) fn remap_keep_max(
    rot: &PixMap<Vec<usize>>,
    v: &[f64],
    old_prior: &[f64],
) -> Vec<f64> {
    let mut out = vec![f64::NEG_INFINITY; v.len()];
    for (q, olds) in rot {
        let val = v[*q];
        if !val.is_finite() {
            continue;
        }
        for o in olds {
            if old_prior[*o] > 0.0 && val > out[*o] {
                out[*o] = val;
            }
        }
    }
    out
}
