//! Hill-climbing maximum-likelihood search and likelihood integration
//! over the concentration.
//!
//! The search is deliberately simple: `first` brackets the maximum by
//! walking in fixed steps from the current best, `search` polishes with
//! two-point probes, and `run` halves the step from 100 down to the stop
//! scale. Every evaluation is recorded and optionally streamed to a
//! writer channel, so a scan file grows while the search runs.

use rand::Rng;
use rand_distr::{Distribution, Gamma, Uniform};
use std::sync::mpsc::Sender;

use isopix::normal::Normal;
use isopix::pixel::Pixelation;
use isopix::EARTH_RADIUS_M;

use crate::diffusion::{Conditionals, DiffusionModel};
use crate::error::DriftError;
use crate::progress::{ProgressFactory, StyledProgress};
use crate::ranges::Ranges;
use crate::stages::StagedTree;
use crate::tree::Tree;

/// One likelihood evaluation, as reported in a scan file.
#[derive(Clone, Debug)]
pub struct LikeRecord {
    pub tree: String,
    pub lambda: f64,
    /// `sqrt(variance) * R_earth`, in km/Myr.
    pub std_dev: f64,
    pub log_like: f64,
}

/// Standard deviation of the kernel at `lambda`, in km/Myr.
pub fn std_dev_km(lambda: f64, pix: &Pixelation) -> f64 {
    Normal::new(lambda, pix).variance().sqrt() * EARTH_RADIUS_M / 1000.0
}

pub struct Search<'m, 'a> {
    model: &'m DiffusionModel<'a>,
    tree: &'m Tree,
    staged: &'m StagedTree,
    ranges: &'m Ranges,
    best_lambda: f64,
    best_like: f64,
    evals: Vec<LikeRecord>,
    tap: Option<Sender<LikeRecord>>,
}

impl<'m, 'a> Search<'m, 'a> {
    /// Starts a search at `lambda`, evaluating it right away.
    pub fn new(
        model: &'m DiffusionModel<'a>,
        tree: &'m Tree,
        staged: &'m StagedTree,
        ranges: &'m Ranges,
        lambda: f64,
        tap: Option<Sender<LikeRecord>>,
    ) -> Result<Search<'m, 'a>, DriftError> {
        if lambda <= 0.0 {
            return Err(DriftError::BadLambda { lambda });
        }
        let mut s = Search {
            model,
            tree,
            staged,
            ranges,
            best_lambda: lambda,
            best_like: f64::NEG_INFINITY,
            evals: Vec::new(),
            tap,
        };
        s.best_like = s.eval(lambda)?;
        Ok(s)
    }

    /// `(lambda, log-likelihood)` of the best evaluation so far.
    pub fn best(&self) -> (f64, f64) {
        (self.best_lambda, self.best_like)
    }

    pub fn records(&self) -> &[LikeRecord] {
        &self.evals
    }

    fn eval(&mut self, lambda: f64) -> Result<f64, DriftError> {
        let conds = self.model.down_pass(self.tree, self.staged, self.ranges, lambda)?;
        let rec = LikeRecord {
            tree: self.tree.name().to_string(),
            lambda,
            std_dev: std_dev_km(lambda, self.model.pix),
            log_like: conds.log_like(),
        };
        if let Some(tap) = &self.tap {
            // A closed consumer only stops the streaming, not the search.
            let _ = tap.send(rec.clone());
        }
        self.evals.push(rec);
        Ok(conds.log_like())
    }

    /// Walks upward from the current best in steps of `step`, accepting
    /// any improvement; if the first probe fails, walks downward instead
    /// until no improvement or the axis runs out.
    pub fn first(&mut self, step: f64) -> Result<(), DriftError> {
        if step <= 0.0 {
            return Err(DriftError::BadStep { step });
        }
        let mut improved = false;
        loop {
            let lambda = self.best_lambda + step;
            let like = self.eval(lambda)?;
            if like > self.best_like {
                self.best_lambda = lambda;
                self.best_like = like;
                improved = true;
            } else {
                break;
            }
        }
        if improved {
            return Ok(());
        }
        loop {
            let lambda = self.best_lambda - step;
            if lambda <= 0.0 {
                break;
            }
            let like = self.eval(lambda)?;
            if like > self.best_like {
                self.best_lambda = lambda;
                self.best_like = like;
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Two-point probe at `best +- step`, repeated while it improves.
    pub fn search(&mut self, step: f64) -> Result<(), DriftError> {
        if step <= 0.0 {
            return Err(DriftError::BadStep { step });
        }
        loop {
            let mut best_probe: Option<(f64, f64)> = None;
            for lambda in &[self.best_lambda + step, self.best_lambda - step] {
                if *lambda <= 0.0 {
                    continue;
                }
                let like = self.eval(*lambda)?;
                if like > self.best_like
                    && best_probe.map(|(_, bl)| like > bl).unwrap_or(true)
                {
                    best_probe = Some((*lambda, like));
                }
            }
            match best_probe {
                Some((lambda, like)) => {
                    self.best_lambda = lambda;
                    self.best_like = like;
                }
                None => return Ok(()),
            }
        }
    }

    /// The full ML loop: bracket with step 100, then halve the step down
    /// to `stop` (1 by default), polishing at each scale.
    pub fn run<F: ProgressFactory>(
        &mut self,
        stop: f64,
        progress: &F,
    ) -> Result<(f64, f64), DriftError> {
        if stop <= 0.0 {
            return Err(DriftError::BadStep { step: stop });
        }
        let mut step = 100.0;
        let scales = (100.0 / stop).log2().ceil().max(1.0) as u64;
        let bar = progress.new_progress_bar(scales + 1);
        bar.set_message("bracketing");
        self.first(step)?;
        bar.inc(1);
        step /= 2.0;
        while step >= stop {
            bar.set_message(&format!("step {:.3}", step));
            self.search(step)?;
            bar.inc(1);
            step /= 2.0;
        }
        bar.finish_with_message(&format!(
            "lambda {:.4}, logLike {:.4}",
            self.best_lambda, self.best_like
        ));
        Ok((self.best_lambda, self.best_like))
    }

    /// Down-pass at the best concentration found, for reporting and
    /// stochastic mapping.
    pub fn conditionals(&self) -> Result<Conditionals, DriftError> {
        self.model
            .down_pass(self.tree, self.staged, self.ranges, self.best_lambda)
    }
}

/// `parts` evenly spaced midpoints of `[min, max]`.
pub fn lambda_grid(min: f64, max: f64, parts: usize) -> Vec<f64> {
    let width = (max - min) / parts as f64;
    (0..parts)
        .map(|i| min + (i as f64 + 0.5) * width)
        .collect()
}

/// `draws` uniform samples from `[min, max]`.
pub fn lambda_uniform<R: Rng>(min: f64, max: f64, draws: usize, rng: &mut R) -> Vec<f64> {
    let u = Uniform::new(min, max);
    (0..draws).map(|_| u.sample(rng)).collect()
}

/// `draws` samples from Gamma(alpha, beta), beta being a rate.
pub fn lambda_gamma<R: Rng>(
    alpha: f64,
    beta: f64,
    draws: usize,
    rng: &mut R,
) -> Result<Vec<f64>, DriftError> {
    let g = Gamma::new(alpha, 1.0 / beta).map_err(|e| {
        DriftError::Config(format!("gamma({}, {}) is not samplable: {}", alpha, beta, e))
    })?;
    Ok((0..draws).map(|_| g.sample(rng)).collect())
}

#[cfg(test)]
mod test;

/// Evaluates the likelihood at every concentration of `lambdas`,
/// recording each evaluation.
pub fn scan<'m, 'a>(
    model: &'m DiffusionModel<'a>,
    tree: &'m Tree,
    staged: &'m StagedTree,
    ranges: &'m Ranges,
    lambdas: &[f64],
    tap: Option<Sender<LikeRecord>>,
) -> Result<Vec<LikeRecord>, DriftError> {
    let mut out = Vec::with_capacity(lambdas.len());
    for lambda in lambdas {
        if *lambda <= 0.0 {
            return Err(DriftError::BadLambda { lambda: *lambda });
        }
        let conds = model.down_pass(tree, staged, ranges, *lambda)?;
        let rec = LikeRecord {
            tree: tree.name().to_string(),
            lambda: *lambda,
            std_dev: std_dev_km(*lambda, model.pix),
            log_like: conds.log_like(),
        };
        if let Some(tap) = &tap {
            let _ = tap.send(rec.clone());
        }
        out.push(rec);
    }
    Ok(out)
}
