use std::path::PathBuf;

use structopt::StructOpt;

#[derive(Clone, StructOpt)]
#[structopt(
name = "phydrift",
about = "Phylogenetic biogeography on a rotating pixelated earth."
)]
pub enum Options {
    /// Maximum-likelihood search over the concentration.
    #[structopt(name = "like")]
    Like {
        #[structopt(short = "t", long = "trees")]
        /// Tree file to analyze.
        trees: PathBuf,

        #[structopt(short = "l", long = "landscape")]
        /// Landscape (paleolandscape classes per stage) file.
        landscape: PathBuf,

        #[structopt(short = "r", long = "rotation")]
        /// Plate rotation file. Needed whenever a branch crosses stages.
        rotation: Option<PathBuf>,

        #[structopt(long = "prior")]
        /// Pixel prior file (class to weight).
        prior: PathBuf,

        #[structopt(long = "ranges")]
        /// Terminal range file.
        ranges: PathBuf,

        #[structopt(short = "e", long = "equator")]
        /// Pixels at the equator; must match every input file.
        equator: usize,

        #[structopt(long = "stem", default_value = "0")]
        /// Root stem length, in years.
        stem: u64,

        #[structopt(long = "cpu", default_value = "1")]
        /// Workers for the pixel-wise computations.
        cpu: usize,

        #[structopt(long = "seed", default_value = "1")]
        /// Seed of the stochastic-map sampler.
        seed: u64,

        #[structopt(long = "distmat")]
        /// Precompute the full ring-distance matrix.
        distmat: bool,

        #[structopt(short = "o", long = "out")]
        /// Folder for the output files; names are derived per tree.
        out: PathBuf,

        #[structopt(long = "lambda", default_value = "100")]
        /// Starting concentration of the search.
        lambda: f64,

        #[structopt(long = "stop", default_value = "1")]
        /// Smallest search step.
        stop: f64,

        #[structopt(short = "p", long = "particles", default_value = "0")]
        /// Stochastic maps to draw at the optimum.
        particles: usize,
    },

    /// Likelihood integration over a concentration bracket.
    #[structopt(name = "scan")]
    Scan {
        #[structopt(short = "t", long = "trees")]
        /// Tree file to analyze.
        trees: PathBuf,

        #[structopt(short = "l", long = "landscape")]
        /// Landscape (paleolandscape classes per stage) file.
        landscape: PathBuf,

        #[structopt(short = "r", long = "rotation")]
        /// Plate rotation file. Needed whenever a branch crosses stages.
        rotation: Option<PathBuf>,

        #[structopt(long = "prior")]
        /// Pixel prior file (class to weight).
        prior: PathBuf,

        #[structopt(long = "ranges")]
        /// Terminal range file.
        ranges: PathBuf,

        #[structopt(short = "e", long = "equator")]
        /// Pixels at the equator; must match every input file.
        equator: usize,

        #[structopt(long = "stem", default_value = "0")]
        /// Root stem length, in years.
        stem: u64,

        #[structopt(long = "cpu", default_value = "1")]
        /// Workers for the pixel-wise computations.
        cpu: usize,

        #[structopt(long = "seed", default_value = "1")]
        /// Seed of the Monte Carlo draws and the sampler.
        seed: u64,

        #[structopt(short = "o", long = "out")]
        /// Folder for the output files; names are derived per tree.
        out: PathBuf,

        #[structopt(long = "min", default_value = "1")]
        /// Lower end of the concentration bracket.
        min: f64,

        #[structopt(long = "max", default_value = "1000")]
        /// Upper end of the concentration bracket.
        max: f64,

        #[structopt(long = "parts")]
        /// Evenly spaced evaluations over the bracket (the default mode,
        /// 100 parts).
        parts: Option<usize>,

        #[structopt(long = "mc")]
        /// Monte Carlo mode: uniform draws from the bracket.
        mc: Option<usize>,

        #[structopt(long = "alpha")]
        /// Distribution mode: Gamma shape. Implies sampling lambda from
        /// Gamma(alpha, beta).
        alpha: Option<f64>,

        #[structopt(long = "beta")]
        /// Distribution mode: Gamma rate; defaults to alpha.
        beta: Option<f64>,

        #[structopt(long = "draws", default_value = "100")]
        /// Draws in distribution mode.
        draws: usize,

        #[structopt(short = "p", long = "particles", default_value = "0")]
        /// Stochastic maps per distribution draw.
        particles: usize,
    },

    /// Random-walk variant with traits and a relaxed rate mixture.
    #[structopt(name = "walk")]
    Walk {
        #[structopt(short = "t", long = "trees")]
        /// Tree file to analyze.
        trees: PathBuf,

        #[structopt(short = "l", long = "landscape")]
        /// Landscape (paleolandscape classes per stage) file.
        landscape: PathBuf,

        #[structopt(short = "r", long = "rotation")]
        /// Plate rotation file. Needed whenever a branch crosses stages.
        rotation: Option<PathBuf>,

        #[structopt(long = "prior")]
        /// Pixel prior file (class to weight); used for validation only
        /// in this variant, settlement weights drive the walk.
        prior: PathBuf,

        #[structopt(long = "ranges")]
        /// Terminal range file.
        ranges: PathBuf,

        #[structopt(short = "e", long = "equator")]
        /// Pixels at the equator; must match every input file.
        equator: usize,

        #[structopt(long = "stem", default_value = "0")]
        /// Root stem length, in years.
        stem: u64,

        #[structopt(long = "cpu", default_value = "1")]
        /// Workers for the pixel-wise computations.
        cpu: usize,

        #[structopt(long = "seed", default_value = "1")]
        /// Seed of the stochastic-map sampler.
        seed: u64,

        #[structopt(short = "o", long = "out")]
        /// Folder for the output files; names are derived per tree.
        out: PathBuf,

        #[structopt(long = "key")]
        /// Pixel key file relating landscape classes to labels.
        key: PathBuf,

        #[structopt(long = "traits")]
        /// Trait observation file (taxon, state).
        traits: PathBuf,

        #[structopt(long = "movement")]
        /// Movement weight matrix (trait, landscape, weight).
        movement: PathBuf,

        #[structopt(long = "settlement")]
        /// Settlement weight matrix (trait, landscape, weight).
        settlement: PathBuf,

        #[structopt(long = "walk-params")]
        /// Walk parameter file (steps, cats, minsteps, relaxed, param).
        walk_params: Option<PathBuf>,

        #[structopt(short = "p", long = "particles", default_value = "0")]
        /// Stochastic maps to draw.
        particles: usize,
    },
}
