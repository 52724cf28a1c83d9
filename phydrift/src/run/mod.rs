//! Loading inputs, running analyses, writing outputs.
//!
//! A run is: read every dataset named in the [`Setup`], build the worker
//! pool and the engine for the requested variant, process every tree of
//! the tree file, and leave one output file per tree and product in the
//! output folder. All heavy lifting lives in the `drift` crate; this
//! module is deliberately plumbing.

use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::{ThreadPool, ThreadPoolBuilder};

use drift::diffusion::mapping::Particle;
use drift::diffusion::DiffusionModel;
use drift::optimize::{self, Search};
use drift::progress::StyledProgress;
use drift::ranges::Ranges;
use drift::report;
use drift::stages::StagedTree;
use drift::tree::{self, Tree};
use drift::walk::mapping::WalkSampler;
use drift::walk::{WalkModel, WalkParams};
use isopix::dist::{DistMat, Distancer};
use isopix::network::Network;
use isopix::pixel::Pixelation;
use paleo::key::PixKey;
use paleo::landscape::Landscape;
use paleo::prior::PixPrior;
use paleo::rotation::Rotations;
use paleo::tsv::TsvReader;
use paleo::weights::{TraitObs, WeightMatrix};

pub mod progress;

use progress::Progress;

/// Everything a run needs to know besides the variant-specific knobs.
#[derive(Debug, Clone)]
pub struct Setup {
    pub tree_file: PathBuf,
    pub landscape_file: PathBuf,
    pub rotation_file: Option<PathBuf>,
    pub prior_file: PathBuf,
    pub range_file: PathBuf,
    /// Pixels at the equator; every input file must agree.
    pub equator: usize,
    /// Root stem length, in years.
    pub stem: u64,
    pub cpus: usize,
    pub seed: u64,
    /// Precompute the N x N ring-distance arena.
    pub dist_matrix: bool,
    pub out_parent_folder: PathBuf,
}

impl Setup {
    /// Output file for one tree and product, e.g. `out/vultures_scan.tab`.
    fn out_file(&self, tree: &str, kind: &str) -> PathBuf {
        let mut f = self.out_parent_folder.clone();
        f.push(format!("{}_{}", tree, kind));
        f.set_extension("tab");
        f
    }

    fn create_out_folder(&self) -> Result<()> {
        fs::DirBuilder::new()
            .recursive(true)
            .create(&self.out_parent_folder)
            .with_context(|| {
                format!("creating output folder {}", self.out_parent_folder.display())
            })
    }
}

/// The datasets shared by every variant.
pub struct Inputs {
    pub pix: Pixelation,
    pub landscape: Landscape,
    pub rotations: Rotations,
    pub prior: PixPrior,
    pub ranges: Ranges,
    pub trees: Vec<Tree>,
}

impl Inputs {
    pub fn load(setup: &Setup) -> Result<Inputs> {
        let pix = Pixelation::new(setup.equator);

        let mut r = TsvReader::open(&setup.landscape_file)?;
        let landscape = Landscape::read(&mut r, setup.equator)?;
        if landscape.num_stages() == 0 {
            bail!(
                "{}: landscape defines no stages",
                setup.landscape_file.display()
            );
        }

        let rotations = match &setup.rotation_file {
            Some(f) => {
                let mut r = TsvReader::open(f)?;
                Rotations::read(&mut r, setup.equator)?
            }
            None => Rotations::new(),
        };

        let mut r = TsvReader::open(&setup.prior_file)?;
        let prior = PixPrior::read(&mut r)?;

        let mut r = TsvReader::open(&setup.range_file)?;
        let ranges = Ranges::read(&mut r, setup.equator)?;

        let mut r = TsvReader::open(&setup.tree_file)?;
        let trees = tree::read(&mut r)?;
        if trees.is_empty() {
            bail!("{}: no trees found", setup.tree_file.display());
        }

        Ok(Inputs {
            pix,
            landscape,
            rotations,
            prior,
            ranges,
            trees,
        })
    }
}

fn worker_pool(cpus: usize) -> Result<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(cpus)
        .build()
        .context("building the worker pool")
}

/// Maximum-likelihood search, with conditional likelihoods (and
/// optionally stochastic maps) written at the optimum.
pub fn max_like(
    setup: &Setup,
    lambda: f64,
    stop: f64,
    particles: usize,
    progress: &Progress,
) -> Result<()> {
    let inputs = Inputs::load(setup)?;
    setup.create_out_folder()?;
    let pool = worker_pool(setup.cpus)?;
    let arena = if setup.dist_matrix {
        Some(DistMat::new(&inputs.pix))
    } else {
        None
    };

    let spinner = progress.new_main_spinner();
    spinner.enable_steady_tick(500);

    for tree in &inputs.trees {
        spinner.set_message(&format!("tree {}: searching", tree.name()));
        let staged = StagedTree::new(tree, &inputs.landscape, setup.stem);
        staged.check_rotations(&inputs.rotations)?;
        let model = DiffusionModel {
            pix: &inputs.pix,
            landscape: &inputs.landscape,
            rotations: &inputs.rotations,
            prior: &inputs.prior,
            dist: match &arena {
                Some(m) => Distancer::Arena(m),
                None => Distancer::Lazy(&inputs.pix),
            },
            pool: &pool,
        };

        let (tap, log) = report::ScanWriter::init_and_run(setup.out_file(tree.name(), "scan"))?;
        let mut search = Search::new(&model, tree, &staged, &inputs.ranges, lambda, Some(tap))?;
        let (best, like) = search.run(stop, progress)?;
        let conds = search.conditionals()?;
        drop(search);
        let _ = log.join();
        spinner.println(&format!(
            "tree {}: lambda {:.4}, stdDev {:.2} km/Myr, logLike {:.4}",
            tree.name(),
            best,
            optimize::std_dev_km(best, &inputs.pix),
            like
        ));

        let file = File::create(setup.out_file(tree.name(), "like"))?;
        let mut w = BufWriter::new(file);
        report::write_conditionals(&mut w, tree, &staged, &conds, setup.equator)?;

        if particles > 0 {
            spinner.set_message(&format!("tree {}: mapping", tree.name()));
            let sampled = sample_particles(&model, tree, &staged, &conds, particles, setup.seed);
            if sampled.len() < particles {
                spinner.println(&format!(
                    "tree {}: {} of {} particles unsampled",
                    tree.name(),
                    particles - sampled.len(),
                    particles
                ));
            }
            let file = File::create(setup.out_file(tree.name(), "particles"))?;
            let mut w = BufWriter::new(file);
            report::write_particles(&mut w, tree, &sampled, best, setup.equator)?;
        }
    }
    spinner.finish_with_message("all trees done");
    Ok(())
}

fn sample_particles(
    model: &DiffusionModel,
    tree: &Tree,
    staged: &StagedTree,
    conds: &drift::diffusion::Conditionals,
    particles: usize,
    seed: u64,
) -> Vec<Particle> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..particles)
        .filter_map(|_| model.simulate(tree, staged, conds, &mut rng))
        .collect()
}

/// How the concentration axis is visited by [`scan`].
#[derive(Debug, Clone, Copy)]
pub enum ScanMode {
    /// Evenly spaced midpoints of the bracket.
    Grid { parts: usize },
    /// Uniform draws from the bracket.
    Uniform { draws: usize },
    /// Gamma(alpha, beta) draws, each optionally followed by stochastic
    /// maps.
    Gamma {
        alpha: f64,
        beta: f64,
        draws: usize,
    },
}

/// Likelihood integration over the concentration axis.
pub fn scan(
    setup: &Setup,
    min: f64,
    max: f64,
    mode: ScanMode,
    particles: usize,
    progress: &Progress,
) -> Result<()> {
    if !(min > 0.0 && max > min) {
        bail!("bad concentration bracket [{}, {}]", min, max);
    }
    let inputs = Inputs::load(setup)?;
    setup.create_out_folder()?;
    let pool = worker_pool(setup.cpus)?;
    let mut rng = SmallRng::seed_from_u64(setup.seed);

    let lambdas = match mode {
        ScanMode::Grid { parts } => optimize::lambda_grid(min, max, parts),
        ScanMode::Uniform { draws } => optimize::lambda_uniform(min, max, draws, &mut rng),
        ScanMode::Gamma { alpha, beta, draws } => {
            optimize::lambda_gamma(alpha, beta, draws, &mut rng)?
        }
    };

    let spinner = progress.new_main_spinner();
    spinner.enable_steady_tick(500);

    for tree in &inputs.trees {
        spinner.set_message(&format!(
            "tree {}: scanning {} concentrations",
            tree.name(),
            lambdas.len()
        ));
        let staged = StagedTree::new(tree, &inputs.landscape, setup.stem);
        staged.check_rotations(&inputs.rotations)?;
        let model = DiffusionModel {
            pix: &inputs.pix,
            landscape: &inputs.landscape,
            rotations: &inputs.rotations,
            prior: &inputs.prior,
            dist: Distancer::Lazy(&inputs.pix),
            pool: &pool,
        };

        let (tap, log) = report::ScanWriter::init_and_run(setup.out_file(tree.name(), "scan"))?;
        optimize::scan(&model, tree, &staged, &inputs.ranges, &lambdas, Some(tap))?;
        let _ = log.join();

        // Distribution sampling also maps at every draw.
        if let ScanMode::Gamma { .. } = mode {
            if particles > 0 {
                spinner.set_message(&format!("tree {}: mapping draws", tree.name()));
                let file = File::create(setup.out_file(tree.name(), "particles"))?;
                let mut w = BufWriter::new(file);
                report::particle_header(&mut w)?;
                let mut next_id = 0;
                for lambda in &lambdas {
                    let conds =
                        model.down_pass(tree, &staged, &inputs.ranges, *lambda)?;
                    let sampled =
                        sample_particles(&model, tree, &staged, &conds, particles, setup.seed);
                    next_id = report::write_particle_rows(
                        &mut w,
                        tree,
                        &sampled,
                        *lambda,
                        setup.equator,
                        next_id,
                    )?;
                }
            }
        }
    }
    spinner.finish_with_message("scan done");
    Ok(())
}

/// The extra datasets of the walk variant.
#[derive(Debug, Clone)]
pub struct WalkFiles {
    pub key_file: PathBuf,
    pub trait_file: PathBuf,
    pub movement_file: PathBuf,
    pub settlement_file: PathBuf,
    pub param_file: Option<PathBuf>,
}

/// Random-walk down-pass and stochastic mapping.
pub fn walk(
    setup: &Setup,
    files: &WalkFiles,
    particles: usize,
    progress: &Progress,
) -> Result<()> {
    let inputs = Inputs::load(setup)?;
    setup.create_out_folder()?;
    let pool = worker_pool(setup.cpus)?;
    let net = Network::new(&inputs.pix);

    let mut r = TsvReader::open(&files.key_file)?;
    let key = PixKey::read(&mut r)?;
    let mut r = TsvReader::open(&files.trait_file)?;
    let traits = TraitObs::read(&mut r)?;
    let mut r = TsvReader::open(&files.movement_file)?;
    let movement = WeightMatrix::read(&mut r)?;
    let mut r = TsvReader::open(&files.settlement_file)?;
    let settlement = WeightMatrix::read(&mut r)?;
    let params = match &files.param_file {
        Some(f) => {
            let mut r = TsvReader::open(f)?;
            WalkParams::read(&mut r)?
        }
        None => WalkParams::default(),
    };

    let spinner = progress.new_main_spinner();
    spinner.enable_steady_tick(500);

    for tree in &inputs.trees {
        spinner.set_message(&format!("tree {}: walking", tree.name()));
        let staged = StagedTree::new(tree, &inputs.landscape, setup.stem);
        staged.check_rotations(&inputs.rotations)?;
        let model = WalkModel {
            pix: &inputs.pix,
            net: &net,
            landscape: &inputs.landscape,
            rotations: &inputs.rotations,
            key: &key,
            movement: &movement,
            settlement: &settlement,
            traits: &traits,
            params,
            pool: &pool,
        };
        let conds = model.down_pass(tree, &staged, &inputs.ranges)?;
        spinner.println(&format!(
            "tree {}: walk logLike {:.4}",
            tree.name(),
            conds.log_like()
        ));

        let file = File::create(setup.out_file(tree.name(), "walk-like"))?;
        let mut w = BufWriter::new(file);
        report::write_walk_conditionals(&mut w, tree, &staged, &conds, &params, setup.equator)?;

        if particles > 0 {
            spinner.set_message(&format!("tree {}: mapping", tree.name()));
            let sampler = WalkSampler::new(&model, tree, &staged, &conds);
            let mut rng = SmallRng::seed_from_u64(setup.seed);
            let sampled: Vec<_> = (0..particles)
                .filter_map(|_| sampler.particle(&mut rng))
                .collect();
            if sampled.len() < particles {
                spinner.println(&format!(
                    "tree {}: {} of {} particles unsampled",
                    tree.name(),
                    particles - sampled.len(),
                    particles
                ));
            }
            let file = File::create(setup.out_file(tree.name(), "walk-particles"))?;
            let mut w = BufWriter::new(file);
            report::write_walk_particles(&mut w, tree, &sampled, &conds, setup.equator)?;
        }
    }
    spinner.finish_with_message("all trees done");
    Ok(())
}
