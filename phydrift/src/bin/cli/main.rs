use std::thread;
use std::time::Duration;

use console::style;
use structopt::StructOpt;

use phydrift::run;
use phydrift::run::progress::Progress;
use phydrift::run::{ScanMode, Setup, WalkFiles};

use crate::options::Options;

mod options;

fn main() {
    let progress = Progress::new();
    drive_progress(progress.clone());

    let result = match Options::from_args() {
        Options::Like {
            trees,
            landscape,
            rotation,
            prior,
            ranges,
            equator,
            stem,
            cpu,
            seed,
            distmat,
            out,
            lambda,
            stop,
            particles,
        } => {
            let setup = Setup {
                tree_file: trees,
                landscape_file: landscape,
                rotation_file: rotation,
                prior_file: prior,
                range_file: ranges,
                equator,
                stem,
                cpus: cpu,
                seed,
                dist_matrix: distmat,
                out_parent_folder: out,
            };
            run::max_like(&setup, lambda, stop, particles, &progress)
        }

        Options::Scan {
            trees,
            landscape,
            rotation,
            prior,
            ranges,
            equator,
            stem,
            cpu,
            seed,
            out,
            min,
            max,
            parts,
            mc,
            alpha,
            beta,
            draws,
            particles,
        } => {
            let setup = Setup {
                tree_file: trees,
                landscape_file: landscape,
                rotation_file: rotation,
                prior_file: prior,
                range_file: ranges,
                equator,
                stem,
                cpus: cpu,
                seed,
                dist_matrix: false,
                out_parent_folder: out,
            };
            let mode = match (alpha, mc) {
                (Some(alpha), _) => ScanMode::Gamma {
                    alpha,
                    beta: beta.unwrap_or(alpha),
                    draws,
                },
                (None, Some(draws)) => ScanMode::Uniform { draws },
                (None, None) => ScanMode::Grid {
                    parts: parts.unwrap_or(100),
                },
            };
            run::scan(&setup, min, max, mode, particles, &progress)
        }

        Options::Walk {
            trees,
            landscape,
            rotation,
            prior,
            ranges,
            equator,
            stem,
            cpu,
            seed,
            out,
            key,
            traits,
            movement,
            settlement,
            walk_params,
            particles,
        } => {
            let setup = Setup {
                tree_file: trees,
                landscape_file: landscape,
                rotation_file: rotation,
                prior_file: prior,
                range_file: ranges,
                equator,
                stem,
                cpus: cpu,
                seed,
                dist_matrix: false,
                out_parent_folder: out,
            };
            let files = WalkFiles {
                key_file: key,
                trait_file: traits,
                movement_file: movement,
                settlement_file: settlement,
                param_file: walk_params,
            };
            run::walk(&setup, &files, particles, &progress)
        }
    };

    // Let the progress thread settle before the final printout.
    thread::sleep(Duration::from_millis(200));

    if let Err(e) = result {
        eprintln!("{} {:#}", style("error:").red().bold(), e);
        std::process::exit(1);
    }
}

/// Drives the progress bars. Not calling this would leave them unmanaged.
fn drive_progress(progress: Progress) {
    let _ = thread::spawn(move || {
        progress.join();
    });
}
