//! Writers for the core's three output files.
//!
//! All outputs use the same tab-delimited dialect as the inputs. Rows are
//! sorted, so two runs over the same data produce byte-identical files.
//! The scan writer runs on its own thread behind a channel, so records
//! appear in the file while a search is still climbing.

use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Sender};
use std::thread;
use std::thread::JoinHandle;

use itertools::Itertools;

use crate::diffusion::mapping::Particle;
use crate::diffusion::Conditionals;
use crate::optimize::LikeRecord;
use crate::relaxed::Relaxed;
use crate::stages::StagedTree;
use crate::tree::Tree;
use crate::walk::downpass::WalkConditionals;
use crate::walk::mapping::WalkParticle;
use crate::walk::WalkParams;

/// Writes the diffusion conditional-likelihood file.
pub fn write_conditionals<W: Write>(
    w: &mut W,
    tree: &Tree,
    staged: &StagedTree,
    conds: &Conditionals,
    equator: usize,
) -> io::Result<()> {
    writeln!(w, "tree\tnode\tage\ttype\tlambda\tequator\tpixel\tvalue")?;
    for at in 0..tree.len() {
        let node = tree.node(at);
        for (slot, stage) in staged.node(at).slots.iter().enumerate() {
            for (pixel, value) in conds.slot(at, slot).iter().sorted_by_key(|(p, _)| *p) {
                writeln!(
                    w,
                    "{}\t{}\t{}\tlog-like\t{}\t{}\t{}\t{}",
                    tree.name(),
                    node.id,
                    stage.age,
                    conds.lambda(),
                    equator,
                    pixel,
                    value
                )?;
            }
        }
    }
    Ok(())
}

/// Writes the walk conditional-likelihood file, one row per category and
/// trait state.
pub fn write_walk_conditionals<W: Write>(
    w: &mut W,
    tree: &Tree,
    staged: &StagedTree,
    conds: &WalkConditionals,
    params: &WalkParams,
    equator: usize,
) -> io::Result<()> {
    writeln!(
        w,
        "tree\tnode\tage\ttype\tsteps\trelaxed\tcats\tcat\ttrait\tequator\tpixel\tvalue"
    )?;
    let relaxed = relaxed_name(params.relaxed);
    for at in 0..tree.len() {
        let node = tree.node(at);
        for (slot, stage) in staged.node(at).slots.iter().enumerate() {
            for cat in 0..conds.multipliers().len() {
                for (t, state) in conds.states().iter().enumerate() {
                    for (pixel, value) in conds
                        .slot(at, slot, cat, t)
                        .iter()
                        .enumerate()
                        .filter(|(_, v)| v.is_finite())
                    {
                        writeln!(
                            w,
                            "{}\t{}\t{}\tlog-like\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                            tree.name(),
                            node.id,
                            stage.age,
                            params.steps_per_myr,
                            relaxed,
                            params.cats,
                            cat,
                            state,
                            equator,
                            pixel,
                            value
                        )?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Writes the diffusion particle file.
pub fn write_particles<W: Write>(
    w: &mut W,
    tree: &Tree,
    particles: &[Particle],
    lambda: f64,
    equator: usize,
) -> io::Result<()> {
    particle_header(w)?;
    write_particle_rows(w, tree, particles, lambda, equator, 0)?;
    Ok(())
}

pub fn particle_header<W: Write>(w: &mut W) -> io::Result<()> {
    writeln!(w, "tree\tparticle\tnode\tage\tlambda\tequator\tfrom\tto")
}

/// Appends particle rows numbered from `first_id`; returns the next free
/// particle id. Used when several concentrations share one file.
pub fn write_particle_rows<W: Write>(
    w: &mut W,
    tree: &Tree,
    particles: &[Particle],
    lambda: f64,
    equator: usize,
    first_id: usize,
) -> io::Result<usize> {
    for (off, particle) in particles.iter().enumerate() {
        for at in 0..tree.len() {
            for seg in &particle.segments[at] {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    tree.name(),
                    first_id + off,
                    tree.node(at).id,
                    seg.age,
                    lambda,
                    equator,
                    seg.from,
                    seg.to
                )?;
            }
        }
    }
    Ok(first_id + particles.len())
}

/// Writes the walk particle file, with the stepwise path spelled out as
/// hyphen-separated `trait:pixel` entries.
pub fn write_walk_particles<W: Write>(
    w: &mut W,
    tree: &Tree,
    particles: &[WalkParticle],
    conds: &WalkConditionals,
    equator: usize,
) -> io::Result<()> {
    writeln!(
        w,
        "tree\tparticle\tnode\tage\tequator\tfrom\tto\tpath\ttrait_start\ttrait_end\tcat"
    )?;
    let states = conds.states();
    for (id, particle) in particles.iter().enumerate() {
        for at in 0..tree.len() {
            for seg in &particle.segments[at] {
                let path = seg
                    .path
                    .iter()
                    .map(|(t, p)| format!("{}:{}", states[*t], p))
                    .join("-");
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    tree.name(),
                    id,
                    tree.node(at).id,
                    seg.age,
                    equator,
                    seg.from,
                    seg.to,
                    path,
                    states[seg.state],
                    states[seg.state],
                    seg.cat
                )?;
            }
        }
    }
    Ok(())
}

fn relaxed_name(relaxed: Option<Relaxed>) -> &'static str {
    match relaxed {
        None => "none",
        Some(Relaxed::Gamma { .. }) => "gamma",
        Some(Relaxed::LogNormal { .. }) => "lognormal",
    }
}

/// A scan file that grows while the search runs: records are posted on
/// the returned channel and written by a dedicated thread. Dropping the
/// sender finishes the file; join the handle to be sure it is flushed.
pub struct ScanWriter;

impl ScanWriter {
    pub fn init_and_run(path: PathBuf) -> io::Result<(Sender<LikeRecord>, JoinHandle<()>)> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        writeln!(out, "tree\tlambda\tstdDev\tlogLike")?;

        let (tx, rx) = channel::<LikeRecord>();
        let handle = thread::spawn(move || {
            for rec in rx {
                // An unwritable row aborts the logger, not the search.
                if writeln!(
                    out,
                    "{}\t{}\t{}\t{}",
                    rec.tree, rec.lambda, rec.std_dev, rec.log_like
                )
                .is_err()
                {
                    break;
                }
            }
            let _ = out.flush();
        });
        Ok((tx, handle))
    }
}

/// Writes scan records in one go, for callers that collected them.
pub fn write_scan<W: Write>(w: &mut W, records: &[LikeRecord]) -> io::Result<()> {
    writeln!(w, "tree\tlambda\tstdDev\tlogLike")?;
    for rec in records {
        writeln!(
            w,
            "{}\t{}\t{}\t{}",
            rec.tree, rec.lambda, rec.std_dev, rec.log_like
        )?;
    }
    Ok(())
}
