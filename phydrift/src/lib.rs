//! Driver for phylogenetic biogeographic analyses.
//!
//! The [`run`] module loads the input files, assembles the engines of the
//! `drift` crate, and writes the output files; the `phydrift` binary is a
//! thin structopt front end over it.

pub mod run;
