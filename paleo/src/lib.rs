//! The time-varying earth model.
//!
//! A paleogeographic reconstruction enters an analysis as a set of
//! tab-delimited files: landscape snapshots at discrete stage ages, plate
//! rotations between adjacent stages, pixel priors keyed by landscape
//! class, and, for the random-walk variant, a pixel key and
//! movement/settlement weight matrices. This crate owns those models and
//! their readers.
//!
//! All files share one dialect: tab-delimited text, `#` comment lines, a
//! single case-insensitive header row, unknown columns ignored. The
//! [`tsv`] module implements the dialect once.

pub mod key;
pub mod landscape;
pub mod prior;
pub mod rotation;
pub mod tsv;
pub mod weights;

pub use crate::tsv::ReadError;
