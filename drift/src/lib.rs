//! Phylogenetic biogeographic inference on a rotating pixelated earth.
//!
//! Given a time-calibrated tree, terminal ranges, and the earth model of
//! the `paleo` crate on an `isopix` pixelation, this crate computes the
//! likelihood that an ancestral diffusion produced the observed ranges,
//! optimises the concentration by maximum likelihood, and samples
//! ancestral pixel trajectories by stochastic mapping. A second engine
//! replaces the continuous kernel with a discrete random walk over the
//! pixel network, conditioned on a lineage trait and a relaxed rate
//! mixture.
//!
//! The usual sequence is: read a [`tree::Tree`] and its
//! [`ranges::Ranges`], cut the tree at the landscape boundaries into a
//! [`stages::StagedTree`], then hand everything to
//! [`diffusion::DiffusionModel`] (or [`walk::WalkModel`]) directly or
//! through the [`optimize`] driver.

pub mod diffusion;
pub mod error;
pub mod optimize;
pub mod progress;
pub mod ranges;
pub mod relaxed;
pub mod report;
pub mod stages;
pub mod tree;
pub mod walk;

pub use crate::error::DriftError;
