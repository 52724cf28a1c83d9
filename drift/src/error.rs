//! Errors surfaced to the driver.
//!
//! Numerical underflow is never an error: the engines absorb it locally
//! by falling back to max expressions. Everything structural ends up
//! here and aborts the running analysis.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriftError {
    /// A mandatory dataset is missing or inconsistent with the others.
    #[error("configuration: {0}")]
    Config(String),

    /// A landscape stage that the staged tree needs has no rotation.
    #[error("configuration: landscape stage {age} is not covered by the rotation model")]
    MissingRotation { age: u64 },

    #[error("terminal {taxon:?} has no defined range")]
    NoRange { taxon: String },

    #[error("taxon {taxon:?} has no trait states")]
    NoTraits { taxon: String },

    #[error("taxon {taxon:?} is not a terminal of tree {tree:?}")]
    UnknownTaxon { taxon: String, tree: String },

    #[error("concentration must be positive, got {lambda}")]
    BadLambda { lambda: f64 },

    #[error("step must be positive, got {step}")]
    BadStep { step: f64 },

    #[error(transparent)]
    Read(#[from] paleo::ReadError),
}
