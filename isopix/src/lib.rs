//! Spherical substrate for paleogeographic inference.
//!
//! The crate provides the pieces every analysis starts from:
//!
//! * An equal-area isolatitude pixelation of the sphere ([`pixel`]).
//! * The ring-neighbourhood network derived from it ([`network`]).
//! * Ring distances, with an optional precomputed distance arena ([`dist`]).
//! * The discrete spherical normal kernel ([`normal`]).
//!
//! Everything here is immutable once built and is shared by reference for
//! the duration of a likelihood pass.

use std::collections::{HashMap, HashSet};
use std::hash::BuildHasherDefault;

pub mod dist;
pub mod network;
pub mod normal;
pub mod pixel;

/// Mean Earth radius, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Hasher used for all pixel-keyed maps.
pub type PixHasher = BuildHasherDefault<ahash::AHasher>;

/// A map keyed by pixel id.
pub type PixMap<V> = HashMap<usize, V, PixHasher>;

/// A set of pixel ids.
pub type PixSet = HashSet<usize, PixHasher>;
