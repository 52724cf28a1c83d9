//! Plate-motion rotations between adjacent stages.
//!
//! A rotation is a multimap between pixel identities across a stage
//! boundary: an old pixel maps to the young pixels its crust moved to,
//! and the inverse direction is derived from it. Deriving the inverse of
//! the inverse returns the original multimap.

use std::collections::HashMap;
use std::io::BufRead;

use isopix::{PixHasher, PixMap};

use crate::tsv::{ReadError, TsvReader};

/// All rotations of a reconstruction, keyed by (from age, to age).
///
/// Both directions are kept; whichever direction the file omits is
/// derived when the reader finishes.
#[derive(Clone, Debug, Default)]
pub struct Rotations {
    maps: HashMap<(u64, u64), PixMap<Vec<usize>>>,
}

impl Rotations {
    pub fn new() -> Rotations {
        Rotations::default()
    }

    /// Reads a rotation file: columns `from_age`, `to_age`, `from`, `to`.
    pub fn read<R: BufRead>(r: &mut TsvReader<R>, equator: usize) -> Result<Rotations, ReadError> {
        let mut rot = Rotations::new();
        while r.next_row()? {
            r.check_equator(equator)?;
            let from_age: u64 = r.parse("from_age")?;
            let to_age: u64 = r.parse("to_age")?;
            let from: usize = r.parse("from")?;
            let to: usize = r.parse("to")?;
            rot.add(from_age, to_age, from, to);
        }
        rot.derive_inverses();
        Ok(rot)
    }

    pub fn add(&mut self, from_age: u64, to_age: u64, from: usize, to: usize) {
        let pixels = self
            .maps
            .entry((from_age, to_age))
            .or_default()
            .entry(from)
            .or_default();
        if !pixels.contains(&to) {
            pixels.push(to);
        }
    }

    /// Fills every missing direction from its opposite.
    pub fn derive_inverses(&mut self) {
        let pairs: Vec<(u64, u64)> = self.maps.keys().cloned().collect();
        for (from_age, to_age) in pairs {
            if self.maps.contains_key(&(to_age, from_age)) {
                continue;
            }
            let inv = invert(&self.maps[&(from_age, to_age)]);
            self.maps.insert((to_age, from_age), inv);
        }
    }

    /// The multimap taking pixels at `from_age` to pixels at `to_age`.
    pub fn between(&self, from_age: u64, to_age: u64) -> Option<&PixMap<Vec<usize>>> {
        self.maps.get(&(from_age, to_age))
    }

    /// True if some rotation involves `stage_age`.
    pub fn covers(&self, stage_age: u64) -> bool {
        self.maps
            .keys()
            .any(|(f, t)| *f == stage_age || *t == stage_age)
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

fn invert(map: &PixMap<Vec<usize>>) -> PixMap<Vec<usize>> {
    let mut inv: PixMap<Vec<usize>> =
        HashMap::with_capacity_and_hasher(map.len(), PixHasher::default());
    for (from, tos) in map {
        for to in tos {
            let pixels = inv.entry(*to).or_default();
            if !pixels.contains(from) {
                pixels.push(*from);
            }
        }
    }
    inv
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Rotations {
        let mut rot = Rotations::new();
        // Old pixel 1 splits into young 10 and 11; old 2 and 3 collide
        // into young 12.
        rot.add(300, 100, 1, 10);
        rot.add(300, 100, 1, 11);
        rot.add(300, 100, 2, 12);
        rot.add(300, 100, 3, 12);
        rot.derive_inverses();
        rot
    }

    #[test]
    fn inverse_is_derived() {
        let rot = sample();
        let inv = rot.between(100, 300).unwrap();
        assert_eq!(inv[&10], vec![1]);
        assert_eq!(inv[&11], vec![1]);
        let mut back = inv[&12].clone();
        back.sort_unstable();
        assert_eq!(back, vec![2, 3]);
    }

    #[test]
    fn inverse_of_inverse_is_original() {
        let rot = sample();
        let fwd = rot.between(300, 100).unwrap();
        let twice = invert(&invert(fwd));
        assert_eq!(twice.len(), fwd.len());
        for (from, tos) in fwd {
            let mut a = tos.clone();
            let mut b = twice[from].clone();
            a.sort_unstable();
            b.sort_unstable();
            assert_eq!(a, b, "pixel {}", from);
        }
    }

    #[test]
    fn read_from_tsv() {
        let text = "from_age\tto_age\tequator\tfrom\tto\n300\t100\t60\t1\t10\n300\t100\t60\t1\t11\n";
        let mut r = TsvReader::new("rot.tab".to_string(), text.as_bytes()).unwrap();
        let rot = Rotations::read(&mut r, 60).unwrap();
        let fwd = rot.between(300, 100).unwrap();
        assert_eq!(fwd[&1], vec![10, 11]);
        assert!(rot.between(100, 300).is_some());
        assert!(rot.covers(300));
        assert!(!rot.covers(200));
    }
}
