//! Time-indexed landscape snapshots.
//!
//! A landscape assigns every pixel an integer class (ocean, tundra, ...)
//! at each of a discrete set of stage ages, in years, larger being older.
//! Pixels missing from a snapshot are class 0. Node ages rarely fall on a
//! stage age exactly; [`Landscape::closest_stage`] resolves an arbitrary
//! age to the nearest stage, ties going to the older one.

use std::collections::BTreeMap;

use isopix::PixMap;

use crate::tsv::{ReadError, TsvReader};
use std::io::BufRead;

#[derive(Clone, Debug, Default)]
pub struct Landscape {
    stages: BTreeMap<u64, PixMap<u8>>,
}

impl Landscape {
    pub fn new() -> Landscape {
        Landscape::default()
    }

    /// Reads a landscape file: columns `age`, `equator`, `pixel`, `class`.
    pub fn read<R: BufRead>(r: &mut TsvReader<R>, equator: usize) -> Result<Landscape, ReadError> {
        let mut ls = Landscape::new();
        while r.next_row()? {
            r.check_equator(equator)?;
            let age: u64 = r.parse("age")?;
            let pixel: usize = r.parse("pixel")?;
            let class: u8 = r.parse("class")?;
            ls.set(age, pixel, class);
        }
        Ok(ls)
    }

    pub fn set(&mut self, age: u64, pixel: usize, class: u8) {
        self.stages.entry(age).or_default().insert(pixel, class);
    }

    /// Stage ages, youngest first.
    pub fn ages(&self) -> impl Iterator<Item = u64> + '_ {
        self.stages.keys().cloned()
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    /// The snapshot at exactly `stage_age`, if one exists.
    pub fn stage(&self, stage_age: u64) -> Option<&PixMap<u8>> {
        self.stages.get(&stage_age)
    }

    /// The stage age closest to `age`; ties resolve to the older stage.
    ///
    /// Panics if the landscape holds no stage at all.
    pub fn closest_stage(&self, age: u64) -> u64 {
        assert!(!self.stages.is_empty(), "landscape without stages");
        let older = self.stages.range(age..).next().map(|(a, _)| *a);
        let younger = self.stages.range(..=age).next_back().map(|(a, _)| *a);
        match (younger, older) {
            (Some(y), Some(o)) => {
                if age - y < o - age {
                    y
                } else {
                    o
                }
            }
            (Some(y), None) => y,
            (None, Some(o)) => o,
            (None, None) => unreachable!(),
        }
    }

    /// Class of `pixel` at `stage_age`; unmapped pixels are class 0.
    #[inline]
    pub fn class(&self, stage_age: u64, pixel: usize) -> u8 {
        self.stages
            .get(&stage_age)
            .and_then(|m| m.get(&pixel))
            .cloned()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Landscape {
        let mut ls = Landscape::new();
        ls.set(0, 1, 2);
        ls.set(0, 2, 3);
        ls.set(100, 1, 1);
        ls.set(300, 5, 4);
        ls
    }

    #[test]
    fn closest_stage_prefers_older_on_tie() {
        let ls = sample();
        assert_eq!(ls.closest_stage(0), 0);
        assert_eq!(ls.closest_stage(40), 0);
        assert_eq!(ls.closest_stage(50), 100);
        assert_eq!(ls.closest_stage(60), 100);
        assert_eq!(ls.closest_stage(200), 300);
        assert_eq!(ls.closest_stage(1_000_000), 300);
    }

    #[test]
    fn unmapped_pixels_are_class_zero() {
        let ls = sample();
        assert_eq!(ls.class(0, 1), 2);
        assert_eq!(ls.class(0, 99), 0);
    }

    #[test]
    fn read_from_tsv() {
        let text = "age\tequator\tpixel\tclass\n0\t60\t1\t2\n100\t60\t1\t1\n";
        let mut r = TsvReader::new("ls.tab".to_string(), text.as_bytes()).unwrap();
        let ls = Landscape::read(&mut r, 60).unwrap();
        assert_eq!(ls.num_stages(), 2);
        assert_eq!(ls.class(0, 1), 2);
        assert_eq!(ls.class(100, 1), 1);
    }

    #[test]
    fn read_rejects_wrong_equator() {
        let text = "age\tequator\tpixel\tclass\n0\t120\t1\t2\n";
        let mut r = TsvReader::new("ls.tab".to_string(), text.as_bytes()).unwrap();
        assert!(matches!(Landscape::read(&mut r, 60), Err(ReadError::Equator { .. })));
    }
}
