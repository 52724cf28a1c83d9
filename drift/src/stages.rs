//! Cutting branches at stage boundaries.
//!
//! A node's lifetime runs from its parent's age down to its own age (the
//! root gets an optional stem prepended). Every landscape stage age
//! strictly inside that interval cuts it, so the branch becomes a vector
//! of time stages, oldest first:
//!
//! * slot 0 sits at the parent's age with duration 0 and carries the
//!   post-split conditional, never a transition;
//! * every following slot carries the span up to the previous slot, in
//!   Myr, and (for the diffusion engine) a kernel at `lambda / duration`;
//! * the last slot sits at the node's own age and holds the observed
//!   range (terminal) or the split product (internal).
//!
//! The skeleton built here is immutable and carries no likelihoods;
//! engines keep their own per-slot stores, so one skeleton serves every
//! evaluation of a search. Building it twice from the same inputs yields
//! identical slots.

use paleo::landscape::Landscape;
use paleo::rotation::Rotations;

use crate::error::DriftError;
use crate::tree::Tree;

const MYR: f64 = 1e6;

/// One time stage of a branch.
#[derive(Clone, Debug, PartialEq)]
pub struct StageSlot {
    /// Age of the younger end, in years.
    pub age: u64,
    /// Landscape stage age governing this slot (the closest one).
    pub frame: u64,
    /// Span up to the previous (older) slot, in Myr. 0 for slot 0.
    pub duration: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StagedNode {
    /// Oldest to youngest. Never empty.
    pub slots: Vec<StageSlot>,
}

impl StagedNode {
    /// Index of the youngest slot.
    #[inline]
    pub fn last(&self) -> usize {
        self.slots.len() - 1
    }
}

/// The staged tree: one [`StagedNode`] per tree node, same indexing as
/// the tree arena.
#[derive(Clone, Debug, PartialEq)]
pub struct StagedTree {
    nodes: Vec<StagedNode>,
}

impl StagedTree {
    /// Cuts every branch of `tree` at the stage ages of `landscape`.
    /// `stem_years` extends the root's lifetime beyond its age.
    pub fn new(tree: &Tree, landscape: &Landscape, stem_years: u64) -> StagedTree {
        let bounds: Vec<u64> = landscape.ages().collect();

        let nodes = tree
            .nodes()
            .map(|node| {
                let top = match node.parent {
                    Some(p) => tree.node(p).age,
                    None => node.age + stem_years,
                };

                let mut slots = vec![StageSlot {
                    age: top,
                    frame: landscape.closest_stage(top),
                    duration: 0.0,
                }];
                for b in bounds.iter().rev() {
                    if *b >= top || *b <= node.age {
                        continue;
                    }
                    let prev = slots.last().unwrap().age;
                    slots.push(StageSlot {
                        age: *b,
                        frame: landscape.closest_stage(*b),
                        duration: (prev - *b) as f64 / MYR,
                    });
                }
                if node.age < top {
                    let prev = slots.last().unwrap().age;
                    slots.push(StageSlot {
                        age: node.age,
                        frame: landscape.closest_stage(node.age),
                        duration: (prev - node.age) as f64 / MYR,
                    });
                }
                StagedNode { slots }
            })
            .collect();

        StagedTree { nodes }
    }

    #[inline]
    pub fn node(&self, at: usize) -> &StagedNode {
        &self.nodes[at]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &StagedNode> {
        self.nodes.iter()
    }

    /// Checks that every frame change along every branch is covered by
    /// the rotation model, in both directions.
    pub fn check_rotations(&self, rotations: &Rotations) -> Result<(), DriftError> {
        for node in &self.nodes {
            for pair in node.slots.windows(2) {
                let (old, young) = (&pair[0], &pair[1]);
                if old.frame == young.frame {
                    continue;
                }
                if rotations.between(young.frame, old.frame).is_none() {
                    return Err(DriftError::MissingRotation { age: young.frame });
                }
                if rotations.between(old.frame, young.frame).is_none() {
                    return Err(DriftError::MissingRotation { age: old.frame });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tree::Tree;

    fn landscape() -> Landscape {
        let mut ls = Landscape::new();
        for age in &[0u64, 1_000_000, 2_000_000, 3_000_000] {
            ls.set(*age, 0, 1);
        }
        ls
    }

    fn tree() -> Tree {
        Tree::new(
            "t",
            vec![
                (0, 0, 2_500_000, None),
                (1, 0, 400_000, Some("a".to_string())),
                (2, 0, 0, Some("b".to_string())),
            ],
        )
        .unwrap()
    }

    #[test]
    fn cuts_at_interior_boundaries() {
        let staged = StagedTree::new(&tree(), &landscape(), 0);

        // Terminal "a": lifetime [2.5, 0.4] Myr cut at 2 and 1.
        let a = staged.node(1);
        let ages: Vec<u64> = a.slots.iter().map(|s| s.age).collect();
        assert_eq!(ages, vec![2_500_000, 2_000_000, 1_000_000, 400_000]);
        assert_eq!(a.slots[0].duration, 0.0);
        assert!((a.slots[1].duration - 0.5).abs() < 1e-12);
        assert!((a.slots[2].duration - 1.0).abs() < 1e-12);
        assert!((a.slots[3].duration - 0.6).abs() < 1e-12);

        // Root without stem: one zero-duration slot at its own age.
        let root = staged.node(0);
        assert_eq!(root.slots.len(), 1);
        assert_eq!(root.slots[0].age, 2_500_000);
        assert_eq!(root.slots[0].duration, 0.0);
    }

    #[test]
    fn root_stem_prepends_lifetime() {
        let staged = StagedTree::new(&tree(), &landscape(), 1_000_000);
        let root = staged.node(0);
        let ages: Vec<u64> = root.slots.iter().map(|s| s.age).collect();
        assert_eq!(ages, vec![3_500_000, 3_000_000, 2_500_000]);
        assert_eq!(root.slots[0].duration, 0.0);
        assert!((root.slots[1].duration - 0.5).abs() < 1e-12);
    }

    #[test]
    fn frames_snap_to_closest_stage() {
        let staged = StagedTree::new(&tree(), &landscape(), 0);
        // 2.5 Myr ties between 2 and 3; ties go older.
        assert_eq!(staged.node(0).slots[0].frame, 3_000_000);
        // 0.4 Myr is closest to 0.
        let a = staged.node(1);
        assert_eq!(a.slots[a.last()].frame, 0);
    }

    #[test]
    fn construction_is_idempotent() {
        let a = StagedTree::new(&tree(), &landscape(), 250_000);
        let b = StagedTree::new(&tree(), &landscape(), 250_000);
        assert_eq!(a, b);
    }

    #[test]
    fn missing_rotation_is_flagged() {
        let staged = StagedTree::new(&tree(), &landscape(), 0);
        let rot = Rotations::new();
        assert!(matches!(
            staged.check_rotations(&rot),
            Err(DriftError::MissingRotation { .. })
        ));
    }
}
