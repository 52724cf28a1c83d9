//! Movement and settlement weights, and trait observations.
//!
//! The walk variant conditions a lineage's movement on a categorical
//! trait: a weight matrix assigns every (trait state, landscape label)
//! pair a non-negative scalar. Settlement weights govern staying (and the
//! walk's pixel prior), movement weights govern stepping onto a
//! neighbour. Trait observations tie terminal taxa to the states they
//! were scored for; a taxon may admit several states.

use std::collections::HashMap;
use std::io::BufRead;

use crate::key::PixKey;
use crate::tsv::{ReadError, TsvReader};

/// A (trait state, landscape label) -> weight matrix.
#[derive(Clone, Debug, Default)]
pub struct WeightMatrix {
    w: HashMap<(String, String), f64>,
    states: Vec<String>,
}

impl WeightMatrix {
    pub fn new() -> WeightMatrix {
        WeightMatrix::default()
    }

    /// Reads a matrix file: columns `trait`, `landscape`, `weight`.
    pub fn read<R: BufRead>(r: &mut TsvReader<R>) -> Result<WeightMatrix, ReadError> {
        let mut m = WeightMatrix::new();
        while r.next_row()? {
            let state = r.field("trait")?.to_lowercase();
            let label = r.field("landscape")?.to_lowercase();
            let w: f64 = r.parse("weight")?;
            if w < 0.0 || !w.is_finite() {
                return Err(ReadError::Field {
                    file: r.file().to_string(),
                    row: r.row(),
                    field: "weight",
                    msg: format!("weight must be finite and non-negative, got {}", w),
                });
            }
            m.set(&state, &label, w);
        }
        Ok(m)
    }

    pub fn set(&mut self, state: &str, label: &str, weight: f64) {
        let state = state.to_lowercase();
        if !self.states.contains(&state) {
            self.states.push(state.clone());
        }
        self.w.insert((state, label.to_lowercase()), weight);
    }

    /// Weight of `state` on `label`; unlisted pairs weigh 0.
    pub fn weight(&self, state: &str, label: &str) -> f64 {
        self.w
            .get(&(state.to_lowercase(), label.to_lowercase()))
            .cloned()
            .unwrap_or(0.0)
    }

    /// Weight of `state` on landscape `class`, resolved through the key.
    /// Classes without a label weigh 0.
    pub fn weight_of_class(&self, state: &str, class: u8, key: &PixKey) -> f64 {
        match key.label(class) {
            Some(label) => self.weight(state, label),
            None => 0.0,
        }
    }

    /// Trait states seen in the matrix, in file order.
    pub fn states(&self) -> &[String] {
        &self.states
    }
}

/// Observed trait states per terminal taxon.
#[derive(Clone, Debug, Default)]
pub struct TraitObs {
    by_taxon: HashMap<String, Vec<String>>,
}

impl TraitObs {
    pub fn new() -> TraitObs {
        TraitObs::default()
    }

    /// Reads a trait file: columns `taxon`, `state`; one state per row,
    /// several rows per taxon allowed.
    pub fn read<R: BufRead>(r: &mut TsvReader<R>) -> Result<TraitObs, ReadError> {
        let mut obs = TraitObs::new();
        while r.next_row()? {
            let taxon = r.field("taxon")?.to_string();
            let state = r.field("state")?.to_lowercase();
            obs.add(&taxon, &state);
        }
        Ok(obs)
    }

    pub fn add(&mut self, taxon: &str, state: &str) {
        let states = self.by_taxon.entry(taxon.trim().to_string()).or_default();
        let state = state.to_lowercase();
        if !states.contains(&state) {
            states.push(state);
        }
    }

    pub fn states(&self, taxon: &str) -> Option<&[String]> {
        self.by_taxon.get(taxon.trim()).map(|v| v.as_slice())
    }

    pub fn taxa(&self) -> impl Iterator<Item = &str> {
        self.by_taxon.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn matrix_lookup_through_key() {
        let mut key = PixKey::new();
        key.set_label(0, "ocean");
        key.set_label(1, "lowland");

        let mut m = WeightMatrix::new();
        m.set("flier", "ocean", 0.1);
        m.set("flier", "lowland", 1.0);
        m.set("walker", "ocean", 0.0);

        assert_eq!(m.weight("FLIER", "Ocean"), 0.1);
        assert_eq!(m.weight_of_class("flier", 1, &key), 1.0);
        assert_eq!(m.weight_of_class("walker", 0, &key), 0.0);
        // Class 5 has no label.
        assert_eq!(m.weight_of_class("flier", 5, &key), 0.0);
        assert_eq!(m.states(), &["flier".to_string(), "walker".to_string()]);
    }

    #[test]
    fn traits_accumulate_per_taxon() {
        let text = "taxon\tstate\nHomo sapiens\twalker\nHomo sapiens\tswimmer\nPan\twalker\n";
        let mut r = TsvReader::new("traits.tab".to_string(), text.as_bytes()).unwrap();
        let obs = TraitObs::read(&mut r).unwrap();
        assert_eq!(
            obs.states("Homo sapiens").unwrap(),
            &["walker".to_string(), "swimmer".to_string()]
        );
        assert_eq!(obs.states("Pan").unwrap().len(), 1);
        assert!(obs.states("Gorilla").is_none());
    }
}
