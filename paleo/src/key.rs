//! The pixel key: landscape classes and their labels.
//!
//! The key relates the integer classes of a landscape to human labels
//! (and display colors, which this crate only carries through). The walk
//! variant uses the labels to look up movement and settlement weights.

use std::collections::HashMap;
use std::io::BufRead;

use crate::tsv::{ReadError, TsvReader};

#[derive(Clone, Debug, Default)]
pub struct PixKey {
    /// class -> label; labels are stored lower-cased.
    label: HashMap<u8, String>,
    /// class -> "r,g,b" as given in the file.
    rgb: HashMap<u8, String>,
    gray: HashMap<u8, u8>,
}

impl PixKey {
    pub fn new() -> PixKey {
        PixKey::default()
    }

    /// Reads a pixel key file: columns `class`, `rgb`, and optionally
    /// `gray` and `label`.
    pub fn read<R: BufRead>(r: &mut TsvReader<R>) -> Result<PixKey, ReadError> {
        let mut key = PixKey::new();
        while r.next_row()? {
            let class: u8 = r.parse("class")?;
            if let Ok(rgb) = r.field("rgb") {
                key.rgb.insert(class, rgb.to_string());
            }
            if let Ok(gray) = r.field("gray") {
                if !gray.is_empty() {
                    let gray = gray.parse().map_err(|e| ReadError::Field {
                        file: r.file().to_string(),
                        row: r.row(),
                        field: "gray",
                        msg: format!("{:?}: {}", gray, e),
                    })?;
                    key.gray.insert(class, gray);
                }
            }
            if let Ok(label) = r.field("label") {
                if !label.is_empty() {
                    key.label.insert(class, label.to_lowercase());
                }
            }
        }
        Ok(key)
    }

    pub fn set_label(&mut self, class: u8, label: &str) {
        self.label.insert(class, label.to_lowercase());
    }

    /// Label of `class`, lower-cased.
    pub fn label(&self, class: u8) -> Option<&str> {
        self.label.get(&class).map(|s| s.as_str())
    }

    pub fn class_of(&self, label: &str) -> Option<u8> {
        let label = label.to_lowercase();
        self.label
            .iter()
            .find(|(_, l)| **l == label)
            .map(|(c, _)| *c)
    }

    pub fn classes(&self) -> impl Iterator<Item = u8> + '_ {
        self.label.keys().cloned()
    }

    pub fn rgb(&self, class: u8) -> Option<&str> {
        self.rgb.get(&class).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn read_and_lookup() {
        let text = "class\trgb\tgray\tlabel\n0\t0,0,255\t0\tOcean\n1\t0,255,0\t128\tLowland\n";
        let mut r = TsvReader::new("key.tab".to_string(), text.as_bytes()).unwrap();
        let key = PixKey::read(&mut r).unwrap();
        assert_eq!(key.label(0), Some("ocean"));
        assert_eq!(key.label(1), Some("lowland"));
        assert_eq!(key.class_of("LOWLAND"), Some(1));
        assert_eq!(key.rgb(0), Some("0,0,255"));
        assert_eq!(key.label(9), None);
    }
}
