//! Terminal geographic ranges.
//!
//! A range is a non-negative density over pixels, either presence points
//! (indicator pixels) or a scaled continuous density in `(0, 1]`. At the
//! terminal's youngest time stage the down-pass uses the normalised log
//! form `ln(range[p]) - ln(sum)`.

use std::collections::HashMap;
use std::io::BufRead;

use isopix::PixMap;
use paleo::tsv::{ReadError, TsvReader};

use crate::error::DriftError;

#[derive(Clone, Debug, Default)]
pub struct Ranges {
    by_taxon: HashMap<String, PixMap<f64>>,
}

impl Ranges {
    pub fn new() -> Ranges {
        Ranges::default()
    }

    /// Reads a range file: columns `taxon`, `type` (`points` or `range`),
    /// `age`, `equator`, `pixel`, `density`.
    pub fn read<R: BufRead>(r: &mut TsvReader<R>, equator: usize) -> Result<Ranges, DriftError> {
        let mut ranges = Ranges::new();
        while r.next_row()? {
            r.check_equator(equator)?;
            let taxon = r.field("taxon")?.trim().to_string();
            let kind = r.field("type")?.to_lowercase();
            let pixel: usize = r.parse("pixel")?;
            let density = match kind.as_str() {
                "points" => 1.0,
                "range" => {
                    let d: f64 = r.parse("density")?;
                    if !(d > 0.0 && d <= 1.0) {
                        return Err(ReadError::Field {
                            file: r.file().to_string(),
                            row: r.row(),
                            field: "density",
                            msg: format!("range density must be in (0, 1], got {}", d),
                        }
                        .into());
                    }
                    d
                }
                other => {
                    return Err(ReadError::Field {
                        file: r.file().to_string(),
                        row: r.row(),
                        field: "type",
                        msg: format!("unknown range type {:?}", other),
                    }
                    .into())
                }
            };
            ranges.add(&taxon, pixel, density);
        }
        Ok(ranges)
    }

    /// Records a density; repeated pixels keep the largest value.
    pub fn add(&mut self, taxon: &str, pixel: usize, density: f64) {
        let range = self.by_taxon.entry(taxon.to_string()).or_default();
        let slot = range.entry(pixel).or_insert(0.0);
        if density > *slot {
            *slot = density;
        }
    }

    pub fn range(&self, taxon: &str) -> Option<&PixMap<f64>> {
        self.by_taxon.get(taxon)
    }

    pub fn taxa(&self) -> impl Iterator<Item = &str> {
        self.by_taxon.keys().map(|s| s.as_str())
    }

    /// The normalised log range of `taxon`:
    /// `ln(range[p]) - ln(sum of range)`.
    pub fn ln_normalized(&self, taxon: &str) -> Result<PixMap<f64>, DriftError> {
        let range = self.range(taxon).ok_or_else(|| DriftError::NoRange {
            taxon: taxon.to_string(),
        })?;
        let total: f64 = range.values().sum();
        if total <= 0.0 {
            return Err(DriftError::NoRange {
                taxon: taxon.to_string(),
            });
        }
        let ln_total = total.ln();
        Ok(range
            .iter()
            .map(|(p, d)| (*p, d.ln() - ln_total))
            .collect())
    }
}
