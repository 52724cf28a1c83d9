//! The shared tab-delimited dialect.
//!
//! Every input file is tab-delimited text: `#` starts a comment line,
//! blank lines are skipped, the first data line is a case-insensitive
//! header, and columns the reader does not know are ignored. A malformed
//! row is reported with file name, row number, and field name, and aborts
//! the read.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

/// Errors shared by every reader in the workspace.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("{file}: {source}")]
    Io {
        file: String,
        #[source]
        source: io::Error,
    },

    #[error("{file}: header is missing column {field:?}")]
    Header { file: String, field: &'static str },

    #[error("{file}: row {row}: field {field:?}: {msg}")]
    Field {
        file: String,
        row: usize,
        field: &'static str,
        msg: String,
    },

    #[error("{file}: row {row}: pixelation mismatch: file says equator {got}, analysis uses {expect}")]
    Equator {
        file: String,
        row: usize,
        expect: usize,
        got: usize,
    },
}

/// A streaming reader over one tab-delimited file.
///
/// ```no_run
/// # use paleo::tsv::TsvReader;
/// let mut r = TsvReader::open("landscape.tab").unwrap();
/// while r.next_row().unwrap() {
///     let age: u64 = r.parse("age").unwrap();
///     let pixel: usize = r.parse("pixel").unwrap();
///     // ...
/// }
/// ```
pub struct TsvReader<R> {
    file: String,
    input: R,
    /// Lower-cased header name to column index.
    header: HashMap<String, usize>,
    /// Fields of the current row, as byte ranges into `line`.
    fields: Vec<(usize, usize)>,
    line: String,
    row: usize,
}

impl TsvReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ReadError> {
        let file = path.as_ref().display().to_string();
        let f = File::open(path.as_ref()).map_err(|source| ReadError::Io {
            file: file.clone(),
            source,
        })?;
        TsvReader::new(file, BufReader::new(f))
    }
}

impl<R: BufRead> TsvReader<R> {
    /// Wraps an already open source. `file` is only used in error reports.
    pub fn new(file: String, input: R) -> Result<Self, ReadError> {
        let mut r = TsvReader {
            file,
            input,
            header: HashMap::new(),
            fields: Vec::new(),
            line: String::new(),
            row: 0,
        };
        if r.advance()? {
            let header = r
                .line
                .split('\t')
                .enumerate()
                .map(|(i, name)| (name.trim().to_lowercase(), i))
                .collect();
            r.header = header;
        }
        Ok(r)
    }

    /// Name of the file being read.
    #[inline]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Row number of the current row (1-based, counting every line).
    #[inline]
    pub fn row(&self) -> usize {
        self.row
    }

    /// Moves to the next data row. Returns false at end of input.
    pub fn next_row(&mut self) -> Result<bool, ReadError> {
        if !self.advance()? {
            return Ok(false);
        }
        self.fields.clear();
        let base = self.line.as_ptr() as usize;
        for f in self.line.split('\t') {
            let start = f.as_ptr() as usize - base;
            self.fields.push((start, start + f.len()));
        }
        Ok(true)
    }

    /// The raw content of column `name` on the current row.
    pub fn field(&self, name: &'static str) -> Result<&str, ReadError> {
        let col = *self.header.get(name).ok_or(ReadError::Header {
            file: self.file.clone(),
            field: name,
        })?;
        let (start, end) = *self.fields.get(col).ok_or_else(|| ReadError::Field {
            file: self.file.clone(),
            row: self.row,
            field: name,
            msg: "row has too few columns".to_string(),
        })?;
        Ok(self.line[start..end].trim())
    }

    /// Parses column `name` of the current row.
    pub fn parse<T: FromStr>(&self, name: &'static str) -> Result<T, ReadError>
    where
        T::Err: std::fmt::Display,
    {
        let raw = self.field(name)?;
        raw.parse().map_err(|e: T::Err| ReadError::Field {
            file: self.file.clone(),
            row: self.row,
            field: name,
            msg: format!("{:?}: {}", raw, e),
        })
    }

    /// Checks the `equator` column of the current row against the
    /// pixelation in use.
    pub fn check_equator(&self, expect: usize) -> Result<(), ReadError> {
        let got: usize = self.parse("equator")?;
        if got != expect {
            return Err(ReadError::Equator {
                file: self.file.clone(),
                row: self.row,
                expect,
                got,
            });
        }
        Ok(())
    }

    /// Reads the next meaningful line into `self.line`.
    fn advance(&mut self) -> Result<bool, ReadError> {
        loop {
            self.line.clear();
            let n = self
                .input
                .read_line(&mut self.line)
                .map_err(|source| ReadError::Io {
                    file: self.file.clone(),
                    source,
                })?;
            self.row += 1;
            if n == 0 {
                return Ok(false);
            }
            while self.line.ends_with('\n') || self.line.ends_with('\r') {
                self.line.pop();
            }
            if self.line.is_empty() || self.line.starts_with('#') {
                continue;
            }
            return Ok(true);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = "\
# a comment
Age\tEquator\tPixel\tClass
100\t60\t5\t1

200\t60\t7\t3
";

    fn reader(content: &str) -> TsvReader<&[u8]> {
        TsvReader::new("sample.tab".to_string(), content.as_bytes()).unwrap()
    }

    #[test]
    fn header_is_case_insensitive() {
        let mut r = reader(SAMPLE);
        assert!(r.next_row().unwrap());
        let age: u64 = r.parse("age").unwrap();
        assert_eq!(age, 100);
        r.check_equator(60).unwrap();
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let mut r = reader(SAMPLE);
        let mut ages = Vec::new();
        while r.next_row().unwrap() {
            ages.push(r.parse::<u64>("age").unwrap());
        }
        assert_eq!(ages, vec![100, 200]);
    }

    #[test]
    fn missing_column_names_the_field() {
        let mut r = reader(SAMPLE);
        r.next_row().unwrap();
        match r.field("density") {
            Err(ReadError::Header { field, .. }) => assert_eq!(field, "density"),
            other => panic!("expected header error, got {:?}", other.map(|s| s.to_string())),
        }
    }

    #[test]
    fn bad_value_reports_row_and_field() {
        let mut r = reader("age\tpixel\nx\t3\n");
        r.next_row().unwrap();
        match r.parse::<u64>("age") {
            Err(ReadError::Field { row, field, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(field, "age");
            }
            other => panic!("expected field error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn equator_mismatch_is_flagged() {
        let mut r = reader(SAMPLE);
        r.next_row().unwrap();
        assert!(matches!(r.check_equator(120), Err(ReadError::Equator { .. })));
    }
}
