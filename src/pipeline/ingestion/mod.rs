//! Turning materialized review extracts into raw frames.
//!
//! Input bytes are already in memory when they reach this module; the only
//! I/O here is the `FileSpec::read_bytes` convenience used by the CLI.

use csv::{ByteRecord, ReaderBuilder};
use polars::prelude::{DataFrame, NamedFrom, Series};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::constants::NA_TOKENS;
use crate::error::{EtlError, Result};

/// One input extract and the source label it is reported under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub path: PathBuf,
    pub source_name: String,
}

impl FileSpec {
    pub fn new(path: impl Into<PathBuf>, source_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source_name: source_name.into(),
        }
    }

    /// Final path component, used as the `source_file` stamp
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    pub fn format(&self) -> Result<TableFormat> {
        TableFormat::from_path(&self.path)
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.path)?)
    }
}

/// Supported tabular layouts, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// Comma separated
    Csv,
    /// Delimiter sniffed from the header line
    Delimited,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") => Ok(TableFormat::Csv),
            Some("txt") => Ok(TableFormat::Delimited),
            _ => Err(EtlError::UnsupportedFileType(
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string_lossy().into_owned()),
            )),
        }
    }
}

/// Parse an extract into a raw frame of Utf8 columns, choosing the
/// delimiter from `spec`'s extension. Unsupported extensions fail before
/// any bytes are inspected.
pub fn read_table(spec: &FileSpec, bytes: &[u8]) -> Result<DataFrame> {
    let bytes = strip_bom(bytes);
    match spec.format()? {
        TableFormat::Csv => parse_delimited(bytes, b','),
        TableFormat::Delimited => {
            let delimiter = sniff_delimiter(bytes);
            debug!(
                file = %spec.file_name(),
                delimiter = %(delimiter as char).escape_default(),
                "sniffed delimiter"
            );
            match parse_delimited(bytes, delimiter) {
                Ok(frame) => Ok(frame),
                Err(e) if delimiter != b',' => {
                    warn!(
                        "Auto read failed for {}, retrying with comma sep. Error: {}",
                        spec.file_name(),
                        e
                    );
                    parse_delimited(bytes, b',')
                }
                Err(e) => Err(e),
            }
        }
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}

/// Pick the first of `,` tab `;` `|` that occurs in the header line
pub fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let header = bytes.split(|&b| b == b'\n').next().unwrap_or_default();
    [b',', b'\t', b';', b'|']
        .into_iter()
        .find(|d| header.contains(d))
        .unwrap_or(b',')
}

fn parse_delimited(bytes: &[u8], delimiter: u8) -> Result<DataFrame> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(bytes);

    let headers = unique_headers(
        reader
            .byte_headers()?
            .iter()
            .map(|h| String::from_utf8_lossy(h).into_owned()),
    );

    // Short rows are padded with nulls, long rows truncated
    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    let mut record = ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        for (idx, column) in cells.iter_mut().enumerate() {
            column.push(record.get(idx).and_then(decode_cell));
        }
    }

    let columns: Vec<Series> = headers
        .iter()
        .zip(cells)
        .map(|(name, values)| Series::new(name, values))
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Frames need unique headers; repeats get a `.N` suffix
fn unique_headers(headers: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .map(|header| {
            let mut name = header.clone();
            let mut n = 1;
            while !seen.insert(name.clone()) {
                name = format!("{}.{}", header, n);
                n += 1;
            }
            name
        })
        .collect()
}

fn decode_cell(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    if NA_TOKENS.contains(&&*text) {
        None
    } else {
        Some(text.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{cell, column_names, Value};

    #[test]
    fn test_csv_with_missing_cells() {
        let spec = FileSpec::new("downtown.csv", "downtown");
        let frame = read_table(&spec, b"Review ID,Rating\n1,4\n2,\n3,NA\n").unwrap();
        assert_eq!(column_names(&frame), vec!["Review ID", "Rating"]);
        assert_eq!(frame.height(), 3);
        assert_eq!(cell(&frame, 0, "Rating"), Some(Value::Text("4".into())));
        assert_eq!(cell(&frame, 1, "Rating"), Some(Value::Missing));
        assert_eq!(cell(&frame, 2, "Rating"), Some(Value::Missing));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let spec = FileSpec::new("downtown.csv", "downtown");
        let frame = read_table(&spec, b"a,b,c\n1,2\n4,5,6,7\n").unwrap();
        assert_eq!(frame.width(), 3);
        assert_eq!(cell(&frame, 0, "c"), Some(Value::Missing));
        assert_eq!(cell(&frame, 1, "c"), Some(Value::Text("6".into())));
    }

    #[test]
    fn test_repeated_headers_are_suffixed() {
        let spec = FileSpec::new("downtown.csv", "downtown");
        let frame = read_table(&spec, b"name,name,,\nann,bob,x,y\n").unwrap();
        assert_eq!(column_names(&frame), vec!["name", "name.1", "", ".1"]);
        assert_eq!(cell(&frame, 0, "name.1"), Some(Value::Text("bob".into())));
    }

    #[test]
    fn test_txt_sniffs_pipe_delimiter() {
        let spec = FileSpec::new("midtown.TXT", "midtown");
        let frame = read_table(&spec, b"review_id|comments\n1|great, really\n").unwrap();
        assert_eq!(column_names(&frame), vec!["review_id", "comments"]);
        assert_eq!(
            cell(&frame, 0, "comments"),
            Some(Value::Text("great, really".into()))
        );
    }

    #[test]
    fn test_unsupported_extension_fails_fast() {
        let spec = FileSpec::new("raw/uptown.xlsx", "uptown");
        match read_table(&spec, b"whatever") {
            Err(EtlError::UnsupportedFileType(name)) => assert_eq!(name, "uptown.xlsx"),
            other => panic!("expected UnsupportedFileType, got {:?}", other),
        }
    }

    #[test]
    fn test_non_utf8_bytes_are_decoded_lossily() {
        let spec = FileSpec::new("eastside.csv", "eastside");
        let frame = read_table(&spec, b"\xEF\xBB\xBFname\ncaf\xE9\n").unwrap();
        assert_eq!(column_names(&frame), vec!["name"]);
        assert_eq!(cell(&frame, 0, "name"), Some(Value::Text("caf\u{FFFD}".into())));
    }

    #[test]
    fn test_sniff_prefers_comma_then_tab() {
        assert_eq!(sniff_delimiter(b"a\tb,c\n"), b',');
        assert_eq!(sniff_delimiter(b"a\tb\n1\t2"), b'\t');
        assert_eq!(sniff_delimiter(b"single\n"), b',');
    }
}
