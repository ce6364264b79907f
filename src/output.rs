//! Pipe-delimited CSV files.
//!
//! Fields are quoted only when they contain `|` or `"` (with inner quotes
//! doubled). Embedded newlines are collapsed to spaces before writing so
//! every record stays on one line.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::Result;
use crate::mapper::{output_row, OUTPUT_COLUMNS};
use crate::models::MergedRecord;

pub const DELIMITER: u8 = b'|';

/// Replace CR/LF sequences with a single space each.
pub fn collapse_newlines(field: &str) -> String {
    if !field.contains(['\n', '\r']) {
        return field.to_string();
    }
    field.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

fn pipe_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(writer)
}

fn pipe_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader)
}

/// Streaming writer for pipe-delimited rows.
pub struct PipeWriter<W: Write> {
    inner: csv::Writer<W>,
    rows: usize,
}

impl<W: Write> PipeWriter<W> {
    pub fn new<S: AsRef<str>>(writer: W, header: &[S]) -> Result<Self> {
        let mut inner = pipe_writer(writer);
        inner.write_record(header.iter().map(|h| h.as_ref()))?;
        Ok(Self { inner, rows: 0 })
    }

    pub fn write_row<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<()> {
        self.inner
            .write_record(fields.iter().map(|f| collapse_newlines(f.as_ref())))?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and return the number of data rows written.
    pub fn finish(mut self) -> Result<usize> {
        self.inner.flush()?;
        Ok(self.rows)
    }
}

/// Write merged records with the fixed output header.
pub fn write_merged<W: Write>(writer: W, records: &[MergedRecord]) -> Result<usize> {
    let mut out = PipeWriter::new(writer, &OUTPUT_COLUMNS)?;
    for record in records {
        out.write_row(&output_row(record))?;
    }
    out.finish()
}

pub fn save_merged(path: &Path, records: &[MergedRecord]) -> Result<usize> {
    write_merged(File::create(path)?, records)
}

/// A pipe-delimited file read fully into memory.
#[derive(Debug, Clone, Default)]
pub struct PipeTable {
    pub headers: Vec<String>,
    pub rows: Vec<csv::StringRecord>,
}

impl PipeTable {
    pub fn read<R: Read>(reader: R) -> Result<Self> {
        let mut csv = pipe_reader(reader);
        let headers = csv
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        let rows = csv.records().collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { headers, rows })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::read(File::open(path)?)
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Non-empty cell of `row` in column `pos`.
    pub fn cell<'r>(row: &'r csv::StringRecord, pos: Option<usize>) -> Option<&'r str> {
        let value = row.get(pos?)?;
        (!value.is_empty()).then_some(value)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
