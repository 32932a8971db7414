//! Record Reader - Splits a delimited text blob into a header and row records
//!
//! By default fields are split on the raw delimiter with no quote handling, so a
//! field that contains the delimiter is split in two. Setting
//! [`ReaderOptions::quoting`] switches the reader (and writer) to RFC 4180 quoting.
//! Empty lines are skipped. Bytes that are not valid UTF-8 are decoded lossily
//! to U+FFFD rather than failing the read.

use crate::error::{PipelineError, Result};
use csv::{ByteRecord, ByteRecordsIntoIter, QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};

/// Delimited-text dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    pub delimiter: u8,
    pub quoting: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quoting: false,
        }
    }
}

/// Ordered column names from the first line of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    columns: Vec<String>,
}

impl Header {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when there is no column with a non-blank name
    pub fn is_empty(&self) -> bool {
        self.columns.iter().all(|c| c.trim().is_empty())
    }

    /// Position of `name`, compared case-insensitively against trimmed header fields
    pub fn position(&self, name: &str) -> Option<usize> {
        let wanted = name.trim();
        self.columns
            .iter()
            .position(|c| c.trim().eq_ignore_ascii_case(wanted))
    }

    /// Copy of this header with `name` appended as a trailing column
    pub fn with_column(&self, name: &str) -> Self {
        let mut columns = self.columns.clone();
        columns.push(name.to_string());
        Self { columns }
    }
}

/// One data line's fields, positionally aligned to the [`Header`]
///
/// The field count may be smaller or larger than the header width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRecord {
    fields: Vec<String>,
}

impl RowRecord {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    pub fn push(&mut self, value: String) {
        self.fields.push(value);
    }
}

impl From<Vec<&str>> for RowRecord {
    fn from(fields: Vec<&str>) -> Self {
        Self::new(fields.into_iter().map(str::to_string).collect())
    }
}

/// Single-pass sequence of row records following the header line
pub struct Records<R> {
    inner: ByteRecordsIntoIter<R>,
}

fn decode_fields(record: &ByteRecord) -> Vec<String> {
    record
        .iter()
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect()
}

impl<R: std::io::Read> Iterator for Records<R> {
    type Item = Result<RowRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|record| {
            record
                .map(|r| RowRecord::new(decode_fields(&r)))
                .map_err(PipelineError::from)
        })
    }
}

/// Parses delimited text into a [`Header`] and lazily produced [`RowRecord`]s
#[derive(Debug, Clone, Default)]
pub struct RecordReader {
    options: ReaderOptions,
}

impl RecordReader {
    pub fn new(options: ReaderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> ReaderOptions {
        self.options
    }

    /// Split `blob` into its header and the remaining records.
    ///
    /// Fails with [`PipelineError::EmptyInput`] when the blob holds no lines.
    pub fn parse<'a>(&self, blob: &'a [u8]) -> Result<(Header, Records<&'a [u8]>)> {
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.options.delimiter)
            .quoting(self.options.quoting)
            .from_reader(blob);

        let mut inner = reader.into_byte_records();
        let header = match inner.next() {
            Some(record) => {
                let record = record?;
                Header::new(decode_fields(&record))
            }
            None => {
                return Err(PipelineError::EmptyInput(
                    "delimited file has no lines".to_string(),
                ))
            }
        };

        Ok((header, Records { inner }))
    }

    /// Serialize a header and rows back to delimited text, one row per line
    pub fn write<'r, I>(&self, header: &Header, rows: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = &'r RowRecord>,
    {
        let quote_style = if self.options.quoting {
            QuoteStyle::Necessary
        } else {
            QuoteStyle::Never
        };

        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.options.delimiter)
            .quote_style(quote_style)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        writer.write_record(header.columns())?;
        for row in rows {
            writer.write_record(row.fields())?;
        }

        writer
            .into_inner()
            .map_err(|e| PipelineError::Io(e.into_error()))
    }
}
