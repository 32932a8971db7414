//! Transformer - deduplicate, order by priority, derive processing time
//!
//! 1. Rows are deduplicated on the key column; the first row seen for a key wins.
//! 2. Surviving rows are stably sorted by ascending priority rank.
//! 3. A processing-time column (ship date minus order date, in days) is appended.
//!
//! Column lookups resolve to `Option<usize>`; a column missing from the header is
//! treated as a missing field on every row.

pub mod priority;
pub mod processing_time;

use crate::error::{PipelineError, Result};
use crate::reader::{Header, RecordReader, RowRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

pub use priority::{rank_of, Priority};
pub use processing_time::processing_days;

/// Column names driving the transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformOptions {
    pub key_column: String,
    pub priority_column: String,
    pub start_date_column: String,
    pub end_date_column: String,
    /// Name of the appended column
    pub derived_column: String,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            key_column: "Order ID".to_string(),
            priority_column: "Order Priority".to_string(),
            start_date_column: "Order Date".to_string(),
            end_date_column: "Ship Date".to_string(),
            derived_column: "Order Processing Time (days)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResolvedColumns {
    key: Option<usize>,
    priority: Option<usize>,
    start_date: Option<usize>,
    end_date: Option<usize>,
}

impl ResolvedColumns {
    fn resolve(header: &Header, options: &TransformOptions) -> Self {
        let lookup = |name: &str| {
            let index = header.position(name);
            if index.is_none() {
                warn!("Column {:?} not found in header", name);
            }
            index
        };

        Self {
            key: lookup(&options.key_column),
            priority: lookup(&options.priority_column),
            start_date: lookup(&options.start_date_column),
            end_date: lookup(&options.end_date_column),
        }
    }
}

/// Rows keyed by their first-seen key value, in encounter order
#[derive(Debug, Default)]
pub struct UniqueRecordSet {
    seen: HashSet<String>,
    records: Vec<RowRecord>,
}

impl UniqueRecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `record` unless `key` was already seen. Returns whether it was kept.
    pub fn insert(&mut self, key: &str, record: RowRecord) -> bool {
        if self.seen.contains(key) {
            return false;
        }
        self.seen.insert(key.to_string());
        self.records.push(record);
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<RowRecord> {
        self.records
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformStats {
    pub input_rows: u64,
    pub unique_rows: u64,
    /// Rows too short to hold the key column
    pub skipped_rows: u64,
    pub duplicates_removed: u64,
}

#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub header: Header,
    pub rows: Vec<RowRecord>,
    pub stats: TransformStats,
}

#[derive(Debug, Clone, Default)]
pub struct Transformer {
    options: TransformOptions,
}

impl Transformer {
    pub fn new(options: TransformOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    pub fn transform<I>(&self, header: &Header, rows: I) -> Result<TransformOutput>
    where
        I: IntoIterator<Item = Result<RowRecord>>,
    {
        if header.is_empty() {
            return Err(PipelineError::EmptyInput("CSV header is empty".to_string()));
        }

        let columns = ResolvedColumns::resolve(header, &self.options);
        let (unique, stats) = deduplicate(rows, columns.key)?;
        info!("Original rows: {}", stats.input_rows);
        info!("Unique rows: {}", stats.unique_rows);
        info!("Duplicates removed: {}", stats.duplicates_removed);
        if stats.skipped_rows > 0 {
            warn!("Rows without a key field skipped: {}", stats.skipped_rows);
        }

        let mut rows = unique.into_records();
        sort_by_priority(&mut rows, columns.priority);
        info!("Records sorted by priority");

        for row in &mut rows {
            let days = processing_days(
                columns.start_date.and_then(|i| row.get(i)),
                columns.end_date.and_then(|i| row.get(i)),
            );
            row.push(days.to_string());
        }

        Ok(TransformOutput {
            header: header.with_column(&self.options.derived_column),
            rows,
            stats,
        })
    }

    /// Parse `blob`, transform it and serialize the result with the same dialect
    pub fn transform_blob(&self, reader: &RecordReader, blob: &[u8]) -> Result<(Vec<u8>, TransformStats)> {
        let (header, records) = reader.parse(blob)?;
        info!("Headers: {}", header.columns().join(","));

        let output = self.transform(&header, records)?;
        let bytes = reader.write(&output.header, &output.rows)?;
        info!("Transformation complete. Output size: {} bytes", bytes.len());

        Ok((bytes, output.stats))
    }
}

/// First-seen-wins deduplication on the trimmed value at `key`.
/// Rows that do not reach the key column are skipped.
pub fn deduplicate<I>(rows: I, key: Option<usize>) -> Result<(UniqueRecordSet, TransformStats)>
where
    I: IntoIterator<Item = Result<RowRecord>>,
{
    let mut unique = UniqueRecordSet::new();
    let mut stats = TransformStats::default();

    for row in rows {
        let row = row?;
        stats.input_rows += 1;

        let Some(value) = key.and_then(|i| row.get(i)) else {
            stats.skipped_rows += 1;
            continue;
        };
        let value = value.trim().to_string();
        unique.insert(&value, row);
    }

    stats.unique_rows = unique.len() as u64;
    stats.duplicates_removed = stats.input_rows - stats.unique_rows - stats.skipped_rows;
    Ok((unique, stats))
}

/// Stable ascending sort on the priority rank at `priority`
pub fn sort_by_priority(rows: &mut [RowRecord], priority: Option<usize>) {
    rows.sort_by_key(|row| rank_of(priority.and_then(|i| row.get(i))));
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALES: &str = "Region,Order Priority,Order Date,Order ID,Ship Date\n\
        Asia,H,1/1/2015,100,1/6/2015\n\
        Europe,L,2/1/2015,101,2/3/2015\n\
        Asia,C,3/1/2015,100,3/9/2015\n\
        Africa,M,bad-date,102,4/2/2015\n\
        Europe,L,5/1/2015,103,5/11/2015\n\
        Oceania,X,6/1/2015,104\n";

    fn run(blob: &str) -> TransformOutput {
        let reader = RecordReader::default();
        let (header, records) = reader.parse(blob.as_bytes()).unwrap();
        Transformer::default().transform(&header, records).unwrap()
    }

    fn column(output: &TransformOutput, index: usize) -> Vec<&str> {
        output.rows.iter().map(|r| r.get(index).unwrap()).collect()
    }

    #[test]
    fn test_first_seen_row_wins() {
        let output = run(SALES);
        assert_eq!(output.stats.input_rows, 6);
        assert_eq!(output.stats.unique_rows, 5);
        assert_eq!(output.stats.duplicates_removed, 1);

        let order_100: Vec<_> = output.rows.iter().filter(|r| r.get(3) == Some("100")).collect();
        assert_eq!(order_100.len(), 1);
        assert_eq!(order_100[0].get(1), Some("H"));
    }

    #[test]
    fn test_sorted_by_rank_and_stable() {
        let output = run(SALES);
        assert_eq!(column(&output, 3), vec!["104", "101", "103", "102", "100"]);

        let ranks: Vec<u8> = output.rows.iter().map(|r| rank_of(r.get(1))).collect();
        assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_processing_time_column() {
        let output = run(SALES);
        assert_eq!(output.header.columns().last().unwrap(), "Order Processing Time (days)");
        assert_eq!(output.header.len(), 6);

        let derived: Vec<&str> = output.rows.iter().map(|r| r.fields().last().unwrap().as_str()).collect();
        // 104 lacks a ship date, 102 has a malformed order date
        assert_eq!(derived, vec!["0", "2", "10", "0", "5"]);
    }

    #[test]
    fn test_short_rows_are_skipped_not_errors() {
        let output = run("Order ID,Order Priority\n1,H\n\n2\n3,L\n");
        assert_eq!(output.stats.unique_rows, 3);

        let output = run("Region,Order ID\nAsia\nEurope,7\n");
        assert_eq!(output.stats.skipped_rows, 1);
        assert_eq!(output.rows.len(), 1);
    }

    #[test]
    fn test_missing_columns_are_guarded() {
        // No priority or date columns: order is preserved and every derived value is 0
        let output = run("Order ID,Region\n2,Asia\n1,Europe\n2,Africa\n");
        assert_eq!(column(&output, 0), vec!["2", "1"]);
        assert_eq!(column(&output, 2), vec!["0", "0"]);

        // No key column: nothing can be keyed
        let output = run("Region\nAsia\nEurope\n");
        assert!(output.rows.is_empty());
        assert_eq!(output.stats.skipped_rows, 2);
    }

    #[test]
    fn test_transform_blob_round_trip() {
        let reader = RecordReader::default();
        let (bytes, stats) = Transformer::default()
            .transform_blob(&reader, b"Order ID,Order Priority,Order Date,Ship Date\n9,C,1/1/2015,1/6/2015\n8,L,1/1/2015,1/2/2015\n")
            .unwrap();

        assert_eq!(stats.unique_rows, 2);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "Order ID,Order Priority,Order Date,Ship Date,Order Processing Time (days)\n\
             8,L,1/1/2015,1/2/2015,1\n\
             9,C,1/1/2015,1/6/2015,5\n"
        );
    }

    #[test]
    fn test_empty_header_is_rejected() {
        let header = Header::new(vec![]);
        let err = Transformer::default().transform(&header, Vec::new()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput(_)));
    }

    #[test]
    fn test_non_utf8_row_does_not_abort() {
        let reader = RecordReader::default();
        let (bytes, stats) = Transformer::default()
            .transform_blob(&reader, b"Order ID,Order Priority,Item\n1,H,caf\xe9\n2,L,tea\n")
            .unwrap();

        assert_eq!(stats.unique_rows, 2);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("2,L,tea,0\n1,H,caf\u{FFFD},0\n"));
    }
}
