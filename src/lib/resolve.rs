//! Resolving barcodes that were observed with more than one variant.
//!
//! The [`MajorityResolver`] works on a persisted count table in two stages:
//!
//! 1. rows with fewer than `min_count` reads are dropped,
//! 2. the remaining rows are grouped by barcode and a row is kept only when its share of the
//!    barcode's reads is at least `min_fraction`.
//!
//! With a `min_fraction` above one half each barcode resolves to at most one variant, or to none
//! when no variant dominates.
#![forbid(unsafe_code)]

use std::{io::Write, path::Path};

use anyhow::Context;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use fgoxide::io::Io;
use itertools::Itertools;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collapse::{CountRecord, COUNT_RECORD_HEADER};

/// Rows with fewer reads than this are dropped.
pub const DEFAULT_MIN_COUNT: u64 = 5;

/// The share of a barcode's reads a variant needs for the barcode to be assigned to it.
pub const DEFAULT_MIN_FRACTION: f64 = 0.75;

/// The error that may occur when reading or writing a count table.
#[derive(Error, Debug)]
pub enum CountTableError {
    #[error("Io error occurred")]
    Io(#[from] std::io::Error),

    #[error("Io error occurred")]
    FgError(#[from] fgoxide::FgError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("The count table is missing the column(s) {missing}, found columns: {found}")]
    MissingColumns { missing: String, found: String },

    #[error("The count table has no rows")]
    Empty,

    #[error("Unable to read line number {line}")]
    ReadRecord { source: csv::Error, line: usize },

    #[error("Invalid count `{value}` on line number {line}")]
    InvalidCount { value: String, line: usize },
}

/// A single row of a count table.
///
/// The full input row is kept so that columns beyond `Barcode`, `VariantID` and `count` are
/// written back out unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct CountRow {
    pub barcode: String,
    pub variant_id: String,
    pub count: u64,
    record: StringRecord,
}

/// A tab-delimited table with at least `Barcode`, `VariantID` and `count` columns.
#[derive(Debug, Clone, PartialEq)]
pub struct CountTable {
    headers: StringRecord,
    rows: Vec<CountRow>,
}

impl CountTable {
    /// Read a count table from a path.  The file may be gzip compressed.
    ///
    /// # Errors
    ///
    /// - [`CountTableError::MissingColumns`] if any required column is absent
    /// - [`CountTableError::Empty`] if there are no rows
    /// - [`CountTableError::InvalidCount`] if a count is not a non-negative integer
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CountTableError> {
        let io = Io::default();
        let reader = io.new_reader(&path)?;
        Self::from_reader(reader)
    }

    /// Read a count table from any reader, see [`CountTable::from_path`].
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, CountTableError> {
        let mut reader =
            ReaderBuilder::new().delimiter(b'\t').has_headers(true).from_reader(reader);
        let headers = reader.headers()?.clone();

        let columns: Vec<Option<usize>> = COUNT_RECORD_HEADER
            .iter()
            .map(|column| headers.iter().position(|h| h == *column))
            .collect();
        let (barcode_index, variant_index, count_index) = match columns[..] {
            [Some(barcode), Some(variant), Some(count)] => (barcode, variant, count),
            _ => {
                let missing = COUNT_RECORD_HEADER
                    .iter()
                    .zip(columns.iter())
                    .filter(|(_, index)| index.is_none())
                    .map(|(column, _)| column)
                    .join(",");
                return Err(CountTableError::MissingColumns {
                    missing,
                    found: headers.iter().join(","),
                });
            }
        };

        let mut rows = vec![];
        for (index, record) in reader.records().enumerate() {
            let line = index + 2;
            let record = record.map_err(|source| CountTableError::ReadRecord { source, line })?;
            let line = record.position().map_or(line, |p| p.line() as usize);
            let field = |i: usize| record.get(i).unwrap_or("").to_string();
            let value = field(count_index);
            let count = value
                .trim()
                .parse::<u64>()
                .map_err(|_| CountTableError::InvalidCount { value: value.clone(), line })?;
            let barcode = field(barcode_index);
            let variant_id = field(variant_index);
            rows.push(CountRow { barcode, variant_id, count, record });
        }

        if rows.is_empty() {
            return Err(CountTableError::Empty);
        }
        Ok(Self { headers, rows })
    }

    /// Build a table with just the `Barcode`, `VariantID` and `count` columns.
    pub fn from_counts<I: IntoIterator<Item = CountRecord>>(counts: I) -> Self {
        let rows = counts
            .into_iter()
            .map(|c| {
                let record = StringRecord::from(vec![
                    c.barcode.clone(),
                    c.variant_id.clone(),
                    c.count.to_string(),
                ]);
                CountRow { barcode: c.barcode, variant_id: c.variant_id, count: c.count, record }
            })
            .collect();
        Self { headers: StringRecord::from(COUNT_RECORD_HEADER.to_vec()), rows }
    }

    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    pub fn rows(&self) -> &[CountRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The `(barcode, variant, count)` triples in row order.
    pub fn to_counts(&self) -> Vec<CountRecord> {
        self.rows
            .iter()
            .map(|r| CountRecord::new(r.barcode.clone(), r.variant_id.clone(), r.count))
            .collect()
    }

    /// Write the table, header first, to the given writer.
    pub fn write<W: Write>(&self, writer: W) -> Result<(), CountTableError> {
        let mut writer =
            WriterBuilder::new().delimiter(b'\t').has_headers(false).from_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(&row.record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the table to a path, compressing it if the path ends in `.gz`.
    pub fn to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), CountTableError> {
        let io = Io::default();
        let writer = io.new_writer(&path)?;
        self.write(writer)
    }
}

/// The thresholds used by the [`MajorityResolver`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverConfig {
    /// Rows with a count below this are dropped before grouping.
    pub min_count: u64,
    /// The minimum share of a barcode's reads for a row to be kept.
    pub min_fraction: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { min_count: DEFAULT_MIN_COUNT, min_fraction: DEFAULT_MIN_FRACTION }
    }
}

/// The number of rows remaining after each stage of resolution.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveStats {
    /// The number of rows in the input table.
    pub input_rows: usize,
    /// The number of rows with at least `min_count` reads.
    pub rows_after_count_filter: usize,
    /// The number of distinct barcodes among those rows.
    pub barcodes: usize,
    /// The number of rows kept after the majority filter.
    pub output_rows: usize,
}

/// Assigns each barcode to the variant accounting for a supermajority of its reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct MajorityResolver {
    config: ResolverConfig,
}

impl MajorityResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Filter the table.  Rows in the output are grouped by barcode, in ascending barcode
    /// order, and keep their input order within a barcode.
    pub fn resolve(&self, table: CountTable) -> (CountTable, ResolveStats) {
        let CountTable { headers, rows } = table;
        let mut stats = ResolveStats { input_rows: rows.len(), ..ResolveStats::default() };

        let supported: Vec<CountRow> =
            rows.into_iter().filter(|row| row.count >= self.config.min_count).collect();
        stats.rows_after_count_filter = supported.len();

        let groups = supported.into_iter().into_group_map_by(|row| row.barcode.clone());
        stats.barcodes = groups.len();

        let mut kept = vec![];
        for (_, group) in groups.into_iter().sorted_by(|(a, _), (b, _)| a.cmp(b)) {
            let total: u64 = group.iter().map(|row| row.count).sum();
            kept.extend(
                group
                    .into_iter()
                    .filter(|row| row.count as f64 / total as f64 >= self.config.min_fraction),
            );
        }
        stats.output_rows = kept.len();

        (CountTable { headers, rows: kept }, stats)
    }
}

/// Read a count table, resolve it, and write the result.
pub fn resolve_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    config: ResolverConfig,
) -> anyhow::Result<ResolveStats> {
    let table = CountTable::from_path(&input).with_context(|| {
        format!("Failed to read count table {}", input.as_ref().to_string_lossy())
    })?;
    let (resolved, stats) = MajorityResolver::new(config).resolve(table);

    info!("Rows before count filter: {}", stats.input_rows);
    info!(
        "Rows after count filter (count >= {}): {}",
        config.min_count, stats.rows_after_count_filter
    );
    info!(
        "Rows after majority filter (fraction >= {}): {} across {} barcodes",
        config.min_fraction, stats.output_rows, stats.barcodes
    );
    if resolved.is_empty() {
        warn!("No rows passed filtering, only a header will be written");
    }

    resolved
        .to_path(&output)
        .with_context(|| format!("Failed to write {}", output.as_ref().to_string_lossy()))?;
    Ok(stats)
}

#[cfg(test)]
mod test {
    use std::fs;

    use matches::assert_matches;
    use rstest::rstest;
    use tempfile::tempdir;

    use super::*;

    fn table(rows: &[(&str, &str, u64)]) -> CountTable {
        CountTable::from_counts(rows.iter().map(|(b, v, c)| CountRecord::new(*b, *v, *c)))
    }

    fn resolve(rows: &[(&str, &str, u64)]) -> Vec<CountRecord> {
        MajorityResolver::default().resolve(table(rows)).0.to_counts()
    }

    #[test]
    fn test_majority_variant_is_kept() {
        let resolved = resolve(&[("BC1", "V1", 8), ("BC1", "V2", 2)]);
        // V2 is dropped by the count filter, leaving V1 with all the reads
        assert_eq!(resolved, vec![CountRecord::new("BC1", "V1", 8)]);
    }

    #[test]
    fn test_majority_applies_after_count_filter() {
        let resolved = resolve(&[("BC1", "V1", 16), ("BC1", "V2", 5)]);
        assert_eq!(resolved, vec![CountRecord::new("BC1", "V1", 16)]);

        let resolved = resolve(&[("BC1", "V1", 15), ("BC1", "V2", 6)]);
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_low_support_row_is_dropped() {
        let (resolved, stats) = MajorityResolver::default().resolve(table(&[
            ("BC2", "V3", 3),
            ("BC4", "V1", 5),
        ]));
        assert_eq!(resolved.to_counts(), vec![CountRecord::new("BC4", "V1", 5)]);
        assert_eq!(
            stats,
            ResolveStats { input_rows: 2, rows_after_count_filter: 1, barcodes: 1, output_rows: 1 }
        );
    }

    #[rstest]
    #[case(75, 25, true)]
    #[case(74, 26, false)]
    #[case(30, 10, true)]
    #[case(50, 50, false)]
    fn test_fraction_threshold_is_inclusive(
        #[case] first: u64,
        #[case] second: u64,
        #[case] first_kept: bool,
    ) {
        let resolved = resolve(&[("BC1", "V1", first), ("BC1", "V2", second)]);
        if first_kept {
            assert_eq!(resolved, vec![CountRecord::new("BC1", "V1", first)]);
        } else {
            assert!(resolved.is_empty());
        }
    }

    #[test]
    fn test_three_way_split_drops_barcode() {
        let resolved = resolve(&[("BC1", "V1", 10), ("BC1", "V2", 10), ("BC1", "V3", 10)]);
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_output_grouped_by_barcode() {
        let resolved = resolve(&[
            ("CCC", "V1", 9),
            ("AAA", "V2", 7),
            ("BBB", "V3", 6),
            ("AAA", "V4", 1),
        ]);
        assert_eq!(
            resolved,
            vec![
                CountRecord::new("AAA", "V2", 7),
                CountRecord::new("BBB", "V3", 6),
                CountRecord::new("CCC", "V1", 9),
            ]
        );
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let rows = [
            ("BC1", "V1", 80),
            ("BC1", "V2", 20),
            ("BC2", "V1", 40),
            ("BC2", "V3", 40),
            ("BC3", "V2", 5),
            ("BC4", "V4", 4),
            ("BC5", "V1", 9),
            ("BC5", "V5", 3),
        ];
        let resolver = MajorityResolver::default();
        let (once, _) = resolver.resolve(table(&rows));
        let (twice, stats) = resolver.resolve(once.clone());
        assert_eq!(twice, once);
        assert_eq!(stats.input_rows, stats.output_rows);
        assert_eq!(
            once.to_counts(),
            vec![
                CountRecord::new("BC1", "V1", 80),
                CountRecord::new("BC3", "V2", 5),
                CountRecord::new("BC5", "V1", 9),
            ]
        );
    }

    #[test]
    fn test_custom_thresholds() {
        let config = ResolverConfig { min_count: 1, min_fraction: 0.5 };
        let (resolved, _) =
            MajorityResolver::new(config).resolve(table(&[("BC1", "V1", 2), ("BC1", "V2", 2)]));
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_read_preserves_extra_columns() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("design.tsv");
        let output = dir.path().join("filtered.tsv");
        let bytes = "\
Barcode\tVariantID\tcount\tLibrary
BC2\tV1\t8\tlibA
BC1\tV1\t8\tlibA
BC1\tV2\t2\tlibB
BC3\tV3\t3\tlibA
";
        fs::write(&input, bytes).unwrap();

        let stats = resolve_file(&input, &output, ResolverConfig::default()).unwrap();
        assert_eq!(
            stats,
            ResolveStats { input_rows: 4, rows_after_count_filter: 2, barcodes: 2, output_rows: 2 }
        );
        let expected = "\
Barcode\tVariantID\tcount\tLibrary
BC1\tV1\t8\tlibA
BC2\tV1\t8\tlibA
";
        assert_eq!(fs::read_to_string(&output).unwrap(), expected);
    }

    #[test]
    fn test_all_rows_filtered_writes_header() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("design.tsv");
        let output = dir.path().join("filtered.tsv");
        fs::write(&input, "Barcode\tVariantID\tcount\nBC1\tV1\t1\n").unwrap();

        resolve_file(&input, &output, ResolverConfig::default()).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "Barcode\tVariantID\tcount\n");
    }

    #[test]
    fn test_missing_count_column() {
        let result = CountTable::from_reader("Barcode\tVariantID\nBC1\tV1\n".as_bytes());
        assert_matches!(result, Err(CountTableError::MissingColumns { .. }));
        if let Err(CountTableError::MissingColumns { missing, .. }) = result {
            assert_eq!(missing, "count");
        }
    }

    #[test]
    fn test_columns_found_in_any_order() {
        let data = "count\tNotes\tVariantID\tBarcode\n9\tx\tV1\tBC1\n";
        let table = CountTable::from_reader(data.as_bytes()).unwrap();
        assert_eq!(table.to_counts(), vec![CountRecord::new("BC1", "V1", 9)]);
    }

    #[test]
    fn test_every_missing_column_is_named() {
        let result = CountTable::from_reader("VariantID\tNotes\nV1\tx\n".as_bytes());
        assert_matches!(result, Err(CountTableError::MissingColumns { .. }));
        if let Err(CountTableError::MissingColumns { missing, found }) = result {
            assert_eq!(missing, "Barcode,count");
            assert_eq!(found, "VariantID,Notes");
        }
    }

    #[test]
    fn test_empty_table() {
        let result = CountTable::from_reader("Barcode\tVariantID\tcount\n".as_bytes());
        assert_matches!(result, Err(CountTableError::Empty));

        let result = CountTable::from_reader("".as_bytes());
        assert_matches!(result, Err(CountTableError::MissingColumns { .. }));
    }

    #[test]
    fn test_invalid_count() {
        let data = "Barcode\tVariantID\tcount\nBC1\tV1\t8\nBC2\tV1\tlots\n";
        let result = CountTable::from_reader(data.as_bytes());
        assert_matches!(result, Err(CountTableError::InvalidCount { .. }));
        if let Err(CountTableError::InvalidCount { value, line }) = result {
            assert_eq!(value, "lots");
            assert_eq!(line, 3);
        }
    }
}
