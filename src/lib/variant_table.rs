//! Reading the variant table: the tab-delimited file that maps each anchor (mapping) sequence to
//! the identifier of the variant it belongs to.
#![forbid(unsafe_code)]

use std::{fmt::Display, path::Path};

use csv::{ReaderBuilder, StringRecord};
use fgoxide::io::Io;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The column holding the anchor sequence.
pub const MAPPING_SEQUENCE_COLUMN: &str = "MappingSequence";

/// The column holding the variant identifier.
pub const VARIANT_ID_COLUMN: &str = "VariantID";

/// The optional line number of the variant table row an error refers to.
#[derive(Debug)]
pub struct ErrorLine(pub Option<usize>);

impl Display for ErrorLine {
    /// Writes the line number if present, nothing otherwise.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(number) => write!(f, "Line {}", number),
            None => Ok(()),
        }
    }
}

/// The error that may occur when reading the variant table or building an index from it.
#[derive(Error, Debug)]
pub enum VariantTableError {
    #[error("Io error occurred")]
    Io(#[from] std::io::Error),

    #[error("Io error occurred")]
    FgError(#[from] fgoxide::FgError),

    #[error(transparent)]
    Deserialize(#[from] csv::Error),

    #[error("The variant table is missing the '{column}' column, found columns: {found}")]
    MissingColumn { column: &'static str, found: String },

    #[error("Unable to deserialize line number {line}")]
    DeserializeRecord { source: csv::Error, line: usize },

    #[error("The variant table must include at least one mapping sequence")]
    ZeroAnchors,

    #[error("Empty mapping sequence for variant `{variant_id}`. {line}")]
    EmptyAnchor { variant_id: String, line: ErrorLine },

    #[error("Mapping sequence `{sequence}` maps to variants `{first}` and `{second}`. {line}")]
    ConflictingAnchor { sequence: String, first: String, second: String, line: ErrorLine },

    #[error("Failed to build the anchor automaton: {0}")]
    Automaton(#[from] aho_corasick::BuildError),
}

/// One row of the variant table: an anchor sequence and the variant it identifies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AnchorEntry {
    /// The anchor sequence searched for in each read.
    #[serde(rename = "MappingSequence")]
    pub sequence: String,

    /// The identifier of the variant.
    #[serde(rename = "VariantID")]
    pub variant_id: String,

    /// The line number in the input in which this anchor was defined
    #[serde(skip)]
    pub line_number: Option<usize>,
}

impl AnchorEntry {
    /// Create a new [`AnchorEntry`] with no associated line number.
    pub fn new<S: Into<String>, V: Into<String>>(sequence: S, variant_id: V) -> Self {
        Self { sequence: sequence.into(), variant_id: variant_id.into(), line_number: None }
    }
}

/// Reads the variant table at the given path.  The file may be gzip compressed.
///
/// Columns other than `MappingSequence` and `VariantID` are ignored.  No validation of the
/// anchors themselves is done here; see [`crate::anchor_index::AnchorIndex::new`].
///
/// # Errors
///
/// - [`VariantTableError::MissingColumn`] if either required column is absent
/// - [`VariantTableError::DeserializeRecord`] if a row cannot be parsed
pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<AnchorEntry>, VariantTableError> {
    let io = Io::default();
    let reader = io.new_reader(&path)?;
    from_reader(reader)
}

/// Reads the variant table from any reader, see [`from_path`].
pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Vec<AnchorEntry>, VariantTableError> {
    let mut reader = ReaderBuilder::new().delimiter(b'\t').has_headers(true).from_reader(reader);

    let headers: StringRecord = reader.headers()?.clone();
    for column in [MAPPING_SEQUENCE_COLUMN, VARIANT_ID_COLUMN] {
        if !headers.iter().any(|h| h == column) {
            return Err(VariantTableError::MissingColumn {
                column,
                found: headers.iter().join(","),
            });
        }
    }

    let mut entries = vec![];
    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, csv::Position::line) as usize;
        let entry: AnchorEntry = record
            .deserialize(Some(&headers))
            .map_err(|source| VariantTableError::DeserializeRecord { source, line })?;
        entries.push(AnchorEntry { line_number: Some(line), ..entry });
    }
    Ok(entries)
}

/// Serialize a collection of [`AnchorEntry`] into a tab-delimited file.
#[cfg(test)]
pub fn to_path<P: AsRef<Path>, I: IntoIterator<Item = AnchorEntry>>(
    path: P,
    entries: I,
) -> Result<(), VariantTableError> {
    let mut writer = csv::WriterBuilder::new().has_headers(true).delimiter(b'\t').from_path(path)?;
    for entry in entries {
        writer.serialize(entry)?;
    }
    writer.flush()?;
    Ok(())
}
