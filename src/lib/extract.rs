//! Functionality directly related to finding the anchor in a read and extracting the barcode that
//! follows it.

use anyhow::{ensure, Result};
use bstr::ByteSlice;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumCount, EnumIter};

use crate::{anchor_index::AnchorIndex, fastq::FastqRead};

/// The shortest read that is scanned for an anchor.
pub const DEFAULT_MIN_READ_LENGTH: usize = 200;

/// The longest read that is scanned for an anchor.
pub const DEFAULT_MAX_READ_LENGTH: usize = 1000;

/// The number of bases following the anchor that make up the barcode.
pub const DEFAULT_BARCODE_LENGTH: usize = 15;

/// The header of the raw match output.
pub const MATCH_RECORD_HEADER: [&str; 4] = ["ReadID", "MappingSequence", "Barcode", "VariantID"];

/// The barcode and variant extracted from a single read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchRecord {
    /// The header of the read.
    #[serde(rename = "ReadID")]
    pub read_id: String,
    /// The anchor found in the read.
    #[serde(rename = "MappingSequence")]
    pub anchor: String,
    /// The bases immediately following the anchor.
    #[serde(rename = "Barcode")]
    pub barcode: String,
    /// The variant identified by the anchor.
    #[serde(rename = "VariantID")]
    pub variant_id: String,
}

/// Why a read produced no [`MatchRecord`].
///
/// None of these are errors; they are counted and otherwise ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// The read is shorter than the minimum read length.
    ReadTooShort,
    /// The read is longer than the maximum read length.
    ReadTooLong,
    /// No anchor occurs in the read.
    NoAnchorFound,
    /// The anchor is too close to the end of the read for a full length barcode.
    BarcodeTruncated,
}

/// The outcome of extracting from one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractResult {
    Match(MatchRecord),
    Skip(SkipReason),
}

/// The read and barcode lengths used by the [`Extractor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractConfig {
    /// Reads shorter than this are skipped.
    pub min_read_length: usize,
    /// Reads longer than this are skipped.
    pub max_read_length: usize,
    /// The number of bases to take after the anchor.
    pub barcode_length: usize,
}

impl ExtractConfig {
    /// Create a new [`ExtractConfig`].
    ///
    /// # Errors
    ///
    /// If the minimum read length is greater than the maximum, or the barcode length is zero.
    pub fn new(
        min_read_length: usize,
        max_read_length: usize,
        barcode_length: usize,
    ) -> Result<Self> {
        ensure!(
            min_read_length <= max_read_length,
            "Minimum read length ({}) must not exceed the maximum read length ({})",
            min_read_length,
            max_read_length
        );
        ensure!(barcode_length > 0, "Barcode length must be greater than zero");
        Ok(Self { min_read_length, max_read_length, barcode_length })
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_read_length: DEFAULT_MIN_READ_LENGTH,
            max_read_length: DEFAULT_MAX_READ_LENGTH,
            barcode_length: DEFAULT_BARCODE_LENGTH,
        }
    }
}

/// Turns reads into [`MatchRecord`]s using a shared [`AnchorIndex`].
#[derive(Debug, Clone, Copy)]
pub struct Extractor<'a> {
    index: &'a AnchorIndex,
    config: ExtractConfig,
}

impl<'a> Extractor<'a> {
    pub fn new(index: &'a AnchorIndex, config: ExtractConfig) -> Self {
        Self { index, config }
    }

    /// Extract the anchor, barcode and variant from a read.
    ///
    /// Only the first anchor occurrence reported by [`AnchorIndex::scan`] is considered, which
    /// is the one that ends earliest in the read, and not necessarily the one that starts
    /// earliest or is longest.  The barcode is the `barcode_length` bases starting immediately
    /// after that anchor.
    pub fn extract(&self, read: &FastqRead) -> ExtractResult {
        let seq: &[u8] = read.seq.as_ref();
        if seq.len() < self.config.min_read_length {
            return ExtractResult::Skip(SkipReason::ReadTooShort);
        } else if seq.len() > self.config.max_read_length {
            return ExtractResult::Skip(SkipReason::ReadTooLong);
        }

        let hit = match self.index.first_hit(seq) {
            Some(hit) => hit,
            None => return ExtractResult::Skip(SkipReason::NoAnchorFound),
        };

        let barcode_start = hit.end_exclusive();
        let barcode = match seq.get(barcode_start..barcode_start + self.config.barcode_length) {
            Some(barcode) => barcode,
            None => return ExtractResult::Skip(SkipReason::BarcodeTruncated),
        };

        let variant_id = match self.index.lookup(hit.anchor) {
            Some(variant_id) => variant_id,
            None => return ExtractResult::Skip(SkipReason::NoAnchorFound),
        };

        ExtractResult::Match(MatchRecord {
            read_id: read.id.to_str_lossy().into_owned(),
            anchor: self.index.anchor(hit.index).to_string(),
            barcode: barcode.to_str_lossy().into_owned(),
            variant_id: variant_id.to_string(),
        })
    }
}
