//! Functionality pertaining to the collection of metrics during extraction.
//!
//! An [`ExtractionMetrics`] is kept per worker for each chunk of reads and merged with
//! [`ExtractionMetrics::update_with`], first across the workers of a chunk and then into the run
//! totals.  Every read is either matched or skipped for
//! exactly one [`SkipReason`].

use std::path::Path;

use anyhow::Result;
use fgoxide::io::DelimFile;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use strum::{EnumCount, IntoEnumIterator};

use crate::extract::{ExtractResult, SkipReason};

/// Counters for a single extraction run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractionMetrics {
    /// The number of complete reads examined.
    pub total_reads: usize,
    /// The number of reads that produced a match record.
    pub matched_reads: usize,
    /// The number of reads skipped, indexed by [`SkipReason`].
    pub skipped: [usize; SkipReason::COUNT],
    /// The number of records discarded for missing lines at the end of the input.
    pub truncated_records: usize,
}

impl ExtractionMetrics {
    /// Count the outcome of extracting from one read.
    pub fn update_with_result(&mut self, result: &ExtractResult) {
        self.total_reads += 1;
        match result {
            ExtractResult::Match(_) => self.matched_reads += 1,
            ExtractResult::Skip(reason) => self.skipped[*reason as usize] += 1,
        }
    }

    /// Update this [`ExtractionMetrics`] with another [`ExtractionMetrics`].
    pub fn update_with(&mut self, other: &Self) {
        self.total_reads += other.total_reads;
        self.matched_reads += other.matched_reads;
        for (mine, theirs) in self.skipped.iter_mut().zip(other.skipped.iter()) {
            *mine += theirs;
        }
        self.truncated_records += other.truncated_records;
    }

    /// The number of reads skipped for the given reason.
    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped[reason as usize]
    }

    /// The number of reads skipped for any reason.
    pub fn total_skipped(&self) -> usize {
        self.skipped.iter().sum()
    }

    /// Build the row that is written to file, deriving the ratio values.
    pub fn as_processed(&self, distinct_pairs: usize) -> ExtractionMetricsProcessed {
        let fraction_matched = if self.total_reads == 0 {
            0.0
        } else {
            self.matched_reads as f64 / self.total_reads as f64
        };
        ExtractionMetricsProcessed {
            total_reads: self.total_reads,
            matched_reads: self.matched_reads,
            read_too_short: self.skipped_for(SkipReason::ReadTooShort),
            read_too_long: self.skipped_for(SkipReason::ReadTooLong),
            no_anchor_found: self.skipped_for(SkipReason::NoAnchorFound),
            barcode_truncated: self.skipped_for(SkipReason::BarcodeTruncated),
            truncated_records: self.truncated_records,
            distinct_barcode_variant_pairs: distinct_pairs,
            fraction_matched,
        }
    }

    /// Log a one line summary per skip reason.
    pub fn log_summary(&self) {
        info!(
            "Examined {} reads, {} matched, {} skipped",
            self.total_reads,
            self.matched_reads,
            self.total_skipped()
        );
        for reason in SkipReason::iter() {
            info!("  {}: {}", reason.as_ref(), self.skipped_for(reason));
        }
        if self.truncated_records > 0 {
            warn!("Discarded {} truncated FASTQ records", self.truncated_records);
        }
    }

    /// Write the metrics as a single row to a tab-delimited file.
    pub fn write<P: AsRef<Path>>(&self, path: P, distinct_pairs: usize) -> Result<()> {
        let delim = DelimFile::default();
        delim.write_tsv(&path, vec![self.as_processed(distinct_pairs)])?;
        Ok(())
    }
}

/// The extraction metrics as written to file.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ExtractionMetricsProcessed {
    /// The number of complete reads examined.
    pub total_reads: usize,
    /// The number of reads that produced a match record.
    pub matched_reads: usize,
    /// The number of reads shorter than the minimum read length.
    pub read_too_short: usize,
    /// The number of reads longer than the maximum read length.
    pub read_too_long: usize,
    /// The number of reads of acceptable length without any anchor.
    pub no_anchor_found: usize,
    /// The number of reads whose anchor was too close to the end for a full barcode.
    pub barcode_truncated: usize,
    /// The number of truncated records discarded at the end of the input.
    pub truncated_records: usize,
    /// The number of rows in the collapsed output.
    pub distinct_barcode_variant_pairs: usize,
    /// `matched_reads / total_reads`, or zero if no reads were examined.
    pub fraction_matched: f64,
}
