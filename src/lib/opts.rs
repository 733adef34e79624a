#![forbid(unsafe_code)]

use std::{num::NonZeroUsize, path::PathBuf};

use anyhow::{ensure, Result};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;

use crate::{
    extract::{
        ExtractConfig, DEFAULT_BARCODE_LENGTH, DEFAULT_MAX_READ_LENGTH, DEFAULT_MIN_READ_LENGTH,
    },
    resolve::{ResolverConfig, DEFAULT_MIN_COUNT, DEFAULT_MIN_FRACTION},
    utils::built_info,
};

pub static TOOL_NAME: &str = "crsbc";

static SHORT_USAGE: &str =
    "Associates barcodes with the variants of a CRS library from long sequencing reads.";

static LONG_USAGE: &str = "
Associates barcodes with the variants of a CRS library from long sequencing reads.

The `extract` command scans each read for one of the known mapping sequences and takes the
bases immediately following it as the barcode.  Every match is written to the raw output, and
the number of reads seen for each barcode and variant pair is written to the collapsed output.

The `filter` command takes a collapsed output and keeps, for each barcode, only a variant that
has enough reads and accounts for most of the barcode's reads.
";

#[derive(Parser, Debug, Clone)]
#[clap(name = TOOL_NAME, version = built_info::VERSION.as_str(), about=SHORT_USAGE, long_about=LONG_USAGE, term_width=0)]
pub struct Opts {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Extract barcodes and variants from a FASTQ and count each barcode/variant pair.
    Extract(ExtractOpts),
    /// Keep only the barcodes that resolve to a single dominant variant.
    Filter(FilterOpts),
}

#[derive(Args, Debug, Clone)]
pub struct ExtractOpts {
    /// Path to the input FASTQ, optionally gzipped.
    #[clap(long, short = 'f', display_order = 1)]
    pub fastq: PathBuf,

    /// Path to the tab-delimited variant table with `MappingSequence` and `VariantID` columns.
    #[clap(long, short = 'v', display_order = 2)]
    pub variants: PathBuf,

    /// Path to write one row per matched read.
    ///
    /// This tool will overwrite existing files.
    #[clap(long, short = 'o', display_order = 3)]
    pub output: PathBuf,

    /// Path to write the number of reads per barcode and variant.
    #[clap(long, short = 'c', display_order = 4)]
    pub collapsed_output: PathBuf,

    /// Optional path to write the extraction metrics.
    #[clap(long, short = 'm', display_order = 5)]
    pub metrics: Option<PathBuf>,

    /// Reads shorter than this are not scanned.
    #[clap(long, default_value_t = DEFAULT_MIN_READ_LENGTH, display_order = 11)]
    pub min_read_length: usize,

    /// Reads longer than this are not scanned.
    #[clap(long, default_value_t = DEFAULT_MAX_READ_LENGTH, display_order = 11)]
    pub max_read_length: usize,

    /// The number of bases after the mapping sequence that form the barcode.
    #[clap(long, default_value_t = DEFAULT_BARCODE_LENGTH, display_order = 11)]
    pub barcode_length: usize,

    /// Number of threads to use for extraction.
    #[clap(long, short = 't', default_value = "1", display_order = 31)]
    pub threads: NonZeroUsize,

    /// Number of reads to extract per chunk when using more than one thread.
    #[clap(long, default_value = "10000", display_order = 31, hide = true)]
    pub chunksize: NonZeroUsize,
}

impl ExtractOpts {
    /// Build the [`ExtractConfig`] from the CLI options.
    pub fn as_extract_config(&self) -> Result<ExtractConfig> {
        ExtractConfig::new(self.min_read_length, self.max_read_length, self.barcode_length)
    }
}

/// Implement defaults that match the CLI options to allow for easier testing.
///
/// Note that these defaults exist only within test code.
#[cfg(test)]
impl Default for ExtractOpts {
    fn default() -> Self {
        Self {
            fastq: PathBuf::default(),
            variants: PathBuf::default(),
            output: PathBuf::default(),
            collapsed_output: PathBuf::default(),
            metrics: None,
            min_read_length: DEFAULT_MIN_READ_LENGTH,
            max_read_length: DEFAULT_MAX_READ_LENGTH,
            barcode_length: DEFAULT_BARCODE_LENGTH,
            threads: NonZeroUsize::new(1).unwrap(),
            chunksize: NonZeroUsize::new(10_000).unwrap(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct FilterOpts {
    /// Path to the collapsed counts with `Barcode`, `VariantID` and `count` columns.
    #[clap(long, short = 'd', display_order = 1)]
    pub design_file: PathBuf,

    /// Path to write the filtered counts.
    #[clap(long, short = 'o', display_order = 2)]
    pub output_file: PathBuf,

    /// Rows with fewer reads than this are dropped.
    #[clap(long, default_value_t = DEFAULT_MIN_COUNT, display_order = 11)]
    pub min_count: u64,

    /// The minimum share of a barcode's reads a variant needs to be kept.
    #[clap(long, default_value_t = DEFAULT_MIN_FRACTION, display_order = 11)]
    pub min_fraction: f64,
}

impl FilterOpts {
    /// Build the [`ResolverConfig`] from the CLI options.
    pub fn as_resolver_config(&self) -> Result<ResolverConfig> {
        ensure!(
            self.min_fraction > 0.0 && self.min_fraction <= 1.0,
            "Minimum fraction must be in the range (0, 1], found {}",
            self.min_fraction
        );
        Ok(ResolverConfig { min_count: self.min_count, min_fraction: self.min_fraction })
    }
}

#[cfg(test)]
impl Default for FilterOpts {
    fn default() -> Self {
        Self {
            design_file: PathBuf::default(),
            output_file: PathBuf::default(),
            min_count: DEFAULT_MIN_COUNT,
            min_fraction: DEFAULT_MIN_FRACTION,
        }
    }
}

/// Parse args and set up logging / tracing
pub fn setup() -> Opts {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    Opts::parse()
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_parse_extract_defaults() {
        let opts = Opts::try_parse_from([
            TOOL_NAME,
            "extract",
            "-f",
            "reads.fastq.gz",
            "-v",
            "variants.tsv",
            "-o",
            "matches.tsv",
            "-c",
            "collapsed.tsv",
        ])
        .unwrap();
        match opts.command {
            Command::Extract(extract) => {
                assert_eq!(extract.fastq, PathBuf::from("reads.fastq.gz"));
                assert_eq!(extract.metrics, None);
                assert_eq!(extract.threads.get(), 1);
                assert_eq!(extract.as_extract_config().unwrap(), ExtractConfig::default());
            }
            other => panic!("Expected extract, found {:?}", other),
        }
    }

    #[test]
    fn test_parse_filter_defaults() {
        let opts =
            Opts::try_parse_from([TOOL_NAME, "filter", "-d", "counts.tsv", "-o", "out.tsv"])
                .unwrap();
        match opts.command {
            Command::Filter(filter) => {
                assert_eq!(filter.design_file, PathBuf::from("counts.tsv"));
                assert_eq!(filter.as_resolver_config().unwrap(), ResolverConfig::default());
            }
            other => panic!("Expected filter, found {:?}", other),
        }
    }

    #[test]
    fn test_zero_threads_is_rejected() {
        let result = Opts::try_parse_from([
            TOOL_NAME, "extract", "-f", "r.fq", "-v", "v.tsv", "-o", "o.tsv", "-c", "c.tsv", "-t",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_read_lengths() {
        let opts = ExtractOpts { min_read_length: 500, max_read_length: 400, ..Default::default() };
        assert!(opts.as_extract_config().is_err());
    }

    #[rstest]
    #[case(0.0)]
    #[case(-0.5)]
    #[case(1.5)]
    fn test_invalid_min_fraction(#[case] min_fraction: f64) {
        let opts = FilterOpts { min_fraction, ..Default::default() };
        assert!(opts.as_resolver_config().is_err());
    }
}
