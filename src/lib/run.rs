use std::{io, num::NonZeroUsize};

use anyhow::{ensure, Context, Result};
use log::{debug, info, warn};
use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};

use crate::{
    anchor_index::AnchorIndex,
    collapse::{Collapser, COUNT_RECORD_HEADER},
    extract::{ExtractResult, Extractor, MatchRecord, MATCH_RECORD_HEADER},
    fastq::{FastqRead, ReadSource},
    metrics::ExtractionMetrics,
    opts::{Command, ExtractOpts, FilterOpts, Opts},
    resolve::{resolve_file, ResolveStats},
    utils::tsv_writer,
    variant_table,
};

/// How often, in reads, progress is logged.
const PROGRESS_INTERVAL: usize = 1_000_000;

/// Run the subcommand given on the command line.
pub fn run(opts: Opts) -> Result<(), anyhow::Error> {
    match opts.command {
        Command::Extract(opts) => run_extract(&opts).map(|_| ()),
        Command::Filter(opts) => run_filter(&opts).map(|_| ()),
    }
}

/// Extract a barcode and variant from every read, writing the raw matches and their counts.
pub fn run_extract(opts: &ExtractOpts) -> Result<ExtractionMetrics> {
    let config = opts.as_extract_config()?;
    ensure!(opts.fastq.exists(), "Input FASTQ does not exist: {}", opts.fastq.to_string_lossy());

    info!("Reading variant table {}", opts.variants.to_string_lossy());
    let anchors = variant_table::from_path(&opts.variants).with_context(|| {
        format!("Failed to read variant table {}", opts.variants.to_string_lossy())
    })?;
    let index = AnchorIndex::new(anchors).with_context(|| {
        format!("Invalid variant table {}", opts.variants.to_string_lossy())
    })?;
    info!("Loaded {} mapping sequences", index.len());
    let extractor = Extractor::new(&index, config);

    let mut reads = ReadSource::from_path(&opts.fastq)?;
    let mut writer = tsv_writer(&opts.output, &MATCH_RECORD_HEADER)?;
    let pool = thread_pool(opts.threads)?;
    debug!("Extracting with {} threads in chunks of {}", opts.threads, opts.chunksize);

    info!("Processing reads");
    let mut metrics = ExtractionMetrics::default();
    let mut collapser = Collapser::new();
    loop {
        let chunk: Vec<FastqRead> = reads
            .by_ref()
            .take(opts.chunksize.get())
            .collect::<io::Result<_>>()
            .with_context(|| format!("Failed to read {}", opts.fastq.to_string_lossy()))?;
        if chunk.is_empty() {
            break;
        }

        let before = metrics.total_reads;
        let extracted = extract_chunk(&extractor, &chunk, pool.as_ref());
        for record in &extracted.records {
            writer.serialize(record)?;
        }
        metrics.update_with(&extracted.metrics);
        collapser.update_with(extracted.counts);
        if before / PROGRESS_INTERVAL != metrics.total_reads / PROGRESS_INTERVAL {
            info!(
                "Processed {} reads, {} matched",
                metrics.total_reads, metrics.matched_reads
            );
        }
    }
    writer.flush()?;
    metrics.truncated_records = reads.num_truncated();
    metrics.log_summary();

    let distinct_pairs = collapser.len();
    info!(
        "Writing {} barcode/variant pairs to {}",
        distinct_pairs,
        opts.collapsed_output.to_string_lossy()
    );
    if collapser.is_empty() {
        warn!("No reads matched a mapping sequence, only headers will be written");
    }
    let mut writer = tsv_writer(&opts.collapsed_output, &COUNT_RECORD_HEADER)?;
    for count in collapser.into_counts() {
        writer.serialize(&count)?;
    }
    writer.flush()?;

    if let Some(path) = &opts.metrics {
        info!("Writing metrics to {}", path.to_string_lossy());
        metrics.write(path, distinct_pairs)?;
    }

    Ok(metrics)
}

/// The outcome of extracting from one chunk of reads.
#[derive(Debug, Default)]
pub struct ExtractedChunk {
    /// The match records, in the order of the reads they came from.
    pub records: Vec<MatchRecord>,
    pub metrics: ExtractionMetrics,
    pub counts: Collapser,
}

/// Build a pool for extraction, or `None` when extracting on the calling thread.
fn thread_pool(threads: NonZeroUsize) -> Result<Option<ThreadPool>> {
    if threads.get() > 1 {
        Ok(Some(ThreadPoolBuilder::new().num_threads(threads.get()).build()?))
    } else {
        Ok(None)
    }
}

/// Extract from every read in the chunk, on the pool if one is given.
///
/// Each worker accumulates its own metrics and counts, which are merged once the workers are
/// done.  Records are returned in input order regardless of the number of threads.
pub fn extract_chunk(
    extractor: &Extractor,
    chunk: &[FastqRead],
    pool: Option<&ThreadPool>,
) -> ExtractedChunk {
    let fold = |mut acc: ExtractedChunk, read: &FastqRead| {
        let result = extractor.extract(read);
        acc.metrics.update_with_result(&result);
        if let ExtractResult::Match(record) = result {
            acc.counts.add(&record);
            acc.records.push(record);
        }
        acc
    };
    let merge = |mut left: ExtractedChunk, right: ExtractedChunk| {
        left.records.extend(right.records);
        left.metrics.update_with(&right.metrics);
        left.counts.update_with(right.counts);
        left
    };

    match pool {
        Some(pool) => pool.install(|| {
            chunk
                .par_iter()
                .fold(ExtractedChunk::default, fold)
                .reduce(ExtractedChunk::default, merge)
        }),
        None => chunk.iter().fold(ExtractedChunk::default(), fold),
    }
}

/// Filter a collapsed count table down to barcodes with a dominant variant.
pub fn run_filter(opts: &FilterOpts) -> Result<ResolveStats> {
    let config = opts.as_resolver_config()?;
    ensure!(
        opts.design_file.exists(),
        "Input design file does not exist: {}",
        opts.design_file.to_string_lossy()
    );
    resolve_file(&opts.design_file, &opts.output_file, config)
}
