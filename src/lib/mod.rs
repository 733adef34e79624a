//! A library of functionality for associating barcodes with CRS library variants.
//!
//! # Overview
//!
//! The flow of data is as follows:
//!
//! - The [`variant_table`] is read and compiled into an [`anchor_index::AnchorIndex`], an
//!   Aho-Corasick automaton over every mapping sequence.
//! - The [`fastq::ReadSource`] yields each read's header and bases.
//! - The [`extract::Extractor`] scans each read for the first anchor to complete and takes the
//!   bases after it as the barcode, producing an [`extract::MatchRecord`] or a
//!   [`extract::SkipReason`].
//! - The [`collapse::Collapser`] counts the match records per barcode and variant.
//! - [`metrics`] and counts are collected per worker over each chunk of reads, then merged
//!   with `update_with`.
//!
//! Separately, the [`resolve::MajorityResolver`] filters a collapsed count table down to the
//! barcodes that resolve to a single dominant variant.
#![deny(unsafe_code)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]
pub mod anchor_index;
pub mod collapse;
pub mod extract;
pub mod fastq;
pub mod metrics;
pub mod opts;
pub mod resolve;
pub mod run;
pub mod utils;
pub mod variant_table;
