//! A multi-pattern index over the anchor (mapping) sequences.
//!
//! The index is an Aho-Corasick automaton: a trie over every anchor with failure links, so that a
//! read is scanned once, left to right, and every occurrence of every anchor is reported without
//! backtracking.  Occurrences are reported in the order they are completed during the scan, so an
//! anchor ending earlier in the read is always reported before one ending later.  When several
//! anchors end at the same position the longest is reported first.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use ahash::AHashMap;
use log::{debug, warn};

use crate::variant_table::{AnchorEntry, ErrorLine, VariantTableError};

/// A single occurrence of an anchor in a scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorHit<'a> {
    /// The index of the anchor in the [`AnchorIndex`].
    pub index: usize,
    /// The offset of the last base of the anchor in the text (inclusive).
    pub end: usize,
    /// The anchor sequence.
    pub anchor: &'a [u8],
}

impl<'a> AnchorHit<'a> {
    /// The offset of the first base of the anchor in the text.
    pub fn start(&self) -> usize {
        self.end + 1 - self.anchor.len()
    }

    /// The offset immediately after the anchor in the text.
    pub fn end_exclusive(&self) -> usize {
        self.end + 1
    }
}

/// The compiled anchor automaton and the anchor to variant lookup.
///
/// Built once per run and read-only afterwards, so it may be shared across threads.
#[derive(Debug)]
pub struct AnchorIndex {
    /// The unique anchors, in the order they were first seen.  The position in this vec is the
    /// pattern identifier used by the automaton.
    entries: Vec<AnchorEntry>,
    /// Lookup from the anchor sequence to its position in `entries`.
    lookup: AHashMap<Vec<u8>, usize>,
    automaton: AhoCorasick,
}

impl AnchorIndex {
    /// Build a new [`AnchorIndex`] over the given anchors.
    ///
    /// An anchor listed more than once with the same variant is kept once.  An anchor listed
    /// with two different variants is rejected, since there is no way to know which is meant.
    ///
    /// # Errors
    ///
    /// - [`VariantTableError::ZeroAnchors`] if no anchors are given
    /// - [`VariantTableError::EmptyAnchor`] if an anchor is the empty string
    /// - [`VariantTableError::ConflictingAnchor`] if an anchor maps to two variants
    pub fn new(anchors: Vec<AnchorEntry>) -> Result<Self, VariantTableError> {
        if anchors.is_empty() {
            return Err(VariantTableError::ZeroAnchors);
        }

        let mut entries: Vec<AnchorEntry> = Vec::with_capacity(anchors.len());
        let mut lookup: AHashMap<Vec<u8>, usize> = AHashMap::with_capacity(anchors.len());
        for anchor in anchors {
            if anchor.sequence.is_empty() {
                return Err(VariantTableError::EmptyAnchor {
                    variant_id: anchor.variant_id,
                    line: ErrorLine(anchor.line_number),
                });
            }
            match lookup.get(anchor.sequence.as_bytes()) {
                Some(&existing) => {
                    let existing = &entries[existing];
                    if existing.variant_id != anchor.variant_id {
                        return Err(VariantTableError::ConflictingAnchor {
                            sequence: anchor.sequence,
                            first: existing.variant_id.clone(),
                            second: anchor.variant_id,
                            line: ErrorLine(anchor.line_number),
                        });
                    }
                    warn!(
                        "Mapping sequence {} for variant {} is listed more than once",
                        anchor.sequence, anchor.variant_id
                    );
                }
                None => {
                    lookup.insert(anchor.sequence.as_bytes().to_vec(), entries.len());
                    entries.push(anchor);
                }
            }
        }

        // Standard semantics are required for overlapping search.
        let automaton = AhoCorasickBuilder::new()
            .match_kind(MatchKind::Standard)
            .build(entries.iter().map(|e| e.sequence.as_bytes()))?;
        debug!(
            "Built {:?} anchor automaton over {} anchors using {} bytes",
            automaton.kind(),
            entries.len(),
            automaton.memory_usage()
        );

        Ok(Self { entries, lookup, automaton })
    }

    /// The number of unique anchors in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no anchors, which can not happen for a constructed index.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The anchor sequence with the given index.
    pub fn anchor(&self, index: usize) -> &str {
        &self.entries[index].sequence
    }

    /// The variant identifier for the anchor with the given index.
    pub fn variant_id(&self, index: usize) -> &str {
        &self.entries[index].variant_id
    }

    /// Look up the variant identifier for an anchor sequence.
    pub fn lookup(&self, anchor: &[u8]) -> Option<&str> {
        self.lookup.get(anchor).map(|&index| self.variant_id(index))
    }

    /// Scan the text, returning every occurrence of every anchor, including overlapping ones, in
    /// the order they are completed.
    pub fn scan<'a>(&'a self, text: &'a [u8]) -> impl Iterator<Item = AnchorHit<'a>> + 'a {
        self.automaton.find_overlapping_iter(text).map(move |m| {
            let index = m.pattern().as_usize();
            AnchorHit { index, end: m.end() - 1, anchor: self.entries[index].sequence.as_bytes() }
        })
    }

    /// The first anchor occurrence reported by [`AnchorIndex::scan`], if any.
    pub fn first_hit<'a>(&'a self, text: &'a [u8]) -> Option<AnchorHit<'a>> {
        self.scan(text).next()
    }
}
