//! Collapsing raw matches into per barcode/variant counts.

use ahash::AHashMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::extract::MatchRecord;

/// The header of the collapsed count output.
pub const COUNT_RECORD_HEADER: [&str; 3] = ["Barcode", "VariantID", "count"];

/// The number of reads observed for one barcode and variant pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CountRecord {
    #[serde(rename = "Barcode")]
    pub barcode: String,
    #[serde(rename = "VariantID")]
    pub variant_id: String,
    pub count: u64,
}

impl CountRecord {
    pub fn new<B: Into<String>, V: Into<String>>(barcode: B, variant_id: V, count: u64) -> Self {
        Self { barcode: barcode.into(), variant_id: variant_id.into(), count }
    }
}

/// Accumulates [`MatchRecord`]s into counts keyed by barcode and variant.
///
/// Counting is commutative, so collapsers built over separate parts of the input may be merged
/// with [`Collapser::update_with`].
#[derive(Debug, Default, Clone)]
pub struct Collapser {
    counts: AHashMap<(String, String), u64>,
    total: u64,
}

impl Collapser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one record.
    pub fn add(&mut self, record: &MatchRecord) {
        *self.counts.entry((record.barcode.clone(), record.variant_id.clone())).or_insert(0) += 1;
        self.total += 1;
    }

    /// Merge the counts from another [`Collapser`] into this one.
    pub fn update_with(&mut self, other: Self) {
        for (key, value) in other.counts {
            *self.counts.entry(key).or_insert(0) += value;
        }
        self.total += other.total;
    }

    /// The number of distinct barcode and variant pairs seen.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// The number of records counted.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// The counts, one per distinct pair, sorted by barcode then variant.
    pub fn into_counts(self) -> Vec<CountRecord> {
        self.counts
            .into_iter()
            .map(|((barcode, variant_id), count)| CountRecord { barcode, variant_id, count })
            .sorted()
            .collect()
    }
}

impl<'a> Extend<&'a MatchRecord> for Collapser {
    fn extend<T: IntoIterator<Item = &'a MatchRecord>>(&mut self, iter: T) {
        for record in iter {
            self.add(record);
        }
    }
}

/// Collapse a collection of [`MatchRecord`]s into sorted [`CountRecord`]s.
pub fn collapse<'a, I: IntoIterator<Item = &'a MatchRecord>>(records: I) -> Vec<CountRecord> {
    let mut collapser = Collapser::new();
    collapser.extend(records);
    collapser.into_counts()
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(read: usize, barcode: &str, variant_id: &str) -> MatchRecord {
        MatchRecord {
            read_id: format!("@read{}", read),
            anchor: format!("ANCHOR_{}", variant_id),
            barcode: barcode.to_string(),
            variant_id: variant_id.to_string(),
        }
    }

    fn records() -> Vec<MatchRecord> {
        vec![
            record(1, "BC1", "V1"),
            record(2, "BC2", "V1"),
            record(3, "BC1", "V1"),
            record(4, "BC1", "V2"),
            record(5, "BC1", "V1"),
            record(6, "BC3", "V3"),
        ]
    }

    #[test]
    fn test_collapse_counts_pairs() {
        let counts = collapse(&records());
        assert_eq!(
            counts,
            vec![
                CountRecord::new("BC1", "V1", 3),
                CountRecord::new("BC1", "V2", 1),
                CountRecord::new("BC2", "V1", 1),
                CountRecord::new("BC3", "V3", 1),
            ]
        );
    }

    #[test]
    fn test_collapse_is_order_independent() {
        let forward = collapse(&records());
        let mut reversed = records();
        reversed.reverse();
        assert_eq!(collapse(&reversed), forward);

        let mut rotated = records();
        rotated.rotate_left(4);
        assert_eq!(collapse(&rotated), forward);
    }

    #[test]
    fn test_collapse_empty() {
        assert!(collapse(&Vec::<MatchRecord>::new()).is_empty());
    }

    #[test]
    fn test_update_with_merges_counts() {
        let records = records();
        let (left, right) = records.split_at(2);

        let mut first = Collapser::new();
        first.extend(left);
        let mut second = Collapser::new();
        second.extend(right);
        first.update_with(second);

        assert_eq!(first.total(), 6);
        assert_eq!(first.len(), 4);
        assert_eq!(first.into_counts(), collapse(&records));
    }
}
