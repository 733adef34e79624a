//! A lazy, line-oriented FASTQ reader.
//!
//! Records are read as groups of four lines: header, sequence, separator and quality.  Only the
//! header and sequence are kept; the separator and quality lines are consumed to keep the four
//! line framing aligned.  An empty header line ends the stream, as does a final record that is
//! missing some of its lines (the partial record is discarded).

use std::{
    io::{self, BufRead},
    path::Path,
};

use anyhow::{Context, Result};
use bstr::{BString, ByteSlice};
use fgoxide::io::Io;
use log::warn;

/// A single FASTQ record reduced to its header and bases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRead {
    /// The header line with surrounding whitespace removed.
    pub id: BString,
    /// The bases with surrounding whitespace removed.
    pub seq: BString,
}

impl FastqRead {
    pub fn new<I: Into<BString>, S: Into<BString>>(id: I, seq: S) -> Self {
        Self { id: id.into(), seq: seq.into() }
    }
}

/// Iterates over the [`FastqRead`]s in a line-oriented reader.
pub struct ReadSource<R: BufRead> {
    reader: R,
    header: Vec<u8>,
    seq: Vec<u8>,
    /// Holds the separator and then the quality line, neither of which is kept.
    discard: Vec<u8>,
    num_records: usize,
    num_truncated: usize,
    done: bool,
}

impl ReadSource<Box<dyn BufRead>> {
    /// Open a FASTQ file for reading, decompressing it if the path ends in `.gz` or `.bgz`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let io = Io::default();
        let reader = io
            .new_reader(&path)
            .with_context(|| format!("Failed to open {}", path.as_ref().to_string_lossy()))?;
        let reader: Box<dyn BufRead> = Box::new(reader);
        Ok(Self::new(reader))
    }
}

impl<R: BufRead> ReadSource<R> {
    /// Create a new [`ReadSource`] over the given reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            header: vec![],
            seq: vec![],
            discard: vec![],
            num_records: 0,
            num_truncated: 0,
            done: false,
        }
    }

    /// The number of complete records returned so far.
    pub fn num_records(&self) -> usize {
        self.num_records
    }

    /// The number of records discarded because they were missing lines at the end of the input.
    pub fn num_truncated(&self) -> usize {
        self.num_truncated
    }

    /// Read the next line into `buf`, returning false at end of input.
    fn read_line(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool> {
        buf.clear();
        Ok(reader.read_until(b'\n', buf)? > 0)
    }

    fn read_record(&mut self) -> io::Result<Option<FastqRead>> {
        if !Self::read_line(&mut self.reader, &mut self.header)? || self.header.trim().is_empty() {
            return Ok(None);
        }
        let complete = Self::read_line(&mut self.reader, &mut self.seq)?
            && Self::read_line(&mut self.reader, &mut self.discard)?
            && Self::read_line(&mut self.reader, &mut self.discard)?;
        if !complete {
            self.num_truncated += 1;
            warn!(
                "Discarding truncated FASTQ record after {} complete records: {}",
                self.num_records,
                self.header.trim().as_bstr()
            );
            return Ok(None);
        }
        self.num_records += 1;
        Ok(Some(FastqRead::new(self.header.trim(), self.seq.trim())))
    }
}

impl<R: BufRead> Iterator for ReadSource<R> {
    type Item = io::Result<FastqRead>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(read)) => Some(Ok(read)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;
    use tempfile::tempdir;

    use crate::utils::test_commons::{generate_reads, write_reads_to_file};

    use super::*;

    fn read_all(data: &str) -> (Vec<FastqRead>, usize) {
        let mut source = ReadSource::new(data.as_bytes());
        let reads: Vec<FastqRead> = source.by_ref().map(Result::unwrap).collect();
        (reads, source.num_truncated())
    }

    #[test]
    fn test_reads_header_and_sequence() {
        let (reads, truncated) = read_all("@r1 comment\nACGT\n+\nIIII\n@r2\nGGCC\n+r2\n!!!!\n");
        assert_eq!(
            reads,
            vec![FastqRead::new("@r1 comment", "ACGT"), FastqRead::new("@r2", "GGCC")]
        );
        assert_eq!(truncated, 0);
    }

    #[test]
    fn test_strips_whitespace_and_crlf() {
        let (reads, _) = read_all("@r1  \r\nACGT\r\n+\r\nIIII\r\n");
        assert_eq!(reads, vec![FastqRead::new("@r1", "ACGT")]);
    }

    #[test]
    fn test_no_trailing_newline() {
        let (reads, truncated) = read_all("@r1\nACGT\n+\nIIII");
        assert_eq!(reads, vec![FastqRead::new("@r1", "ACGT")]);
        assert_eq!(truncated, 0);
    }

    #[rstest]
    #[case("@r1\nACGT\n+\nIIII\n@r2\n")]
    #[case("@r1\nACGT\n+\nIIII\n@r2\nACGT\n")]
    #[case("@r1\nACGT\n+\nIIII\n@r2\nACGT\n+\n")]
    fn test_truncated_final_record_is_discarded(#[case] data: &str) {
        let (reads, truncated) = read_all(data);
        assert_eq!(reads, vec![FastqRead::new("@r1", "ACGT")]);
        assert_eq!(truncated, 1);
    }

    #[test]
    fn test_empty_header_ends_stream() {
        let (reads, truncated) = read_all("@r1\nACGT\n+\nIIII\n\n@r2\nACGT\n+\nIIII\n");
        assert_eq!(reads, vec![FastqRead::new("@r1", "ACGT")]);
        assert_eq!(truncated, 0);
    }

    #[test]
    fn test_empty_input() {
        let (reads, truncated) = read_all("");
        assert!(reads.is_empty());
        assert_eq!(truncated, 0);
    }

    #[rstest]
    #[case("reads.fastq")]
    #[case("reads.fastq.gz")]
    fn test_from_path(#[case] name: &str) {
        let dir = tempdir().unwrap();
        let path = dir.path().join(name);
        let reads = generate_reads("frag", 25, 250);
        write_reads_to_file(reads.iter(), &path);

        let mut source = ReadSource::from_path(&path).unwrap();
        let seen: Vec<FastqRead> = source.by_ref().map(Result::unwrap).collect();
        assert_eq!(seen, reads);
        assert_eq!(source.num_records(), 25);
    }
}
