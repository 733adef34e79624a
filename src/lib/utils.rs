//! Utility functions.
use std::{io::Write, path::Path};

use anyhow::{Context, Result};
use fgoxide::io::Io;

pub mod built_info {
    use lazy_static::lazy_static;
    include!(concat!(env!("OUT_DIR"), "/built.rs"));

    /// Get a software version string including
    ///   - Git commit hash
    ///   - Git dirty info (whether the repo had uncommitted changes)
    ///   - Cargo package version if no git info found
    fn get_software_version() -> String {
        let prefix = if let Some(s) = GIT_COMMIT_HASH {
            format!("{}-{}", PKG_VERSION, &s[0..8])
        } else {
            PKG_VERSION.to_string()
        };
        let suffix = match GIT_DIRTY {
            Some(true) => "-dirty",
            _ => "",
        };
        format!("{}{}", prefix, suffix)
    }

    lazy_static! {
        /// Version of the software with git hash
        pub static ref VERSION: String = get_software_version();
    }
}

/// Open a tab-delimited writer that writes the given header before any records.
///
/// The header is written explicitly so that a file with no records still has one.  Output is
/// gzip compressed if the path ends in `.gz` or `.bgz`.
pub fn tsv_writer<P: AsRef<Path>>(
    path: P,
    header: &[&str],
) -> Result<csv::Writer<Box<dyn Write>>> {
    let io = Io::default();
    let writer = io
        .new_writer(&path)
        .with_context(|| format!("Failed to create {}", path.as_ref().to_string_lossy()))?;
    let writer: Box<dyn Write> = Box::new(writer);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(header)?;
    Ok(writer)
}


#[cfg(test)]
mod test {
    use tempfile::tempdir;

    use super::tsv_writer;

    #[test]
    fn test_tsv_writer_writes_header_without_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.tsv");
        let mut writer = tsv_writer(&path, &["Barcode", "VariantID", "count"]).unwrap();
        writer.flush().unwrap();
        drop(writer);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Barcode\tVariantID\tcount\n");
    }

    #[test]
    fn test_tsv_writer_writes_records_after_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("counts.tsv");
        let mut writer = tsv_writer(&path, &["Barcode", "VariantID", "count"]).unwrap();
        writer.serialize(("BC1", "V1", 3)).unwrap();
        writer.flush().unwrap();
        drop(writer);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Barcode\tVariantID\tcount\nBC1\tV1\t3\n"
        );
    }
}
