//! Reads RIR extended delegation files into the allocation store.
//!
//! Version headers, per-registry summary rows, comments, and non-address
//! record types (asn) are skipped silently; rows that name an address
//! family but fail normalization are logged and counted as rejected.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, warn};
use thiserror::Error;

use alloc_store::MemoryAllocationStore;
use bucketing::ingest::{v4_record, v6_record, RegistryLine};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read delegation file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub v4: usize,
    pub v6: usize,
    pub skipped: usize,
    pub rejected: usize,
}

impl LoadReport {
    pub fn merge(&mut self, other: &LoadReport) {
        self.v4 += other.v4;
        self.v6 += other.v6;
        self.skipped += other.skipped;
        self.rejected += other.rejected;
    }
}

pub fn load_delegation_file(
    path: &Path,
    store: &MemoryAllocationStore,
) -> Result<LoadReport, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut report = LoadReport::default();
    for line in reader.lines() {
        let line = line.map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            report.skipped += 1;
            continue;
        }
        let parsed = match RegistryLine::parse(trimmed) {
            Ok(parsed) => parsed,
            Err(_) => {
                report.skipped += 1;
                continue;
            }
        };
        // Summary rows carry `*` in the country column.
        if parsed.cc == "*" {
            report.skipped += 1;
            continue;
        }
        match parsed.rtype {
            "ipv4" => match v4_record(&parsed) {
                Ok(Some(record)) => {
                    store.insert(record);
                    report.v4 += 1;
                }
                Ok(None) => report.skipped += 1,
                Err(err) => {
                    warn!("rejecting row in {}: {err}", path.display());
                    report.rejected += 1;
                }
            },
            "ipv6" => match v6_record(&parsed) {
                Ok(Some(record)) => {
                    store.insert(record);
                    report.v6 += 1;
                }
                Ok(None) => report.skipped += 1,
                Err(err) => {
                    warn!("rejecting row in {}: {err}", path.display());
                    report.rejected += 1;
                }
            },
            _ => report.skipped += 1,
        }
    }
    debug!(
        "loaded {}: v4={} v6={} skipped={} rejected={}",
        path.display(),
        report.v4,
        report.v6,
        report.skipped,
        report.rejected
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use core_types::types::IpVersion;

    const SAMPLE: &str = "\
2|apnic|20230711|5|19830101|20230710|+1000
apnic|*|ipv4|*|3|summary
apnic|CN|ipv4|1.0.1.0|256|20110414|allocated
apnic|JP|asn|2497|1|20000101|allocated
apnic|JP|ipv6|2001:200::|35|19990813|allocated
apnic|ZZ|ipv4|not-an-address|256|20000101|allocated
apnic|AU|ipv4|1.0.0.0|256|20110811|available
";

    #[test]
    fn loads_address_rows_and_counts_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("delegated-apnic-extended-latest");
        let mut file = File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let store = MemoryAllocationStore::new();
        let report = load_delegation_file(&path, &store).unwrap();
        assert_eq!(report.v4, 1);
        assert_eq!(report.v6, 1);
        // Header, summary, asn row, and the available row.
        assert_eq!(report.skipped, 4);
        assert_eq!(report.rejected, 1);
        assert_eq!(store.len(IpVersion::V4), 1);
        assert_eq!(store.len(IpVersion::V6), 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        let store = MemoryAllocationStore::new();
        assert!(load_delegation_file(Path::new("/nonexistent/delegated"), &store).is_err());
    }
}
