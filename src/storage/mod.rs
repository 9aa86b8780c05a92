//! Write side: every file is replaced atomically so a failed run never
//! leaves a half-written snapshot behind.

use crate::models::{FundamentalRecord, LiveTradingCache, Snapshot};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), StorageError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| StorageError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(StorageError::OutputDir(format!("{:?} is not a directory", dir)));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| StorageError::OutputDir(e.to_string()))?;
    }
    Ok(())
}

/// Write to a temp file next to the target, then rename over it.
pub fn write_atomic(target: &Path, content: &[u8]) -> Result<PathBuf, StorageError> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ensure_output_dir(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(target).map_err(|e| StorageError::Io(e.error))?;
    Ok(target.to_path_buf())
}

fn csv_bytes<F>(fill: F) -> Result<Vec<u8>, StorageError>
where
    F: FnOnce(&mut csv::Writer<Vec<u8>>) -> Result<(), StorageError>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    fill(&mut writer)?;
    writer.into_inner().map_err(|e| StorageError::Io(e.into_error()))
}

pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), StorageError> {
    let bytes = csv_bytes(|w| {
        w.write_record(&snapshot.headers)?;
        for row in &snapshot.rows {
            w.write_record(row.cells())?;
        }
        Ok(())
    })?;
    write_atomic(path, &bytes)?;
    info!("Saved {} rows to {:?}", snapshot.len(), path);
    Ok(())
}

pub fn write_live_trading(path: &Path, cache: &LiveTradingCache) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(cache)?;
    write_atomic(path, json.as_bytes())?;
    info!("Saved {} records to {:?}", cache.data.len().saturating_sub(1), path);
    Ok(())
}

pub fn write_fundamentals(path: &Path, records: &[FundamentalRecord]) -> Result<(), StorageError> {
    let bytes = csv_bytes(|w| {
        // serialize() only emits a header once it sees a record
        if records.is_empty() {
            w.write_record(["Symbol", "EPS", "Book Value"])?;
        }
        for r in records {
            w.serialize(r)?;
        }
        Ok(())
    })?;
    write_atomic(path, &bytes)?;
    info!("Saved {} records to {:?}", records.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{load_fundamentals, load_live_trading, load_snapshot};
    use crate::models::Row;

    #[test]
    fn test_snapshot_roundtrip_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("div.csv");
        fs::write(&path, "old contents\n").unwrap();

        let snap = Snapshot::new(
            vec!["Symbol".into(), "Remarks".into()],
            vec![Row::new(["NABIL", "book closure, AGM"])],
        );
        write_snapshot(&path, &snap).unwrap();
        assert_eq!(load_snapshot(&path).unwrap(), snap);

        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/cache.json");
        let cache = LiveTradingCache::from_quotes("2024-05-01T10:00:00".into(), vec![]);
        write_live_trading(&path, &cache).unwrap();
        assert_eq!(load_live_trading(&path).unwrap(), cache);
    }

    #[test]
    fn test_rejects_file_as_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, "x").unwrap();
        let err = write_atomic(&file.join("child.csv"), b"data").unwrap_err();
        assert!(matches!(err, StorageError::OutputDir(_)));
    }

    #[test]
    fn test_fundamentals_header_always_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eps.csv");
        write_fundamentals(&path, &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "Symbol,EPS,Book Value\n");

        let recs = vec![FundamentalRecord::unknown("ADBL")];
        write_fundamentals(&path, &recs).unwrap();
        assert_eq!(load_fundamentals(&path).unwrap(), recs);
    }
}
