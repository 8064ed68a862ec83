use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::article::{ArticleRecord, COLUMNS};
use crate::error::{Error, Result};
use crate::storage::traits::{RecordStore, WriteOutcome};

const BOM: &[u8] = b"\xEF\xBB\xBF";
const BOM_CHAR: char = '\u{feff}';

/// The record table as a CSV file with a fixed header.
///
/// Every write goes to a temporary file next to the target which is synced
/// and then renamed over it, so a reader sees either the old or the new
/// contents.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
    write_bom: bool,
}

impl CsvStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_bom: true,
        }
    }

    /// Write a UTF-8 byte-order mark when the file is created.
    pub fn with_bom(mut self, write_bom: bool) -> Self {
        self.write_bom = write_bom;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw file contents without a leading BOM, or `None` when there is
    /// no store yet (missing or blank file).
    fn read_existing(&self) -> Result<Option<Vec<u8>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&self.path).map_err(|e| {
            Error::StoreCorruption(format!("Cannot read {}: {}", self.path.display(), e))
        })?;

        let body = bytes.strip_prefix(BOM).unwrap_or(&bytes);
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }

        Ok(Some(body.to_vec()))
    }

    fn parse(&self, body: &[u8]) -> Result<Vec<ArticleRecord>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(body);

        let headers = reader.headers().map_err(|e| self.corruption(e))?;
        let columns: Vec<&str> = headers
            .iter()
            .map(|h| h.trim_start_matches(BOM_CHAR).trim())
            .collect();
        if columns != COLUMNS {
            return Err(Error::StoreCorruption(format!(
                "{} has header {:?}, expected {:?}",
                self.path.display(),
                columns,
                COLUMNS
            )));
        }
        // Rows bind to the canonical names, not the padded ones on disk.
        reader.set_headers(csv::StringRecord::from(COLUMNS.to_vec()));

        let mut records = Vec::new();
        for row in reader.deserialize::<ArticleRecord>() {
            let mut record = row.map_err(|e| self.corruption(e))?;
            record.id = record
                .id
                .map(|id| id.trim_start_matches(BOM_CHAR).trim().to_string())
                .filter(|id| !id.is_empty());
            records.push(record);
        }

        Ok(records)
    }

    fn corruption(&self, err: csv::Error) -> Error {
        Error::StoreCorruption(format!("{}: {}", self.path.display(), err))
    }

    fn encode(records: &[ArticleRecord], with_header: bool) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());

        if with_header {
            writer.write_record(COLUMNS)?;
        }
        for record in records {
            writer.serialize(record)?;
        }

        writer
            .into_inner()
            .map_err(|e| Error::Csv(format!("Failed to flush CSV buffer: {}", e)))
    }

    fn fresh_file(&self, records: &[ArticleRecord]) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        if self.write_bom {
            bytes.extend_from_slice(BOM);
        }
        bytes.extend(Self::encode(records, true)?);
        Ok(bytes)
    }

    /// Write `bytes` to a synced temporary file beside the target. The
    /// target is untouched until the returned file is persisted; dropping it
    /// removes it.
    fn stage(&self, bytes: &[u8]) -> Result<NamedTempFile> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        Ok(temp)
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<()> {
        let temp = self.stage(bytes)?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        debug!("Persisted {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl RecordStore for CsvStore {
    async fn load(&self) -> Result<Vec<ArticleRecord>> {
        match self.read_existing()? {
            Some(body) => {
                let records = self.parse(&body)?;
                debug!("Loaded {} records from {}", records.len(), self.path.display());
                Ok(records)
            }
            None => {
                debug!("No store at {}, starting empty", self.path.display());
                Ok(Vec::new())
            }
        }
    }

    async fn overwrite(&self, records: &[ArticleRecord]) -> Result<WriteOutcome> {
        if records.is_empty() {
            warn!("Refusing to overwrite {} with zero records", self.path.display());
            return Ok(WriteOutcome::EmptyWritePrevented);
        }

        self.write_atomic(&self.fresh_file(records)?)?;
        info!("Wrote {} records to {}", records.len(), self.path.display());
        Ok(WriteOutcome::Written(records.len()))
    }

    async fn append(&self, records: &[ArticleRecord]) -> Result<WriteOutcome> {
        if records.is_empty() {
            warn!("Nothing to append to {}", self.path.display());
            return Ok(WriteOutcome::EmptyWritePrevented);
        }

        let bytes = match self.read_existing()? {
            Some(body) => {
                // Never extend a file we could not read back.
                self.parse(&body)?;

                let mut bytes = fs::read(&self.path)?;
                if bytes.last() != Some(&b'\n') {
                    bytes.push(b'\n');
                }
                bytes.extend(Self::encode(records, false)?);
                bytes
            }
            None => self.fresh_file(records)?,
        };

        self.write_atomic(&bytes)?;
        info!("Appended {} records to {}", records.len(), self.path.display());
        Ok(WriteOutcome::Written(records.len()))
    }
}
