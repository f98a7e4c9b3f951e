//! JSON file-backed ledger storage
//!
//! Each record lives in `<data_dir>/records/<key>.json`. Writes go to a
//! temporary file that is then renamed over the target.

use crate::error::{LedgerError, Result};
use crate::storage::{LedgerStorage, RecordKey};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Ledger storage persisting one JSON file per record
#[derive(Debug, Clone)]
pub struct FileLedgerStorage {
    records_dir: PathBuf,
}

impl FileLedgerStorage {
    /// Create storage rooted at `data_dir`, creating the directory if needed
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let records_dir = data_dir.as_ref().join("records");
        fs::create_dir_all(&records_dir).map_err(|e| LedgerError::Storage {
            message: format!(
                "Failed to create records directory {}: {}",
                records_dir.display(),
                e
            ),
        })?;

        Ok(Self { records_dir })
    }

    fn path_for(&self, key: RecordKey) -> PathBuf {
        self.records_dir.join(format!("{}.json", key.as_str()))
    }
}

impl LedgerStorage for FileLedgerStorage {
    fn get_raw(&self, key: RecordKey) -> Result<Option<serde_json::Value>> {
        let path = self.path_for(key);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                return Err(LedgerError::Storage {
                    message: format!("Failed to read record '{}'", key),
                }
                .into());
            }
        };

        let value = serde_json::from_str(&contents).map_err(|e| LedgerError::InvalidRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(value))
    }

    fn put_raw(&self, key: RecordKey, value: serde_json::Value) -> Result<()> {
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(&value)?;

        fs::write(&tmp_path, contents)
            .and_then(|_| fs::rename(&tmp_path, &path))
            .map_err(|e| {
                error!("Failed to write {}: {}", path.display(), e);
                LedgerError::Storage {
                    message: format!("Failed to write record '{}'", key),
                }
            })?;

        debug!("Stored record '{}' at {}", key, path.display());
        Ok(())
    }

    fn remove(&self, key: RecordKey) -> Result<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LedgerError::Storage {
                message: format!("Failed to remove record '{}': {}", key, e),
            }
            .into()),
        }
    }
}
