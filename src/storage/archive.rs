//! Season archive storage
//!
//! Archives are opaque snapshots keyed by season number. Backups of the
//! working state taken before a restore are kept separately and never read
//! back by the service.

use crate::error::{LedgerError, Result};
use crate::types::{SeasonNumber, SeasonSnapshot, SeasonSummary};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Trait for season archive operations
#[async_trait]
pub trait SeasonArchive: Send + Sync {
    /// Store a snapshot, replacing any existing one for the same season
    async fn store(&self, snapshot: SeasonSnapshot) -> Result<()>;

    /// Load the snapshot of a season
    async fn load(&self, season: SeasonNumber) -> Result<Option<SeasonSnapshot>>;

    /// Remove a season's snapshot, returning whether it existed
    async fn remove(&self, season: SeasonNumber) -> Result<bool>;

    /// Summaries of all archived seasons, ascending by season number
    async fn list(&self) -> Result<Vec<SeasonSummary>>;

    /// Keep a copy of the working state before it is overwritten
    async fn store_backup(&self, backup: SeasonSnapshot) -> Result<()>;
}

fn summarize(snapshot: &SeasonSnapshot) -> SeasonSummary {
    SeasonSummary {
        season: snapshot.season,
        name: snapshot.season_name.clone(),
        archived_at: Some(snapshot.archived_at),
        is_import_season: false,
    }
}

/// In-memory season archive
#[derive(Debug, Default)]
pub struct InMemorySeasonArchive {
    snapshots: RwLock<BTreeMap<SeasonNumber, SeasonSnapshot>>,
    backups: RwLock<Vec<SeasonSnapshot>>,
}

impl InMemorySeasonArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backups taken so far (for testing)
    pub async fn backups(&self) -> Vec<SeasonSnapshot> {
        self.backups.read().await.clone()
    }
}

#[async_trait]
impl SeasonArchive for InMemorySeasonArchive {
    async fn store(&self, snapshot: SeasonSnapshot) -> Result<()> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.season, snapshot);
        Ok(())
    }

    async fn load(&self, season: SeasonNumber) -> Result<Option<SeasonSnapshot>> {
        Ok(self.snapshots.read().await.get(&season).cloned())
    }

    async fn remove(&self, season: SeasonNumber) -> Result<bool> {
        Ok(self.snapshots.write().await.remove(&season).is_some())
    }

    async fn list(&self) -> Result<Vec<SeasonSummary>> {
        Ok(self.snapshots.read().await.values().map(summarize).collect())
    }

    async fn store_backup(&self, backup: SeasonSnapshot) -> Result<()> {
        self.backups.write().await.push(backup);
        Ok(())
    }
}

/// Season archive writing one JSON file per season
#[derive(Debug, Clone)]
pub struct FileSeasonArchive {
    archive_dir: PathBuf,
    backup_dir: PathBuf,
}

impl FileSeasonArchive {
    /// Create an archive under `<data_dir>/archives` and `<data_dir>/backups`
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let archive_dir = data_dir.as_ref().join("archives");
        let backup_dir = data_dir.as_ref().join("backups");

        for dir in [&archive_dir, &backup_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| LedgerError::Storage {
                    message: format!("Failed to create directory {}: {}", dir.display(), e),
                })?;
        }

        Ok(Self {
            archive_dir,
            backup_dir,
        })
    }

    fn path_for(&self, season: SeasonNumber) -> PathBuf {
        self.archive_dir.join(format!("season-{}.json", season))
    }

    async fn write_json(path: &Path, snapshot: &SeasonSnapshot) -> Result<()> {
        let contents = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| LedgerError::Storage {
                message: format!("Failed to write {}: {}", path.display(), e),
            })?;
        Ok(())
    }

    async fn read_snapshot(path: &Path) -> Result<Option<SeasonSnapshot>> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LedgerError::Storage {
                    message: format!("Failed to read {}: {}", path.display(), e),
                }
                .into())
            }
        };

        let snapshot = serde_json::from_str(&contents).map_err(|e| LedgerError::InvalidRecord {
            key: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(snapshot))
    }
}

#[async_trait]
impl SeasonArchive for FileSeasonArchive {
    async fn store(&self, snapshot: SeasonSnapshot) -> Result<()> {
        let path = self.path_for(snapshot.season);
        Self::write_json(&path, &snapshot).await?;
        info!("Archived season {} to {}", snapshot.season, path.display());
        Ok(())
    }

    async fn load(&self, season: SeasonNumber) -> Result<Option<SeasonSnapshot>> {
        Self::read_snapshot(&self.path_for(season)).await
    }

    async fn remove(&self, season: SeasonNumber) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(season)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LedgerError::Storage {
                message: format!("Failed to remove archive of season {}: {}", season, e),
            }
            .into()),
        }
    }

    async fn list(&self) -> Result<Vec<SeasonSummary>> {
        let mut entries =
            tokio::fs::read_dir(&self.archive_dir)
                .await
                .map_err(|e| LedgerError::Storage {
                    message: format!("Failed to list archives: {}", e),
                })?;

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(snapshot) = Self::read_snapshot(&path).await? {
                summaries.push(summarize(&snapshot));
            }
        }

        summaries.sort_by_key(|s| s.season);
        debug!("Found {} archived seasons", summaries.len());
        Ok(summaries)
    }

    async fn store_backup(&self, backup: SeasonSnapshot) -> Result<()> {
        let path = self.backup_dir.join(format!(
            "backup-{}-{}.json",
            backup.archived_at.format("%Y%m%dT%H%M%S"),
            backup.id
        ));
        Self::write_json(&path, &backup).await
    }
}
