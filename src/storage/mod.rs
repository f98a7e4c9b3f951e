//! Ledger storage interface and implementations
//!
//! Records are stored as JSON values under a fixed set of keys. Typed access
//! goes through [`LedgerStorageExt`], which validates every record on the way
//! in and on the way out so malformed data never reaches the rating engine.

pub mod archive;
pub mod file;

pub use archive::{FileSeasonArchive, InMemorySeasonArchive, SeasonArchive};
pub use file::FileLedgerStorage;

use crate::error::{LedgerError, Result};
use crate::types::{
    BattlegroupDeathEntry, CurrentSeason, CustomPlayer, DeletedPlayer, DifficultyTable,
    HiddenPlayer, ImportedRoster, PlayerEntries, SeasonWars, StreakRecord, NODE_COUNT,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Keys of the records the ledger persists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    ImportedRoster,
    DifficultyTable,
    PlayerEntries,
    BattlegroupDeaths,
    CustomPlayers,
    HiddenPlayers,
    DeletedPlayers,
    CurrentSeason,
    WarCalendar,
    StreakHistory,
}

impl RecordKey {
    pub const ALL: [RecordKey; 10] = [
        RecordKey::ImportedRoster,
        RecordKey::DifficultyTable,
        RecordKey::PlayerEntries,
        RecordKey::BattlegroupDeaths,
        RecordKey::CustomPlayers,
        RecordKey::HiddenPlayers,
        RecordKey::DeletedPlayers,
        RecordKey::CurrentSeason,
        RecordKey::WarCalendar,
        RecordKey::StreakHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKey::ImportedRoster => "imported_roster",
            RecordKey::DifficultyTable => "difficulty_table",
            RecordKey::PlayerEntries => "player_entries",
            RecordKey::BattlegroupDeaths => "battlegroup_deaths",
            RecordKey::CustomPlayers => "custom_players",
            RecordKey::HiddenPlayers => "hidden_players",
            RecordKey::DeletedPlayers => "deleted_players",
            RecordKey::CurrentSeason => "current_season",
            RecordKey::WarCalendar => "war_calendar",
            RecordKey::StreakHistory => "streak_history",
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed record stored under a fixed key
pub trait Record: Serialize + DeserializeOwned {
    const KEY: RecordKey;

    /// Check invariants that serde cannot express
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

fn invalid(key: RecordKey, reason: impl Into<String>) -> anyhow::Error {
    LedgerError::InvalidRecord {
        key: key.to_string(),
        reason: reason.into(),
    }
    .into()
}

fn require_names<'a>(key: RecordKey, names: impl Iterator<Item = &'a str>) -> Result<()> {
    for name in names {
        if name.trim().is_empty() {
            return Err(invalid(key, "player name cannot be empty"));
        }
    }
    Ok(())
}

impl Record for ImportedRoster {
    const KEY: RecordKey = RecordKey::ImportedRoster;

    fn validate(&self) -> Result<()> {
        require_names(Self::KEY, self.players.iter().map(|p| p.name.as_str()))?;
        if self.node_defaults.values().any(|p| !p.is_finite()) {
            return Err(invalid(Self::KEY, "node defaults must be finite"));
        }
        Ok(())
    }
}

impl Record for DifficultyTable {
    const KEY: RecordKey = RecordKey::DifficultyTable;

    fn validate(&self) -> Result<()> {
        for (node, difficulty) in &self.nodes {
            if *node == 0 || *node > NODE_COUNT {
                return Err(invalid(Self::KEY, format!("node {} out of range", node)));
            }
            let values = [
                difficulty.base_value,
                difficulty.current_value,
                difficulty.kill_bonus,
                difficulty.death_penalty,
            ];
            if values.iter().any(|v| !v.is_finite()) {
                return Err(invalid(
                    Self::KEY,
                    format!("node {} has a non-finite value", node),
                ));
            }
        }
        self.settings
            .validate()
            .map_err(|e| invalid(Self::KEY, e.to_string()))
    }
}

impl Record for Vec<PlayerEntries> {
    const KEY: RecordKey = RecordKey::PlayerEntries;

    fn validate(&self) -> Result<()> {
        require_names(Self::KEY, self.iter().map(|row| row.player.as_str()))?;
        for row in self {
            for entry in &row.entries {
                if let Some(node) = entry.node {
                    if node == 0 || node > NODE_COUNT {
                        return Err(invalid(
                            Self::KEY,
                            format!("entry for '{}' has node {} out of range", row.player, node),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Record for Vec<BattlegroupDeathEntry> {
    const KEY: RecordKey = RecordKey::BattlegroupDeaths;
}

impl Record for Vec<CustomPlayer> {
    const KEY: RecordKey = RecordKey::CustomPlayers;

    fn validate(&self) -> Result<()> {
        require_names(Self::KEY, self.iter().map(|p| p.name.as_str()))?;
        let mut seen = HashSet::new();
        for player in self {
            if !seen.insert(player.name.trim().to_lowercase()) {
                return Err(invalid(
                    Self::KEY,
                    format!("duplicate custom player '{}'", player.name),
                ));
            }
        }
        Ok(())
    }
}

impl Record for Vec<HiddenPlayer> {
    const KEY: RecordKey = RecordKey::HiddenPlayers;

    fn validate(&self) -> Result<()> {
        require_names(Self::KEY, self.iter().map(|p| p.name.as_str()))
    }
}

impl Record for Vec<DeletedPlayer> {
    const KEY: RecordKey = RecordKey::DeletedPlayers;

    fn validate(&self) -> Result<()> {
        require_names(Self::KEY, self.iter().map(|p| p.name.as_str()))
    }
}

impl Record for CurrentSeason {
    const KEY: RecordKey = RecordKey::CurrentSeason;

    fn validate(&self) -> Result<()> {
        if self.number == 0 {
            return Err(invalid(Self::KEY, "season number must be positive"));
        }
        Ok(())
    }
}

impl Record for Vec<SeasonWars> {
    const KEY: RecordKey = RecordKey::WarCalendar;

    fn validate(&self) -> Result<()> {
        for season in self {
            if season.wars.iter().filter(|w| w.active).count() > 1 {
                return Err(invalid(
                    Self::KEY,
                    format!("season {} has more than one active war", season.season),
                ));
            }
        }
        Ok(())
    }
}

impl Record for Vec<StreakRecord> {
    const KEY: RecordKey = RecordKey::StreakHistory;

    fn validate(&self) -> Result<()> {
        require_names(Self::KEY, self.iter().map(|r| r.name.as_str()))
    }
}

/// Trait for raw key-value record storage
#[cfg_attr(test, mockall::automock)]
pub trait LedgerStorage: Send + Sync {
    /// Get the JSON value stored under a key
    fn get_raw(&self, key: RecordKey) -> Result<Option<serde_json::Value>>;

    /// Store or replace the JSON value under a key
    fn put_raw(&self, key: RecordKey, value: serde_json::Value) -> Result<()>;

    /// Remove a key, returning whether it existed
    fn remove(&self, key: RecordKey) -> Result<bool>;
}

/// Typed, validated access on top of [`LedgerStorage`]
pub trait LedgerStorageExt: LedgerStorage {
    /// Load a record, failing if the stored value is malformed
    fn load<T: Record>(&self) -> Result<Option<T>> {
        let Some(value) = self.get_raw(T::KEY)? else {
            return Ok(None);
        };

        let record: T =
            serde_json::from_value(value).map_err(|e| invalid(T::KEY, e.to_string()))?;
        record.validate()?;
        Ok(Some(record))
    }

    /// Load a record, falling back to its default when absent
    fn load_or_default<T: Record + Default>(&self) -> Result<T> {
        Ok(self.load::<T>()?.unwrap_or_default())
    }

    /// Validate and store a record
    fn save<T: Record>(&self, record: &T) -> Result<()> {
        record.validate()?;
        let value = serde_json::to_value(record).map_err(|e| invalid(T::KEY, e.to_string()))?;
        self.put_raw(T::KEY, value)
    }
}

impl<S: LedgerStorage + ?Sized> LedgerStorageExt for S {}

/// In-memory ledger storage implementation
#[derive(Debug, Default)]
pub struct InMemoryLedgerStorage {
    records: RwLock<HashMap<RecordKey, serde_json::Value>>,
}

impl InMemoryLedgerStorage {
    /// Create a new, empty in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored
    pub fn len(&self) -> Result<usize> {
        let records = self
            .records
            .read()
            .map_err(|_| LedgerError::InternalError {
                message: "Failed to acquire records read lock".to_string(),
            })?;
        Ok(records.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl LedgerStorage for InMemoryLedgerStorage {
    fn get_raw(&self, key: RecordKey) -> Result<Option<serde_json::Value>> {
        let records = self
            .records
            .read()
            .map_err(|_| LedgerError::InternalError {
                message: "Failed to acquire records read lock".to_string(),
            })?;

        Ok(records.get(&key).cloned())
    }

    fn put_raw(&self, key: RecordKey, value: serde_json::Value) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| LedgerError::InternalError {
                message: "Failed to acquire records write lock".to_string(),
            })?;

        records.insert(key, value);
        Ok(())
    }

    fn remove(&self, key: RecordKey) -> Result<bool> {
        let mut records = self
            .records
            .write()
            .map_err(|_| LedgerError::InternalError {
                message: "Failed to acquire records write lock".to_string(),
            })?;

        Ok(records.remove(&key).is_some())
    }
}
