//! Test fixtures shared by the integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use warboard::config::{AppConfig, StorageBackend};
use warboard::metrics::MetricsCollector;
use warboard::roster::import::{column_index, PLAYER_NAME_COLUMNS};
use warboard::storage::{
    FileLedgerStorage, FileSeasonArchive, InMemoryLedgerStorage, InMemorySeasonArchive,
};
use warboard::types::{NodeId, NODE_COUNT};
use warboard::WarLedger;

/// One cell of sheet data: a player's kills and deaths on a node
#[derive(Debug, Clone, Copy)]
pub struct SheetCell {
    pub node: NodeId,
    pub kills: u32,
    pub deaths: u32,
}

/// A player on the roster sheet, by name slot (0..30)
#[derive(Debug, Clone)]
pub struct SheetPlayer {
    pub name: &'static str,
    pub slot: usize,
    pub cells: Vec<SheetCell>,
}

impl SheetPlayer {
    pub fn new(name: &'static str, slot: usize) -> Self {
        Self {
            name,
            slot,
            cells: Vec::new(),
        }
    }

    pub fn with(mut self, node: NodeId, kills: u32, deaths: u32) -> Self {
        self.cells.push(SheetCell {
            node,
            kills,
            deaths,
        });
        self
    }
}

/// Render a roster sheet in the alliance's CSV layout.
///
/// `node_values` sets column Y (value) for the given nodes; all other
/// parameter cells stay empty so the importer falls back to its defaults.
pub fn roster_sheet_csv(players: &[SheetPlayer], node_values: &[(NodeId, f64)]) -> String {
    let width = column_index("ASX").unwrap() + 2;
    let mut grid = vec![vec![String::new(); width]; 53];

    for player in players {
        let column = column_index(PLAYER_NAME_COLUMNS[player.slot]).unwrap();
        grid[1][column] = player.name.to_string();
        for cell in &player.cells {
            let row = 3 + (NODE_COUNT - cell.node) as usize;
            grid[row][column] = cell.kills.to_string();
            grid[row][column + 1] = cell.deaths.to_string();
        }
    }

    let value_column = column_index("Y").unwrap();
    for (node, value) in node_values {
        let row = 3 + (NODE_COUNT - node) as usize;
        grid[row][value_column] = value.to_string();
    }

    grid.iter()
        .map(|row| row.join(","))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Streak sheet rows: (name, high, current) in columns 2, 3 and 4
pub fn streak_sheet_csv(rows: &[(&str, u32, u32)]) -> String {
    let mut lines = vec!["#,,Name,High,Current".to_string()];
    for (name, high, current) in rows {
        lines.push(format!(",,{},{},{}", name, high, current));
    }
    lines.join("\n")
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// The three-player roster used by most scenarios
pub fn standard_roster() -> Vec<SheetPlayer> {
    vec![
        SheetPlayer::new("Aria", 0).with(50, 10, 0).with(1, 2, 1),
        SheetPlayer::new("Bram", 10).with(25, 6, 3),
        SheetPlayer::new("Cato", 20).with(10, 1, 4),
    ]
}

pub fn memory_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.backend = StorageBackend::Memory;
    config
}

/// Ledger over in-memory storage
pub fn memory_ledger() -> Arc<WarLedger> {
    Arc::new(
        WarLedger::new(
            &memory_config(),
            Arc::new(InMemoryLedgerStorage::new()),
            Arc::new(InMemorySeasonArchive::new()),
            Arc::new(MetricsCollector::new().unwrap()),
        )
        .unwrap(),
    )
}

/// Ledger over JSON files under `data_dir`
pub async fn file_ledger(data_dir: &Path) -> Arc<WarLedger> {
    let mut config = AppConfig::default();
    config.storage.data_dir = data_dir.to_path_buf();

    Arc::new(
        WarLedger::new(
            &config,
            Arc::new(FileLedgerStorage::new(data_dir).unwrap()),
            Arc::new(FileSeasonArchive::new(data_dir).await.unwrap()),
            Arc::new(MetricsCollector::new().unwrap()),
        )
        .unwrap(),
    )
}
