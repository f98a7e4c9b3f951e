//! Roster and streak sheet import
//!
//! The alliance keeps its roster in a spreadsheet exported as CSV. The layout
//! is fixed: player names sit in row 1 at thirty known cells, ten per
//! battlegroup; rows 3..53 hold nodes 50 down to 1 with each player's kills
//! in the name column and deaths in the column right after it. Columns Y, Z
//! and AA of those rows carry the node's value, kill bonus and death penalty.

use crate::error::{LedgerError, Result};
use crate::types::{
    Battlegroup, ImportedPlayer, ImportedRoster, NodeId, NodeParameters, NodeTable, NodeTally,
    StreakRecord, NODE_COUNT,
};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Columns holding player names, in roster order
pub const PLAYER_NAME_COLUMNS: [&str; 30] = [
    "KH", "FR", "HZ", "GV", "EN", "JD", "DJ", "BB", "CF", "LL", // BG1
    "TN", "SJ", "VV", "UR", "ZH", "WZ", "AAL", "RF", "YD", "ABP", // BG2
    "APL", "AOH", "AKV", "AIN", "ALZ", "ART", "AQP", "AJR", "ASX", "AND", // BG3
];

/// Players per battlegroup in the sheet
pub const PLAYERS_PER_BATTLEGROUP: usize = 10;

const NAME_ROW: usize = 1;
const FIRST_NODE_ROW: usize = 3;
const VALUE_COLUMN: &str = "Y";
const KILL_BONUS_COLUMN: &str = "Z";
const DEATH_PENALTY_COLUMN: &str = "AA";

// Streak sheet columns
const STREAK_NAME_COLUMN: usize = 2;
const STREAK_HIGH_COLUMN: usize = 3;
const STREAK_CURRENT_COLUMN: usize = 4;

/// Zero-based index of a spreadsheet column label (`A` = 0, `AA` = 26)
pub fn column_index(label: &str) -> Option<usize> {
    if label.is_empty() {
        return None;
    }

    let mut index = 0usize;
    for c in label.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    Some(index - 1)
}

fn read_rows<R: Read>(reader: R) -> Result<Vec<csv::StringRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        rows.push(record.map_err(|e| LedgerError::Import {
            reason: format!("Malformed CSV: {}", e),
        })?);
    }
    Ok(rows)
}

fn cell<'a>(row: &'a csv::StringRecord, column: usize) -> &'a str {
    row.get(column).map(str::trim).unwrap_or("")
}

fn parse_count(row: &csv::StringRecord, column: usize) -> u32 {
    cell(row, column).parse().unwrap_or(0)
}

fn parse_param(row: &csv::StringRecord, column: usize, default: f64) -> f64 {
    match cell(row, column).parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => default,
    }
}

/// Node id of a node row (row 3 is node 50, row 52 is node 1)
fn node_for_row(row: usize) -> NodeId {
    NODE_COUNT - (row - FIRST_NODE_ROW) as NodeId
}

/// Parse a roster sheet into players, per-node counts and node defaults
pub fn parse_roster_sheet<R: Read>(reader: R) -> Result<ImportedRoster> {
    let rows = read_rows(reader)?;
    let last_node_row = FIRST_NODE_ROW + NODE_COUNT as usize;
    if rows.len() < last_node_row {
        return Err(LedgerError::Import {
            reason: format!(
                "Roster sheet has {} rows, expected at least {}",
                rows.len(),
                last_node_row
            ),
        }
        .into());
    }

    let node_rows = &rows[FIRST_NODE_ROW..last_node_row];
    let name_row = &rows[NAME_ROW];

    let mut players = Vec::new();
    for (i, label) in PLAYER_NAME_COLUMNS.iter().enumerate() {
        let Some(column) = column_index(label) else {
            continue;
        };
        let name = cell(name_row, column);
        if name.is_empty() {
            continue;
        }
        let Some(battlegroup) = Battlegroup::from_index(i / PLAYERS_PER_BATTLEGROUP) else {
            continue;
        };

        let mut nodes = BTreeMap::new();
        for (offset, row) in node_rows.iter().enumerate() {
            let kills = parse_count(row, column);
            let deaths = parse_count(row, column + 1);
            if kills > 0 || deaths > 0 {
                nodes.insert(node_for_row(FIRST_NODE_ROW + offset), NodeTally { kills, deaths });
            }
        }

        debug!("Imported '{}' in {} with {} nodes", name, battlegroup, nodes.len());
        players.push(ImportedPlayer {
            name: name.to_string(),
            battlegroup,
            nodes,
        });
    }

    let node_defaults = parse_node_defaults(node_rows);

    info!(
        "Parsed roster sheet: {} players, {} nodes",
        players.len(),
        node_defaults.len()
    );

    Ok(ImportedRoster {
        players,
        node_defaults,
        imported_at: Some(chrono::Utc::now()),
    })
}

fn parse_node_defaults(node_rows: &[csv::StringRecord]) -> NodeTable {
    let defaults = NodeParameters::default();
    let (Some(value_col), Some(bonus_col), Some(penalty_col)) = (
        column_index(VALUE_COLUMN),
        column_index(KILL_BONUS_COLUMN),
        column_index(DEATH_PENALTY_COLUMN),
    ) else {
        return NodeTable::new();
    };

    node_rows
        .iter()
        .enumerate()
        .map(|(offset, row)| {
            let params = NodeParameters {
                value: parse_param(row, value_col, defaults.value),
                kill_bonus: parse_param(row, bonus_col, defaults.kill_bonus),
                death_penalty: parse_param(row, penalty_col, defaults.death_penalty),
            };
            (node_for_row(FIRST_NODE_ROW + offset), params)
        })
        .collect()
}

/// Parse the streak sheet: name, high streak and current streak per row.
///
/// Rows without a name, or with both streaks at zero, are skipped.
pub fn parse_streak_sheet<R: Read>(reader: R) -> Result<Vec<StreakRecord>> {
    let rows = read_rows(reader)?;

    let records: Vec<StreakRecord> = rows
        .iter()
        .filter_map(|row| {
            let name = cell(row, STREAK_NAME_COLUMN);
            if name.is_empty() {
                return None;
            }
            let high_streak = parse_count(row, STREAK_HIGH_COLUMN);
            let current_streak = parse_count(row, STREAK_CURRENT_COLUMN);
            if high_streak == 0 && current_streak == 0 {
                return None;
            }
            Some(StreakRecord {
                name: name.to_string(),
                battlegroup: None,
                high_streak,
                current_streak,
                total_kills: 0,
                total_deaths: 0,
                is_new_high: false,
            })
        })
        .collect();

    info!("Parsed streak sheet: {} players", records.len());
    Ok(records)
}

fn open(path: &Path) -> Result<std::fs::File> {
    std::fs::File::open(path).map_err(|e| {
        warn!("Cannot open sheet {}: {}", path.display(), e);
        LedgerError::Import {
            reason: format!("Cannot open {}: {}", path.display(), e),
        }
        .into()
    })
}

/// Read and parse a roster sheet from disk
pub fn load_roster_sheet(path: &Path) -> Result<ImportedRoster> {
    parse_roster_sheet(open(path)?)
}

/// Read and parse a streak sheet from disk
pub fn load_streak_sheet(path: &Path) -> Result<Vec<StreakRecord>> {
    parse_streak_sheet(open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a sheet with the given names and one (node, kills, deaths) cell per player
    fn create_test_sheet(players: &[(&str, usize, NodeId, u32, u32)]) -> String {
        let width = column_index("ASX").unwrap() + 4;
        let mut grid = vec![vec![String::new(); width]; 53];

        for (name, slot, node, kills, deaths) in players {
            let column = column_index(PLAYER_NAME_COLUMNS[*slot]).unwrap();
            grid[NAME_ROW][column] = name.to_string();
            let row = FIRST_NODE_ROW + (NODE_COUNT - node) as usize;
            grid[row][column] = kills.to_string();
            grid[row][column + 1] = deaths.to_string();
        }

        let value_col = column_index(VALUE_COLUMN).unwrap();
        // node 50 lives on the first node row
        grid[FIRST_NODE_ROW][value_col] = "2.5".to_string();
        grid[FIRST_NODE_ROW][value_col + 1] = "0.3".to_string();
        grid[FIRST_NODE_ROW][value_col + 2] = "0.4".to_string();
        grid[FIRST_NODE_ROW + 1][value_col] = "n/a".to_string();

        grid.iter()
            .map(|row| row.join(","))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A"), Some(0));
        assert_eq!(column_index("Y"), Some(24));
        assert_eq!(column_index("Z"), Some(25));
        assert_eq!(column_index("AA"), Some(26));
        assert_eq!(column_index("KH"), Some(293));
        assert_eq!(column_index("AND"), Some(1043));
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("A1"), None);
    }

    #[test]
    fn test_parse_roster_sheet() {
        let sheet = create_test_sheet(&[
            ("Aria", 0, 50, 3, 1),
            ("Bram", 12, 1, 2, 0),
            ("Cato", 29, 25, 5, 2),
        ]);
        let roster = parse_roster_sheet(sheet.as_bytes()).unwrap();

        assert_eq!(roster.players.len(), 3);
        let aria = &roster.players[0];
        assert_eq!(aria.battlegroup, Battlegroup::Bg1);
        assert_eq!(aria.nodes[&50], NodeTally { kills: 3, deaths: 1 });

        let bram = &roster.players[1];
        assert_eq!(bram.battlegroup, Battlegroup::Bg2);
        assert_eq!(bram.nodes[&1], NodeTally { kills: 2, deaths: 0 });

        let cato = &roster.players[2];
        assert_eq!(cato.battlegroup, Battlegroup::Bg3);
        assert_eq!(cato.nodes.len(), 1);
    }

    #[test]
    fn test_node_defaults_with_fallback() {
        let sheet = create_test_sheet(&[("Aria", 0, 50, 1, 0)]);
        let roster = parse_roster_sheet(sheet.as_bytes()).unwrap();

        assert_eq!(roster.node_defaults.len(), NODE_COUNT as usize);
        assert_eq!(
            roster.node_defaults[&50],
            NodeParameters {
                value: 2.5,
                kill_bonus: 0.3,
                death_penalty: 0.4,
            }
        );
        // unparseable and empty cells use defaults
        assert_eq!(roster.node_defaults[&49], NodeParameters::default());
        assert_eq!(roster.node_defaults[&1], NodeParameters::default());
    }

    #[test]
    fn test_short_sheet_rejected() {
        let err = parse_roster_sheet("a,b\nc,d\n".as_bytes()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::Import { .. })
        ));
    }

    #[test]
    fn test_parse_streak_sheet() {
        let sheet = "\
,,Name,High,Current
,,Aria,120,14
,,Bram,0,0
,,Cato,8,0
,,,5,5
";
        let records = parse_streak_sheet(sheet.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Aria");
        assert_eq!(records[0].high_streak, 120);
        assert_eq!(records[0].current_streak, 14);
        assert_eq!(records[1].name, "Cato");
    }

    #[test]
    fn test_missing_file() {
        assert!(load_roster_sheet(Path::new("/nonexistent/roster.csv")).is_err());
    }
}
