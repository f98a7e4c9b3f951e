//! Common types used throughout the war ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Identifier of a war node (1..=50)
pub type NodeId = u8;

/// Season number, e.g. 60
pub type SeasonNumber = u32;

/// War number within a season (1..=12)
pub type WarNumber = u32;

/// Number of war nodes on the map
pub const NODE_COUNT: NodeId = 50;

/// Number of wars scheduled in a season
pub const WARS_PER_SEASON: WarNumber = 12;

/// Iterate every node id in ascending order
pub fn all_nodes() -> impl Iterator<Item = NodeId> {
    1..=NODE_COUNT
}

/// One of the three roster partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Battlegroup {
    #[serde(rename = "BG1")]
    Bg1,
    #[serde(rename = "BG2")]
    Bg2,
    #[serde(rename = "BG3")]
    Bg3,
}

impl Battlegroup {
    pub const ALL: [Battlegroup; 3] = [Battlegroup::Bg1, Battlegroup::Bg2, Battlegroup::Bg3];

    /// Battlegroup for a zero-based partition index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl std::fmt::Display for Battlegroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Battlegroup::Bg1 => write!(f, "BG1"),
            Battlegroup::Bg2 => write!(f, "BG2"),
            Battlegroup::Bg3 => write!(f, "BG3"),
        }
    }
}

impl std::str::FromStr for Battlegroup {
    type Err = crate::error::LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BG1" => Ok(Battlegroup::Bg1),
            "BG2" => Ok(Battlegroup::Bg2),
            "BG3" => Ok(Battlegroup::Bg3),
            other => Err(crate::error::LedgerError::InvalidRequest {
                reason: format!("Unknown battlegroup: {}", other),
            }),
        }
    }
}

/// Kills and deaths a player recorded on one node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTally {
    pub kills: u32,
    pub deaths: u32,
}

/// A player's per-node statistics as fed to the rating engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerTally {
    pub name: String,
    pub battlegroup: Battlegroup,
    pub nodes: BTreeMap<NodeId, NodeTally>,
    #[serde(default)]
    pub hidden: bool,
}

impl PlayerTally {
    pub fn new(name: impl Into<String>, battlegroup: Battlegroup) -> Self {
        Self {
            name: name.into(),
            battlegroup,
            nodes: BTreeMap::new(),
            hidden: false,
        }
    }

    /// Add kills and deaths on a node
    pub fn record(&mut self, node: NodeId, kills: u32, deaths: u32) {
        let tally = self.nodes.entry(node).or_default();
        tally.kills = tally.kills.saturating_add(kills);
        tally.deaths = tally.deaths.saturating_add(deaths);
    }

    pub fn total_kills(&self) -> u64 {
        self.nodes.values().map(|t| t.kills as u64).sum()
    }

    pub fn total_deaths(&self) -> u64 {
        self.nodes.values().map(|t| t.deaths as u64).sum()
    }
}

/// Weighting parameters of a node used by the power-rating formula
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeParameters {
    pub value: f64,
    pub kill_bonus: f64,
    pub death_penalty: f64,
}

impl Default for NodeParameters {
    fn default() -> Self {
        Self {
            value: 1.0,
            kill_bonus: 0.1,
            death_penalty: 0.1,
        }
    }
}

impl NodeParameters {
    pub fn is_finite(&self) -> bool {
        self.value.is_finite() && self.kill_bonus.is_finite() && self.death_penalty.is_finite()
    }
}

/// Node parameter table keyed by node id
pub type NodeTable = BTreeMap<NodeId, NodeParameters>;

/// Alliance-wide kill and death totals, including unattributed battlegroup deaths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllianceTotals {
    pub kills: u64,
    pub deaths: u64,
}

/// Dynamically adjusted difficulty state of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDifficulty {
    pub base_value: f64,
    pub current_value: f64,
    pub kill_bonus: f64,
    pub death_penalty: f64,
    #[serde(default)]
    pub total_kills: u64,
    #[serde(default)]
    pub total_deaths: u64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for NodeDifficulty {
    fn default() -> Self {
        Self::from_parameters(NodeParameters::default())
    }
}

impl NodeDifficulty {
    /// Fresh node whose base and current value equal the given parameters
    pub fn from_parameters(params: NodeParameters) -> Self {
        Self {
            base_value: params.value,
            current_value: params.value,
            kill_bonus: params.kill_bonus,
            death_penalty: params.death_penalty,
            total_kills: 0,
            total_deaths: 0,
            last_updated: None,
        }
    }

    /// Parameters as consumed by the power-rating formula
    pub fn parameters(&self) -> NodeParameters {
        NodeParameters {
            value: self.current_value,
            kill_bonus: self.kill_bonus,
            death_penalty: self.death_penalty,
        }
    }
}

/// Tunables for difficulty recalculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultySettings {
    /// Stored for compatibility; the recalculation formula does not read it
    pub adjustment_factor: f64,
    pub min_value: f64,
    pub max_value: f64,
    /// Stored for compatibility; the recalculation formula does not read it
    pub update_threshold: u32,
}

impl Default for DifficultySettings {
    fn default() -> Self {
        Self {
            adjustment_factor: 0.1,
            min_value: 0.1,
            max_value: 5.0,
            update_threshold: 10,
        }
    }
}

impl DifficultySettings {
    /// Check that the clamp range is usable
    pub fn validate(&self) -> crate::error::Result<()> {
        if !self.min_value.is_finite() || !self.max_value.is_finite() {
            return Err(crate::error::LedgerError::InvalidRequest {
                reason: "Difficulty bounds must be finite".to_string(),
            }
            .into());
        }
        if self.min_value > self.max_value {
            return Err(crate::error::LedgerError::InvalidRequest {
                reason: format!(
                    "Difficulty min value {} exceeds max value {}",
                    self.min_value, self.max_value
                ),
            }
            .into());
        }
        if !self.adjustment_factor.is_finite() {
            return Err(crate::error::LedgerError::InvalidRequest {
                reason: "Adjustment factor must be finite".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Stored difficulty state of every node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyTable {
    pub nodes: BTreeMap<NodeId, NodeDifficulty>,
    #[serde(default)]
    pub settings: DifficultySettings,
    #[serde(default)]
    pub last_recalculated: Option<DateTime<Utc>>,
}

impl DifficultyTable {
    /// Table seeded from per-node parameters
    pub fn from_node_table(table: &NodeTable) -> Self {
        Self {
            nodes: table
                .iter()
                .map(|(node, params)| (*node, NodeDifficulty::from_parameters(*params)))
                .collect(),
            settings: DifficultySettings::default(),
            last_recalculated: None,
        }
    }

    /// Current parameters of every node, as consumed by the rating engine
    pub fn node_table(&self) -> NodeTable {
        self.nodes
            .iter()
            .map(|(node, difficulty)| (*node, difficulty.parameters()))
            .collect()
    }
}

/// Partial update of a single node's parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOverride {
    pub base_value: Option<f64>,
    pub current_value: Option<f64>,
    pub kill_bonus: Option<f64>,
    pub death_penalty: Option<f64>,
}

/// One live ledger record for a player.
///
/// An entry with a node counts one kill on that node; deaths (if any) are
/// charged to the same node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEntry {
    #[serde(default)]
    pub node: Option<NodeId>,
    #[serde(default)]
    pub deaths: Option<u32>,
    #[serde(default)]
    pub war: Option<WarNumber>,
    #[serde(default)]
    pub carry_over: bool,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl NodeEntry {
    /// A kill on `node` with the given deaths
    pub fn fight(node: NodeId, deaths: u32, war: Option<WarNumber>) -> Self {
        Self {
            node: Some(node),
            deaths: Some(deaths),
            war,
            carry_over: false,
            recorded_at: Some(Utc::now()),
        }
    }

    /// A kill on `node` where deaths are derived from unused attack bonuses
    pub fn from_bonuses(node: NodeId, bonuses_remaining: u8, war: Option<WarNumber>) -> Self {
        Self::fight(node, crate::utils::deaths_from_bonuses(bonuses_remaining), war)
    }

    /// Synthetic entry that keeps a running streak alive across seasons
    pub fn streak_carry_over() -> Self {
        Self {
            node: Some(1),
            deaths: Some(0),
            war: None,
            carry_over: true,
            recorded_at: None,
        }
    }

    pub fn death_count(&self) -> u32 {
        self.deaths.unwrap_or(0)
    }
}

/// All live entries recorded for one player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEntries {
    pub player: String,
    pub entries: Vec<NodeEntry>,
}

/// Deaths charged to a battlegroup rather than a specific player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattlegroupDeathEntry {
    pub battlegroup: Battlegroup,
    pub deaths: u32,
    pub war: Option<WarNumber>,
    pub season: SeasonNumber,
    pub timestamp: DateTime<Utc>,
}

/// Player added by an administrator rather than the sheet import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPlayer {
    pub name: String,
    pub battlegroup: Battlegroup,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub hidden: bool,
}

/// Player excluded from rankings but kept in totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HiddenPlayer {
    pub name: String,
    pub battlegroup: Option<Battlegroup>,
    pub hidden_at: DateTime<Utc>,
    pub is_custom: bool,
}

/// Imported player removed from the roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedPlayer {
    pub name: String,
    pub deleted_at: DateTime<Utc>,
}

/// Player parsed from the roster sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedPlayer {
    pub name: String,
    pub battlegroup: Battlegroup,
    pub nodes: BTreeMap<NodeId, NodeTally>,
}

/// Result of a sheet import: players with their counts plus node defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedRoster {
    pub players: Vec<ImportedPlayer>,
    pub node_defaults: NodeTable,
    pub imported_at: Option<DateTime<Utc>>,
}

/// The season currently being recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentSeason {
    pub number: SeasonNumber,
    pub name: String,
}

impl CurrentSeason {
    pub fn new(number: SeasonNumber) -> Self {
        Self {
            number,
            name: format!("Season {}", number),
        }
    }
}

/// Archived working state of a finished season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonSnapshot {
    pub id: Uuid,
    pub season: SeasonNumber,
    pub season_name: String,
    pub player_entries: Vec<PlayerEntries>,
    pub battlegroup_deaths: Vec<BattlegroupDeathEntry>,
    pub custom_players: Vec<CustomPlayer>,
    pub hidden_players: Vec<HiddenPlayer>,
    pub total_kills: u64,
    pub total_deaths: u64,
    pub archived_at: DateTime<Utc>,
    pub description: String,
}

/// Listing entry for a known season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonSummary {
    pub season: SeasonNumber,
    pub name: String,
    pub archived_at: Option<DateTime<Utc>>,
    pub is_import_season: bool,
}

/// One scheduled war
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct War {
    pub number: WarNumber,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub active: bool,
}

/// War schedule of one season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonWars {
    pub season: SeasonNumber,
    pub wars: Vec<War>,
    pub created_at: DateTime<Utc>,
}

/// Historical or computed kill-streak state of a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakRecord {
    pub name: String,
    pub battlegroup: Option<Battlegroup>,
    pub high_streak: u32,
    pub current_streak: u32,
    #[serde(default)]
    pub total_kills: u64,
    #[serde(default)]
    pub total_deaths: u64,
    #[serde(default)]
    pub is_new_high: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battlegroup_serde_names() {
        let json = serde_json::to_string(&Battlegroup::Bg2).unwrap();
        assert_eq!(json, "\"BG2\"");

        let parsed: Battlegroup = "bg3".parse().unwrap();
        assert_eq!(parsed, Battlegroup::Bg3);
        assert!("BG4".parse::<Battlegroup>().is_err());
    }

    #[test]
    fn test_battlegroup_from_index() {
        assert_eq!(Battlegroup::from_index(0), Some(Battlegroup::Bg1));
        assert_eq!(Battlegroup::from_index(2), Some(Battlegroup::Bg3));
        assert_eq!(Battlegroup::from_index(3), None);
    }

    #[test]
    fn test_player_tally_totals() {
        let mut tally = PlayerTally::new("Aria", Battlegroup::Bg1);
        tally.record(3, 2, 1);
        tally.record(3, 1, 0);
        tally.record(40, 4, 2);

        assert_eq!(tally.nodes[&3], NodeTally { kills: 3, deaths: 1 });
        assert_eq!(tally.total_kills(), 7);
        assert_eq!(tally.total_deaths(), 3);
    }

    #[test]
    fn test_node_entry_defaults_from_sparse_json() {
        let entry: NodeEntry = serde_json::from_str(r#"{"node": 12}"#).unwrap();
        assert_eq!(entry.node, Some(12));
        assert_eq!(entry.death_count(), 0);
        assert!(!entry.carry_over);

        let carry = NodeEntry::streak_carry_over();
        assert!(carry.carry_over);
        assert_eq!(carry.node, Some(1));
    }

    #[test]
    fn test_difficulty_table_exposes_current_values() {
        let mut table = DifficultyTable::default();
        let mut node = NodeDifficulty::default();
        node.current_value = 2.5;
        table.nodes.insert(7, node);

        let params = table.node_table();
        assert_eq!(params[&7].value, 2.5);
        assert_eq!(params[&7].death_penalty, 0.1);
    }

    #[test]
    fn test_settings_validation() {
        assert!(DifficultySettings::default().validate().is_ok());

        let inverted = DifficultySettings {
            min_value: 6.0,
            max_value: 1.0,
            ..DifficultySettings::default()
        };
        assert!(inverted.validate().is_err());

        let nan = DifficultySettings {
            max_value: f64::NAN,
            ..DifficultySettings::default()
        };
        assert!(nan.validate().is_err());
    }
}
