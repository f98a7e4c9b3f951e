//! Node difficulty recalculation
//!
//! Each node's current value is re-derived from how many deaths the alliance
//! took on it relative to the alliance-wide death total:
//!
//! ```text
//! total      = Σ deaths / (scale · (baseline + total_offset))
//! difficulty = ((node_deaths / (scale · (baseline + node_offset))) / total) · 10 + 1
//! current    = clamp(difficulty, min_value, max_value)
//! ```
//!
//! With no deaths recorded at all a node keeps its base value (still clamped).

use crate::config::RatingConfig;
use crate::error::{LedgerError, Result};
use crate::types::{
    all_nodes, DifficultySettings, DifficultyTable, NodeDifficulty, NodeId, NodeOverride,
    PlayerEntries, NODE_COUNT,
};
use crate::utils::clamp_value;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Kills and deaths observed on one node across the alliance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeObservation {
    pub kills: u64,
    pub deaths: u64,
}

/// Aggregate live entries per node. Carry-over entries and entries without
/// a valid node are skipped.
pub fn aggregate_entries(rows: &[PlayerEntries]) -> BTreeMap<NodeId, NodeObservation> {
    let mut observations: BTreeMap<NodeId, NodeObservation> = BTreeMap::new();

    for entry in rows.iter().flat_map(|row| row.entries.iter()) {
        if entry.carry_over {
            continue;
        }
        let Some(node) = entry.node else {
            continue;
        };
        if node == 0 || node > NODE_COUNT {
            continue;
        }

        let observation = observations.entry(node).or_default();
        observation.kills += 1;
        observation.deaths += entry.death_count() as u64;
    }

    observations
}

/// Recalculates node difficulty from observed deaths
#[derive(Debug, Clone, Default)]
pub struct DifficultyCalculator {
    config: RatingConfig,
}

impl DifficultyCalculator {
    pub fn new(config: RatingConfig) -> Self {
        Self { config }
    }

    /// Alliance-wide normalized death total
    pub fn total_difficulty_rating(&self, observations: &BTreeMap<NodeId, NodeObservation>) -> f64 {
        let total_deaths: u64 = observations.values().map(|o| o.deaths).sum();
        total_deaths as f64 / self.config.total_normalizer()
    }

    /// Unclamped difficulty of a node given the alliance total
    fn node_difficulty(&self, node_deaths: u64, total_rating: f64) -> f64 {
        let node_rating = node_deaths as f64 / self.config.node_normalizer();
        (node_rating / total_rating) * self.config.difficulty_scale + self.config.difficulty_floor
    }

    /// Produce a new table with every node 1..=50 recalculated.
    ///
    /// Missing nodes are created with default parameters. The result is a
    /// function of the inputs only, so repeating it with the same
    /// observations yields the same current values.
    pub fn recalculate(
        &self,
        table: &DifficultyTable,
        observations: &BTreeMap<NodeId, NodeObservation>,
        now: DateTime<Utc>,
    ) -> DifficultyTable {
        let settings = match table.settings.validate() {
            Ok(()) => table.settings,
            Err(e) => {
                warn!("Invalid difficulty settings, using defaults: {}", e);
                DifficultySettings::default()
            }
        };

        let total_rating = self.total_difficulty_rating(observations);
        let mut nodes = table.nodes.clone();

        for node in all_nodes() {
            let observed = observations.get(&node).copied().unwrap_or_default();
            let entry = nodes.entry(node).or_insert_with(NodeDifficulty::default);

            let raw = if total_rating > 0.0 {
                self.node_difficulty(observed.deaths, total_rating)
            } else {
                entry.base_value
            };

            entry.current_value = clamp_value(raw, settings.min_value, settings.max_value);
            entry.total_kills = observed.kills;
            entry.total_deaths = observed.deaths;
            entry.last_updated = Some(now);
        }

        debug!(
            "Recalculated {} nodes, total difficulty rating {:.6}",
            NODE_COUNT, total_rating
        );

        DifficultyTable {
            nodes,
            settings,
            last_recalculated: Some(now),
        }
    }
}

/// Manually set parameters on an existing node
pub fn apply_override(
    table: &mut DifficultyTable,
    node: NodeId,
    update: &NodeOverride,
    now: DateTime<Utc>,
) -> Result<()> {
    let values = [
        update.base_value,
        update.current_value,
        update.kill_bonus,
        update.death_penalty,
    ];
    if values.iter().flatten().any(|v| !v.is_finite()) {
        return Err(LedgerError::InvalidRequest {
            reason: format!("Node {} override contains a non-finite value", node),
        }
        .into());
    }

    let entry = table
        .nodes
        .get_mut(&node)
        .ok_or(LedgerError::NodeNotFound { node })?;

    if let Some(base) = update.base_value {
        entry.base_value = base;
    }
    if let Some(current) = update.current_value {
        entry.current_value = current;
    }
    if let Some(bonus) = update.kill_bonus {
        entry.kill_bonus = bonus;
    }
    if let Some(penalty) = update.death_penalty {
        entry.death_penalty = penalty;
    }
    entry.last_updated = Some(now);

    info!("Node {} parameters updated manually", node);
    Ok(())
}

/// Replace recalculation settings after validating them
pub fn update_settings(table: &mut DifficultyTable, settings: DifficultySettings) -> Result<()> {
    settings.validate()?;
    table.settings = settings;
    Ok(())
}

/// Nodes ordered from hardest to easiest by current value
pub fn rank_nodes(table: &DifficultyTable) -> Vec<(NodeId, f64)> {
    let mut ranked: Vec<(NodeId, f64)> = table
        .nodes
        .iter()
        .map(|(node, difficulty)| (*node, difficulty.current_value))
        .collect();

    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}
