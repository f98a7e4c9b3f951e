//! Power rating calculator
//!
//! A player's power rating is the node-weighted kill rating adjusted by how
//! the player's solo rate compares to the alliance's. The calculation is a
//! pure function of the player tallies, the node parameter table and the
//! alliance totals; it never fails.

use crate::config::RatingConfig;
use crate::types::{AllianceTotals, Battlegroup, NodeTable, PlayerTally};
use crate::utils::{round2, solo_rate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Derived rating figures for one player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatedPlayer {
    pub name: String,
    pub battlegroup: Battlegroup,
    pub hidden: bool,
    pub total_kills: u64,
    pub total_deaths: u64,
    /// Σ value·kills − penalty·deaths over the node table, unrounded
    pub total_kill_rating: f64,
    pub solo_rate: f64,
    /// Rounded to two decimals
    pub power_rating: f64,
    /// Average node value per kill, rounded to two decimals
    pub difficulty_rating_per_fight: f64,
}

/// Trait for computing player ratings from node tallies
pub trait RatingCalculator: Send + Sync {
    /// Rate a single player against precomputed alliance totals
    fn rate_player(
        &self,
        player: &PlayerTally,
        nodes: &NodeTable,
        alliance: AllianceTotals,
    ) -> RatedPlayer;

    /// Rate every player; order is preserved
    fn rate_players(
        &self,
        players: &[PlayerTally],
        nodes: &NodeTable,
        alliance: AllianceTotals,
    ) -> Vec<RatedPlayer> {
        players
            .iter()
            .map(|player| self.rate_player(player, nodes, alliance))
            .collect()
    }

    /// Get current configuration as JSON
    fn config(&self) -> serde_json::Value;
}

/// Calculator implementing the alliance power-rating formula
#[derive(Debug, Clone)]
pub struct PowerRatingCalculator {
    config: RatingConfig,
}

impl PowerRatingCalculator {
    /// Create a new calculator, validating the constants
    pub fn new(config: RatingConfig) -> crate::error::Result<Self> {
        config
            .validate()
            .map_err(|e| crate::error::LedgerError::ConfigurationError {
                message: e.to_string(),
            })?;
        Ok(Self { config })
    }

    pub fn rating_config(&self) -> &RatingConfig {
        &self.config
    }

    /// Alliance totals: every player's kills and deaths, hidden players
    /// included, plus deaths charged to battlegroups directly
    pub fn alliance_totals(players: &[PlayerTally], battlegroup_deaths: u64) -> AllianceTotals {
        let (kills, deaths) = players.iter().fold((0u64, 0u64), |(k, d), player| {
            (k + player.total_kills(), d + player.total_deaths())
        });

        AllianceTotals {
            kills,
            deaths: deaths + battlegroup_deaths,
        }
    }
}

impl Default for PowerRatingCalculator {
    fn default() -> Self {
        Self {
            config: RatingConfig::default(),
        }
    }
}

impl RatingCalculator for PowerRatingCalculator {
    fn rate_player(
        &self,
        player: &PlayerTally,
        nodes: &NodeTable,
        alliance: AllianceTotals,
    ) -> RatedPlayer {
        let mut total_kill_rating = 0.0;
        let mut difficulty_accum = 0.0;

        for (node, params) in nodes {
            let Some(tally) = player.nodes.get(node) else {
                continue;
            };

            if !params.is_finite() {
                warn!(
                    "Node {} has non-finite parameters, ignoring it for player '{}'",
                    node, player.name
                );
                continue;
            }

            let kills = tally.kills as f64;
            let deaths = tally.deaths as f64;
            total_kill_rating += params.value * kills - params.death_penalty * deaths;
            difficulty_accum += params.value * kills;
        }

        let total_kills = player.total_kills();
        let total_deaths = player.total_deaths();

        let player_solo_rate = solo_rate(total_kills, total_deaths);
        let alliance_solo_rate = solo_rate(alliance.kills, alliance.deaths);
        let solo_rate_bonus = total_kill_rating
            * (player_solo_rate - alliance_solo_rate)
            * self.config.solo_rate_multiplier;

        let difficulty_rating_per_fight = if total_kills > 0 {
            round2(difficulty_accum / total_kills as f64)
        } else {
            0.0
        };

        let power_rating = round2(total_kill_rating + solo_rate_bonus);

        debug!(
            "Rated '{}': kill rating {:.2}, solo {:.3} vs {:.3}, PR {:.2}",
            player.name, total_kill_rating, player_solo_rate, alliance_solo_rate, power_rating
        );

        RatedPlayer {
            name: player.name.clone(),
            battlegroup: player.battlegroup,
            hidden: player.hidden,
            total_kills,
            total_deaths,
            total_kill_rating,
            solo_rate: player_solo_rate,
            power_rating,
            difficulty_rating_per_fight,
        }
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "power_rating",
            "solo_rate_multiplier": self.config.solo_rate_multiplier,
        })
    }
}
