//! Rating engine configuration
//!
//! The difficulty constants are calibration values inherited from the
//! alliance's original spreadsheet. They are kept configurable but the
//! defaults must not be changed without re-deriving the node scale.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Constants used by the power-rating and difficulty formulas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    /// Weight of the solo-rate delta against the alliance average
    pub solo_rate_multiplier: f64,
    /// Scale applied to both death normalizations (150)
    pub normalization_scale: f64,
    /// Fight baseline of the normalizations (419)
    pub baseline_fights: f64,
    /// Offset added to the baseline for the alliance-wide total (0)
    pub total_offset: f64,
    /// Offset added to the baseline for a single node (12)
    pub node_offset: f64,
    /// Multiplier applied to a node's relative death share (10)
    pub difficulty_scale: f64,
    /// Floor added to every node difficulty (1)
    pub difficulty_floor: f64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            solo_rate_multiplier: 1.6,
            normalization_scale: 150.0,
            baseline_fights: 419.0,
            total_offset: 0.0,
            node_offset: 12.0,
            difficulty_scale: 10.0,
            difficulty_floor: 1.0,
        }
    }
}

impl RatingConfig {
    /// Denominator applied to alliance-wide deaths
    pub fn total_normalizer(&self) -> f64 {
        self.normalization_scale * (self.baseline_fights + self.total_offset)
    }

    /// Denominator applied to a single node's deaths
    pub fn node_normalizer(&self) -> f64 {
        self.normalization_scale * (self.baseline_fights + self.node_offset)
    }

    /// Reject values that would make the formulas produce non-finite output
    pub fn validate(&self) -> Result<()> {
        let values = [
            ("solo_rate_multiplier", self.solo_rate_multiplier),
            ("normalization_scale", self.normalization_scale),
            ("baseline_fights", self.baseline_fights),
            ("total_offset", self.total_offset),
            ("node_offset", self.node_offset),
            ("difficulty_scale", self.difficulty_scale),
            ("difficulty_floor", self.difficulty_floor),
        ];
        for (name, value) in values {
            if !value.is_finite() {
                return Err(anyhow!("Rating constant {} must be finite", name));
            }
        }

        if self.total_normalizer() <= 0.0 {
            return Err(anyhow!("Total difficulty normalizer must be positive"));
        }
        if self.node_normalizer() <= 0.0 {
            return Err(anyhow!("Node difficulty normalizer must be positive"));
        }

        Ok(())
    }
}
