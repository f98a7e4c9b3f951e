//! Utility functions for the war ledger

use chrono::{DateTime, Utc};

/// Attack bonuses a player starts each fight with
pub const MAX_ATTACK_BONUSES: u8 = 3;

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Round to two decimal places, half away from zero
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// kills / (kills + deaths), with an empty record rated as 0
pub fn solo_rate(kills: u64, deaths: u64) -> f64 {
    // zero denominator is replaced by 1, not skipped
    let fights = (kills + deaths).max(1);
    kills as f64 / fights as f64
}

/// Deaths implied by the attack bonuses left after a fight
pub fn deaths_from_bonuses(bonuses_remaining: u8) -> u32 {
    MAX_ATTACK_BONUSES.saturating_sub(bonuses_remaining) as u32
}

/// Case-insensitive player name comparison
pub fn names_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Clamp that tolerates an inverted or NaN range by returning `min`.
///
/// `f64::clamp` panics when `min > max`; this never does.
pub fn clamp_value(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return min;
    }
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}
