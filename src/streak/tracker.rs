//! Kill-streak tracking
//!
//! A streak grows by one for each kill and drops to zero on any fight with
//! deaths. Each player starts from a baseline (historical high and running
//! streak) and the live entry log is replayed on top of it in war order.

use crate::types::{Battlegroup, NodeEntry, PlayerEntries, StreakRecord};
use crate::utils::names_match;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use tracing::debug;

/// Streak length that earns a player a place on the centennial board
pub const CENTENNIAL_THRESHOLD: u32 = 100;

/// Outcome of replaying a player's entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakProgress {
    pub current: u32,
    pub session_high: u32,
    pub kills: u64,
    pub deaths: u64,
}

/// Entries in war order; entries without a war come first, ties keep log order
pub fn ordered_entries(entries: &[NodeEntry]) -> Vec<&NodeEntry> {
    let mut ordered: Vec<&NodeEntry> = entries.iter().collect();
    ordered.sort_by_key(|entry| entry.war);
    ordered
}

/// Replay entries on top of a starting streak
pub fn replay(start: u32, entries: &[NodeEntry]) -> StreakProgress {
    let mut progress = StreakProgress {
        current: start,
        session_high: start,
        kills: 0,
        deaths: 0,
    };

    for entry in ordered_entries(entries) {
        let deaths = entry.death_count();
        if deaths > 0 {
            progress.current = 0;
        } else if entry.node.is_some() {
            progress.current += 1;
            progress.session_high = progress.session_high.max(progress.current);
        }

        if !entry.carry_over {
            if entry.node.is_some() {
                progress.kills += 1;
            }
            progress.deaths += deaths as u64;
        }
    }

    progress
}

/// Synthetic entries that recreate a running streak in a new season
pub fn carry_over_entries(streak: u32) -> Vec<NodeEntry> {
    (0..streak).map(|_| NodeEntry::streak_carry_over()).collect()
}

/// Compute streak records for the roster.
///
/// `members` is the active roster; players that only exist in the baseline
/// keep their historical record unchanged. Results are ordered by current
/// streak, then high streak, both descending.
pub fn compute_streaks(
    members: &[(String, Battlegroup)],
    rows: &[PlayerEntries],
    baseline: &[StreakRecord],
) -> Vec<StreakRecord> {
    let mut records: Vec<StreakRecord> = members
        .iter()
        .map(|(name, battlegroup)| {
            let base = baseline.iter().find(|b| names_match(&b.name, name));
            let (base_high, base_current) =
                base.map_or((0, 0), |b| (b.high_streak, b.current_streak));

            let entries: &[NodeEntry] = rows
                .iter()
                .find(|row| names_match(&row.player, name))
                .map(|row| row.entries.as_slice())
                .unwrap_or(&[]);

            let progress = replay(base_current, entries);
            let high_streak = if progress.session_high > base_high {
                progress.session_high
            } else {
                base_high
            };

            StreakRecord {
                name: name.clone(),
                battlegroup: Some(*battlegroup),
                high_streak,
                current_streak: progress.current,
                total_kills: progress.kills,
                total_deaths: progress.deaths,
                is_new_high: progress.current > base_high,
            }
        })
        .collect();

    for base in baseline {
        if !members.iter().any(|(name, _)| names_match(name, &base.name)) {
            records.push(StreakRecord {
                is_new_high: false,
                ..base.clone()
            });
        }
    }

    records.sort_by_key(|r| (Reverse(r.current_streak), Reverse(r.high_streak)));
    debug!("Computed streaks for {} players", records.len());
    records
}

/// Players whose high streak reached `threshold`, highest first
pub fn centennial(records: &[StreakRecord], threshold: u32) -> Vec<StreakRecord> {
    let mut board: Vec<StreakRecord> = records
        .iter()
        .filter(|r| r.high_streak >= threshold)
        .cloned()
        .collect();
    board.sort_by_key(|r| Reverse(r.high_streak));
    board
}

/// Fold computed highs into the stored history, never lowering a high.
///
/// Current streaks in the history are left alone; they are the baseline the
/// live log is replayed from.
pub fn merge_all_time_highs(history: &mut Vec<StreakRecord>, computed: &[StreakRecord]) -> usize {
    let mut raised = 0;
    for record in computed {
        match history.iter_mut().find(|h| names_match(&h.name, &record.name)) {
            Some(existing) => {
                if record.high_streak > existing.high_streak {
                    existing.high_streak = record.high_streak;
                    raised += 1;
                }
                if existing.battlegroup.is_none() {
                    existing.battlegroup = record.battlegroup;
                }
            }
            None if record.high_streak > 0 => {
                history.push(StreakRecord {
                    current_streak: 0,
                    total_kills: 0,
                    total_deaths: 0,
                    is_new_high: false,
                    ..record.clone()
                });
                raised += 1;
            }
            None => {}
        }
    }
    raised
}
