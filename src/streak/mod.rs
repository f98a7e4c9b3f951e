//! Kill-streak tracking and history

pub mod tracker;

pub use tracker::{
    carry_over_entries, centennial, compute_streaks, merge_all_time_highs, replay, StreakProgress,
    CENTENNIAL_THRESHOLD,
};
