//! Rating engine: power ratings, node difficulty and rankings
//!
//! Everything in this module is a pure function of its inputs. Loading the
//! inputs and persisting the difficulty table is the service layer's job.

pub mod calculator;
pub mod difficulty;
pub mod ranking;

// Re-export commonly used types
pub use calculator::{PowerRatingCalculator, RatedPlayer, RatingCalculator};
pub use difficulty::{aggregate_entries, DifficultyCalculator, NodeObservation};
pub use ranking::{battlegroup_totals, rank_players, BattlegroupTotals, ReportingPeriod, SortKey};
