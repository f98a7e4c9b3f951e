//! Warboard - alliance war ledger
//!
//! Tracks per-player kills and deaths on the 50 war nodes, derives power
//! ratings and node difficulty from them, follows kill streaks and manages
//! the season and battlegroup state around the ledger.

pub mod config;
pub mod error;
pub mod metrics;
pub mod rating;
pub mod roster;
pub mod season;
pub mod service;
pub mod storage;
pub mod streak;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{LedgerError, Result};
pub use types::*;

// Re-export key components
pub use rating::{PowerRatingCalculator, RatingCalculator};
pub use service::{AppState, WarLedger};
pub use storage::{LedgerStorage, LedgerStorageExt, SeasonArchive};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
