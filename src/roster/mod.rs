//! Roster import and administration

pub mod import;
pub mod ledger;

pub use import::{load_roster_sheet, load_streak_sheet, parse_roster_sheet, parse_streak_sheet};
pub use ledger::Roster;
