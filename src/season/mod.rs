//! Season lifecycle and war calendar

pub mod calendar;
pub mod manager;

pub use calendar::WarCalendar;
pub use manager::{import_season_name, load_current_season, SeasonManager};
