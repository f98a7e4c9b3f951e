//! War calendar: twelve wars per season, at most one active at a time

use crate::error::{LedgerError, Result};
use crate::storage::{LedgerStorage, LedgerStorageExt};
use crate::types::{SeasonNumber, SeasonWars, War, WarNumber, WARS_PER_SEASON};
use crate::utils::current_timestamp;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct WarCalendar {
    storage: Arc<dyn LedgerStorage>,
}

impl WarCalendar {
    pub fn new(storage: Arc<dyn LedgerStorage>) -> Self {
        Self { storage }
    }

    pub fn seasons(&self) -> Result<Vec<SeasonWars>> {
        self.storage.load_or_default()
    }

    /// Create the schedule for a season with all wars inactive
    pub fn create_season(&self, season: SeasonNumber) -> Result<SeasonWars> {
        let mut calendar = self.seasons()?;
        if calendar.iter().any(|s| s.season == season) {
            return Err(LedgerError::Conflict {
                message: format!("Season {} already has a war schedule", season),
            }
            .into());
        }

        let schedule = SeasonWars {
            season,
            wars: (1..=WARS_PER_SEASON)
                .map(|number| War {
                    number,
                    started_at: None,
                    ended_at: None,
                    active: false,
                })
                .collect(),
            created_at: current_timestamp(),
        };
        calendar.push(schedule.clone());
        calendar.sort_by_key(|s| s.season);
        self.storage.save(&calendar)?;

        info!("Created war schedule for Season {}", season);
        Ok(schedule)
    }

    /// Start a war, ending whichever war was active before
    pub fn start_war(&self, season: SeasonNumber, war: WarNumber) -> Result<War> {
        let mut calendar = self.seasons()?;
        Self::find_war(&mut calendar, season, war)?;

        let now = current_timestamp();
        for other in calendar.iter_mut().flat_map(|s| s.wars.iter_mut()) {
            if other.active {
                other.active = false;
                other.ended_at = Some(now);
            }
        }

        let started = Self::find_war(&mut calendar, season, war)?;
        started.active = true;
        started.started_at = Some(now);
        started.ended_at = None;
        let started = started.clone();

        self.storage.save(&calendar)?;
        info!("Started war {} of Season {}", war, season);
        Ok(started)
    }

    pub fn end_war(&self, season: SeasonNumber, war: WarNumber) -> Result<War> {
        let mut calendar = self.seasons()?;
        let ended = Self::find_war(&mut calendar, season, war)?;
        if !ended.active {
            return Err(LedgerError::Conflict {
                message: format!("War {} of Season {} is not active", war, season),
            }
            .into());
        }
        ended.active = false;
        ended.ended_at = Some(current_timestamp());
        let ended = ended.clone();

        self.storage.save(&calendar)?;
        info!("Ended war {} of Season {}", war, season);
        Ok(ended)
    }

    /// The active war, if any
    pub fn active_war(&self) -> Result<Option<(SeasonNumber, WarNumber)>> {
        Ok(self.seasons()?.iter().find_map(|s| {
            s.wars
                .iter()
                .find(|w| w.active)
                .map(|w| (s.season, w.number))
        }))
    }

    fn find_war(
        calendar: &mut [SeasonWars],
        season: SeasonNumber,
        war: WarNumber,
    ) -> Result<&mut War> {
        let schedule = calendar
            .iter_mut()
            .find(|s| s.season == season)
            .ok_or(LedgerError::SeasonNotFound { season })?;
        schedule
            .wars
            .iter_mut()
            .find(|w| w.number == war)
            .ok_or_else(|| LedgerError::WarNotFound { season, war }.into())
    }
}
