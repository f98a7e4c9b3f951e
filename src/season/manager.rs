//! Season lifecycle management
//!
//! Starting a season archives the working state under the current season
//! number, then resets the entry log to carry-over entries for every running
//! streak and clears battlegroup deaths. Custom players, hidden players and
//! streak history survive the reset. If the reset fails partway, the
//! overwritten records are put back and the previous season stays current.

use anyhow::Context;
use crate::error::{LedgerError, Result};
use crate::storage::{LedgerStorage, LedgerStorageExt, SeasonArchive};
use crate::streak::{carry_over_entries, replay};
use crate::types::{
    BattlegroupDeathEntry, CurrentSeason, CustomPlayer, HiddenPlayer, PlayerEntries,
    SeasonNumber, SeasonSnapshot, SeasonSummary, StreakRecord,
};
use crate::utils::{current_timestamp, names_match};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The current season, defaulting to the import season when none is stored
pub fn load_current_season(
    storage: &dyn LedgerStorage,
    import_season: SeasonNumber,
) -> Result<CurrentSeason> {
    Ok(storage
        .load::<CurrentSeason>()?
        .unwrap_or_else(|| CurrentSeason::new(import_season)))
}

/// Display name of the import season
pub fn import_season_name(season: SeasonNumber) -> String {
    format!("Season {} (CSV Data)", season)
}

/// Manages season archives and the current season
#[derive(Clone)]
pub struct SeasonManager {
    storage: Arc<dyn LedgerStorage>,
    archive: Arc<dyn SeasonArchive>,
    import_season: SeasonNumber,
}

impl SeasonManager {
    pub fn new(
        storage: Arc<dyn LedgerStorage>,
        archive: Arc<dyn SeasonArchive>,
        import_season: SeasonNumber,
    ) -> Self {
        Self {
            storage,
            archive,
            import_season,
        }
    }

    pub fn current_season(&self) -> Result<CurrentSeason> {
        load_current_season(self.storage.as_ref(), self.import_season)
    }

    /// Snapshot of the working state, labelled with `season`
    fn working_snapshot(&self, season: &CurrentSeason, description: String) -> Result<SeasonSnapshot> {
        let player_entries: Vec<PlayerEntries> = self.storage.load_or_default()?;
        let battlegroup_deaths: Vec<BattlegroupDeathEntry> = self.storage.load_or_default()?;
        let custom_players: Vec<CustomPlayer> = self.storage.load_or_default()?;
        let hidden_players: Vec<HiddenPlayer> = self.storage.load_or_default()?;

        let live = player_entries
            .iter()
            .flat_map(|row| row.entries.iter())
            .filter(|entry| !entry.carry_over);
        let (total_kills, player_deaths) = live.fold((0u64, 0u64), |(k, d), entry| {
            (
                k + entry.node.is_some() as u64,
                d + entry.death_count() as u64,
            )
        });
        let unattributed: u64 = battlegroup_deaths.iter().map(|e| e.deaths as u64).sum();

        Ok(SeasonSnapshot {
            id: Uuid::new_v4(),
            season: season.number,
            season_name: season.name.clone(),
            player_entries,
            battlegroup_deaths,
            custom_players,
            hidden_players,
            total_kills,
            total_deaths: player_deaths + unattributed,
            archived_at: current_timestamp(),
            description,
        })
    }

    /// Running streak of every player with entries or a baseline streak
    fn running_streaks(&self, rows: &[PlayerEntries]) -> Result<Vec<(String, u32)>> {
        let history: Vec<StreakRecord> = self.storage.load_or_default()?;

        let mut streaks: Vec<(String, u32)> = rows
            .iter()
            .map(|row| {
                let start = history
                    .iter()
                    .find(|h| names_match(&h.name, &row.player))
                    .map_or(0, |h| h.current_streak);
                (row.player.clone(), replay(start, &row.entries).current)
            })
            .collect();

        for record in &history {
            let has_entries = rows.iter().any(|row| names_match(&row.player, &record.name));
            if !has_entries && record.current_streak > 0 {
                streaks.push((record.name.clone(), record.current_streak));
            }
        }

        Ok(streaks)
    }

    /// Archive the current season and begin `next`
    pub async fn start_new_season(
        &self,
        next: SeasonNumber,
        description: Option<String>,
    ) -> Result<SeasonSnapshot> {
        if next == 0 {
            return Err(LedgerError::InvalidRequest {
                reason: "Season number must be positive".to_string(),
            }
            .into());
        }
        let current = self.current_season()?;
        if next == current.number {
            return Err(LedgerError::Conflict {
                message: format!("Season {} is already the current season", next),
            }
            .into());
        }

        let description =
            description.unwrap_or_else(|| format!("{} archived before Season {}", current.name, next));
        let snapshot = self.working_snapshot(&current, description)?;

        let carried: Vec<PlayerEntries> = self
            .running_streaks(&snapshot.player_entries)?
            .into_iter()
            .filter(|(_, streak)| *streak > 0)
            .map(|(player, streak)| PlayerEntries {
                player,
                entries: carry_over_entries(streak),
            })
            .collect();

        self.archive.store(snapshot.clone()).await?;

        let history: Vec<StreakRecord> = self.storage.load_or_default()?;
        if let Err(e) = self.reset_working_state(&carried, &history, next) {
            error!("Starting Season {} failed, rolling back: {:#}", next, e);
            if let Err(rollback) = self.roll_back_working_state(&snapshot, &history) {
                error!("Rollback of the working state failed: {:#}", rollback);
            }
            return Err(e);
        }

        info!(
            "Archived {} ({} kills, {} deaths); started Season {} with {} carried streaks",
            snapshot.season_name,
            snapshot.total_kills,
            snapshot.total_deaths,
            next,
            carried.len()
        );
        Ok(snapshot)
    }

    /// Reset the working state for `next`. The current season is written
    /// last, so a failure leaves the previous season current.
    fn reset_working_state(
        &self,
        carried: &Vec<PlayerEntries>,
        history: &[StreakRecord],
        next: SeasonNumber,
    ) -> Result<()> {
        // carry-over entries now hold the running streaks
        let history: Vec<StreakRecord> = history
            .iter()
            .map(|record| StreakRecord {
                current_streak: 0,
                ..record.clone()
            })
            .collect();

        self.storage
            .save(carried)
            .context("resetting the entry log")?;
        self.storage
            .save(&Vec::<BattlegroupDeathEntry>::new())
            .context("clearing battlegroup deaths")?;
        self.storage
            .save(&history)
            .context("resetting running streaks")?;
        self.storage
            .save(&CurrentSeason::new(next))
            .context("switching the current season")?;
        Ok(())
    }

    /// Put back the records `reset_working_state` may have overwritten
    fn roll_back_working_state(
        &self,
        snapshot: &SeasonSnapshot,
        history: &Vec<StreakRecord>,
    ) -> Result<()> {
        self.storage.save(&snapshot.player_entries)?;
        self.storage.save(&snapshot.battlegroup_deaths)?;
        self.storage.save(history)?;
        warn!("Restored the working state of {}", snapshot.season_name);
        Ok(())
    }

    /// Make an archived season the working state again.
    ///
    /// The working state is backed up first. Custom and hidden players are
    /// not restored.
    pub async fn restore_season(&self, season: SeasonNumber) -> Result<CurrentSeason> {
        let snapshot = self
            .archive
            .load(season)
            .await?
            .ok_or(LedgerError::SeasonNotFound { season })?;

        let current = self.current_season()?;
        let backup = self.working_snapshot(
            &current,
            format!("Backup of {} before restoring Season {}", current.name, season),
        )?;
        self.archive.store_backup(backup).await?;

        self.storage.save(&snapshot.player_entries)?;
        self.storage.save(&snapshot.battlegroup_deaths)?;
        let restored = CurrentSeason {
            number: snapshot.season,
            name: snapshot.season_name.clone(),
        };
        self.storage.save(&restored)?;

        info!("Restored {}", restored.name);
        Ok(restored)
    }

    /// Delete an archived season; the import season cannot be deleted
    pub async fn delete_season(&self, season: SeasonNumber) -> Result<()> {
        if season == self.import_season {
            return Err(LedgerError::InvalidRequest {
                reason: format!("Season {} holds the imported sheet data and cannot be deleted", season),
            }
            .into());
        }

        if !self.archive.remove(season).await? {
            return Err(LedgerError::SeasonNotFound { season }.into());
        }

        info!("Deleted archived Season {}", season);
        Ok(())
    }

    /// All known seasons: the import season, the current one and every archive
    pub async fn list_seasons(&self) -> Result<Vec<SeasonSummary>> {
        let mut seasons = self.archive.list().await?;
        let current = self.current_season()?;

        for (number, name) in [
            (self.import_season, import_season_name(self.import_season)),
            (current.number, current.name.clone()),
        ] {
            if !seasons.iter().any(|s| s.season == number) {
                seasons.push(SeasonSummary {
                    season: number,
                    name,
                    archived_at: None,
                    is_import_season: false,
                });
            }
        }

        for summary in seasons.iter_mut() {
            summary.is_import_season = summary.season == self.import_season;
        }

        seasons.sort_by_key(|s| s.season);
        debug!("Listing {} seasons", seasons.len());
        Ok(seasons)
    }

    /// Point the ledger at another season without touching any data
    pub fn switch_season(&self, season: SeasonNumber) -> Result<CurrentSeason> {
        let current = if season == self.import_season {
            CurrentSeason {
                number: season,
                name: import_season_name(season),
            }
        } else {
            CurrentSeason::new(season)
        };

        self.storage.save(&current)?;
        info!("Switched to {}", current.name);
        Ok(current)
    }
}
