//! War ledger service
//!
//! Ties the roster, rating engine, difficulty table, streak tracker and
//! season lifecycle to one storage backend. Reads are recomputed from storage
//! on every call. Every mutation goes through a single writer gate, so two
//! concurrent admin requests never interleave their load-modify-save cycles.

use crate::config::AppConfig;
use crate::error::{LedgerError, Result};
use crate::metrics::MetricsCollector;
use crate::rating::difficulty::{apply_override, update_settings};
use crate::rating::{
    aggregate_entries, battlegroup_totals, rank_players, BattlegroupTotals, DifficultyCalculator,
    PowerRatingCalculator, RatedPlayer, RatingCalculator, ReportingPeriod, SortKey,
};
use crate::roster::{load_roster_sheet, load_streak_sheet, Roster};
use crate::season::{SeasonManager, WarCalendar};
use crate::storage::{LedgerStorage, LedgerStorageExt, SeasonArchive};
use crate::streak::{centennial, compute_streaks, merge_all_time_highs, CENTENNIAL_THRESHOLD};
use crate::types::{
    all_nodes, AllianceTotals, Battlegroup, CurrentSeason, DifficultySettings, DifficultyTable,
    ImportedRoster, NodeEntry, NodeId, NodeOverride, NodeParameters, NodeTable, PlayerEntries,
    SeasonNumber, SeasonSnapshot, StreakRecord, WarNumber,
};
use crate::utils::{current_timestamp, round2, solo_rate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Everything the dashboard shows for the current season
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub season: CurrentSeason,
    pub alliance: AllianceTotals,
    pub alliance_solo_rate: f64,
    pub total_power_rating: f64,
    /// Visible players in ranking order
    pub players: Vec<RatedPlayer>,
    pub hidden_players: usize,
    pub battlegroups: Vec<BattlegroupTotals>,
    pub generated_at: DateTime<Utc>,
}

/// Computed streaks plus the centennial board
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakBoard {
    pub records: Vec<StreakRecord>,
    pub centennial: Vec<StreakRecord>,
}

pub struct WarLedger {
    storage: Arc<dyn LedgerStorage>,
    calculator: PowerRatingCalculator,
    difficulty: DifficultyCalculator,
    roster: Roster,
    seasons: SeasonManager,
    calendar: WarCalendar,
    metrics: Arc<MetricsCollector>,
    streaks_csv: Option<PathBuf>,
    writer: Mutex<()>,
}

impl WarLedger {
    pub fn new(
        config: &AppConfig,
        storage: Arc<dyn LedgerStorage>,
        archive: Arc<dyn SeasonArchive>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self> {
        let import_season = config.sheet.import_season;
        let calculator = PowerRatingCalculator::new(config.rating.clone())?;

        Ok(Self {
            difficulty: DifficultyCalculator::new(config.rating.clone()),
            roster: Roster::new(storage.clone(), import_season),
            seasons: SeasonManager::new(storage.clone(), archive, import_season),
            calendar: WarCalendar::new(storage.clone()),
            storage,
            calculator,
            metrics,
            streaks_csv: config.sheet.streaks_csv.clone(),
            writer: Mutex::new(()),
        })
    }

    pub fn storage(&self) -> &Arc<dyn LedgerStorage> {
        &self.storage
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn seasons(&self) -> &SeasonManager {
        &self.seasons
    }

    pub fn calendar(&self) -> &WarCalendar {
        &self.calendar
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Count storage failures before handing the result back
    fn observe<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if matches!(
                e.downcast_ref::<LedgerError>(),
                Some(LedgerError::Storage { .. }) | Some(LedgerError::InvalidRecord { .. })
            ) {
                self.metrics.record_storage_error(operation);
            }
        }
        result
    }

    /// The working difficulty table.
    ///
    /// Falls back to the imported node defaults, then to default parameters
    /// for every node, when no table has been stored yet.
    pub fn difficulty_table(&self) -> Result<DifficultyTable> {
        let stored = self.observe("load_difficulty", self.storage.load::<DifficultyTable>())?;
        if let Some(table) = stored {
            return Ok(table);
        }

        let imported: ImportedRoster =
            self.observe("load_roster", self.storage.load_or_default())?;
        if !imported.node_defaults.is_empty() {
            debug!("No difficulty table stored, using imported node defaults");
            return Ok(DifficultyTable::from_node_table(&imported.node_defaults));
        }

        let defaults: NodeTable = all_nodes()
            .map(|node| (node, NodeParameters::default()))
            .collect();
        Ok(DifficultyTable::from_node_table(&defaults))
    }

    /// Rate every roster member, hidden players included, in roster order
    pub fn rate_roster(&self) -> Result<(Vec<RatedPlayer>, AllianceTotals)> {
        let timer = self.metrics.start_timer();

        let tallies = self.observe("load_roster", self.roster.tallies())?;
        let unattributed: u64 = self
            .observe("load_deaths", self.roster.battlegroup_deaths())?
            .iter()
            .map(|entry| entry.deaths as u64)
            .sum();
        let nodes = self.difficulty_table()?.node_table();

        let alliance = PowerRatingCalculator::alliance_totals(&tallies, unattributed);
        let rated = self.calculator.rate_players(&tallies, &nodes, alliance);

        let visible = rated.iter().filter(|p| !p.hidden).count();
        let total: f64 = rated.iter().map(|p| p.power_rating).sum();
        self.metrics
            .record_rating_pass(rated.len(), visible, total, timer.stop());

        Ok((rated, alliance))
    }

    pub fn dashboard(&self, sort: SortKey, period: ReportingPeriod) -> Result<Dashboard> {
        let (rated, alliance) = self.rate_roster()?;
        let deaths = self.roster.battlegroup_deaths()?;
        let season = self.seasons.current_season()?;

        let players = rank_players(&rated, sort);
        let battlegroups = battlegroup_totals(&rated, &deaths, &period);

        Ok(Dashboard {
            season,
            alliance,
            alliance_solo_rate: solo_rate(alliance.kills, alliance.deaths),
            total_power_rating: round2(rated.iter().map(|p| p.power_rating).sum()),
            hidden_players: rated.len() - players.len(),
            players,
            battlegroups,
            generated_at: current_timestamp(),
        })
    }

    pub fn battlegroups(&self, period: ReportingPeriod) -> Result<Vec<BattlegroupTotals>> {
        let (rated, _) = self.rate_roster()?;
        let deaths = self.roster.battlegroup_deaths()?;
        Ok(battlegroup_totals(&rated, &deaths, &period))
    }

    /// Streak baseline: stored history, else the streak sheet if configured
    fn streak_baseline(&self) -> Result<Vec<StreakRecord>> {
        let history: Vec<StreakRecord> =
            self.observe("load_streaks", self.storage.load_or_default())?;
        if !history.is_empty() {
            return Ok(history);
        }

        match &self.streaks_csv {
            Some(path) => match load_streak_sheet(path) {
                Ok(records) => Ok(records),
                Err(e) => {
                    warn!("Streak sheet unavailable, starting from zero: {}", e);
                    Ok(Vec::new())
                }
            },
            None => Ok(Vec::new()),
        }
    }

    pub fn streaks(&self) -> Result<StreakBoard> {
        let members: Vec<(String, Battlegroup)> = self
            .roster
            .tallies()?
            .into_iter()
            .map(|tally| (tally.name, tally.battlegroup))
            .collect();
        let rows: Vec<PlayerEntries> = self.storage.load_or_default()?;
        let baseline = self.streak_baseline()?;

        let records = compute_streaks(&members, &rows, &baseline);
        let centennial = centennial(&records, CENTENNIAL_THRESHOLD);
        Ok(StreakBoard {
            records,
            centennial,
        })
    }

    /// Recalculate every node from the live entry log and store the table
    pub async fn recalculate_difficulty(&self) -> Result<DifficultyTable> {
        let _guard = self.writer.lock().await;
        let timer = self.metrics.start_timer();

        let table = self.difficulty_table()?;
        let rows: Vec<PlayerEntries> =
            self.observe("load_entries", self.storage.load_or_default())?;
        let observations = aggregate_entries(&rows);

        let recalculated = self
            .difficulty
            .recalculate(&table, &observations, current_timestamp());
        self.observe("save_difficulty", self.storage.save(&recalculated))?;

        let total_rating = self.difficulty.total_difficulty_rating(&observations);
        self.metrics
            .record_recalculation("manual", total_rating, timer.stop());
        info!(
            "Recalculated node difficulty from {} observed nodes",
            observations.len()
        );
        Ok(recalculated)
    }

    /// Reset the table to the imported node defaults, keeping settings
    pub async fn initialize_difficulty_from_sheet(&self) -> Result<DifficultyTable> {
        let _guard = self.writer.lock().await;

        let imported: ImportedRoster = self.storage.load_or_default()?;
        if imported.node_defaults.is_empty() {
            return Err(LedgerError::InvalidRequest {
                reason: "No imported node defaults to initialize from".to_string(),
            }
            .into());
        }

        let mut table = DifficultyTable::from_node_table(&imported.node_defaults);
        if let Some(existing) = self.storage.load::<DifficultyTable>()? {
            table.settings = existing.settings;
        }
        self.observe("save_difficulty", self.storage.save(&table))?;

        self.metrics
            .record_recalculation("sheet", 0.0, std::time::Duration::ZERO);
        info!("Initialized {} nodes from sheet defaults", table.nodes.len());
        Ok(table)
    }

    pub async fn override_node(&self, node: NodeId, update: NodeOverride) -> Result<DifficultyTable> {
        let _guard = self.writer.lock().await;

        let mut table = self.difficulty_table()?;
        apply_override(&mut table, node, &update, current_timestamp())?;
        self.observe("save_difficulty", self.storage.save(&table))?;

        self.metrics.record_override();
        Ok(table)
    }

    pub async fn update_difficulty_settings(
        &self,
        settings: DifficultySettings,
    ) -> Result<DifficultyTable> {
        let _guard = self.writer.lock().await;

        let mut table = self.difficulty_table()?;
        update_settings(&mut table, settings)?;
        self.observe("save_difficulty", self.storage.save(&table))?;

        info!(
            "Difficulty bounds set to [{}, {}]",
            settings.min_value, settings.max_value
        );
        Ok(table)
    }

    /// Replace the imported roster
    pub async fn import_roster(&self, mut imported: ImportedRoster) -> Result<usize> {
        let _guard = self.writer.lock().await;

        if imported.imported_at.is_none() {
            imported.imported_at = Some(current_timestamp());
        }
        self.observe("save_roster", self.roster.store_import(&imported))?;

        self.metrics.record_import("roster");
        Ok(imported.players.len())
    }

    pub async fn import_roster_sheet(&self, path: &Path) -> Result<usize> {
        let imported = load_roster_sheet(path)?;
        self.import_roster(imported).await
    }

    /// Replace the stored streak history with the streak sheet
    pub async fn import_streak_sheet(&self, path: &Path) -> Result<usize> {
        let records = load_streak_sheet(path)?;
        let _guard = self.writer.lock().await;

        self.observe("save_streaks", self.storage.save(&records))?;
        self.metrics.record_import("streaks");
        info!("Imported {} streak records", records.len());
        Ok(records.len())
    }

    /// Fold the computed highs into the stored streak history
    pub async fn save_all_time_highs(&self) -> Result<usize> {
        let _guard = self.writer.lock().await;

        let board = self.streaks()?;
        let mut history = self.streak_baseline()?;
        let raised = merge_all_time_highs(&mut history, &board.records);
        self.observe("save_streaks", self.storage.save(&history))?;

        info!("Saved streak history, {} highs raised", raised);
        Ok(raised)
    }

    /// Run a roster administration action under the writer gate
    pub async fn administer<T>(
        &self,
        action: &str,
        f: impl FnOnce(&Roster) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.writer.lock().await;
        let result = self.observe(action, f(&self.roster))?;
        self.metrics.record_roster_change(action);
        Ok(result)
    }

    pub async fn record_entry(&self, player: &str, entry: NodeEntry) -> Result<()> {
        let _guard = self.writer.lock().await;
        self.observe("record_entry", self.roster.record_entry(player, entry))?;
        self.metrics.record_entry("node");
        Ok(())
    }

    pub async fn record_battlegroup_deaths(
        &self,
        battlegroup: Battlegroup,
        deaths: u32,
        war: Option<WarNumber>,
    ) -> Result<()> {
        let _guard = self.writer.lock().await;
        self.observe(
            "record_deaths",
            self.roster.record_battlegroup_deaths(battlegroup, deaths, war),
        )?;
        self.metrics.record_entry("battlegroup");
        Ok(())
    }

    pub async fn start_new_season(
        &self,
        next: SeasonNumber,
        description: Option<String>,
    ) -> Result<SeasonSnapshot> {
        let _guard = self.writer.lock().await;
        let snapshot = self.seasons.start_new_season(next, description).await?;
        self.metrics.record_season_action("start");
        Ok(snapshot)
    }

    pub async fn restore_season(&self, season: SeasonNumber) -> Result<CurrentSeason> {
        let _guard = self.writer.lock().await;
        let restored = self.seasons.restore_season(season).await?;
        self.metrics.record_season_action("restore");
        Ok(restored)
    }

    pub async fn delete_season(&self, season: SeasonNumber) -> Result<()> {
        let _guard = self.writer.lock().await;
        self.seasons.delete_season(season).await?;
        self.metrics.record_season_action("delete");
        Ok(())
    }

    pub async fn switch_season(&self, season: SeasonNumber) -> Result<CurrentSeason> {
        let _guard = self.writer.lock().await;
        let current = self.seasons.switch_season(season)?;
        self.metrics.record_season_action("switch");
        Ok(current)
    }

    /// Run a war calendar action under the writer gate
    pub async fn schedule<T>(&self, f: impl FnOnce(&WarCalendar) -> Result<T>) -> Result<T> {
        let _guard = self.writer.lock().await;
        f(&self.calendar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryLedgerStorage, InMemorySeasonArchive, MockLedgerStorage};
    use crate::types::{ImportedPlayer, NodeTally};
    use std::collections::BTreeMap;

    fn create_test_ledger() -> WarLedger {
        create_test_ledger_with(Arc::new(InMemoryLedgerStorage::new()))
    }

    fn create_test_ledger_with(storage: Arc<dyn LedgerStorage>) -> WarLedger {
        WarLedger::new(
            &AppConfig::default(),
            storage,
            Arc::new(InMemorySeasonArchive::new()),
            Arc::new(MetricsCollector::new().unwrap()),
        )
        .unwrap()
    }

    fn create_test_import() -> ImportedRoster {
        let player = |name: &str, bg: Battlegroup, node: NodeId, kills: u32, deaths: u32| {
            let mut nodes = BTreeMap::new();
            nodes.insert(node, NodeTally { kills, deaths });
            ImportedPlayer {
                name: name.to_string(),
                battlegroup: bg,
                nodes,
            }
        };

        let mut node_defaults = NodeTable::new();
        node_defaults.insert(
            10,
            NodeParameters {
                value: 2.0,
                kill_bonus: 0.1,
                death_penalty: 0.5,
            },
        );
        node_defaults.insert(20, NodeParameters::default());

        ImportedRoster {
            players: vec![
                player("Aria", Battlegroup::Bg1, 10, 10, 0),
                player("Bram", Battlegroup::Bg2, 20, 4, 2),
            ],
            node_defaults,
            imported_at: None,
        }
    }

    #[test]
    fn test_default_difficulty_table_covers_all_nodes() {
        let ledger = create_test_ledger();
        let table = ledger.difficulty_table().unwrap();
        assert_eq!(table.nodes.len(), 50);
        assert!(table.nodes.values().all(|n| n.current_value == 1.0));
    }

    #[tokio::test]
    async fn test_dashboard_from_import() {
        let ledger = create_test_ledger();
        ledger.import_roster(create_test_import()).await.unwrap();

        let dashboard = ledger
            .dashboard(SortKey::PowerRating, ReportingPeriod::default())
            .unwrap();

        assert_eq!(dashboard.alliance, AllianceTotals { kills: 14, deaths: 2 });
        assert_eq!(dashboard.players.len(), 2);
        assert_eq!(dashboard.players[0].name, "Aria");
        assert_eq!(dashboard.battlegroups.len(), 3);
        assert_eq!(dashboard.battlegroups[0].battlegroup, Battlegroup::Bg1);
        assert_eq!(ledger.metrics().rating().computations_total.get(), 1);
    }

    #[tokio::test]
    async fn test_hidden_players_leave_rankings_not_totals() {
        let ledger = create_test_ledger();
        ledger.import_roster(create_test_import()).await.unwrap();
        ledger
            .administer("hide", |roster| roster.hide_player("bram"))
            .await
            .unwrap();

        let dashboard = ledger
            .dashboard(SortKey::Kills, ReportingPeriod::default())
            .unwrap();
        assert_eq!(dashboard.players.len(), 1);
        assert_eq!(dashboard.hidden_players, 1);
        assert_eq!(dashboard.alliance.kills, 14);
    }

    #[tokio::test]
    async fn test_recalculate_and_override() {
        let ledger = create_test_ledger();
        ledger.import_roster(create_test_import()).await.unwrap();
        ledger
            .record_entry("Aria", NodeEntry::fight(10, 2, Some(1)))
            .await
            .unwrap();

        let table = ledger.recalculate_difficulty().await.unwrap();
        assert_eq!(table.nodes.len(), 50);
        assert!(table.last_recalculated.is_some());
        // every death is on node 10, so its raw difficulty (~10.7) clamps to the max
        assert_eq!(table.nodes[&10].current_value, 5.0);
        assert_eq!(table.nodes[&20].current_value, 1.0);

        let update = NodeOverride {
            current_value: Some(2.5),
            ..Default::default()
        };
        let table = ledger.override_node(10, update.clone()).await.unwrap();
        assert_eq!(table.nodes[&10].current_value, 2.5);
        assert!(ledger.override_node(51, update).await.is_err());
    }

    #[tokio::test]
    async fn test_initialize_from_sheet_requires_import() {
        let ledger = create_test_ledger();
        assert!(ledger.initialize_difficulty_from_sheet().await.is_err());

        ledger.import_roster(create_test_import()).await.unwrap();
        let table = ledger.initialize_difficulty_from_sheet().await.unwrap();
        assert_eq!(table.nodes.len(), 2);
        assert_eq!(table.nodes[&10].base_value, 2.0);
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected() {
        let ledger = create_test_ledger();
        let settings = DifficultySettings {
            min_value: 3.0,
            max_value: 1.0,
            ..Default::default()
        };
        assert!(ledger.update_difficulty_settings(settings).await.is_err());
    }

    #[tokio::test]
    async fn test_streaks_and_saved_highs() {
        let ledger = create_test_ledger();
        ledger.import_roster(create_test_import()).await.unwrap();
        for war in 1..=3 {
            ledger
                .record_entry("Aria", NodeEntry::fight(10, 0, Some(war)))
                .await
                .unwrap();
        }

        let board = ledger.streaks().unwrap();
        assert_eq!(board.records[0].name, "Aria");
        assert_eq!(board.records[0].current_streak, 3);
        assert!(board.centennial.is_empty());

        assert_eq!(ledger.save_all_time_highs().await.unwrap(), 1);
        assert_eq!(ledger.save_all_time_highs().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_entries_are_not_lost() {
        let ledger = Arc::new(create_test_ledger());
        ledger.import_roster(create_test_import()).await.unwrap();

        let writes = (0..20).map(|i| {
            let ledger = ledger.clone();
            async move {
                ledger
                    .record_entry("Aria", NodeEntry::fight(5, 0, Some(i % 12 + 1)))
                    .await
            }
        });
        let results = futures::future::join_all(writes).await;
        assert!(results.iter().all(|r| r.is_ok()));

        let rows: Vec<PlayerEntries> = ledger.storage.load_or_default().unwrap();
        assert_eq!(rows[0].entries.len(), 20);
    }

    #[tokio::test]
    async fn test_storage_failures_are_counted() {
        let mut storage = MockLedgerStorage::new();
        storage.expect_get_raw().returning(|_| {
            Err(LedgerError::Storage {
                message: "disk unavailable".to_string(),
            }
            .into())
        });

        let ledger = create_test_ledger_with(Arc::new(storage));
        assert!(ledger.rate_roster().is_err());
        assert_eq!(
            ledger
                .metrics()
                .ledger()
                .storage_errors_total
                .with_label_values(&["load_roster"])
                .get(),
            1
        );
    }
}
