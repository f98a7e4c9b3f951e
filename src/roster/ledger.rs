//! Roster assembly and administration
//!
//! The active roster is the custom players plus the imported players that
//! have not been deleted. Per-node counts come from the sheet (only while
//! the import season is current) and from the live entry log.

use crate::error::{LedgerError, Result};
use crate::season::manager::load_current_season;
use crate::storage::{LedgerStorage, LedgerStorageExt};
use crate::types::{
    Battlegroup, BattlegroupDeathEntry, CustomPlayer, DeletedPlayer, HiddenPlayer,
    ImportedRoster, NodeEntry, PlayerEntries, PlayerTally, SeasonNumber, WarNumber, NODE_COUNT,
};
use crate::utils::{current_timestamp, names_match};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Roster operations over the ledger storage
#[derive(Clone)]
pub struct Roster {
    storage: Arc<dyn LedgerStorage>,
    import_season: SeasonNumber,
}

impl Roster {
    pub fn new(storage: Arc<dyn LedgerStorage>, import_season: SeasonNumber) -> Self {
        Self {
            storage,
            import_season,
        }
    }

    /// Replace the imported roster
    pub fn store_import(&self, roster: &ImportedRoster) -> Result<()> {
        self.storage.save(roster)?;
        info!("Stored imported roster with {} players", roster.players.len());
        Ok(())
    }

    /// Per-player tallies for every roster member, hidden players included
    pub fn tallies(&self) -> Result<Vec<PlayerTally>> {
        let imported: ImportedRoster = self.storage.load_or_default()?;
        let custom: Vec<CustomPlayer> = self.storage.load_or_default()?;
        let hidden: Vec<HiddenPlayer> = self.storage.load_or_default()?;
        let deleted: Vec<DeletedPlayer> = self.storage.load_or_default()?;
        let rows: Vec<PlayerEntries> = self.storage.load_or_default()?;

        let season = load_current_season(self.storage.as_ref(), self.import_season)?;
        let use_sheet_counts = season.number == self.import_season;

        let mut players: Vec<PlayerTally> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for player in &custom {
            let mut tally = PlayerTally::new(player.name.clone(), player.battlegroup);
            tally.hidden = player.hidden;
            index.insert(key(&player.name), players.len());
            players.push(tally);
        }

        for player in &imported.players {
            if deleted.iter().any(|d| names_match(&d.name, &player.name)) {
                continue;
            }
            if index.contains_key(&key(&player.name)) {
                continue;
            }

            let mut tally = PlayerTally::new(player.name.clone(), player.battlegroup);
            if use_sheet_counts {
                for (node, counts) in &player.nodes {
                    tally.record(*node, counts.kills, counts.deaths);
                }
            }
            index.insert(key(&player.name), players.len());
            players.push(tally);
        }

        for entry in &hidden {
            if let Some(&i) = index.get(&key(&entry.name)) {
                players[i].hidden = true;
            }
        }

        for row in &rows {
            let Some(&i) = index.get(&key(&row.player)) else {
                debug!("Ignoring entries for unknown player '{}'", row.player);
                continue;
            };
            for entry in &row.entries {
                if entry.carry_over {
                    continue;
                }
                if let Some(node) = entry.node {
                    players[i].record(node, 1, entry.death_count());
                }
            }
        }

        Ok(players)
    }

    /// Deaths charged directly to battlegroups
    pub fn battlegroup_deaths(&self) -> Result<Vec<BattlegroupDeathEntry>> {
        self.storage.load_or_default()
    }

    fn find_member(&self, name: &str) -> Result<(String, Battlegroup, bool)> {
        let custom: Vec<CustomPlayer> = self.storage.load_or_default()?;
        if let Some(player) = custom.iter().find(|p| names_match(&p.name, name)) {
            return Ok((player.name.clone(), player.battlegroup, true));
        }

        let imported: ImportedRoster = self.storage.load_or_default()?;
        let deleted: Vec<DeletedPlayer> = self.storage.load_or_default()?;
        imported
            .players
            .iter()
            .filter(|p| !deleted.iter().any(|d| names_match(&d.name, &p.name)))
            .find(|p| names_match(&p.name, name))
            .map(|p| (p.name.clone(), p.battlegroup, false))
            .ok_or_else(|| {
                LedgerError::PlayerNotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Whether `name` is an imported player that has not been deleted
    fn is_imported(&self, name: &str) -> Result<bool> {
        let imported: ImportedRoster = self.storage.load_or_default()?;
        let deleted: Vec<DeletedPlayer> = self.storage.load_or_default()?;
        Ok(imported
            .players
            .iter()
            .filter(|p| !deleted.iter().any(|d| names_match(&d.name, &p.name)))
            .any(|p| names_match(&p.name, name)))
    }

    /// Add a player that is not on the sheet.
    ///
    /// The name must not match a custom player or an active imported player.
    pub fn add_custom_player(&self, name: &str, battlegroup: Battlegroup) -> Result<CustomPlayer> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidRequest {
                reason: "Player name cannot be empty".to_string(),
            }
            .into());
        }

        let mut custom: Vec<CustomPlayer> = self.storage.load_or_default()?;
        if custom.iter().any(|p| names_match(&p.name, name)) || self.is_imported(name)? {
            return Err(LedgerError::Conflict {
                message: format!("Player '{}' already exists", name),
            }
            .into());
        }

        let player = CustomPlayer {
            name: name.to_string(),
            battlegroup,
            added_at: current_timestamp(),
            hidden: false,
        };
        custom.push(player.clone());
        self.storage.save(&custom)?;

        info!("Added custom player '{}' to {}", name, battlegroup);
        Ok(player)
    }

    /// Set the hidden flag of a custom player
    pub fn set_custom_hidden(&self, name: &str, hidden: bool) -> Result<()> {
        let mut custom: Vec<CustomPlayer> = self.storage.load_or_default()?;
        let player = custom
            .iter_mut()
            .find(|p| names_match(&p.name, name))
            .ok_or_else(|| LedgerError::PlayerNotFound {
                name: name.to_string(),
            })?;
        player.hidden = hidden;
        self.storage.save(&custom)
    }

    /// Remove a custom player and purge their entries
    pub fn remove_custom_player(&self, name: &str) -> Result<()> {
        let mut custom: Vec<CustomPlayer> = self.storage.load_or_default()?;
        let before = custom.len();
        custom.retain(|p| !names_match(&p.name, name));
        if custom.len() == before {
            return Err(LedgerError::PlayerNotFound {
                name: name.to_string(),
            }
            .into());
        }

        self.storage.save(&custom)?;
        self.purge_entries(name)?;
        info!("Removed custom player '{}'", name);
        Ok(())
    }

    /// Exclude a player from rankings while keeping them in totals
    pub fn hide_player(&self, name: &str) -> Result<HiddenPlayer> {
        let (name, battlegroup, is_custom) = self.find_member(name)?;

        let mut hidden: Vec<HiddenPlayer> = self.storage.load_or_default()?;
        if hidden.iter().any(|h| names_match(&h.name, &name)) {
            return Err(LedgerError::Conflict {
                message: format!("Player '{}' is already hidden", name),
            }
            .into());
        }

        let entry = HiddenPlayer {
            name,
            battlegroup: Some(battlegroup),
            hidden_at: current_timestamp(),
            is_custom,
        };
        hidden.push(entry.clone());
        self.storage.save(&hidden)?;

        info!("Hid player '{}'", entry.name);
        Ok(entry)
    }

    /// Return a hidden player to the rankings
    pub fn unhide_player(&self, name: &str) -> Result<()> {
        let mut hidden: Vec<HiddenPlayer> = self.storage.load_or_default()?;
        let before = hidden.len();
        hidden.retain(|h| !names_match(&h.name, name));
        if hidden.len() == before {
            return Err(LedgerError::PlayerNotFound {
                name: name.to_string(),
            }
            .into());
        }
        self.storage.save(&hidden)
    }

    /// Remove an imported player from the roster and purge their entries
    pub fn delete_imported_player(&self, name: &str) -> Result<()> {
        let imported: ImportedRoster = self.storage.load_or_default()?;
        let Some(player) = imported.players.iter().find(|p| names_match(&p.name, name)) else {
            return Err(LedgerError::PlayerNotFound {
                name: name.to_string(),
            }
            .into());
        };

        let mut deleted: Vec<DeletedPlayer> = self.storage.load_or_default()?;
        if deleted.iter().any(|d| names_match(&d.name, name)) {
            return Err(LedgerError::Conflict {
                message: format!("Player '{}' is already deleted", player.name),
            }
            .into());
        }

        deleted.push(DeletedPlayer {
            name: player.name.clone(),
            deleted_at: current_timestamp(),
        });
        self.storage.save(&deleted)?;
        self.purge_entries(name)?;

        info!("Deleted imported player '{}'", player.name);
        Ok(())
    }

    /// Put a deleted imported player back on the roster
    pub fn restore_imported_player(&self, name: &str) -> Result<()> {
        let custom: Vec<CustomPlayer> = self.storage.load_or_default()?;
        if let Some(player) = custom.iter().find(|p| names_match(&p.name, name)) {
            return Err(LedgerError::Conflict {
                message: format!("Custom player '{}' already uses this name", player.name),
            }
            .into());
        }

        let mut deleted: Vec<DeletedPlayer> = self.storage.load_or_default()?;
        let before = deleted.len();
        deleted.retain(|d| !names_match(&d.name, name));
        if deleted.len() == before {
            return Err(LedgerError::PlayerNotFound {
                name: name.to_string(),
            }
            .into());
        }
        self.storage.save(&deleted)
    }

    fn purge_entries(&self, name: &str) -> Result<()> {
        let mut rows: Vec<PlayerEntries> = self.storage.load_or_default()?;
        let before = rows.len();
        rows.retain(|row| !names_match(&row.player, name));
        if rows.len() != before {
            self.storage.save(&rows)?;
            debug!("Purged entries of '{}'", name);
        }
        Ok(())
    }

    /// Append one live entry for a roster member
    pub fn record_entry(&self, player: &str, entry: NodeEntry) -> Result<()> {
        if let Some(node) = entry.node {
            if node == 0 || node > NODE_COUNT {
                return Err(LedgerError::InvalidRequest {
                    reason: format!("Node {} is out of range", node),
                }
                .into());
            }
        }
        let (name, _, _) = self.find_member(player)?;

        let mut rows: Vec<PlayerEntries> = self.storage.load_or_default()?;
        match rows.iter_mut().find(|row| names_match(&row.player, &name)) {
            Some(row) => row.entries.push(entry),
            None => rows.push(PlayerEntries {
                player: name.clone(),
                entries: vec![entry],
            }),
        }
        self.storage.save(&rows)?;

        debug!("Recorded entry for '{}'", name);
        Ok(())
    }

    /// Replace the whole live entry log
    pub fn replace_entries(&self, rows: Vec<PlayerEntries>) -> Result<()> {
        self.storage.save(&rows)?;
        info!("Replaced entry log with {} players", rows.len());
        Ok(())
    }

    /// Append deaths charged to a battlegroup in the current season
    pub fn record_battlegroup_deaths(
        &self,
        battlegroup: Battlegroup,
        deaths: u32,
        war: Option<WarNumber>,
    ) -> Result<BattlegroupDeathEntry> {
        let season = load_current_season(self.storage.as_ref(), self.import_season)?;
        let entry = BattlegroupDeathEntry {
            battlegroup,
            deaths,
            war,
            season: season.number,
            timestamp: current_timestamp(),
        };

        let mut entries = self.battlegroup_deaths()?;
        entries.push(entry.clone());
        self.storage.save(&entries)?;

        info!("Recorded {} deaths for {}", deaths, battlegroup);
        Ok(entry)
    }
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryLedgerStorage;
    use crate::types::{CurrentSeason, ImportedPlayer, NodeTally};
    use std::collections::BTreeMap;

    fn create_test_roster() -> (Roster, Arc<dyn LedgerStorage>) {
        let storage: Arc<dyn LedgerStorage> = Arc::new(InMemoryLedgerStorage::new());
        let roster = Roster::new(storage.clone(), 60);

        let mut nodes = BTreeMap::new();
        nodes.insert(10, NodeTally { kills: 4, deaths: 1 });
        roster
            .store_import(&ImportedRoster {
                players: vec![
                    ImportedPlayer {
                        name: "Aria".to_string(),
                        battlegroup: Battlegroup::Bg1,
                        nodes,
                    },
                    ImportedPlayer {
                        name: "Bram".to_string(),
                        battlegroup: Battlegroup::Bg2,
                        nodes: BTreeMap::new(),
                    },
                ],
                ..ImportedRoster::default()
            })
            .unwrap();

        (roster, storage)
    }

    fn find<'a>(players: &'a [PlayerTally], name: &str) -> Option<&'a PlayerTally> {
        players.iter().find(|p| p.name == name)
    }

    #[test]
    fn test_sheet_counts_only_in_import_season() {
        let (roster, storage) = create_test_roster();

        let players = roster.tallies().unwrap();
        assert_eq!(find(&players, "Aria").unwrap().total_kills(), 4);

        storage.save(&CurrentSeason::new(61)).unwrap();
        let players = roster.tallies().unwrap();
        assert_eq!(find(&players, "Aria").unwrap().total_kills(), 0);
        assert_eq!(players.len(), 2);
    }

    #[test]
    fn test_live_entries_merge() {
        let (roster, _) = create_test_roster();
        roster
            .record_entry("aria", NodeEntry::fight(10, 2, Some(1)))
            .unwrap();
        roster
            .record_entry("Bram", NodeEntry::fight(3, 0, Some(1)))
            .unwrap();

        let players = roster.tallies().unwrap();
        let aria = find(&players, "Aria").unwrap();
        assert_eq!(aria.nodes[&10], NodeTally { kills: 5, deaths: 3 });
        assert_eq!(find(&players, "Bram").unwrap().total_kills(), 1);
    }

    #[test]
    fn test_carry_over_entries_not_counted() {
        let (roster, _) = create_test_roster();
        roster
            .record_entry("Bram", NodeEntry::streak_carry_over())
            .unwrap();

        let players = roster.tallies().unwrap();
        assert_eq!(find(&players, "Bram").unwrap().total_kills(), 0);
    }

    #[test]
    fn test_record_entry_unknown_player() {
        let (roster, _) = create_test_roster();
        let err = roster
            .record_entry("Ghost", NodeEntry::fight(1, 0, None))
            .unwrap_err();
        assert!(err.downcast_ref::<LedgerError>().unwrap().is_not_found());

        assert!(roster
            .record_entry("Aria", NodeEntry::fight(0, 0, None))
            .is_err());
    }

    #[test]
    fn test_custom_players() {
        let (roster, _) = create_test_roster();
        roster.add_custom_player("Cato", Battlegroup::Bg3).unwrap();

        let dup = roster.add_custom_player("cato", Battlegroup::Bg1).unwrap_err();
        assert!(matches!(
            dup.downcast_ref::<LedgerError>(),
            Some(LedgerError::Conflict { .. })
        ));

        roster.set_custom_hidden("Cato", true).unwrap();
        let players = roster.tallies().unwrap();
        assert!(find(&players, "Cato").unwrap().hidden);

        roster
            .record_entry("Cato", NodeEntry::fight(5, 0, None))
            .unwrap();
        roster.remove_custom_player("Cato").unwrap();
        let players = roster.tallies().unwrap();
        assert!(find(&players, "Cato").is_none());
        assert!(roster.remove_custom_player("Cato").is_err());
    }

    #[test]
    fn test_custom_player_cannot_shadow_imported_player() {
        let (roster, _) = create_test_roster();

        let err = roster.add_custom_player("aria", Battlegroup::Bg3).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::Conflict { .. })
        ));

        let players = roster.tallies().unwrap();
        let aria = find(&players, "Aria").unwrap();
        assert_eq!(aria.battlegroup, Battlegroup::Bg1);
        assert_eq!(aria.total_kills(), 4);
        assert_eq!(players.len(), 2);

        // a deleted imported name is free until the player is restored
        roster.delete_imported_player("Bram").unwrap();
        roster.add_custom_player("bram", Battlegroup::Bg3).unwrap();
        let err = roster.restore_imported_player("Bram").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::Conflict { .. })
        ));
    }

    #[test]
    fn test_hide_and_unhide() {
        let (roster, _) = create_test_roster();
        let hidden = roster.hide_player("bram").unwrap();
        assert_eq!(hidden.name, "Bram");
        assert_eq!(hidden.battlegroup, Some(Battlegroup::Bg2));
        assert!(!hidden.is_custom);

        assert!(roster.hide_player("Bram").is_err());
        assert!(find(&roster.tallies().unwrap(), "Bram").unwrap().hidden);

        roster.unhide_player("Bram").unwrap();
        assert!(!find(&roster.tallies().unwrap(), "Bram").unwrap().hidden);
        assert!(roster.unhide_player("Bram").is_err());
    }

    #[test]
    fn test_delete_imported_player_purges_entries() {
        let (roster, storage) = create_test_roster();
        roster
            .record_entry("Aria", NodeEntry::fight(1, 0, None))
            .unwrap();

        roster.delete_imported_player("Aria").unwrap();
        assert!(find(&roster.tallies().unwrap(), "Aria").is_none());

        let rows: Vec<PlayerEntries> = storage.load_or_default().unwrap();
        assert!(rows.iter().all(|r| r.player != "Aria"));

        assert!(roster.delete_imported_player("Aria").is_err());

        roster.restore_imported_player("Aria").unwrap();
        let players = roster.tallies().unwrap();
        // sheet counts come back, live entries do not
        assert_eq!(find(&players, "Aria").unwrap().total_kills(), 4);
    }

    #[test]
    fn test_battlegroup_deaths_use_current_season() {
        let (roster, storage) = create_test_roster();
        storage.save(&CurrentSeason::new(62)).unwrap();

        let entry = roster
            .record_battlegroup_deaths(Battlegroup::Bg2, 3, Some(4))
            .unwrap();
        assert_eq!(entry.season, 62);
        assert_eq!(roster.battlegroup_deaths().unwrap().len(), 1);
    }
}
