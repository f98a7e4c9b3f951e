//! Player rankings and battlegroup aggregation

use crate::error::LedgerError;
use crate::rating::calculator::RatedPlayer;
use crate::types::{Battlegroup, BattlegroupDeathEntry, SeasonNumber, WarNumber};
use crate::utils::round2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Field players are ranked by (always descending)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    #[serde(rename = "pr")]
    PowerRating,
    Kills,
    Deaths,
    SoloRate,
}

impl std::str::FromStr for SortKey {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pr" | "power_rating" => Ok(SortKey::PowerRating),
            "kills" => Ok(SortKey::Kills),
            "deaths" => Ok(SortKey::Deaths),
            "solo_rate" | "soloRate" => Ok(SortKey::SoloRate),
            other => Err(LedgerError::InvalidRequest {
                reason: format!("Unknown sort key: {}", other),
            }),
        }
    }
}

impl SortKey {
    fn compare(&self, a: &RatedPlayer, b: &RatedPlayer) -> Ordering {
        match self {
            SortKey::PowerRating => b
                .power_rating
                .partial_cmp(&a.power_rating)
                .unwrap_or(Ordering::Equal),
            SortKey::Kills => b.total_kills.cmp(&a.total_kills),
            SortKey::Deaths => b.total_deaths.cmp(&a.total_deaths),
            SortKey::SoloRate => b
                .solo_rate
                .partial_cmp(&a.solo_rate)
                .unwrap_or(Ordering::Equal),
        }
    }
}

/// Visible players ordered by `key`, highest first. Ties keep input order.
pub fn rank_players(rated: &[RatedPlayer], key: SortKey) -> Vec<RatedPlayer> {
    let mut visible: Vec<RatedPlayer> = rated.iter().filter(|p| !p.hidden).cloned().collect();
    visible.sort_by(|a, b| key.compare(a, b));
    visible
}

/// Restricts which battlegroup death entries are counted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingPeriod {
    pub season: Option<SeasonNumber>,
    pub war: Option<WarNumber>,
}

impl ReportingPeriod {
    pub fn matches(&self, entry: &BattlegroupDeathEntry) -> bool {
        let season_ok = self.season.map_or(true, |s| entry.season == s);
        let war_ok = self.war.map_or(true, |w| entry.war == Some(w));
        season_ok && war_ok
    }
}

/// Aggregated figures for one battlegroup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattlegroupTotals {
    pub battlegroup: Battlegroup,
    /// 1 = highest summed power rating
    pub rank: u32,
    pub total_kills: u64,
    /// Member deaths plus deaths charged to the battlegroup directly
    pub total_deaths: u64,
    pub total_power_rating: f64,
    pub average_solo_rate: f64,
    /// Members including hidden players
    pub player_count: usize,
    pub visible_player_count: usize,
}

/// Totals for all three battlegroups, ranked by summed power rating.
///
/// Hidden players count toward every figure except `visible_player_count`.
pub fn battlegroup_totals(
    rated: &[RatedPlayer],
    battlegroup_deaths: &[BattlegroupDeathEntry],
    period: &ReportingPeriod,
) -> Vec<BattlegroupTotals> {
    let mut totals: Vec<BattlegroupTotals> = Battlegroup::ALL
        .iter()
        .map(|bg| {
            let members: Vec<&RatedPlayer> =
                rated.iter().filter(|p| p.battlegroup == *bg).collect();

            let unattributed: u64 = battlegroup_deaths
                .iter()
                .filter(|entry| entry.battlegroup == *bg && period.matches(entry))
                .map(|entry| entry.deaths as u64)
                .sum();

            let total_kills = members.iter().map(|p| p.total_kills).sum();
            let member_deaths: u64 = members.iter().map(|p| p.total_deaths).sum();
            let total_power_rating = round2(members.iter().map(|p| p.power_rating).sum());
            let average_solo_rate = if members.is_empty() {
                0.0
            } else {
                members.iter().map(|p| p.solo_rate).sum::<f64>() / members.len() as f64
            };

            BattlegroupTotals {
                battlegroup: *bg,
                rank: 0,
                total_kills,
                total_deaths: member_deaths + unattributed,
                total_power_rating,
                average_solo_rate,
                player_count: members.len(),
                visible_player_count: members.iter().filter(|p| !p.hidden).count(),
            }
        })
        .collect();

    totals.sort_by(|a, b| {
        b.total_power_rating
            .partial_cmp(&a.total_power_rating)
            .unwrap_or(Ordering::Equal)
    });
    for (index, entry) in totals.iter_mut().enumerate() {
        entry.rank = index as u32 + 1;
    }

    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_test_rated(
        name: &str,
        bg: Battlegroup,
        pr: f64,
        kills: u64,
        deaths: u64,
        hidden: bool,
    ) -> RatedPlayer {
        RatedPlayer {
            name: name.to_string(),
            battlegroup: bg,
            hidden,
            total_kills: kills,
            total_deaths: deaths,
            total_kill_rating: pr,
            solo_rate: crate::utils::solo_rate(kills, deaths),
            power_rating: pr,
            difficulty_rating_per_fight: 1.0,
        }
    }

    fn create_test_roster() -> Vec<RatedPlayer> {
        vec![
            create_test_rated("Aria", Battlegroup::Bg1, 40.0, 20, 5, false),
            create_test_rated("Bram", Battlegroup::Bg1, 12.5, 8, 8, false),
            create_test_rated("Cato", Battlegroup::Bg2, 55.0, 30, 2, false),
            create_test_rated("Dax", Battlegroup::Bg3, 70.0, 35, 10, true),
            create_test_rated("Eve", Battlegroup::Bg3, 1.0, 1, 1, false),
        ]
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!("pr".parse::<SortKey>().unwrap(), SortKey::PowerRating);
        assert_eq!("soloRate".parse::<SortKey>().unwrap(), SortKey::SoloRate);
        assert!("name".parse::<SortKey>().is_err());
    }

    #[test]
    fn test_rank_players_excludes_hidden() {
        let ranked = rank_players(&create_test_roster(), SortKey::PowerRating);
        let names: Vec<&str> = ranked.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Cato", "Aria", "Bram", "Eve"]);
    }

    #[test]
    fn test_rank_players_by_each_key() {
        let roster = create_test_roster();

        let by_kills = rank_players(&roster, SortKey::Kills);
        assert_eq!(by_kills[0].name, "Cato");

        let by_deaths = rank_players(&roster, SortKey::Deaths);
        assert_eq!(by_deaths[0].name, "Bram");

        let by_solo = rank_players(&roster, SortKey::SoloRate);
        assert_eq!(by_solo[0].name, "Cato");
        assert!(by_solo.windows(2).all(|w| w[0].solo_rate >= w[1].solo_rate));
    }

    #[test]
    fn test_battlegroup_totals() {
        let deaths = vec![
            BattlegroupDeathEntry {
                battlegroup: Battlegroup::Bg1,
                deaths: 4,
                war: Some(2),
                season: 61,
                timestamp: Utc::now(),
            },
            BattlegroupDeathEntry {
                battlegroup: Battlegroup::Bg1,
                deaths: 3,
                war: Some(3),
                season: 61,
                timestamp: Utc::now(),
            },
        ];

        let totals = battlegroup_totals(&create_test_roster(), &deaths, &ReportingPeriod::default());
        assert_eq!(totals.len(), 3);

        let bg1 = totals
            .iter()
            .find(|t| t.battlegroup == Battlegroup::Bg1)
            .unwrap();
        assert_eq!(bg1.total_kills, 28);
        assert_eq!(bg1.total_deaths, 13 + 7);
        assert_eq!(bg1.total_power_rating, 52.5);
        assert_eq!(bg1.player_count, 2);

        // hidden Dax still counts toward BG3
        let bg3 = totals
            .iter()
            .find(|t| t.battlegroup == Battlegroup::Bg3)
            .unwrap();
        assert_eq!(bg3.rank, 1);
        assert_eq!(bg3.total_power_rating, 71.0);
        assert_eq!(bg3.player_count, 2);
        assert_eq!(bg3.visible_player_count, 1);

        let ranks: Vec<u32> = totals.iter().map(|t| t.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_reporting_period_filters_battlegroup_deaths() {
        let deaths = vec![
            BattlegroupDeathEntry {
                battlegroup: Battlegroup::Bg2,
                deaths: 4,
                war: Some(2),
                season: 61,
                timestamp: Utc::now(),
            },
            BattlegroupDeathEntry {
                battlegroup: Battlegroup::Bg2,
                deaths: 3,
                war: Some(3),
                season: 61,
                timestamp: Utc::now(),
            },
        ];
        let period = ReportingPeriod {
            season: Some(61),
            war: Some(3),
        };

        let totals = battlegroup_totals(&create_test_roster(), &deaths, &period);
        let bg2 = totals
            .iter()
            .find(|t| t.battlegroup == Battlegroup::Bg2)
            .unwrap();
        assert_eq!(bg2.total_deaths, 2 + 3);
    }

    #[test]
    fn test_empty_battlegroup() {
        let totals = battlegroup_totals(&[], &[], &ReportingPeriod::default());
        assert!(totals.iter().all(|t| t.average_solo_rate == 0.0 && t.player_count == 0));
    }
}
