//! Health check reporting
//!
//! Component checks exercise the same paths a dashboard request takes:
//! reading records from storage, listing the season archive and rating the
//! roster.

use crate::service::ledger::WarLedger;
use crate::storage::LedgerStorageExt;
use crate::types::PlayerEntries;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value exported as `warboard_health_status`
    pub fn gauge_value(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    /// The worse of two statuses
    fn worst(self, other: HealthStatus) -> HealthStatus {
        if other.gauge_value() < self.gauge_value() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: LedgerStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Set when the component is not healthy
    pub message: Option<String>,
    pub duration_ms: u64,
}

/// Ledger figures reported alongside the health status
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerStats {
    pub current_season: Option<u32>,
    pub roster_size: usize,
    pub visible_players: usize,
    pub live_entries: usize,
    pub archived_seasons: usize,
    pub last_recalculated: Option<chrono::DateTime<chrono::Utc>>,
}

impl HealthCheck {
    /// Run every component check against the ledger
    pub async fn check(ledger: &WarLedger, service: &str) -> Result<Self> {
        let mut stats = LedgerStats::default();
        let mut checks = Vec::new();

        checks.push(Self::check_storage(ledger, &mut stats));
        checks.push(Self::check_archive(ledger, &mut stats).await);
        checks.push(Self::check_rating(ledger, &mut stats));

        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |acc, check| acc.worst(check.status));

        let metrics = ledger.metrics();
        metrics.update_health_status(status.gauge_value());
        for check in &checks {
            metrics.update_component_health(&check.name, check.status == HealthStatus::Healthy);
        }

        Ok(HealthCheck {
            status,
            service: service.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    fn check_storage(ledger: &WarLedger, stats: &mut LedgerStats) -> ComponentCheck {
        let start = Instant::now();

        let result = ledger.seasons().current_season().and_then(|season| {
            let rows: Vec<PlayerEntries> = ledger.storage().load_or_default()?;
            let table = ledger.difficulty_table()?;
            Ok((season, rows, table))
        });

        let (status, message) = match result {
            Ok((season, rows, table)) => {
                stats.current_season = Some(season.number);
                stats.live_entries = rows.iter().map(|row| row.entries.len()).sum();
                stats.last_recalculated = table.last_recalculated;
                (HealthStatus::Healthy, None)
            }
            Err(e) => {
                error!("Storage health check failed: {}", e);
                (HealthStatus::Unhealthy, Some(e.to_string()))
            }
        };

        ComponentCheck {
            name: "storage".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn check_archive(ledger: &WarLedger, stats: &mut LedgerStats) -> ComponentCheck {
        let start = Instant::now();

        // the archive only backs season admin, so a failure degrades
        let (status, message) = match ledger.seasons().list_seasons().await {
            Ok(seasons) => {
                stats.archived_seasons = seasons.iter().filter(|s| s.archived_at.is_some()).count();
                (HealthStatus::Healthy, None)
            }
            Err(e) => {
                error!("Season archive health check failed: {}", e);
                (HealthStatus::Degraded, Some(e.to_string()))
            }
        };

        ComponentCheck {
            name: "season_archive".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_rating(ledger: &WarLedger, stats: &mut LedgerStats) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match ledger.rate_roster() {
            Ok((rated, _)) if rated.is_empty() => {
                debug!("Roster is empty");
                (
                    HealthStatus::Degraded,
                    Some("No players on the roster; import a sheet".to_string()),
                )
            }
            Ok((rated, _)) => {
                stats.roster_size = rated.len();
                stats.visible_players = rated.iter().filter(|p| !p.hidden).count();
                (HealthStatus::Healthy, None)
            }
            Err(e) => {
                error!("Rating health check failed: {}", e);
                (HealthStatus::Unhealthy, Some(e.to_string()))
            }
        };

        ComponentCheck {
            name: "rating_engine".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::metrics::MetricsCollector;
    use crate::storage::{InMemoryLedgerStorage, InMemorySeasonArchive};
    use crate::types::Battlegroup;
    use std::sync::Arc;

    fn create_test_ledger() -> WarLedger {
        WarLedger::new(
            &AppConfig::default(),
            Arc::new(InMemoryLedgerStorage::new()),
            Arc::new(InMemorySeasonArchive::new()),
            Arc::new(MetricsCollector::new().unwrap()),
        )
        .unwrap()
    }

    #[test]
    fn test_worst_status() {
        assert_eq!(
            HealthStatus::Healthy.worst(HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Unhealthy.worst(HealthStatus::Degraded),
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_empty_roster_is_degraded() {
        let ledger = create_test_ledger();
        let health = HealthCheck::check(&ledger, "warboard").await.unwrap();

        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.checks.len(), 3);
        assert_eq!(health.stats.current_season, Some(60));
        assert_eq!(ledger.metrics().service().health_status.get(), 1);
    }

    #[tokio::test]
    async fn test_healthy_with_players() {
        let ledger = create_test_ledger();
        ledger
            .administer("add", |roster| roster.add_custom_player("Aria", Battlegroup::Bg1))
            .await
            .unwrap();

        let health = HealthCheck::check(&ledger, "warboard").await.unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.stats.roster_size, 1);
        assert!(health.to_json().unwrap().contains("\"healthy\""));
    }
}
