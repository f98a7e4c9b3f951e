//! Metrics collection using Prometheus
//!
//! Metric groups mirror the ledger's concerns: rating passes, difficulty
//! recalculation, ledger writes and HTTP traffic.

use anyhow::Result;
use prometheus::{
    Gauge, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the ledger service
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    service_metrics: ServiceMetrics,
    rating_metrics: RatingMetrics,
    difficulty_metrics: DifficultyMetrics,
    ledger_metrics: LedgerMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// HTTP requests by route and status class
    pub http_requests_total: IntCounterVec,

    /// HTTP request duration by route
    pub http_request_duration: HistogramVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Power rating metrics
#[derive(Clone)]
pub struct RatingMetrics {
    /// Rating passes over the roster
    pub computations_total: IntCounter,

    /// Players rated by the latest pass
    pub players_rated: IntGauge,

    /// Visible players in the latest ranking
    pub visible_players: IntGauge,

    /// Summed power rating of the latest pass
    pub alliance_power_rating: Gauge,

    /// Time to rate the whole roster
    pub computation_duration: Histogram,
}

/// Node difficulty metrics
#[derive(Clone)]
pub struct DifficultyMetrics {
    /// Recalculations by trigger
    pub recalculations_total: IntCounterVec,

    /// Manual node overrides
    pub overrides_total: IntCounter,

    /// Alliance-wide difficulty rating of the latest recalculation
    pub total_difficulty_rating: Gauge,

    /// Recalculation time
    pub recalculation_duration: Histogram,
}

/// Ledger write metrics
#[derive(Clone)]
pub struct LedgerMetrics {
    /// Entries recorded by kind (node, battlegroup)
    pub entries_recorded_total: IntCounterVec,

    /// Roster administration actions
    pub roster_changes_total: IntCounterVec,

    /// Sheet imports by sheet kind
    pub imports_total: IntCounterVec,

    /// Season lifecycle actions
    pub season_actions_total: IntCounterVec,

    /// Storage failures by operation
    pub storage_errors_total: IntCounterVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let rating_metrics = RatingMetrics::new(&registry)?;
        let difficulty_metrics = DifficultyMetrics::new(&registry)?;
        let ledger_metrics = LedgerMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            rating_metrics,
            difficulty_metrics,
            ledger_metrics,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn rating(&self) -> &RatingMetrics {
        &self.rating_metrics
    }

    pub fn difficulty(&self) -> &DifficultyMetrics {
        &self.difficulty_metrics
    }

    pub fn ledger(&self) -> &LedgerMetrics {
        &self.ledger_metrics
    }

    /// Record a rating pass over the roster
    pub fn record_rating_pass(
        &self,
        players: usize,
        visible: usize,
        total_power_rating: f64,
        duration: Duration,
    ) {
        self.rating_metrics.computations_total.inc();
        self.rating_metrics.players_rated.set(players as i64);
        self.rating_metrics.visible_players.set(visible as i64);
        self.rating_metrics
            .alliance_power_rating
            .set(total_power_rating);
        self.rating_metrics
            .computation_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a difficulty recalculation
    pub fn record_recalculation(&self, trigger: &str, total_rating: f64, duration: Duration) {
        self.difficulty_metrics
            .recalculations_total
            .with_label_values(&[trigger])
            .inc();
        self.difficulty_metrics
            .total_difficulty_rating
            .set(total_rating);
        self.difficulty_metrics
            .recalculation_duration
            .observe(duration.as_secs_f64());
    }

    pub fn record_override(&self) {
        self.difficulty_metrics.overrides_total.inc();
    }

    pub fn record_entry(&self, kind: &str) {
        self.ledger_metrics
            .entries_recorded_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn record_roster_change(&self, action: &str) {
        self.ledger_metrics
            .roster_changes_total
            .with_label_values(&[action])
            .inc();
    }

    pub fn record_import(&self, sheet: &str) {
        self.ledger_metrics
            .imports_total
            .with_label_values(&[sheet])
            .inc();
    }

    pub fn record_season_action(&self, action: &str) {
        self.ledger_metrics
            .season_actions_total
            .with_label_values(&[action])
            .inc();
    }

    pub fn record_storage_error(&self, operation: &str) {
        self.ledger_metrics
            .storage_errors_total
            .with_label_values(&[operation])
            .inc();
    }

    /// Record an HTTP request
    pub fn record_http_request(&self, route: &str, status: u16, duration: Duration) {
        let class = match status {
            200..=299 => "2xx",
            400..=499 => "4xx",
            500..=599 => "5xx",
            _ => "other",
        };

        self.service_metrics
            .http_requests_total
            .with_label_values(&[route, class])
            .inc();
        self.service_metrics
            .http_request_duration
            .with_label_values(&[route])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds = IntGauge::new("warboard_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("warboard_http_requests_total", "HTTP requests served"),
            &["route", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "warboard_http_request_duration_seconds",
                "HTTP request duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["route"],
        )?;
        registry.register(Box::new(http_request_duration.clone()))?;

        let health_status = IntGauge::new(
            "warboard_health_status",
            "Service health (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("warboard_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            http_requests_total,
            http_request_duration,
            health_status,
            component_health,
        })
    }
}

impl RatingMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let computations_total = IntCounter::new(
            "warboard_rating_computations_total",
            "Power rating passes over the roster",
        )?;
        registry.register(Box::new(computations_total.clone()))?;

        let players_rated =
            IntGauge::new("warboard_players_rated", "Players rated by the latest pass")?;
        registry.register(Box::new(players_rated.clone()))?;

        let visible_players = IntGauge::new(
            "warboard_visible_players",
            "Visible players in the latest ranking",
        )?;
        registry.register(Box::new(visible_players.clone()))?;

        let alliance_power_rating = Gauge::new(
            "warboard_alliance_power_rating",
            "Summed power rating of the latest pass",
        )?;
        registry.register(Box::new(alliance_power_rating.clone()))?;

        let computation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "warboard_rating_duration_seconds",
                "Time to rate the roster",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;
        registry.register(Box::new(computation_duration.clone()))?;

        Ok(Self {
            computations_total,
            players_rated,
            visible_players,
            alliance_power_rating,
            computation_duration,
        })
    }
}

impl DifficultyMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let recalculations_total = IntCounterVec::new(
            Opts::new(
                "warboard_difficulty_recalculations_total",
                "Node difficulty recalculations",
            ),
            &["trigger"],
        )?;
        registry.register(Box::new(recalculations_total.clone()))?;

        let overrides_total = IntCounter::new(
            "warboard_difficulty_overrides_total",
            "Manual node difficulty overrides",
        )?;
        registry.register(Box::new(overrides_total.clone()))?;

        let total_difficulty_rating = Gauge::new(
            "warboard_total_difficulty_rating",
            "Alliance-wide difficulty rating of the latest recalculation",
        )?;
        registry.register(Box::new(total_difficulty_rating.clone()))?;

        let recalculation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "warboard_difficulty_recalculation_duration_seconds",
                "Node difficulty recalculation time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;
        registry.register(Box::new(recalculation_duration.clone()))?;

        Ok(Self {
            recalculations_total,
            overrides_total,
            total_difficulty_rating,
            recalculation_duration,
        })
    }
}

impl LedgerMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let entries_recorded_total = IntCounterVec::new(
            Opts::new("warboard_entries_recorded_total", "Ledger entries recorded"),
            &["kind"],
        )?;
        registry.register(Box::new(entries_recorded_total.clone()))?;

        let roster_changes_total = IntCounterVec::new(
            Opts::new(
                "warboard_roster_changes_total",
                "Roster administration actions",
            ),
            &["action"],
        )?;
        registry.register(Box::new(roster_changes_total.clone()))?;

        let imports_total = IntCounterVec::new(
            Opts::new("warboard_sheet_imports_total", "Sheet imports"),
            &["sheet"],
        )?;
        registry.register(Box::new(imports_total.clone()))?;

        let season_actions_total = IntCounterVec::new(
            Opts::new("warboard_season_actions_total", "Season lifecycle actions"),
            &["action"],
        )?;
        registry.register(Box::new(season_actions_total.clone()))?;

        let storage_errors_total = IntCounterVec::new(
            Opts::new("warboard_storage_errors_total", "Storage failures"),
            &["operation"],
        )?;
        registry.register(Box::new(storage_errors_total.clone()))?;

        Ok(Self {
            entries_recorded_total,
            roster_changes_total,
            imports_total,
            season_actions_total,
            storage_errors_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    fn encode(collector: &MetricsCollector) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&collector.registry().gather(), &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _rating = collector.rating();
        let _difficulty = collector.difficulty();
        let _ledger = collector.ledger();
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Arc::new(Registry::new());
        MetricsCollector::with_registry(registry.clone()).unwrap();
        assert!(MetricsCollector::with_registry(registry).is_err());
    }

    #[test]
    fn test_rating_pass_recording() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_rating_pass(30, 28, 1234.5, Duration::from_micros(250));

        assert_eq!(collector.rating().computations_total.get(), 1);
        assert_eq!(collector.rating().players_rated.get(), 30);
        assert_eq!(collector.rating().visible_players.get(), 28);
        assert_eq!(collector.rating().alliance_power_rating.get(), 1234.5);
    }

    #[test]
    fn test_ledger_recording() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_recalculation("manual", 0.42, Duration::from_micros(80));
        collector.record_entry("node");
        collector.record_entry("node");
        collector.record_storage_error("save");
        collector.record_http_request("/api/players", 200, Duration::from_millis(3));

        assert_eq!(
            collector
                .ledger()
                .entries_recorded_total
                .with_label_values(&["node"])
                .get(),
            2
        );

        let text = encode(&collector);
        assert!(text.contains("warboard_difficulty_recalculations_total"));
        assert!(text.contains("warboard_storage_errors_total"));
        assert!(text.contains("warboard_http_requests_total"));
    }

    #[test]
    fn test_health_status_updates() {
        let collector = MetricsCollector::new().unwrap();

        collector.update_health_status(2);
        collector.update_component_health("storage", true);
        collector.update_component_health("archive", false);

        assert_eq!(collector.service().health_status.get(), 2);
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.elapsed();

        assert!(duration >= Duration::from_millis(10));

        let final_duration = timer.stop();
        assert!(final_duration >= Duration::from_millis(10));
    }
}
