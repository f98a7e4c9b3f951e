//! Service layer for the warboard ledger
//!
//! [`WarLedger`] holds the ledger operations and the writer gate;
//! [`AppState`] wires it to configuration, storage and the HTTP server.

pub mod app;
pub mod health;
pub mod ledger;

pub use app::{AppState, ServiceError};
pub use health::{HealthCheck, HealthStatus, LedgerStats};
pub use ledger::{Dashboard, StreakBoard, WarLedger};
