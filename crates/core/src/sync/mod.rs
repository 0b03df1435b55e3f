//! Stock synchronization.
//!
//! - `config` - Sweep settings and quick/full mode
//! - `budget` - Daily provider request budget
//! - `in_flight` - Per-symbol deduplication of concurrent syncs
//! - `orchestrator` - Sweep state machine and single-symbol sync

mod budget;
mod config;
mod in_flight;
mod orchestrator;
mod orchestrator_tests;

pub use budget::{BudgetReservation, BudgetSnapshot, DateSource, SyncBudget};
pub use config::{SyncConfig, SyncMode};
pub use in_flight::{Claim, InFlightGuard, InFlightRegistry, InFlightWaiter};
pub use orchestrator::{SweepResult, SweepStatus, SyncError, SyncOrchestrator, SyncStats};
