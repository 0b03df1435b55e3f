//! Synchronization orchestrator.
//!
//! Runs sweeps over the tracked stocks: picks the most overdue ones, spends
//! the daily request budget on them one at a time, and reports an aggregate
//! [`SweepResult`]. A sweep never fails past its own boundary; every error is
//! recorded against the stock it happened on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use log::{debug, error, info, warn};
use rottenstocks_market_data::{normalize_symbol, ErrorKind, MarketDataProvider};
use serde::Serialize;

use super::budget::{BudgetSnapshot, SyncBudget};
use super::config::{SyncConfig, SyncMode};
use super::in_flight::{Claim, InFlightRegistry};
use crate::errors::{Error, Result};
use crate::stocks::{Stock, StockStore};

/// Stocks not refreshed within this window count as stale in [`SyncStats`].
const STALE_AFTER_MINUTES: i64 = 60;

const BUDGET_REASON: &str = "Daily API request limit reached";

// =============================================================================
// Result Types
// =============================================================================

/// Final state of a sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStatus {
    /// Every attempted stock was refreshed.
    Completed,
    /// Some stocks failed, or the budget ran out after some were attempted.
    PartialFailure,
    /// The working set could not be loaded, or every attempted stock failed.
    Failed,
    /// The budget was exhausted before any stock was attempted.
    SkippedBudget,
    /// Another sweep was running; nothing was done.
    AlreadyRunning,
}

/// Error details for a stock that failed to sync.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncError {
    pub symbol: String,
    /// Provider failure classification, when the failure came from the provider
    pub kind: Option<ErrorKind>,
    pub message: String,
}

/// Aggregate result of one sweep.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResult {
    pub status: SweepStatus,
    /// Stocks attempted (succeeded + failed)
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<SyncError>,
    /// Why the sweep stopped early or did nothing
    pub skipped_reason: Option<String>,
    /// Budget usage for today when the sweep ended
    pub requests_used: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SweepResult {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            status: SweepStatus::Completed,
            processed: 0,
            succeeded: 0,
            failed: 0,
            errors: Vec::new(),
            skipped_reason: None,
            requests_used: 0,
            started_at: now,
            finished_at: now,
        }
    }

    fn record_success(&mut self) {
        self.processed += 1;
        self.succeeded += 1;
    }

    fn record_failure(&mut self, symbol: &str, error: &Error) {
        self.processed += 1;
        self.failed += 1;
        self.errors.push(SyncError {
            symbol: symbol.to_string(),
            kind: error.market_data_kind(),
            message: error.to_string(),
        });
    }

    fn halt(&mut self, reason: &str) {
        self.skipped_reason = Some(reason.to_string());
    }

    /// Derive the status from the counters and stamp the end time.
    fn finish(mut self, requests_used: u32) -> Self {
        self.status = if self.skipped_reason.is_some() {
            if self.processed == 0 {
                SweepStatus::SkippedBudget
            } else {
                SweepStatus::PartialFailure
            }
        } else if self.processed > 0 && self.failed == self.processed {
            SweepStatus::Failed
        } else if self.failed > 0 {
            SweepStatus::PartialFailure
        } else {
            SweepStatus::Completed
        };
        self.requests_used = requests_used;
        self.finished_at = Utc::now();
        self
    }

    /// Get a summary string.
    pub fn summary(&self) -> String {
        format!(
            "{:?}: {} processed, {} succeeded, {} failed, {} requests used today",
            self.status, self.processed, self.succeeded, self.failed, self.requests_used
        )
    }
}

/// Synchronization statistics.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub total_stocks: usize,
    pub active_stocks: usize,
    /// Active stocks never synced or not synced within the last hour
    pub stale_stocks: usize,
    pub requests_used_today: u32,
    pub daily_limit: u32,
    pub requests_remaining: u32,
    pub last_reset_date: NaiveDate,
    pub sweep_running: bool,
    pub last_sweep_finished_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Sweep Guard
// =============================================================================

/// Marks a sweep as running for as long as it is alive.
struct SweepGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SweepGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives stock synchronization against a quota-limited provider.
///
/// Owns the daily budget and the in-flight registry; every sync path, sweep
/// or single symbol, goes through both.
pub struct SyncOrchestrator {
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<dyn StockStore>,
    config: SyncConfig,
    budget: SyncBudget,
    in_flight: InFlightRegistry,
    sweep_running: AtomicBool,
    last_sweep_finished_at: Mutex<Option<DateTime<Utc>>>,
}

impl SyncOrchestrator {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn StockStore>,
        config: SyncConfig,
    ) -> Self {
        let budget = SyncBudget::new(config.daily_request_limit);
        Self::with_budget(provider, store, config, budget)
    }

    /// Create an orchestrator with an explicitly constructed budget.
    pub fn with_budget(
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn StockStore>,
        config: SyncConfig,
        budget: SyncBudget,
    ) -> Self {
        Self {
            provider,
            store,
            config,
            budget,
            in_flight: InFlightRegistry::new(),
            sweep_running: AtomicBool::new(false),
            last_sweep_finished_at: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn budget(&self) -> BudgetSnapshot {
        self.budget.snapshot()
    }

    pub fn is_sweep_running(&self) -> bool {
        self.sweep_running.load(Ordering::Acquire)
    }

    /// Active stocks ordered most overdue first (never synced, then oldest
    /// `last_updated`), truncated to the batch size.
    pub async fn select_working_set(&self) -> Result<Vec<Stock>> {
        let mut stocks = self.store.list_active().await?;
        // None sorts before Some, so never-synced stocks come first
        stocks.sort_by_key(|s| s.last_updated);
        stocks.truncate(self.config.batch_size);
        Ok(stocks)
    }

    /// Run one synchronization sweep.
    ///
    /// Never returns an error: failures are reported in the result.
    pub async fn run_synchronization_sweep(&self) -> SweepResult {
        let Some(_running) = SweepGuard::try_acquire(&self.sweep_running) else {
            info!("Sync sweep already running, rejecting re-entrant call");
            let mut result = SweepResult::start();
            result.status = SweepStatus::AlreadyRunning;
            result.skipped_reason = Some("Sweep already in progress".to_string());
            result.requests_used = self.budget.used();
            return result;
        };

        let result = self.sweep().await;

        *self
            .last_sweep_finished_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(result.finished_at);

        info!("Sync sweep finished. {}", result.summary());
        result
    }

    async fn sweep(&self) -> SweepResult {
        let mut result = SweepResult::start();

        if self.budget.is_exhausted() {
            info!(
                "Skipping sync sweep: daily request limit reached ({}/{})",
                self.budget.used(),
                self.budget.daily_limit()
            );
            result.halt(BUDGET_REASON);
            return result.finish(self.budget.used());
        }

        let stocks = match self.select_working_set().await {
            Ok(stocks) => stocks,
            Err(e) => {
                error!("Sync sweep failed to load working set: {}", e);
                result.halt(&format!("Failed to load stocks: {}", e));
                let mut result = result.finish(self.budget.used());
                result.status = SweepStatus::Failed;
                return result;
            }
        };

        if stocks.is_empty() {
            debug!("No active stocks to sync");
            return result.finish(self.budget.used());
        }

        let mode = self.config.sweep_mode;
        info!(
            "Starting {} sync sweep over {} stock(s), {} request(s) remaining today",
            mode,
            stocks.len(),
            self.budget.snapshot().remaining
        );

        for (index, stock) in stocks.into_iter().enumerate() {
            if self.budget.is_exhausted() {
                warn!(
                    "Daily request limit reached after {} stock(s), halting sweep",
                    result.processed
                );
                result.halt(BUDGET_REASON);
                break;
            }

            if index > 0 && !self.config.inter_request_delay.is_zero() {
                tokio::time::sleep(self.config.inter_request_delay).await;
            }

            let symbol = stock.symbol.clone();
            match self.sync_stock(stock, mode, false).await {
                Ok(_) => result.record_success(),
                Err(Error::BudgetExhausted { .. }) => {
                    warn!("Daily request limit reached before {}, halting sweep", symbol);
                    result.halt(BUDGET_REASON);
                    break;
                }
                Err(e) => {
                    warn!("Failed to sync {}: {}", symbol, e);
                    result.record_failure(&symbol, &e);
                }
            }
        }

        result.finish(self.budget.used())
    }

    /// Refresh one tracked stock using the sweep mode.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the symbol is not tracked, otherwise whatever
    /// the sync itself failed with.
    pub async fn sync_symbol(&self, symbol: &str) -> Result<Stock> {
        let symbol = normalize_symbol(symbol)?;
        let stock = self
            .store
            .get_by_symbol(&symbol)
            .await?
            .ok_or_else(|| Error::NotFound(symbol.clone()))?;
        self.sync_stock(stock, self.config.sweep_mode, false).await
    }

    /// Start tracking a symbol (or reactivate it) and run a full sync.
    pub async fn add_or_refresh_symbol(&self, symbol: &str) -> Result<Stock> {
        let symbol = normalize_symbol(symbol)?;
        let stock = match self.store.get_by_symbol(&symbol).await? {
            Some(existing) => existing,
            None => {
                info!("Tracking new stock {}", symbol);
                Stock::new(symbol)
            }
        };
        self.sync_stock(stock, SyncMode::Full, true).await
    }

    /// Sync one stock, deduplicating against any sync already in flight for
    /// the same symbol.
    ///
    /// `seed` is only used when the store has no record for the symbol; the
    /// leader always works on the stored copy so concurrent writes made
    /// since `seed` was read are kept.
    async fn sync_stock(&self, seed: Stock, mode: SyncMode, reactivate: bool) -> Result<Stock> {
        let guard = match self.in_flight.claim(&seed.symbol) {
            Claim::Leader(guard) => guard,
            Claim::Follower(waiter) => return waiter.wait().await,
        };

        let outcome = self.fetch_and_persist(seed, mode, reactivate).await;
        guard.complete(&outcome);
        outcome
    }

    async fn fetch_and_persist(
        &self,
        seed: Stock,
        mode: SyncMode,
        reactivate: bool,
    ) -> Result<Stock> {
        let mut stock = self
            .store
            .get_by_symbol(&seed.symbol)
            .await?
            .unwrap_or(seed);
        if reactivate {
            stock.is_active = true;
        }

        let reservation = self.budget.try_reserve(1)?;
        let quote = self.provider.get_quote(&stock.symbol).await?;
        reservation.commit();
        stock.apply_quote(&quote, Utc::now());

        if mode == SyncMode::Full {
            self.enrich(&mut stock).await;
        }

        let saved = self.store.upsert(&stock).await?;
        debug!("Updated stock data for {}", saved.symbol);
        Ok(saved)
    }

    /// Best-effort company overview fetch; failures leave the stock as is.
    async fn enrich(&self, stock: &mut Stock) {
        let reservation = match self.budget.try_reserve(1) {
            Ok(reservation) => reservation,
            Err(_) => {
                warn!(
                    "Skipping company overview for {}: daily request limit reached",
                    stock.symbol
                );
                return;
            }
        };

        match self.provider.get_company_overview(&stock.symbol).await {
            Ok(overview) => {
                reservation.commit();
                stock.apply_overview(&overview);
            }
            Err(e) => warn!("Company overview for {} failed: {}", stock.symbol, e),
        }
    }

    /// Current synchronization statistics.
    pub async fn sync_stats(&self) -> Result<SyncStats> {
        let stocks = self.store.list().await?;
        let now = Utc::now();
        let max_age = ChronoDuration::minutes(STALE_AFTER_MINUTES);

        let active: Vec<&Stock> = stocks.iter().filter(|s| s.is_active).collect();
        let stale_stocks = active.iter().filter(|s| s.is_stale(now, max_age)).count();
        let budget = self.budget.snapshot();

        Ok(SyncStats {
            total_stocks: stocks.len(),
            active_stocks: active.len(),
            stale_stocks,
            requests_used_today: budget.requests_used_today,
            daily_limit: budget.daily_limit,
            requests_remaining: budget.remaining,
            last_reset_date: budget.last_reset_date,
            sweep_running: self.is_sweep_running(),
            last_sweep_finished_at: *self
                .last_sweep_finished_at
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        })
    }
}
