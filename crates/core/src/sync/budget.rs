//! Daily provider request budget.
//!
//! Requests are reserved before they are issued and the reservation is
//! refunded if the call fails, so concurrent callers can never push usage
//! above the limit. The counter resets the first time it is touched on a new
//! calendar day.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::errors::{Error, Result};

/// Supplies the current calendar date.
pub type DateSource = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Debug)]
struct BudgetState {
    used: u32,
    last_reset_date: NaiveDate,
}

/// Point-in-time view of the budget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSnapshot {
    pub requests_used_today: u32,
    pub daily_limit: u32,
    pub remaining: u32,
    pub last_reset_date: NaiveDate,
}

/// Process-wide daily request counter.
pub struct SyncBudget {
    daily_limit: u32,
    state: Mutex<BudgetState>,
    today: DateSource,
}

impl SyncBudget {
    /// A budget that rolls over at UTC midnight.
    pub fn new(daily_limit: u32) -> Self {
        Self::with_date_source(daily_limit, Arc::new(|| Utc::now().date_naive()))
    }

    /// A budget reading the current date from `today`.
    pub fn with_date_source(daily_limit: u32, today: DateSource) -> Self {
        let last_reset_date = today();
        Self {
            daily_limit,
            state: Mutex::new(BudgetState {
                used: 0,
                last_reset_date,
            }),
            today,
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Lock the state and apply any pending date rollover.
    fn lock_current(&self) -> MutexGuard<'_, BudgetState> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Sync budget mutex was poisoned, recovering");
            poisoned.into_inner()
        });

        let today = (self.today)();
        if today != state.last_reset_date {
            info!(
                "Sync budget: new day {}, resetting usage ({} requests used on {})",
                today, state.used, state.last_reset_date
            );
            state.used = 0;
            state.last_reset_date = today;
        }
        state
    }

    /// Reserve `requests` against today's budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BudgetExhausted`] if the reservation would exceed the
    /// daily limit. Nothing is reserved in that case.
    pub fn try_reserve(&self, requests: u32) -> Result<BudgetReservation<'_>> {
        let mut state = self.lock_current();
        let used = state.used;
        if used.saturating_add(requests) > self.daily_limit {
            debug!(
                "Sync budget: refusing {} request(s), {}/{} used",
                requests, used, self.daily_limit
            );
            return Err(Error::BudgetExhausted {
                used,
                limit: self.daily_limit,
            });
        }

        state.used = used + requests;
        Ok(BudgetReservation {
            budget: self,
            requests,
            date: state.last_reset_date,
            committed: false,
        })
    }

    /// Give back requests reserved on `date`. Reservations from a previous
    /// day are dropped since that day's counter is gone.
    fn refund(&self, requests: u32, date: NaiveDate) {
        let mut state = self.lock_current();
        if state.last_reset_date == date {
            state.used = state.used.saturating_sub(requests);
        }
    }

    /// Whether no further request can be reserved today.
    pub fn is_exhausted(&self) -> bool {
        self.lock_current().used >= self.daily_limit
    }

    pub fn used(&self) -> u32 {
        self.lock_current().used
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        let state = self.lock_current();
        BudgetSnapshot {
            requests_used_today: state.used,
            daily_limit: self.daily_limit,
            remaining: self.daily_limit.saturating_sub(state.used),
            last_reset_date: state.last_reset_date,
        }
    }
}

/// Requests held against the budget.
///
/// Refunded on drop unless [`commit`](BudgetReservation::commit) was called.
#[must_use = "an uncommitted reservation is refunded when dropped"]
pub struct BudgetReservation<'a> {
    budget: &'a SyncBudget,
    requests: u32,
    date: NaiveDate,
    committed: bool,
}

impl BudgetReservation<'_> {
    /// Keep the reserved requests as spent.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for BudgetReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.budget.refund(self.requests, self.date);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn budget_with_clock(limit: u32) -> (SyncBudget, Arc<Mutex<NaiveDate>>) {
        let clock = Arc::new(Mutex::new(day(1)));
        let source = clock.clone();
        let budget = SyncBudget::with_date_source(limit, Arc::new(move || *source.lock().unwrap()));
        (budget, clock)
    }

    #[test]
    fn test_reserve_until_limit() {
        let (budget, _) = budget_with_clock(25);

        for _ in 0..25 {
            budget.try_reserve(1).unwrap().commit();
        }

        assert!(budget.is_exhausted());
        assert_eq!(
            budget.try_reserve(1).err(),
            Some(Error::BudgetExhausted {
                used: 25,
                limit: 25
            })
        );
        assert_eq!(budget.used(), 25);
    }

    #[test]
    fn test_uncommitted_reservation_refunded() {
        let (budget, _) = budget_with_clock(5);

        let reservation = budget.try_reserve(2).unwrap();
        assert_eq!(budget.used(), 2);
        drop(reservation);
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn test_reservation_larger_than_remaining_refused() {
        let (budget, _) = budget_with_clock(3);
        budget.try_reserve(2).unwrap().commit();

        assert!(budget.try_reserve(2).is_err());
        assert_eq!(budget.used(), 2);
        budget.try_reserve(1).unwrap().commit();
        assert!(budget.is_exhausted());
    }

    #[test]
    fn test_resets_on_date_rollover() {
        let (budget, clock) = budget_with_clock(2);
        budget.try_reserve(2).unwrap().commit();
        assert!(budget.is_exhausted());

        *clock.lock().unwrap() = day(2);

        let snapshot = budget.snapshot();
        assert_eq!(snapshot.requests_used_today, 0);
        assert_eq!(snapshot.remaining, 2);
        assert_eq!(snapshot.last_reset_date, day(2));
        assert!(budget.try_reserve(1).is_ok());
    }

    #[test]
    fn test_stale_refund_ignored_after_rollover() {
        let (budget, clock) = budget_with_clock(2);
        let reservation = budget.try_reserve(1).unwrap();

        *clock.lock().unwrap() = day(2);
        budget.try_reserve(1).unwrap().commit();
        drop(reservation);

        assert_eq!(budget.used(), 1);
    }
}
