//! Per-symbol in-flight deduplication.
//!
//! The first caller for a symbol becomes the leader and holds an
//! [`InFlightGuard`]; later callers become followers and wait for the
//! leader's outcome instead of issuing a second provider call. The guard
//! removes the symbol when dropped, so the entry is released exactly once on
//! every exit path.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use log::{debug, warn};
use tokio::sync::watch;

use crate::errors::{Error, Result};
use crate::stocks::Stock;

type Outcome = Option<Result<Stock>>;

/// Result of claiming a symbol.
pub enum Claim<'a> {
    /// No sync was running; the caller must perform it and publish.
    Leader(InFlightGuard<'a>),
    /// Another caller is syncing this symbol.
    Follower(InFlightWaiter),
}

/// Set of symbols currently being synchronized.
#[derive(Default)]
pub struct InFlightRegistry {
    entries: Mutex<HashMap<String, watch::Receiver<Outcome>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, watch::Receiver<Outcome>>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("In-flight registry mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Become the leader for `symbol`, or join the running sync.
    pub fn claim(&self, symbol: &str) -> Claim<'_> {
        let mut entries = self.lock_entries();
        if let Some(receiver) = entries.get(symbol) {
            debug!("Sync for {} already in flight, waiting for its result", symbol);
            return Claim::Follower(InFlightWaiter {
                symbol: symbol.to_string(),
                receiver: receiver.clone(),
            });
        }

        let (sender, receiver) = watch::channel(None);
        entries.insert(symbol.to_string(), receiver);
        Claim::Leader(InFlightGuard {
            registry: self,
            symbol: symbol.to_string(),
            sender,
        })
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.lock_entries().contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Leader's claim on a symbol. Releases the symbol when dropped.
pub struct InFlightGuard<'a> {
    registry: &'a InFlightRegistry,
    symbol: String,
    sender: watch::Sender<Outcome>,
}

impl InFlightGuard<'_> {
    /// Publish the outcome to every follower and release the symbol.
    pub fn complete(self, outcome: &Result<Stock>) {
        self.sender.send_replace(Some(outcome.clone()));
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.lock_entries().remove(&self.symbol);
    }
}

/// Follower's handle on a running sync.
pub struct InFlightWaiter {
    symbol: String,
    receiver: watch::Receiver<Outcome>,
}

impl InFlightWaiter {
    /// Wait for the leader's outcome.
    ///
    /// If the leader goes away without publishing, the follower gets
    /// [`Error::SyncAbandoned`] rather than retrying on its own.
    pub async fn wait(mut self) -> Result<Stock> {
        match self.receiver.wait_for(Option::is_some).await {
            Ok(outcome) => outcome
                .clone()
                .unwrap_or_else(|| Err(Error::SyncAbandoned(self.symbol.clone()))),
            Err(_) => Err(Error::SyncAbandoned(self.symbol)),
        }
    }
}
