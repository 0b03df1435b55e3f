//! RottenStocks Core - stock tracking and quota-aware synchronization.
//!
//! This crate owns the stock entity, its storage trait, and the
//! synchronization orchestrator that spends the daily provider budget. It
//! depends on `rottenstocks-market-data` for the resilient provider layer and
//! is storage-agnostic.

pub mod context;
pub mod errors;
pub mod stocks;
pub mod sync;

pub use context::ServiceContext;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
