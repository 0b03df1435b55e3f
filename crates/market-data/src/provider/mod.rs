//! Market data provider abstractions and implementations.
//!
//! This module contains:
//! - The `ProviderTransport` trait for raw outbound calls
//! - The `MarketDataProvider` trait for typed capabilities
//! - Response classification shared by all providers
//! - The Alpha Vantage implementation

mod classifier;
mod traits;

pub mod alpha_vantage;

pub use classifier::{ResponseClassifier, SoftErrorRule, ALPHA_VANTAGE_SOFT_ERRORS};
pub use traits::{
    MarketDataProvider, ProviderRequest, ProviderTransport, RawResponse, TransportFailure,
    TransportFailureKind,
};
