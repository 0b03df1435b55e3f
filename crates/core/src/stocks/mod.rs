//! Tracked stocks and their storage.

mod model;
mod store;

pub use model::Stock;
pub use store::{InMemoryStockStore, StockStore};
