use std::sync::Arc;

use rottenstocks_core::stocks::InMemoryStockStore;
use rottenstocks_core::ServiceContext;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub fn init_tracing() {
    let log_format = std::env::var("RS_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn build_context(config: &Config) -> anyhow::Result<Arc<ServiceContext>> {
    let store = Arc::new(InMemoryStockStore::new());
    let context = ServiceContext::new(
        config.api_key.clone(),
        &config.market_data,
        config.sync.clone(),
        store,
    )?;

    let seeded = context.seed_watchlist(&config.watchlist).await?;
    tracing::info!(
        "Tracking {} stock(s) from watchlist, syncing every {} minute(s)",
        seeded,
        config.sync_interval.as_secs() / 60
    );

    Ok(Arc::new(context))
}
