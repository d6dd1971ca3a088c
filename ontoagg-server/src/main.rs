//! OntoAgg Server - scheduled aggregation runs and their HTTP control API

mod api;

use chrono::{DateTime, FixedOffset, Utc};
use ontoagg_core::config::{OntoAggConfig, ScheduleConfig};
use ontoagg_core::scheduler::Aggregator;
use ontoagg_core::store::{HttpStore, TripleStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Wait used when the next tick cannot be computed
const FALLBACK_TICK_WAIT: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = OntoAggConfig::load()?;

    info!("Starting OntoAgg...");
    info!("Config file: {:?}", OntoAggConfig::config_path());
    info!("SPARQL query endpoint: {}", config.store.query_url);
    info!("SPARQL update endpoint: {}", config.store.update_url);

    let store = HttpStore::new(config.store.clone())?;
    let aggregator = Aggregator::new(store, &config)?;
    let state = Arc::new(api::AppState::new(aggregator));

    tokio::spawn(schedule_loop(state.clone(), config.schedule.clone()));

    // Create router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr).await?;
    info!("OntoAgg control API listening on {}", config.server.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Fire one aggregation tick per day at the configured local hour
async fn schedule_loop<S: TripleStore + 'static>(state: Arc<api::AppState<S>>, schedule: ScheduleConfig) {
    let offset = match schedule.offset() {
        Ok(offset) => offset,
        Err(e) => {
            error!("scheduler disabled: {}", e);
            return;
        }
    };

    loop {
        let wait = until_next_tick(Utc::now(), offset, schedule.tick_hour).unwrap_or_else(|| {
            warn!(hour = schedule.tick_hour, "cannot compute next tick, retrying in an hour");
            FALLBACK_TICK_WAIT
        });
        info!(secs = wait.as_secs(), "next aggregation tick scheduled");
        tokio::time::sleep(wait).await;

        let results = {
            let mut aggregator = state.aggregator.lock().await;
            aggregator.tick(Utc::now()).await
        };
        for result in results {
            match result {
                Ok(report) if report.already_aggregated => {}
                Ok(report) => state.record(report),
                Err(e) => error!("scheduled aggregation failed: {}", e),
            }
        }
    }
}

/// Time until the next `hour:00` in local time
fn until_next_tick(now: DateTime<Utc>, offset: FixedOffset, hour: u32) -> Option<Duration> {
    let local = now.with_timezone(&offset);
    let mut next = local
        .date_naive()
        .and_hms_opt(hour, 0, 0)?
        .and_local_timezone(offset)
        .single()?;
    if next <= local {
        next += chrono::Duration::days(1);
    }
    (next - local).to_std().ok()
}
