use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use statsedge::api::health::HealthState;
use statsedge::api::routes::{router, ApiState};
use statsedge::baas::{BaasClient, PickRefresher};
use statsedge::config::{Config, CHANNEL_CAPACITY};
use statsedge::error::Result;
use statsedge::gate::TierGate;
use statsedge::genai::GenAiClient;
use statsedge::realtime::{apply_entitlements, RealtimeManager};
use statsedge::state::{PickStore, ViewerStore};
use statsedge::types::EntitlementEvent;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let health = Arc::new(HealthState::new());
    let picks = PickStore::new();
    let viewers = ViewerStore::new();
    let baas = BaasClient::new(&cfg)?;
    let genai = GenAiClient::new(&cfg)?;

    // --- Bootstrap: first pick load. A failure here is not fatal; the refresher retries.
    let refresher = PickRefresher::new(
        baas.clone(),
        Arc::clone(&picks),
        Arc::clone(&health),
        cfg.pick_refresh_secs,
    );
    match refresher.refresh().await {
        Ok(()) => {
            health.record_refresh(true);
            info!("Bootstrap complete: {} picks loaded", picks.pick_count());
        }
        Err(e) => {
            health.record_refresh(false);
            warn!("Bootstrap pick load failed, serving empty feed until next refresh: {e}");
        }
    }

    if !genai.is_configured() {
        warn!("GENAI_API_KEY not set: /analysis will serve the demo reply");
    }

    // --- Spawn tasks ---

    // Pick refresher (background, every PICK_REFRESH_SECS)
    info!(period_secs = cfg.pick_refresh_secs, "Pick refresher started");
    tokio::spawn(async move { refresher.run().await });

    // Realtime entitlements
    if cfg.realtime_enabled {
        if cfg.baas_service_key.is_none() {
            warn!("BAAS_SERVICE_KEY not set: realtime joins with the anon key and may see no profile changes");
        }
        let (event_tx, event_rx) = mpsc::channel::<EntitlementEvent>(CHANNEL_CAPACITY);
        let realtime = RealtimeManager::new(cfg.realtime_url(), event_tx, Arc::clone(&health));
        tokio::spawn(async move { realtime.run().await });

        let store = Arc::clone(&viewers);
        tokio::spawn(async move { apply_entitlements(event_rx, store).await });
    } else {
        info!("REALTIME_ENABLED=false: entitlements refresh only on first sighting of each user");
    }

    // HTTP API server
    let api_state = ApiState {
        picks,
        viewers,
        baas,
        genai,
        gate: TierGate::new(cfg.free_teaser_count),
        health,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(
        free_teaser_count = cfg.free_teaser_count,
        "HTTP API listening on {bind_addr}"
    );

    axum::serve(listener, app).await?;

    Ok(())
}
