use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::baas::BaasClient;
use crate::error::Result;
use crate::picks::{normalize_rows, NormalizeStats};
use crate::state::{PickSnapshot, PickStore};

/// Periodically re-reads the pick tables and swaps the store snapshot.
pub struct PickRefresher {
    client: BaasClient,
    store: Arc<PickStore>,
    health: Arc<HealthState>,
    period: Duration,
}

impl PickRefresher {
    pub fn new(
        client: BaasClient,
        store: Arc<PickStore>,
        health: Arc<HealthState>,
        period_secs: u64,
    ) -> Self {
        Self {
            client,
            store,
            health,
            period: Duration::from_secs(period_secs),
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.period);
        ticker.tick().await; // first tick is immediate; bootstrap already loaded

        loop {
            ticker.tick().await;
            match self.refresh().await {
                Ok(()) => self.health.record_refresh(true),
                Err(e) => {
                    // Keep serving the previous snapshot.
                    self.health.record_refresh(false);
                    error!(
                        failures = self.health.refresh_failures(),
                        "Pick refresh failed: {e}"
                    );
                }
            }
        }
    }

    pub async fn refresh(&self) -> Result<()> {
        let feed_rows = self.client.fetch_feed_rows().await?;
        let gold_rows = self.client.fetch_gold_rows().await?;

        let (picks, feed_stats) = normalize_rows(&feed_rows);
        let (gold, gold_stats) = normalize_rows(&gold_rows);
        log_rejections("feed", &feed_stats);
        log_rejections("gold", &gold_stats);

        let rejected = feed_stats.rejected + gold_stats.rejected;
        info!(
            feed = picks.len(),
            gold = gold.len(),
            rejected,
            "Pick refresh complete: {} feed, {} gold, {rejected} rejected",
            picks.len(),
            gold.len(),
        );

        self.store.replace(PickSnapshot {
            picks,
            gold,
            refreshed_at: Some(Utc::now()),
            rejected,
        });
        Ok(())
    }
}

fn log_rejections(source: &str, stats: &NormalizeStats) {
    if stats.rejected == 0 {
        return;
    }
    warn!(
        source,
        total = stats.total,
        accepted = stats.accepted,
        rejected = stats.rejected,
        "[NORMALIZE] {source}: {} of {} rows rejected",
        stats.rejected,
        stats.total,
    );
    for (id, reason) in &stats.rejection_samples {
        warn!("[NORMALIZE]   {id}: {reason}");
    }
}
