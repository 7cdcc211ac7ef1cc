use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::api::health::HealthState;
use crate::config::{RECONNECT_BACKOFF_MS, REALTIME_HEARTBEAT_SECS};
use crate::error::{AppError, Result};
use crate::realtime::messages::{build_heartbeat_msg, build_join_msg, parse_frame, ParsedFrame};
use crate::state::ViewerStore;
use crate::types::EntitlementEvent;

/// Single websocket to the realtime service, subscribed to profile row changes.
pub struct RealtimeManager {
    ws_url: String,
    event_tx: mpsc::Sender<EntitlementEvent>,
    next_ref: u64,
    health: Arc<HealthState>,
}

impl RealtimeManager {
    pub fn new(
        ws_url: String,
        event_tx: mpsc::Sender<EntitlementEvent>,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            ws_url,
            event_tx,
            next_ref: 0,
            health,
        }
    }

    pub async fn run(mut self) {
        let mut backoff_idx = 0usize;

        loop {
            // Key is in the query string; keep it out of the logs.
            let endpoint = self.ws_url.split('?').next().unwrap_or_default().to_string();
            info!("Realtime connecting to {endpoint}");
            let outcome = self.connect_once().await;
            self.health.set_realtime_connected(false);
            match outcome {
                Ok(()) => {
                    info!("Realtime connection closed cleanly");
                    backoff_idx = 0;
                }
                Err(e) => {
                    error!("Realtime connection error: {e}");
                }
            }

            if self.event_tx.is_closed() {
                info!("Entitlement consumer gone, realtime shutting down");
                return;
            }

            let delay_ms = backoff_delay_ms(backoff_idx);
            backoff_idx = (backoff_idx + 1).min(RECONNECT_BACKOFF_MS.len().saturating_sub(1));

            warn!("Realtime reconnecting in {delay_ms}ms");
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    fn take_ref(&mut self) -> u64 {
        self.next_ref += 1;
        self.next_ref
    }

    async fn connect_once(&mut self) -> Result<()> {
        let (ws_stream, _) = connect_async(&self.ws_url).await?;
        let (mut write, mut read) = ws_stream.split();

        let join_ref = self.take_ref();
        write.send(Message::Text(build_join_msg(join_ref).into())).await?;
        debug!(join_ref, "Realtime join sent");

        let mut heartbeat = interval(Duration::from_secs(REALTIME_HEARTBEAT_SECS));
        heartbeat.tick().await; // consume immediate first tick
        self.health.set_realtime_connected(true);

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(&text).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Ok(());
                        }
                        Some(Err(e)) => return Err(e.into()),
                        Some(Ok(_)) => {}
                    }
                }

                _ = heartbeat.tick() => {
                    let r = self.take_ref();
                    debug!(heartbeat_ref = r, "Realtime heartbeat");
                    write.send(Message::Text(build_heartbeat_msg(r).into())).await?;
                }
            }
        }
    }

    async fn handle_frame(&self, text: &str) -> Result<()> {
        match parse_frame(text) {
            ParsedFrame::Changes(events) => {
                for event in events {
                    if self.event_tx.send(event).await.is_err() {
                        return Err(AppError::Config("entitlement channel closed".into()));
                    }
                    self.health.inc_entitlement_events();
                }
            }
            ParsedFrame::Reply { topic, ok, detail } => {
                if ok {
                    debug!(topic = %topic, "Realtime reply ok");
                } else {
                    warn!(topic = %topic, "Realtime request refused: {detail}");
                }
            }
            ParsedFrame::ChannelClosed { topic, reason } => {
                // Reconnect rejoins from scratch.
                return Err(AppError::RowStore(format!(
                    "realtime channel {topic} closed: {reason}"
                )));
            }
            ParsedFrame::Ignored => {}
        }
        Ok(())
    }
}

fn backoff_delay_ms(idx: usize) -> u64 {
    RECONNECT_BACKOFF_MS
        .get(idx)
        .or(RECONNECT_BACKOFF_MS.last())
        .copied()
        .unwrap_or(1_000)
}

/// Drain entitlement events into the store. Ends when every sender is dropped.
pub async fn apply_entitlements(mut rx: mpsc::Receiver<EntitlementEvent>, viewers: Arc<ViewerStore>) {
    while let Some(event) = rx.recv().await {
        let user_id = event.user_id().to_string();
        let kind = match &event {
            EntitlementEvent::Snapshot(_) => "snapshot",
            EntitlementEvent::Purchase { .. } => "purchase",
            EntitlementEvent::Downgrade { .. } => "downgrade",
            EntitlementEvent::Revoke { .. } => "revoke",
        };
        if viewers.apply(event) {
            let tier = viewers
                .get(&user_id)
                .map(|e| e.tier.to_string())
                .unwrap_or_else(|| "none".to_string());
            info!(user_id = %user_id, kind, tier = %tier, "Entitlement updated");
        } else {
            debug!(user_id = %user_id, kind, "Entitlement event had no effect");
        }
    }
}
