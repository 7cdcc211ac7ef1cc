use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::types::{Entitlement, EntitlementEvent, SubscriptionTier, Viewer};

/// Current entitlement per signed-in user, kept fresh by the realtime channel.
///
/// Requests never cache a gate decision; they read the entitlement here and
/// re-evaluate. Snapshots only ever widen access because a purchase confirmation
/// and the matching push can arrive in either order.
pub struct ViewerStore {
    /// user_id → entitlement
    entitlements: DashMap<String, Entitlement>,
}

impl ViewerStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entitlements: DashMap::new(),
        })
    }

    /// Apply one event. Returns true if the stored entitlement changed.
    pub fn apply(&self, event: EntitlementEvent) -> bool {
        match event {
            EntitlementEvent::Snapshot(incoming) => {
                let mut entry = self
                    .entitlements
                    .entry(incoming.user_id.clone())
                    .or_insert_with(|| Entitlement::free(&incoming.user_id));
                let before = entry.clone();
                entry.tier = entry.tier.max(incoming.tier);
                entry.purchased_pick_ids.extend(incoming.purchased_pick_ids);
                *entry != before
            }
            EntitlementEvent::Purchase { user_id, pick_id } => {
                let mut entry = self
                    .entitlements
                    .entry(user_id.clone())
                    .or_insert_with(|| Entitlement::free(&user_id));
                entry.purchased_pick_ids.insert(pick_id)
            }
            EntitlementEvent::Downgrade { user_id, tier } => {
                let mut entry = self
                    .entitlements
                    .entry(user_id.clone())
                    .or_insert_with(|| Entitlement::free(&user_id));
                let changed = entry.tier != tier;
                entry.tier = tier;
                changed
            }
            EntitlementEvent::Revoke { user_id } => {
                let removed = self.entitlements.remove(&user_id).is_some();
                if removed {
                    debug!(user_id = %user_id, "entitlement revoked");
                }
                removed
            }
        }
    }

    pub fn get(&self, user_id: &str) -> Option<Entitlement> {
        self.entitlements.get(user_id).map(|e| e.clone())
    }

    /// Viewer for an authenticated user. Unknown users are free.
    pub fn viewer(&self, user_id: &str) -> Viewer {
        Viewer::Authenticated(
            self.get(user_id)
                .unwrap_or_else(|| Entitlement::free(user_id)),
        )
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.entitlements.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.entitlements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entitlements.is_empty()
    }

    /// Count of known users per tier, reported by `/health`.
    pub fn tier_counts(&self) -> TierCounts {
        let mut counts = TierCounts::default();
        for e in self.entitlements.iter() {
            match e.tier {
                SubscriptionTier::Free => counts.free += 1,
                SubscriptionTier::Pro => counts.pro += 1,
                SubscriptionTier::Elite => counts.elite += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub free: usize,
    pub pro: usize,
    pub elite: usize,
}
