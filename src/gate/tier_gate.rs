use serde::Serialize;

use crate::config::{edge_thresholds, FREE_TEASER_COUNT};
use crate::error::{AppError, Result};
use crate::types::{Entitlement, Pick, SubscriptionTier, Viewer};

/// Why a pick is or is not revealed to a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Unlocked,
    /// Anonymous: send to sign-in, never to checkout.
    AuthenticationRequired,
    /// Signed in but not entitled: offer the single-pick purchase or an upgrade.
    PaymentRequired,
}

impl Access {
    pub fn is_unlocked(&self) -> bool {
        matches!(self, Access::Unlocked)
    }
}

/// Decides whether analysis content may be shown. Stateless apart from the teaser
/// count; the viewer is passed in on every call.
#[derive(Debug, Clone, Copy)]
pub struct TierGate {
    pub free_teaser_count: usize,
}

impl Default for TierGate {
    fn default() -> Self {
        Self {
            free_teaser_count: FREE_TEASER_COUNT,
        }
    }
}

impl TierGate {
    pub fn new(free_teaser_count: usize) -> Self {
        Self { free_teaser_count }
    }

    /// `index` is the pick's position in the feed as rendered.
    pub fn unlocked(&self, viewer: &Viewer, pick: &Pick, index: usize) -> bool {
        let Some(ent) = viewer.entitlement() else {
            return false;
        };
        index < self.free_teaser_count
            || ent.tier >= SubscriptionTier::Pro
            || ent.has_purchased(&pick.id)
    }

    pub fn access(&self, viewer: &Viewer, pick: &Pick, index: usize) -> Access {
        if Self::require_authenticated(viewer).is_err() {
            Access::AuthenticationRequired
        } else if self.unlocked(viewer, pick, index) {
            Access::Unlocked
        } else {
            Access::PaymentRequired
        }
    }

    /// Precondition for anything beyond browsing.
    pub fn require_authenticated(viewer: &Viewer) -> Result<&Entitlement> {
        viewer.entitlement().ok_or(AppError::Unauthenticated)
    }

    /// Elite paywall on high-edge content. Anonymous viewers count as locked.
    pub fn elite_locked(viewer: &Viewer, edge_percentage: f64) -> bool {
        edge_percentage > edge_thresholds::ELITE && viewer.tier() != Some(SubscriptionTier::Elite)
    }

    /// The daily gold pick is sold separately; Pro alone does not unlock it.
    pub fn gold_unlocked(viewer: &Viewer, gold: &Pick) -> bool {
        viewer
            .entitlement()
            .is_some_and(|e| e.tier == SubscriptionTier::Elite || e.has_purchased(&gold.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picks::sample_pick;

    fn viewer(tier: SubscriptionTier, purchased: &[&str]) -> Viewer {
        let mut e = Entitlement::free("user-1");
        e.tier = tier;
        e.purchased_pick_ids = purchased.iter().map(|s| s.to_string()).collect();
        Viewer::Authenticated(e)
    }

    #[test]
    fn free_viewer_sees_teasers_only() {
        let gate = TierGate::default();
        let pick = sample_pick("p1");
        let free = viewer(SubscriptionTier::Free, &[]);

        assert!(gate.unlocked(&free, &pick, 0));
        assert!(gate.unlocked(&free, &pick, 1));
        assert!(!gate.unlocked(&free, &pick, 2));
        assert_eq!(gate.access(&free, &pick, 2), Access::PaymentRequired);
    }

    #[test]
    fn pro_viewer_sees_everything() {
        let gate = TierGate::default();
        let pro = viewer(SubscriptionTier::Pro, &[]);
        assert!(gate.unlocked(&pro, &sample_pick("p1"), 99));
    }

    #[test]
    fn purchase_unlocks_single_pick() {
        let gate = TierGate::default();
        let free = viewer(SubscriptionTier::Free, &["p7"]);
        assert!(gate.unlocked(&free, &sample_pick("p7"), 5));
        assert!(!gate.unlocked(&free, &sample_pick("p8"), 5));
    }

    #[test]
    fn anonymous_viewer_is_routed_to_auth() {
        let gate = TierGate::default();
        let pick = sample_pick("p1");

        assert!(!gate.unlocked(&Viewer::Anonymous, &pick, 0));
        assert!(matches!(
            TierGate::require_authenticated(&Viewer::Anonymous),
            Err(AppError::Unauthenticated)
        ));
        assert_eq!(
            gate.access(&Viewer::Anonymous, &pick, 0),
            Access::AuthenticationRequired
        );
    }

    #[test]
    fn teaser_count_is_configurable() {
        let gate = TierGate::new(0);
        let free = viewer(SubscriptionTier::Free, &[]);
        assert!(!gate.unlocked(&free, &sample_pick("p1"), 0));
    }

    #[test]
    fn elite_lock_above_ten_percent() {
        let pro = viewer(SubscriptionTier::Pro, &[]);
        let elite = viewer(SubscriptionTier::Elite, &[]);

        assert!(!TierGate::elite_locked(&pro, 10.0));
        assert!(TierGate::elite_locked(&pro, 10.5));
        assert!(TierGate::elite_locked(&Viewer::Anonymous, 12.0));
        assert!(!TierGate::elite_locked(&elite, 25.0));
    }

    #[test]
    fn gold_requires_purchase_or_elite() {
        let gold = sample_pick("gold-1");
        assert!(!TierGate::gold_unlocked(&Viewer::Anonymous, &gold));
        assert!(!TierGate::gold_unlocked(&viewer(SubscriptionTier::Pro, &[]), &gold));
        assert!(TierGate::gold_unlocked(
            &viewer(SubscriptionTier::Free, &["gold-1"]),
            &gold
        ));
        assert!(TierGate::gold_unlocked(
            &viewer(SubscriptionTier::Elite, &[]),
            &gold
        ));
    }
}
