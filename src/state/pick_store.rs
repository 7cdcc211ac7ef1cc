use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::types::Pick;

/// Latest normalized picks. Replaced wholesale on every refresh so readers always
/// see one consistent load.
#[derive(Debug, Clone, Default)]
pub struct PickSnapshot {
    /// Feed rows in row store order (edge descending as served).
    pub picks: Vec<Pick>,
    pub gold: Vec<Pick>,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub rejected: usize,
}

pub struct PickStore {
    snapshot: RwLock<Arc<PickSnapshot>>,
}

impl PickStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            snapshot: RwLock::new(Arc::new(PickSnapshot::default())),
        })
    }

    pub fn replace(&self, snapshot: PickSnapshot) {
        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(snapshot);
    }

    /// Cheap clone of the current snapshot.
    pub fn snapshot(&self) -> Arc<PickSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn find(&self, id: &str) -> Option<Pick> {
        let snap = self.snapshot();
        snap.picks
            .iter()
            .chain(snap.gold.iter())
            .find(|p| p.id == id)
            .cloned()
    }

    pub fn pick_count(&self) -> usize {
        let snap = self.snapshot();
        snap.picks.len() + snap.gold.len()
    }
}
