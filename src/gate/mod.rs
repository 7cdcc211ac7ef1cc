pub mod tier_gate;
pub mod view;

pub use tier_gate::{Access, TierGate};
pub use view::{redact, AnalysisView, PickView};
