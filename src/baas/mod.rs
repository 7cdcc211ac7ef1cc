pub mod client;
pub mod refresh;

pub use client::{entitlement_from_row, BaasClient};
pub use refresh::PickRefresher;
