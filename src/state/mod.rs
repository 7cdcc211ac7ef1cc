pub mod pick_store;
pub mod viewer_store;

pub use pick_store::{PickSnapshot, PickStore};
pub use viewer_store::{TierCounts, ViewerStore};
