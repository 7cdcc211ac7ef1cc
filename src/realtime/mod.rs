pub mod connection;
pub mod messages;

pub use connection::{apply_entitlements, RealtimeManager};
