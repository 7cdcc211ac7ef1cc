pub mod api;
pub mod baas;
pub mod config;
pub mod error;
pub mod gate;
pub mod genai;
pub mod insurance;
pub mod odds;
pub mod picks;
pub mod realtime;
pub mod state;
pub mod types;
