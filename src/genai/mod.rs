pub mod client;

pub use client::{demo_analysis, AnalysisSource, DeepAnalysis, GenAiClient};
