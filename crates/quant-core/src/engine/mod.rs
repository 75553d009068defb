//! Analysis orchestration
//!
//! Composes the analytics engines into per-symbol reports and runs them
//! concurrently over a shared cache and compute pool.

pub mod orchestrator;
pub mod pool;
pub mod result;

pub use orchestrator::AnalysisOrchestrator;
pub use pool::ComputePool;
pub use result::{AnalysisResult, BatchEntry, Metrics, PriceHistory};
