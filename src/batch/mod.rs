//! Batch orchestration: chunked fan-out, per-item retries, progress
//! events and an outer fault breaker.

mod circuit_breaker;
mod orchestrator;

pub use circuit_breaker::{CircuitState, FaultBreaker};
pub use orchestrator::BatchOrchestrator;
