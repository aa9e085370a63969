//! Fault breaker for the batch orchestrator.
//!
//! Guards the batch machinery against hammering a fully degraded
//! dependency graph. The circuit has three states:
//!
//! - **Closed**: normal operation, batch runs are allowed.
//! - **Open**: repeated orchestration faults, runs are short-circuited.
//! - **HalfOpen**: cooldown elapsed, one test run is allowed.
//!
//! Only orchestration faults count - per-item failures are data, never
//! faults. State is in-memory and resets on restart.

use std::sync::{Mutex, MutexGuard};

use log::{debug, info, warn};
use tokio::time::Instant;

use crate::config::BreakerConfig;

/// Breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CircuitState {
    /// Normal operation - runs are allowed.
    Closed,
    /// Machinery is faulting - runs are blocked.
    Open,
    /// Testing recovery - one run allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    /// Consecutive orchestration faults.
    fault_count: u32,
    /// Time of the last fault (for the cooldown).
    last_fault: Option<Instant>,
}

/// Single-circuit breaker over the batch machinery.
///
/// Thread-safe; consulted before every batch attempt.
pub struct FaultBreaker {
    circuit: Mutex<Circuit>,
    config: BreakerConfig,
}

impl FaultBreaker {
    /// Create a breaker with default settings.
    pub fn new() -> Self {
        Self::with_config(BreakerConfig::default())
    }

    /// Create a breaker with custom configuration.
    pub fn with_config(config: BreakerConfig) -> Self {
        Self {
            circuit: Mutex::new(Circuit {
                state: CircuitState::Closed,
                fault_count: 0,
                last_fault: None,
            }),
            config,
        }
    }

    /// Lock the circuit, recovering from poison if necessary.
    ///
    /// Recovering is safe here: the worst case is a slightly incorrect
    /// circuit state, which is better than panicking.
    fn lock_circuit(&self) -> MutexGuard<'_, Circuit> {
        self.circuit.lock().unwrap_or_else(|poisoned| {
            warn!("Fault breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Whether a batch run is currently allowed.
    ///
    /// Also handles the Open -> HalfOpen transition once the cooldown
    /// has elapsed.
    pub fn is_allowed(&self) -> bool {
        let mut circuit = self.lock_circuit();

        match circuit.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if let Some(last_fault) = circuit.last_fault {
                    if last_fault.elapsed() >= self.config.cooldown {
                        info!("Fault breaker: cooldown elapsed, transitioning to HalfOpen");
                        circuit.state = CircuitState::HalfOpen;
                        return true;
                    }
                }
                false
            }
        }
    }

    /// Record a successful batch run.
    pub fn record_success(&self) {
        let mut circuit = self.lock_circuit();

        match circuit.state {
            CircuitState::Closed => {
                circuit.fault_count = 0;
            }
            CircuitState::HalfOpen => {
                info!("Fault breaker: closing circuit after successful test run");
                circuit.state = CircuitState::Closed;
                circuit.fault_count = 0;
                circuit.last_fault = None;
            }
            CircuitState::Open => {
                // Shouldn't happen - is_allowed should have transitioned first.
                debug!("Fault breaker: unexpected success while Open");
            }
        }
    }

    /// Record an orchestration fault.
    ///
    /// Opens the circuit after `fault_threshold` consecutive faults; in
    /// HalfOpen any fault immediately reopens it.
    pub fn record_fault(&self) {
        let mut circuit = self.lock_circuit();

        circuit.fault_count += 1;
        circuit.last_fault = Some(Instant::now());

        match circuit.state {
            CircuitState::Closed => {
                if circuit.fault_count >= self.config.fault_threshold {
                    warn!(
                        "Fault breaker: opening circuit after {} consecutive faults",
                        circuit.fault_count
                    );
                    circuit.state = CircuitState::Open;
                } else {
                    debug!(
                        "Fault breaker: fault {}/{}",
                        circuit.fault_count, self.config.fault_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                warn!("Fault breaker: reopening circuit after fault in HalfOpen");
                circuit.state = CircuitState::Open;
            }
            CircuitState::Open => {
                debug!("Fault breaker: additional fault while already Open");
            }
        }
    }

    /// Current breaker state.
    pub fn state(&self) -> CircuitState {
        self.lock_circuit().state
    }

    /// Consecutive fault count.
    pub fn fault_count(&self) -> u32 {
        self.lock_circuit().fault_count
    }

    /// Reset the breaker to Closed.
    pub fn reset(&self) {
        let mut circuit = self.lock_circuit();
        info!("Fault breaker: manual reset");
        circuit.state = CircuitState::Closed;
        circuit.fault_count = 0;
        circuit.last_fault = None;
    }
}

impl Default for FaultBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(threshold: u32, cooldown_ms: u64) -> FaultBreaker {
        FaultBreaker::with_config(BreakerConfig {
            fault_threshold: threshold,
            cooldown: Duration::from_millis(cooldown_ms),
        })
    }

    #[tokio::test]
    async fn test_starts_closed() {
        let b = breaker(3, 1000);
        assert!(b.is_allowed());
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let b = breaker(3, 1000);

        b.record_fault();
        b.record_fault();
        assert!(b.is_allowed());

        b.record_fault();
        assert!(!b.is_allowed());
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_success_resets_fault_count() {
        let b = breaker(3, 1000);

        b.record_fault();
        b.record_fault();
        assert_eq!(b.fault_count(), 2);

        b.record_success();
        assert_eq!(b.fault_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_transitions_to_half_open() {
        let b = breaker(1, 500);

        b.record_fault();
        assert!(!b.is_allowed());

        tokio::time::advance(Duration::from_millis(501)).await;

        assert!(b.is_allowed());
        assert_eq!(b.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_on_success() {
        let b = breaker(1, 500);

        b.record_fault();
        tokio::time::advance(Duration::from_millis(501)).await;
        assert!(b.is_allowed());

        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_reopens_on_fault() {
        let b = breaker(1, 500);

        b.record_fault();
        tokio::time::advance(Duration::from_millis(501)).await;
        assert!(b.is_allowed());

        b.record_fault();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.is_allowed());
    }

    #[tokio::test]
    async fn test_manual_reset() {
        let b = breaker(1, 60_000);

        b.record_fault();
        assert_eq!(b.state(), CircuitState::Open);

        b.reset();
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.is_allowed());
    }
}
