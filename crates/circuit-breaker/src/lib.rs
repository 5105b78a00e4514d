//! Circuit breaker protecting downstream targets from repeated failures.
//!
//! Each named target gets one shared three-state breaker. Consecutive
//! failures of executed calls trip the breaker open; open breakers reject
//! calls without invoking the target until a timeout elapses, after which a
//! single trial call probes whether the target recovered.

pub mod breaker;
pub mod config;
pub mod error;
pub mod registry;
pub mod state;

pub use breaker::CircuitBreaker;
pub use config::CircuitBreakerConfig;
pub use error::CircuitBreakerError;
pub use registry::CircuitBreakerRegistry;
pub use state::{BreakerSnapshot, CircuitState};
