//! Resilience patterns for upstream catalog calls.
//!
//! - **Circuit breaker**: fails fast while the catalog is unhealthy
//! - **Retry**: exponential backoff with jitter for transient errors
//! - **ResilientCatalog**: both of the above plus per-attempt timeouts,
//!   wrapped around any [`PriceCatalog`](crate::catalog::PriceCatalog)

pub mod breaker;
pub mod retry;
pub mod wrapper;

pub use breaker::{BreakerPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::RetryPolicy;
pub use wrapper::ResilientCatalog;
