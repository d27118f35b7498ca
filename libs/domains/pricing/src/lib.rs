//! Pricing Domain
//!
//! Resolves compute, storage and commitment-plan prices from an upstream
//! price catalog for migration cost estimates, and keeps them cached.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌───────────────────────┐
//! │ PricingService   │──▶│ AvailabilityResolver  │  ← regional availability, alternatives
//! └────────┬─────────┘   └───────────┬───────────┘
//!          │                         │
//! ┌────────▼─────────┐               │
//! │ BatchOrchestrator│  ← chunked, bounded fan-out
//! └────────┬─────────┘               │
//! ┌────────▼─────────────────────────▼┐
//! │ QuotePipeline                     │  ← cache first, then upstream
//! └────────┬───────────────┬──────────┘
//! ┌────────▼───────┐ ┌─────▼──────────────┐
//! │ TieredCache    │ │ PriceSourceAdapter │  ← strategies + ProductSelector
//! │ shared + local │ └─────┬──────────────┘
//! └────────────────┘ ┌─────▼──────────────┐
//!                    │ ResilientCatalog   │  ← retry + circuit breaker
//!                    └─────┬──────────────┘
//!                    ┌─────▼──────────────┐
//!                    │ PriceCatalog       │  ← HTTP or in-memory
//!                    └────────────────────┘
//! ```

pub mod availability;
pub mod batch;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod quotes;
pub mod resilience;
pub mod resolver;
pub mod selector;
pub mod service;

// Re-export commonly used types
pub use availability::{
    AlternativeResolution, AvailabilityConfig, AvailabilityResolver, PriceDelta, RegionOverride,
};
pub use batch::{BatchConfig, BatchOrchestrator, BatchOutcome};
pub use cache::{CacheStats, QuoteCache, TieredCache};
pub use catalog::{HttpCatalogClient, InMemoryCatalog, PriceCatalog, PriceSourceAdapter};
pub use config::{CacheConfig, CatalogConfig, PricingConfig};
pub use error::{BatchFailure, ErrorCategory, PricingError, PricingResult};
pub use models::{
    BillingModel, CommitmentRequest, Currency, InstanceRequest, OperatingSystem, PaymentOption,
    PlanType, PriceRequest, StorageRequest, Term,
};
pub use quotes::{CommitmentPlanQuote, InstancePriceQuote, PriceEstimate, Quote, StoragePriceQuote};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryPolicy};
pub use resolver::{QuotePipeline, QuoteResolver};
pub use service::PricingService;
