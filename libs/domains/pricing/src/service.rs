use std::sync::Arc;
use tracing::{info, warn};

use crate::availability::{AlternativeResolution, AvailabilityResolver, AvailabilitySource};
use crate::batch::{BatchOrchestrator, BatchOutcome};
use crate::cache::{CacheStats, QuoteCache, RedisCacheBackend, SharedCacheBackend, TieredCache};
use crate::catalog::{HttpCatalogClient, PriceCatalog, PriceSourceAdapter};
use crate::config::PricingConfig;
use crate::error::{PricingError, PricingResult};
use crate::models::{
    BillingModel, CommitmentRequest, InstanceRequest, OperatingSystem, PaymentOption,
    PriceRequest, StorageRequest, Term,
};
use crate::quotes::{CommitmentPlanQuote, InstancePriceQuote, Quote, StoragePriceQuote};
use crate::resilience::{CircuitBreaker, CircuitState, ResilientCatalog};
use crate::resolver::{QuotePipeline, QuoteResolver};

/// Term and payment used when a commitment price is asked for by billing model alone
pub const DEFAULT_COMMITMENT: (Term, PaymentOption) = (Term::OneYear, PaymentOption::NoUpfront);

/// Long-lived entry point to the pricing engine.
///
/// Built once at startup and shared by reference; it owns the one circuit
/// breaker for its catalog endpoint and the cache every resolution goes through.
pub struct PricingService {
    pipeline: Arc<QuotePipeline>,
    batch: BatchOrchestrator,
    availability: AvailabilityResolver,
    breaker: Arc<CircuitBreaker>,
    cache: Arc<dyn QuoteCache>,
}

impl PricingService {
    /// Wire the engine around a catalog and an optional shared cache tier
    pub fn build(
        config: &PricingConfig,
        endpoint: &str,
        catalog: Arc<dyn PriceCatalog>,
        shared: Option<Arc<dyn SharedCacheBackend>>,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(endpoint, config.breaker.clone()));
        let resilient: Arc<dyn PriceCatalog> = Arc::new(ResilientCatalog::new(
            catalog,
            breaker.clone(),
            config.retry.clone(),
            config.catalog.call_timeout,
        ));
        let adapter = PriceSourceAdapter::new(resilient);

        let cache: Arc<dyn QuoteCache> =
            Arc::new(TieredCache::new(config.cache.max_entries, shared));
        let pipeline = Arc::new(QuotePipeline::new(
            cache.clone(),
            adapter.clone(),
            config.cache.ttl,
            config.cache.key_hash_threshold,
        ));

        let batch = BatchOrchestrator::new(pipeline.clone(), config.batch.clone());
        let source: Arc<dyn AvailabilitySource> = Arc::new(adapter);
        let availability =
            AvailabilityResolver::new(source, pipeline.clone(), config.availability.clone());

        Self {
            pipeline,
            batch,
            availability,
            breaker,
            cache,
        }
    }

    /// Build against the HTTP catalog, connecting the shared tier when configured.
    ///
    /// A shared tier that cannot be reached at startup leaves the service
    /// running with the local tier only.
    pub async fn connect(config: &PricingConfig) -> PricingResult<Self> {
        let client = HttpCatalogClient::new(config.catalog.url.clone(), config.catalog.max_pages)
            .with_listing_pages(config.catalog.listing_max_pages);
        let shared = Self::shared_tier(config).await;
        Ok(Self::build(
            config,
            &config.catalog.url,
            Arc::new(client),
            shared,
        ))
    }

    /// Connect the configured shared cache tier, if any.
    ///
    /// Connection failures are logged and yield `None`.
    pub async fn shared_tier(config: &PricingConfig) -> Option<Arc<dyn SharedCacheBackend>> {
        let url = config.cache.redis_url.as_deref()?;
        match RedisCacheBackend::connect_with_retry(url, &config.retry).await {
            Ok(backend) => Some(Arc::new(backend)),
            Err(e) => {
                warn!(error = %e, "Shared cache unreachable at startup, caching locally only");
                None
            }
        }
    }

    /// Resolve an instance price by billing model.
    ///
    /// Reserved and commitment-plan prices use a one-year, no-upfront commitment.
    pub async fn resolve_instance_price(
        &self,
        instance_type: &str,
        region: &str,
        operating_system: OperatingSystem,
        billing_model: BillingModel,
    ) -> PricingResult<InstancePriceQuote> {
        let mut request = InstanceRequest::on_demand(instance_type, region, operating_system);
        if billing_model != BillingModel::OnDemand {
            let (term, payment) = DEFAULT_COMMITMENT;
            request = request.with_commitment(billing_model, term, payment);
        }
        self.resolve_instance(request).await
    }

    pub async fn resolve_instance(&self, request: InstanceRequest) -> PricingResult<InstancePriceQuote> {
        let quote = self.pipeline.resolve(&PriceRequest::Instance(request)).await?;
        quote.into_instance().ok_or_else(|| mismatched("instance"))
    }

    pub async fn resolve_storage_price(
        &self,
        volume_type: &str,
        region: &str,
    ) -> PricingResult<StoragePriceQuote> {
        let request = PriceRequest::Storage(StorageRequest::new(volume_type, region));
        let quote = self.pipeline.resolve(&request).await?;
        quote.into_storage().ok_or_else(|| mismatched("storage"))
    }

    /// Resolve a commitment plan with savings against the same instance on demand
    pub async fn resolve_commitment_plan(
        &self,
        request: CommitmentRequest,
    ) -> PricingResult<CommitmentPlanQuote> {
        let quote = self.pipeline.resolve(&PriceRequest::Commitment(request)).await?;
        quote.into_commitment().ok_or_else(|| mismatched("commitment"))
    }

    /// Resolve on-demand prices for many instance types in one region.
    ///
    /// The outcome is keyed by instance type.
    pub async fn resolve_batch(
        &self,
        instance_types: &[String],
        region: &str,
        operating_system: OperatingSystem,
    ) -> PricingResult<BatchOutcome> {
        let items = instance_types
            .iter()
            .map(|instance_type| {
                let request = PriceRequest::Instance(InstanceRequest::on_demand(
                    instance_type.clone(),
                    region,
                    operating_system,
                ));
                (instance_type.clone(), request)
            })
            .collect();
        self.batch.resolve(items).await
    }

    /// Resolve arbitrary keyed requests as one batch
    pub async fn resolve_requests(&self, items: Vec<(String, PriceRequest)>) -> PricingResult<BatchOutcome> {
        self.batch.resolve(items).await
    }

    pub async fn resolve_available_alternative(
        &self,
        instance_type: &str,
        region: &str,
        operating_system: OperatingSystem,
    ) -> PricingResult<AlternativeResolution> {
        self.availability
            .best_alternative(instance_type, region, operating_system)
            .await
    }

    pub async fn is_available(&self, instance_type: &str, region: &str) -> PricingResult<bool> {
        self.availability.is_available(instance_type, region).await
    }

    /// Cached quote for a request, without an upstream call
    pub async fn cached_quote(&self, request: &PriceRequest) -> Option<Quote> {
        self.pipeline.lookup_cached(request).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop cached quotes whose keys match a glob pattern, e.g. `instance:*`
    pub async fn invalidate_cache(&self, pattern: &str) -> PricingResult<usize> {
        let removed = self.cache.invalidate(pattern).await?;
        info!(pattern, removed, "Cache invalidated by operator");
        Ok(removed)
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Force the catalog breaker closed
    pub fn reset_circuit_breaker(&self) {
        self.breaker.reset();
    }
}

fn mismatched(kind: &str) -> PricingError {
    PricingError::Internal(format!("{kind} request resolved to a different quote kind"))
}
