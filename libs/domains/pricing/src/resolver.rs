//! Cache-then-upstream quote resolution

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache::{QuoteCache, cache_key};
use crate::catalog::PriceSourceAdapter;
use crate::error::{PricingError, PricingResult};
use crate::models::{InstanceRequest, PriceRequest};
use crate::quotes::Quote;

/// Resolves one request to a quote.
///
/// Split into a cache lookup and an upstream fetch so callers that bound
/// upstream concurrency can let cache hits through without taking a slot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteResolver: Send + Sync {
    /// A cached quote for the request, without touching the upstream
    async fn lookup_cached(&self, request: &PriceRequest) -> Option<Quote>;

    /// Resolve upstream and populate the cache
    async fn fetch(&self, request: &PriceRequest) -> PricingResult<Quote>;

    async fn resolve(&self, request: &PriceRequest) -> PricingResult<Quote> {
        match self.lookup_cached(request).await {
            Some(quote) => Ok(quote),
            None => self.fetch(request).await,
        }
    }
}

/// The standard pipeline: tiered cache in front of the price source adapter
pub struct QuotePipeline {
    cache: Arc<dyn QuoteCache>,
    adapter: PriceSourceAdapter,
    ttl: Duration,
    hash_threshold: usize,
}

impl QuotePipeline {
    pub fn new(
        cache: Arc<dyn QuoteCache>,
        adapter: PriceSourceAdapter,
        ttl: Duration,
        hash_threshold: usize,
    ) -> Self {
        Self {
            cache,
            adapter,
            ttl,
            hash_threshold,
        }
    }

    pub fn cache(&self) -> &Arc<dyn QuoteCache> {
        &self.cache
    }

    pub fn adapter(&self) -> &PriceSourceAdapter {
        &self.adapter
    }

    pub fn key_for(&self, request: &PriceRequest) -> String {
        cache_key(request, self.hash_threshold)
    }

    async fn store(&self, request: &PriceRequest, quote: &Quote) {
        self.cache.set(&self.key_for(request), quote, self.ttl).await;
    }

    /// On-demand hourly rate of the instance a commitment is measured against
    async fn on_demand_reference(&self, request: &InstanceRequest) -> PricingResult<f64> {
        let reference = PriceRequest::Instance(request.clone());
        let quote = match self.lookup_cached(&reference).await {
            Some(quote) => quote,
            None => {
                let fresh = Quote::Instance(self.adapter.instance_quote(request).await?);
                self.store(&reference, &fresh).await;
                fresh
            }
        };
        quote
            .into_instance()
            .map(|q| q.hourly_rate())
            .ok_or_else(|| PricingError::Internal("instance key cached a non-instance quote".into()))
    }
}

#[async_trait]
impl QuoteResolver for QuotePipeline {
    async fn lookup_cached(&self, request: &PriceRequest) -> Option<Quote> {
        self.cache.get(&self.key_for(request)).await
    }

    async fn fetch(&self, request: &PriceRequest) -> PricingResult<Quote> {
        request.validate()?;

        let quote = match request {
            PriceRequest::Instance(r) => Quote::Instance(self.adapter.instance_quote(r).await?),
            PriceRequest::Storage(r) => Quote::Storage(self.adapter.storage_quote(r).await?),
            PriceRequest::Commitment(r) => {
                let reference = InstanceRequest::on_demand(
                    r.instance_type.clone(),
                    r.region.clone(),
                    r.operating_system,
                );
                let on_demand_rate = self.on_demand_reference(&reference).await?;
                Quote::Commitment(self.adapter.commitment_quote(r, on_demand_rate).await?)
            }
        };

        debug!(request = %request.label(), "Resolved quote from catalog");
        self.store(request, &quote).await;
        Ok(quote)
    }
}
