//! Fixture-backed catalog for offline runs and tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::{CatalogQuery, PriceCatalog, RawCandidate, ServiceCode};
use crate::error::{PricingError, PricingResult};

/// Catalog that answers queries from candidates held in memory.
///
/// Filters match attribute values case-insensitively, the same way the
/// upstream `TERM_MATCH` filter behaves. Every `query` is counted, and an
/// outage switch makes all queries fail with a transient error.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    candidates: HashMap<ServiceCode, Vec<RawCandidate>>,
    calls: AtomicUsize,
    outage: AtomicBool,
    latency: Option<Duration>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add candidates for a service
    pub fn with_candidates(
        mut self,
        service: ServiceCode,
        candidates: impl IntoIterator<Item = RawCandidate>,
    ) -> Self {
        self.candidates.entry(service).or_default().extend(candidates);
        self
    }

    /// Delay every query by a fixed amount
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Parse a fixture: `{"AmazonEC2": [candidate, ...], "AWSComputeSavingsPlan": [...]}`
    pub fn from_json(json: &str) -> PricingResult<Self> {
        let raw: HashMap<String, Vec<RawCandidate>> = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for (service, candidates) in raw {
            let service = ServiceCode::from_str(&service).map_err(|_| {
                PricingError::InvalidInput(format!("unknown catalog service '{service}'"))
            })?;
            catalog = catalog.with_candidates(service, candidates);
        }
        Ok(catalog)
    }

    /// Load a fixture file
    pub async fn load(path: impl AsRef<Path>) -> PricingResult<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            PricingError::InvalidInput(format!("cannot read catalog file {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Number of queries answered (or failed) so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Toggle a simulated upstream outage
    pub fn set_outage(&self, down: bool) {
        self.outage.store(down, Ordering::SeqCst);
    }

    fn matches(candidate: &RawCandidate, query: &CatalogQuery) -> bool {
        query.filters.iter().all(|filter| {
            candidate
                .attribute(&filter.field)
                .is_some_and(|value| value.eq_ignore_ascii_case(&filter.value))
        })
    }
}

#[async_trait]
impl PriceCatalog for InMemoryCatalog {
    async fn query(&self, query: &CatalogQuery) -> PricingResult<Vec<RawCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.outage.load(Ordering::SeqCst) {
            return Err(PricingError::TransientUpstream(
                "simulated catalog outage".to_string(),
            ));
        }

        Ok(self
            .candidates
            .get(&query.service)
            .map(|candidates| {
                candidates
                    .iter()
                    .filter(|c| Self::matches(c, query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "AmazonEC2": [
            {
                "product": {
                    "sku": "SKU1",
                    "productFamily": "Compute Instance",
                    "attributes": {"instanceType": "m5.large", "regionCode": "us-east-1"}
                }
            },
            {
                "product": {
                    "sku": "SKU2",
                    "productFamily": "Compute Instance",
                    "attributes": {"instanceType": "c5.large", "regionCode": "us-east-1"}
                }
            }
        ]
    }"#;

    #[tokio::test]
    async fn test_filters_match_case_insensitively() {
        let catalog = InMemoryCatalog::from_json(FIXTURE).unwrap();
        let query = CatalogQuery::new(ServiceCode::Compute)
            .term("instanceType", "M5.LARGE")
            .term("productFamily", "compute instance");

        let found = catalog.query(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].sku(), Some("SKU1"));
        assert_eq!(catalog.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_attribute_never_matches() {
        let catalog = InMemoryCatalog::from_json(FIXTURE).unwrap();
        let query = CatalogQuery::new(ServiceCode::Compute).term("tenancy", "Shared");
        assert!(catalog.query(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outage_fails_transiently() {
        let catalog = InMemoryCatalog::from_json(FIXTURE).unwrap();
        catalog.set_outage(true);
        let err = catalog
            .query(&CatalogQuery::new(ServiceCode::Compute))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(catalog.calls(), 1);
    }

    #[test]
    fn test_unknown_service_rejected() {
        let err = InMemoryCatalog::from_json(r#"{"AmazonS3": []}"#).unwrap_err();
        assert!(matches!(err, PricingError::InvalidInput(_)));
    }
}
