//! Regional availability and alternative instance selection.
//!
//! Availability comes from a per-region snapshot of offered instance types
//! with its own TTL. Snapshots refresh lazily on the first lookup after
//! expiry; if a refresh fails and an older snapshot exists, the old one keeps
//! serving.
//!
//! When a type is not offered, alternatives come from a region override table
//! and then from a family table. Alternatives are priced through the normal
//! resolution path and the cheapest wins. The price delta is measured against
//! an estimate of the original (same-family `large` scaled by size), which is
//! always reported as approximate.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::catalog::PriceSourceAdapter;
use crate::error::{PricingError, PricingResult};
use crate::metrics::PricingMetrics;
use crate::models::{InstanceRequest, OperatingSystem, PriceRequest, split_instance_type};
use crate::quotes::{InstancePriceQuote, PriceEstimate};
use crate::resolver::QuoteResolver;

/// Families to try, in preference order, when a family is not offered
const FAMILY_ALTERNATIVES: &[(&str, &[&str])] = &[
    ("m5", &["m5d", "m6i", "m5a", "m6a", "m7i"]),
    ("m5d", &["m5", "m6id", "m6i"]),
    ("m6i", &["m6a", "m7i", "m5"]),
    ("m4", &["m5", "m6i", "m5a"]),
    ("c5", &["c5d", "c6i", "c5a", "c6a", "c7i"]),
    ("c5d", &["c5", "c6id", "c6i"]),
    ("c6i", &["c6a", "c7i", "c5"]),
    ("c4", &["c5", "c6i", "c5a"]),
    ("r5", &["r5d", "r6i", "r5a", "r6a", "r7i"]),
    ("r5d", &["r5", "r6id", "r6i"]),
    ("r6i", &["r6a", "r7i", "r5"]),
    ("r4", &["r5", "r6i", "r5a"]),
    ("t3", &["t3a", "t2"]),
    ("t2", &["t3", "t3a"]),
    ("i3", &["i3en", "i4i"]),
];

/// Relative cost of a size against `large` within one family
const SIZE_MULTIPLIERS: &[(&str, f64)] = &[
    ("nano", 0.0625),
    ("micro", 0.125),
    ("small", 0.25),
    ("medium", 0.5),
    ("large", 1.0),
    ("xlarge", 2.0),
    ("2xlarge", 4.0),
    ("4xlarge", 8.0),
    ("8xlarge", 16.0),
    ("9xlarge", 18.0),
    ("12xlarge", 24.0),
    ("16xlarge", 32.0),
    ("18xlarge", 36.0),
    ("24xlarge", 48.0),
    ("32xlarge", 64.0),
    ("48xlarge", 96.0),
];

/// Known-good substitutes in regions that lack a type: (region, type, substitute)
const DEFAULT_OVERRIDES: &[(&str, &str, &str)] = &[
    ("ap-southeast-3", "m5.large", "m6i.large"),
    ("ap-southeast-3", "c5.large", "c6i.large"),
    ("me-central-1", "m5.xlarge", "m6i.xlarge"),
    ("eu-south-2", "r5.large", "r6i.large"),
];

const REASON_ORIGINAL: &str = "original available";
const REASON_OVERRIDE: &str = "regional override";
const REASON_BEST: &str = "best available alternative";
const REASON_UNPRICED: &str = "available alternative, price unknown";

/// Catalog of instance types offered per region
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AvailabilitySource: Send + Sync {
    async fn instance_types(&self, region: &str) -> PricingResult<HashSet<String>>;
}

#[async_trait]
impl AvailabilitySource for PriceSourceAdapter {
    async fn instance_types(&self, region: &str) -> PricingResult<HashSet<String>> {
        self.available_instance_types(region).await
    }
}

pub fn family_alternatives(instance_type: &str) -> Vec<String> {
    let Some((family, size)) = split_instance_type(instance_type) else {
        return Vec::new();
    };
    FAMILY_ALTERNATIVES
        .iter()
        .find(|(f, _)| *f == family)
        .map(|(_, alts)| alts.iter().map(|alt| format!("{alt}.{size}")).collect())
        .unwrap_or_default()
}

pub fn size_multiplier(size: &str) -> Option<f64> {
    SIZE_MULTIPLIERS
        .iter()
        .find(|(s, _)| *s == size)
        .map(|(_, m)| *m)
}

/// Hourly price difference of the chosen type against the original
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceDelta {
    Exact { hourly: f64 },
    /// Measured against an estimate of the original
    Approximate { hourly: f64, basis: String },
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlternativeResolution {
    pub original: String,
    pub region: String,
    pub instance_type: String,
    pub price_delta: PriceDelta,
    pub reason: String,
    /// Quote of the chosen alternative, when it could be priced
    pub quote: Option<InstancePriceQuote>,
    pub original_estimate: Option<PriceEstimate>,
}

impl AlternativeResolution {
    pub fn is_original(&self) -> bool {
        self.original == self.instance_type
    }
}

/// A known-good substitute for one instance type in one region.
///
/// Written as `region/instance-type=substitute`, e.g.
/// `eu-south-2/r5.large=r6i.large`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionOverride {
    pub region: String,
    pub instance_type: String,
    pub substitute: String,
}

impl FromStr for RegionOverride {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || format!("expected region/instance-type=substitute, got '{s}'");
        let (target, substitute) = s.split_once('=').ok_or_else(malformed)?;
        let (region, instance_type) = target.split_once('/').ok_or_else(malformed)?;

        let [region, instance_type, substitute] =
            [region, instance_type, substitute].map(str::trim);
        if region.is_empty() || instance_type.is_empty() || substitute.is_empty() {
            return Err(malformed());
        }
        Ok(Self {
            region: region.to_string(),
            instance_type: instance_type.to_string(),
            substitute: substitute.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AvailabilityConfig {
    pub snapshot_ttl: Duration,
    /// Region used to price the reference instance when the target region lacks it
    pub reference_region: String,
    /// Substitutes applied on top of the built-in override table
    pub overrides: Vec<RegionOverride>,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl: Duration::from_secs(6 * 3600),
            reference_region: "us-east-1".to_string(),
            overrides: Vec::new(),
        }
    }
}

impl AvailabilityConfig {
    pub fn with_snapshot_ttl(mut self, ttl: Duration) -> Self {
        self.snapshot_ttl = ttl;
        self
    }

    pub fn with_reference_region(mut self, region: impl Into<String>) -> Self {
        self.reference_region = region.into();
        self
    }

    pub fn with_override(mut self, region_override: RegionOverride) -> Self {
        self.overrides.push(region_override);
        self
    }
}

#[derive(Debug, Clone)]
struct AvailabilitySnapshot {
    types: Arc<HashSet<String>>,
    refreshed_at: Instant,
}

pub struct AvailabilityResolver {
    source: Arc<dyn AvailabilitySource>,
    resolver: Arc<dyn QuoteResolver>,
    config: AvailabilityConfig,
    overrides: HashMap<(String, String), String>,
    snapshots: RwLock<HashMap<String, AvailabilitySnapshot>>,
}

impl AvailabilityResolver {
    pub fn new(
        source: Arc<dyn AvailabilitySource>,
        resolver: Arc<dyn QuoteResolver>,
        config: AvailabilityConfig,
    ) -> Self {
        let overrides = DEFAULT_OVERRIDES
            .iter()
            .map(|(region, original, alt)| ((region.to_string(), original.to_string()), alt.to_string()))
            .chain(config.overrides.iter().map(|o| {
                ((o.region.clone(), o.instance_type.clone()), o.substitute.clone())
            }))
            .collect();
        Self {
            source,
            resolver,
            config,
            overrides,
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    /// Add or replace a regional substitute
    pub fn with_override(
        mut self,
        region: impl Into<String>,
        instance_type: impl Into<String>,
        substitute: impl Into<String>,
    ) -> Self {
        self.overrides
            .insert((region.into(), instance_type.into()), substitute.into());
        self
    }

    pub async fn is_available(&self, instance_type: &str, region: &str) -> PricingResult<bool> {
        Ok(self.snapshot(region).await?.contains(instance_type))
    }

    /// The requested type if offered, otherwise the cheapest offered substitute
    pub async fn best_alternative(
        &self,
        instance_type: &str,
        region: &str,
        operating_system: OperatingSystem,
    ) -> PricingResult<AlternativeResolution> {
        let available = self.snapshot(region).await?;

        if available.contains(instance_type) {
            return Ok(AlternativeResolution {
                original: instance_type.to_string(),
                region: region.to_string(),
                instance_type: instance_type.to_string(),
                price_delta: PriceDelta::Exact { hourly: 0.0 },
                reason: REASON_ORIGINAL.to_string(),
                quote: None,
                original_estimate: None,
            });
        }

        let (candidates, reason) = self.candidates(instance_type, region, &available)?;

        let priced = join_all(
            candidates
                .iter()
                .map(|alt| self.price(alt, region, operating_system)),
        )
        .await;

        let cheapest = candidates
            .iter()
            .zip(priced)
            .filter_map(|(alt, result)| match result {
                Ok(quote) => Some(quote),
                Err(e) => {
                    debug!(alternative = %alt, region, error = %e, "Could not price alternative");
                    None
                }
            })
            .min_by(|a, b| a.hourly_rate().total_cmp(&b.hourly_rate()));

        let Some(quote) = cheapest else {
            let fallback = candidates.into_iter().next().ok_or_else(|| {
                PricingError::Internal("alternative list emptied while pricing".into())
            })?;
            debug!(original = instance_type, region, alternative = %fallback, "No alternative could be priced");
            return Ok(AlternativeResolution {
                original: instance_type.to_string(),
                region: region.to_string(),
                instance_type: fallback,
                price_delta: PriceDelta::Unknown,
                reason: REASON_UNPRICED.to_string(),
                quote: None,
                original_estimate: None,
            });
        };

        let estimate = self
            .estimate_price(instance_type, region, operating_system, &available)
            .await;
        let price_delta = match &estimate {
            Some(estimate) => PriceDelta::Approximate {
                hourly: quote.hourly_rate() - estimate.hourly_rate,
                basis: estimate.basis.clone(),
            },
            None => PriceDelta::Unknown,
        };

        Ok(AlternativeResolution {
            original: instance_type.to_string(),
            region: region.to_string(),
            instance_type: quote.instance_type().to_string(),
            price_delta,
            reason: reason.to_string(),
            quote: Some(quote),
            original_estimate: estimate,
        })
    }

    /// Drop every cached snapshot so the next lookup refreshes
    pub fn clear_snapshots(&self) {
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn candidates(
        &self,
        instance_type: &str,
        region: &str,
        available: &HashSet<String>,
    ) -> PricingResult<(Vec<String>, &'static str)> {
        if let Some(substitute) = self
            .overrides
            .get(&(region.to_string(), instance_type.to_string()))
        {
            if available.contains(substitute) {
                return Ok((vec![substitute.clone()], REASON_OVERRIDE));
            }
            debug!(region, substitute = %substitute, "Override substitute not offered in region");
        }

        let family = family_alternatives(instance_type);
        if family.is_empty() {
            return Err(PricingError::NoAlternative {
                instance_type: instance_type.to_string(),
                region: region.to_string(),
                reason: "no known alternatives for this instance family".to_string(),
            });
        }

        let considered = family.len();
        let offered: Vec<String> = family
            .into_iter()
            .filter(|alt| available.contains(alt))
            .collect();
        if offered.is_empty() {
            return Err(PricingError::NoAlternative {
                instance_type: instance_type.to_string(),
                region: region.to_string(),
                reason: format!("none of {considered} family alternatives is offered in the region"),
            });
        }
        Ok((offered, REASON_BEST))
    }

    async fn price(
        &self,
        instance_type: &str,
        region: &str,
        operating_system: OperatingSystem,
    ) -> PricingResult<InstancePriceQuote> {
        let request = PriceRequest::Instance(InstanceRequest::on_demand(
            instance_type,
            region,
            operating_system,
        ));
        self.resolver
            .resolve(&request)
            .await?
            .into_instance()
            .ok_or_else(|| PricingError::Internal("instance request resolved to a non-instance quote".into()))
    }

    /// Estimate an unavailable type from the family's `large` size
    async fn estimate_price(
        &self,
        instance_type: &str,
        region: &str,
        operating_system: OperatingSystem,
        available: &HashSet<String>,
    ) -> Option<PriceEstimate> {
        let (family, size) = split_instance_type(instance_type)?;
        let multiplier = size_multiplier(size)?;
        let reference = format!("{family}.large");

        let mut regions = Vec::with_capacity(2);
        if available.contains(&reference) {
            regions.push(region);
        }
        if self.config.reference_region != region {
            regions.push(self.config.reference_region.as_str());
        }

        for reference_region in regions {
            match self.price(&reference, reference_region, operating_system).await {
                Ok(quote) => {
                    return Some(PriceEstimate::approximate(
                        quote.hourly_rate() * multiplier,
                        format!("{reference} in {reference_region} x {multiplier}"),
                    ));
                }
                Err(e) => {
                    debug!(reference = %reference, region = reference_region, error = %e, "Reference price unavailable");
                }
            }
        }
        None
    }

    async fn snapshot(&self, region: &str) -> PricingResult<Arc<HashSet<String>>> {
        let cached = self
            .snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(region)
            .cloned();

        if let Some(snapshot) = &cached {
            if snapshot.refreshed_at.elapsed() < self.config.snapshot_ttl {
                return Ok(snapshot.types.clone());
            }
        }

        match self.source.instance_types(region).await {
            Ok(types) => {
                debug!(region, count = types.len(), "Availability snapshot refreshed");
                PricingMetrics::record_snapshot_refresh(region, false);
                let types = Arc::new(types);
                self.snapshots
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(
                        region.to_string(),
                        AvailabilitySnapshot {
                            types: types.clone(),
                            refreshed_at: Instant::now(),
                        },
                    );
                Ok(types)
            }
            Err(e) => match cached {
                Some(stale) => {
                    warn!(region, error = %e, "Availability refresh failed, serving previous snapshot");
                    PricingMetrics::record_snapshot_refresh(region, true);
                    Ok(stale.types)
                }
                None => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillingModel, Currency, InstanceSpecs};
    use crate::quotes::{InstanceQuoteParts, Quote};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Prices keyed by (instance type, region); anything else is not found
    #[derive(Default)]
    struct PriceTable {
        prices: HashMap<(String, String), f64>,
        fetches: AtomicUsize,
    }

    impl PriceTable {
        fn with(mut self, instance_type: &str, region: &str, rate: f64) -> Self {
            self.prices
                .insert((instance_type.to_string(), region.to_string()), rate);
            self
        }
    }

    #[async_trait]
    impl QuoteResolver for PriceTable {
        async fn lookup_cached(&self, _request: &PriceRequest) -> Option<Quote> {
            None
        }

        async fn fetch(&self, request: &PriceRequest) -> PricingResult<Quote> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let PriceRequest::Instance(r) = request else {
                return Err(PricingError::InvalidInput("instances only".into()));
            };
            let rate = self
                .prices
                .get(&(r.instance_type.clone(), r.region.clone()))
                .copied()
                .ok_or_else(|| PricingError::NotFound(request.label()))?;
            Ok(Quote::Instance(
                InstancePriceQuote::new(InstanceQuoteParts {
                    instance_type: r.instance_type.clone(),
                    region: r.region.clone(),
                    operating_system: r.operating_system,
                    billing_model: BillingModel::OnDemand,
                    term: None,
                    payment_option: None,
                    hourly_rate: rate,
                    upfront_cost: 0.0,
                    currency: Currency::Usd,
                    specs: InstanceSpecs::default(),
                    sku: None,
                    resolved_at: Utc::now(),
                })
                .unwrap(),
            ))
        }
    }

    fn source(types: &[&str]) -> MockAvailabilitySource {
        let types: HashSet<String> = types.iter().map(|t| t.to_string()).collect();
        let mut source = MockAvailabilitySource::new();
        source
            .expect_instance_types()
            .returning(move |_| Ok(types.clone()));
        source
    }

    fn resolver(source: MockAvailabilitySource, prices: PriceTable) -> AvailabilityResolver {
        AvailabilityResolver::new(Arc::new(source), Arc::new(prices), AvailabilityConfig::default())
    }

    #[tokio::test]
    async fn test_cheapest_alternative_against_estimated_original() {
        let prices = PriceTable::default()
            .with("m6i.large", "eu-south-2", 0.095)
            .with("m5.large", "us-east-1", 0.090);
        let resolver = resolver(source(&["m6i.large", "c5.large"]), prices);

        let result = resolver
            .best_alternative("m5.large", "eu-south-2", OperatingSystem::Linux)
            .await
            .unwrap();

        assert_eq!(result.instance_type, "m6i.large");
        assert_eq!(result.reason, "best available alternative");
        match result.price_delta {
            PriceDelta::Approximate { hourly, ref basis } => {
                assert!((hourly - 0.005).abs() < 1e-9);
                assert!(basis.contains("us-east-1"));
            }
            other => panic!("expected approximate delta, got {other:?}"),
        }
        let estimate = result.original_estimate.unwrap();
        assert!(estimate.approximate);
        assert!((estimate.hourly_rate - 0.090).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_original_available_needs_no_pricing() {
        let prices = Arc::new(PriceTable::default());
        let resolver = AvailabilityResolver::new(
            Arc::new(source(&["m5.large"])),
            prices.clone(),
            AvailabilityConfig::default(),
        );

        let result = resolver
            .best_alternative("m5.large", "us-east-1", OperatingSystem::Linux)
            .await
            .unwrap();
        assert!(result.is_original());
        assert_eq!(result.reason, "original available");
        assert_eq!(result.price_delta, PriceDelta::Exact { hourly: 0.0 });
        assert_eq!(prices.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_picks_cheapest_of_several() {
        let prices = PriceTable::default()
            .with("m5d.xlarge", "r", 0.226)
            .with("m6a.xlarge", "r", 0.173)
            .with("m6i.xlarge", "r", 0.192)
            .with("m5.large", "us-east-1", 0.096);
        let resolver = resolver(source(&["m5d.xlarge", "m6a.xlarge", "m6i.xlarge"]), prices);

        let result = resolver
            .best_alternative("m5.xlarge", "r", OperatingSystem::Linux)
            .await
            .unwrap();
        assert_eq!(result.instance_type, "m6a.xlarge");
        // Estimate is m5.large x 2
        match result.price_delta {
            PriceDelta::Approximate { hourly, .. } => assert!((hourly - (0.173 - 0.192)).abs() < 1e-9),
            other => panic!("expected approximate delta, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unpriceable_alternative_has_unknown_delta() {
        let resolver = resolver(source(&["m6i.large"]), PriceTable::default());

        let result = resolver
            .best_alternative("m5.large", "r", OperatingSystem::Linux)
            .await
            .unwrap();
        assert_eq!(result.instance_type, "m6i.large");
        assert_eq!(result.price_delta, PriceDelta::Unknown);
        assert!(result.reason.contains("price unknown"));
        assert!(result.quote.is_none());
    }

    #[tokio::test]
    async fn test_missing_estimate_gives_unknown_delta() {
        let prices = PriceTable::default().with("m6i.large", "r", 0.095);
        let resolver = resolver(source(&["m6i.large"]), prices);

        let result = resolver
            .best_alternative("m5.large", "r", OperatingSystem::Linux)
            .await
            .unwrap();
        assert_eq!(result.reason, "best available alternative");
        assert_eq!(result.price_delta, PriceDelta::Unknown);
        assert!(result.quote.is_some());
    }

    #[tokio::test]
    async fn test_no_alternative_offered() {
        let resolver = resolver(source(&["c5.large"]), PriceTable::default());

        let err = resolver
            .best_alternative("m5.large", "r", OperatingSystem::Linux)
            .await
            .unwrap_err();
        match err {
            PricingError::NoAlternative { instance_type, reason, .. } => {
                assert_eq!(instance_type, "m5.large");
                assert!(reason.contains("offered"));
            }
            other => panic!("expected NoAlternative, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_family_has_no_alternative() {
        let resolver = resolver(source(&["c5.large"]), PriceTable::default());
        assert!(matches!(
            resolver
                .best_alternative("x9z.large", "r", OperatingSystem::Linux)
                .await,
            Err(PricingError::NoAlternative { .. })
        ));
    }

    #[tokio::test]
    async fn test_override_wins_over_family_table() {
        let prices = PriceTable::default()
            .with("m5a.large", "r", 0.086)
            .with("m7i.large", "r", 0.100);
        let resolver = resolver(source(&["m5a.large", "m7i.large"]), prices)
            .with_override("r", "m5.large", "m7i.large");

        let result = resolver
            .best_alternative("m5.large", "r", OperatingSystem::Linux)
            .await
            .unwrap();
        assert_eq!(result.instance_type, "m7i.large");
        assert_eq!(result.reason, "regional override");
    }

    #[tokio::test]
    async fn test_configured_override_replaces_built_in_entry() {
        let prices = PriceTable::default()
            .with("r6i.large", "eu-south-2", 0.118)
            .with("r5d.large", "eu-south-2", 0.144);
        // Built in, eu-south-2 r5.large maps to r6i.large
        let config = AvailabilityConfig::default()
            .with_override("eu-south-2/r5.large=r5d.large".parse().unwrap());
        let resolver = AvailabilityResolver::new(
            Arc::new(source(&["r6i.large", "r5d.large"])),
            Arc::new(prices),
            config,
        );

        let result = resolver
            .best_alternative("r5.large", "eu-south-2", OperatingSystem::Linux)
            .await
            .unwrap();
        assert_eq!(result.instance_type, "r5d.large");
        assert_eq!(result.reason, "regional override");
    }

    #[test]
    fn test_region_override_parsing() {
        let parsed: RegionOverride = " ap-southeast-3/m5.large = m6i.large ".parse().unwrap();
        assert_eq!(
            parsed,
            RegionOverride {
                region: "ap-southeast-3".into(),
                instance_type: "m5.large".into(),
                substitute: "m6i.large".into(),
            }
        );
        assert!("m5.large=m6i.large".parse::<RegionOverride>().is_err());
        assert!("eu-west-1/m5.large".parse::<RegionOverride>().is_err());
        assert!("eu-west-1/=m6i.large".parse::<RegionOverride>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_refreshes_after_ttl() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut source = MockAvailabilitySource::new();
        source.expect_instance_types().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HashSet::from(["m5.large".to_string()]))
        });
        let resolver = AvailabilityResolver::new(
            Arc::new(source),
            Arc::new(PriceTable::default()),
            AvailabilityConfig::default().with_snapshot_ttl(Duration::from_secs(60)),
        );

        assert!(resolver.is_available("m5.large", "us-east-1").await.unwrap());
        assert!(!resolver.is_available("m6i.large", "us-east-1").await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(resolver.is_available("m5.large", "us-east-1").await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        resolver.clear_snapshots();
        resolver.is_available("m5.large", "us-east-1").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_reuses_stale_snapshot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut source = MockAvailabilitySource::new();
        source.expect_instance_types().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(HashSet::from(["m5.large".to_string()]))
            } else {
                Err(PricingError::TransientUpstream("catalog down".into()))
            }
        });
        let resolver = AvailabilityResolver::new(
            Arc::new(source),
            Arc::new(PriceTable::default()),
            AvailabilityConfig::default().with_snapshot_ttl(Duration::from_secs(60)),
        );

        assert!(resolver.is_available("m5.large", "us-east-1").await.unwrap());
        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(resolver.is_available("m5.large", "us-east-1").await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // No earlier snapshot for this region
        assert!(matches!(
            resolver.is_available("m5.large", "eu-west-1").await,
            Err(PricingError::TransientUpstream(_))
        ));
    }

    #[test]
    fn test_family_and_size_tables() {
        assert_eq!(
            family_alternatives("m5.xlarge")[..2],
            ["m5d.xlarge".to_string(), "m6i.xlarge".to_string()]
        );
        assert!(family_alternatives("m5").is_empty());
        assert_eq!(size_multiplier("2xlarge"), Some(4.0));
        assert_eq!(size_multiplier("metal"), None);
    }
}
