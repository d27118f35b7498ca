//! Price source adapter: strategy walk + selection + quote construction

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::parse::{
    PriceParseError, TermPrice, instance_specs, on_demand_price, reserved_price,
    savings_plan_price,
};
use super::strategy::{
    AVAILABILITY_STRATEGIES, FilterStrategy, INSTANCE_STRATEGIES, RESERVED_STRATEGIES,
    RegionRequest, SAVINGS_PLAN_STRATEGIES, STORAGE_STRATEGIES,
};
use super::{PriceCatalog, RawCandidate};
use crate::error::{PricingError, PricingResult};
use crate::models::{
    BillingModel, CommitmentRequest, InstanceRequest, PaymentOption, PlanType, StorageRequest,
    Term, split_instance_type,
};
use crate::quotes::{
    CommitmentPlanQuote, CommitmentPlanTerms, InstancePriceQuote, InstanceQuoteParts,
    StoragePriceQuote, StorageQuoteParts,
};
use crate::selector::{ProductSelector, SelectionTarget};

/// Plan used when an instance request asks for `commitment-plan` billing
const INSTANCE_COMMITMENT_PLAN: PlanType = PlanType::ComputeSavingsPlan;

/// What the adapter picked for a request
struct Resolved {
    candidate: RawCandidate,
    price: TermPrice,
    strategy: &'static str,
}

/// Turns requests into catalog queries and selected, validated quotes
#[derive(Clone)]
pub struct PriceSourceAdapter {
    catalog: Arc<dyn PriceCatalog>,
    selector: ProductSelector,
}

impl PriceSourceAdapter {
    pub fn new(catalog: Arc<dyn PriceCatalog>) -> Self {
        Self {
            catalog,
            selector: ProductSelector::default(),
        }
    }

    pub fn with_selector(mut self, selector: ProductSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Try each strategy in order and return the first selectable candidate.
    ///
    /// A strategy whose candidates all fail selection falls through to the
    /// next one. Upstream errors end the walk immediately.
    async fn first_match<R, F>(
        &self,
        strategies: &[FilterStrategy<R>],
        request: &R,
        target: SelectionTarget<'_>,
        price: F,
    ) -> PricingResult<Option<Resolved>>
    where
        R: Sync,
        F: Fn(&RawCandidate) -> Result<TermPrice, PriceParseError> + Send + Sync,
    {
        for strategy in strategies {
            let Some(query) = (strategy.build)(request) else {
                continue;
            };
            let candidates = self.catalog.query(&query).await?;
            if candidates.is_empty() {
                debug!(strategy = strategy.name, identity = target.identity, "Strategy returned no candidates");
                continue;
            }

            let picked = self
                .selector
                .select(&candidates, &target, &price)
                .map(|s| (s.index, s.score, s.price));

            let Some((index, score, price)) = picked else {
                debug!(
                    strategy = strategy.name,
                    identity = target.identity,
                    candidates = candidates.len(),
                    "No candidate matched, falling back"
                );
                continue;
            };

            debug!(
                strategy = strategy.name,
                identity = target.identity,
                candidates = candidates.len(),
                score,
                "Selected catalog candidate"
            );
            let candidate = candidates.into_iter().nth(index).ok_or_else(|| {
                PricingError::Internal("selected candidate index out of range".into())
            })?;
            return Ok(Some(Resolved {
                candidate,
                price,
                strategy: strategy.name,
            }));
        }
        Ok(None)
    }

    /// Resolve an instance price for any billing model
    pub async fn instance_quote(&self, request: &InstanceRequest) -> PricingResult<InstancePriceQuote> {
        request.validate()?;

        let resolved = match (request.billing_model, request.term, request.payment_option) {
            (BillingModel::OnDemand, _, _) => {
                let target = SelectionTarget::instance(
                    &request.instance_type,
                    request.operating_system.catalog_value(),
                );
                self.first_match(INSTANCE_STRATEGIES, request, target, on_demand_price)
                    .await?
            }
            (BillingModel::Reserved, Some(term), Some(payment)) => {
                let commitment = commitment_for(request, PlanType::StandardReserved, term, payment);
                self.resolve_commitment(&commitment).await?
            }
            (BillingModel::CommitmentPlan, Some(term), Some(payment)) => {
                let commitment = commitment_for(request, INSTANCE_COMMITMENT_PLAN, term, payment);
                self.resolve_commitment(&commitment).await?
            }
            _ => {
                return Err(PricingError::InvalidInput(format!(
                    "{} pricing requires a term and payment option",
                    request.billing_model
                )));
            }
        };

        let resolved = resolved.ok_or_else(|| {
            PricingError::NotFound(format!(
                "{} {} ({}, {})",
                request.instance_type,
                request.region,
                request.operating_system,
                request.billing_model
            ))
        })?;

        // Commitment prices are quoted as an effective hourly rate with the
        // upfront part amortized over the term.
        let hourly_rate = match request.term {
            Some(term) if request.billing_model != BillingModel::OnDemand => {
                resolved.price.recurring + resolved.price.upfront / term.hours()
            }
            _ => resolved.price.recurring,
        };

        debug!(
            instance_type = %request.instance_type,
            region = %request.region,
            strategy = resolved.strategy,
            hourly_rate,
            "Resolved instance price"
        );

        InstancePriceQuote::new(InstanceQuoteParts {
            instance_type: request.instance_type.clone(),
            region: request.region.clone(),
            operating_system: request.operating_system,
            billing_model: request.billing_model,
            term: request.term,
            payment_option: request.payment_option,
            hourly_rate,
            upfront_cost: resolved.price.upfront,
            currency: resolved.price.currency,
            specs: instance_specs(&resolved.candidate),
            sku: resolved.candidate.sku().map(str::to_string),
            resolved_at: Utc::now(),
        })
    }

    /// Resolve a block-storage price per GB-month
    pub async fn storage_quote(&self, request: &StorageRequest) -> PricingResult<StoragePriceQuote> {
        request.validate()?;

        let target = SelectionTarget::volume(&request.volume_type);
        let resolved = self
            .first_match(STORAGE_STRATEGIES, request, target, on_demand_price)
            .await?
            .ok_or_else(|| {
                PricingError::NotFound(format!("{} storage in {}", request.volume_type, request.region))
            })?;

        StoragePriceQuote::new(StorageQuoteParts {
            volume_type: request.volume_type.clone(),
            region: request.region.clone(),
            price_per_gb_month: resolved.price.recurring,
            currency: resolved.price.currency,
            sku: resolved.candidate.sku().map(str::to_string),
            resolved_at: Utc::now(),
        })
    }

    async fn resolve_commitment(&self, request: &CommitmentRequest) -> PricingResult<Option<Resolved>> {
        let target = SelectionTarget::instance(
            &request.instance_type,
            request.operating_system.catalog_value(),
        );
        let (term, payment) = (request.term, request.payment_option);

        if request.plan_type.is_reserved() {
            let class = request.plan_type.catalog_value();
            self.first_match(RESERVED_STRATEGIES, request, target, move |c: &RawCandidate| {
                reserved_price(c, term, payment, class)
            })
            .await
        } else {
            self.first_match(SAVINGS_PLAN_STRATEGIES, request, target, move |c: &RawCandidate| {
                savings_plan_price(c, term, payment)
            })
            .await
        }
    }

    /// Resolve a commitment plan, measuring savings against `on_demand_rate`
    pub async fn commitment_quote(
        &self,
        request: &CommitmentRequest,
        on_demand_rate: f64,
    ) -> PricingResult<CommitmentPlanQuote> {
        request.validate()?;

        let resolved = self.resolve_commitment(request).await?.ok_or_else(|| {
            PricingError::NotFound(format!(
                "{} {} plan for {} in {}",
                request.term, request.plan_type, request.instance_type, request.region
            ))
        })?;

        let instance_family = split_instance_type(&request.instance_type)
            .map(|(family, _)| family.to_string())
            .unwrap_or_else(|| request.instance_type.clone());

        CommitmentPlanQuote::new(CommitmentPlanTerms {
            plan_type: request.plan_type,
            instance_family,
            region: request.region.clone(),
            term: request.term,
            payment_option: request.payment_option,
            hourly_rate: resolved.price.recurring,
            upfront_cost: resolved.price.upfront,
            currency: resolved.price.currency,
            on_demand_reference_rate: on_demand_rate,
            resolved_at: Utc::now(),
        })
    }

    /// Distinct instance types offered in a region.
    ///
    /// Uses the first strategy that returns any record. An empty set means the
    /// catalog knows nothing about the region.
    pub async fn available_instance_types(&self, region: &str) -> PricingResult<HashSet<String>> {
        let request = RegionRequest {
            region: region.to_string(),
        };

        for strategy in AVAILABILITY_STRATEGIES {
            let Some(query) = (strategy.build)(&request) else {
                continue;
            };
            let candidates = self.catalog.query(&query).await?;
            let types: HashSet<String> = candidates
                .iter()
                .filter_map(|c| c.attribute("instanceType"))
                .map(str::to_string)
                .collect();
            if !types.is_empty() {
                debug!(region, strategy = strategy.name, count = types.len(), "Listed offered instance types");
                return Ok(types);
            }
        }
        Ok(HashSet::new())
    }
}

fn commitment_for(
    request: &InstanceRequest,
    plan_type: PlanType,
    term: Term,
    payment_option: PaymentOption,
) -> CommitmentRequest {
    CommitmentRequest {
        instance_type: request.instance_type.clone(),
        region: request.region.clone(),
        operating_system: request.operating_system,
        plan_type,
        term,
        payment_option,
    }
}
