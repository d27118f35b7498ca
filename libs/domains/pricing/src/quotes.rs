//! Resolved quote value objects.
//!
//! Quotes are immutable once constructed: fields are private, constructors
//! validate, and derived values (effective rate, savings) are computed exactly
//! once. Deserialization goes through the same constructors, so a cached
//! payload can never smuggle in an inconsistent derived field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PricingError, PricingResult};
use crate::models::{
    BillingModel, Currency, HOURS_PER_MONTH, InstanceSpecs, OperatingSystem, PaymentOption,
    PlanType, Term,
};

fn validate_rate(field: &str, value: f64) -> PricingResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(PricingError::InvalidInput(format!(
            "{field} must be a finite, non-negative amount (got {value})"
        )));
    }
    Ok(())
}

/// Construction input for [`InstancePriceQuote`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceQuoteParts {
    pub instance_type: String,
    pub region: String,
    pub operating_system: OperatingSystem,
    pub billing_model: BillingModel,
    pub term: Option<Term>,
    pub payment_option: Option<PaymentOption>,
    /// Effective hourly rate; for commitments this already includes amortized upfront
    pub hourly_rate: f64,
    #[serde(default)]
    pub upfront_cost: f64,
    pub currency: Currency,
    #[serde(default)]
    pub specs: InstanceSpecs,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default = "Utc::now")]
    pub resolved_at: DateTime<Utc>,
}

/// A resolved compute price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "InstanceQuoteParts")]
pub struct InstancePriceQuote {
    instance_type: String,
    region: String,
    operating_system: OperatingSystem,
    billing_model: BillingModel,
    term: Option<Term>,
    payment_option: Option<PaymentOption>,
    hourly_rate: f64,
    upfront_cost: f64,
    currency: Currency,
    specs: InstanceSpecs,
    sku: Option<String>,
    resolved_at: DateTime<Utc>,
}

impl InstancePriceQuote {
    pub fn new(parts: InstanceQuoteParts) -> PricingResult<Self> {
        validate_rate("hourly_rate", parts.hourly_rate)?;
        validate_rate("upfront_cost", parts.upfront_cost)?;
        Ok(Self {
            instance_type: parts.instance_type,
            region: parts.region,
            operating_system: parts.operating_system,
            billing_model: parts.billing_model,
            term: parts.term,
            payment_option: parts.payment_option,
            hourly_rate: parts.hourly_rate,
            upfront_cost: parts.upfront_cost,
            currency: parts.currency,
            specs: parts.specs,
            sku: parts.sku,
            resolved_at: parts.resolved_at,
        })
    }

    pub fn instance_type(&self) -> &str {
        &self.instance_type
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn operating_system(&self) -> OperatingSystem {
        self.operating_system
    }

    pub fn billing_model(&self) -> BillingModel {
        self.billing_model
    }

    pub fn term(&self) -> Option<Term> {
        self.term
    }

    pub fn payment_option(&self) -> Option<PaymentOption> {
        self.payment_option
    }

    pub fn hourly_rate(&self) -> f64 {
        self.hourly_rate
    }

    pub fn upfront_cost(&self) -> f64 {
        self.upfront_cost
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn specs(&self) -> InstanceSpecs {
        self.specs
    }

    pub fn sku(&self) -> Option<&str> {
        self.sku.as_deref()
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }

    /// Estimated monthly cost at 730 hours/month
    pub fn monthly_cost(&self) -> f64 {
        self.hourly_rate * HOURS_PER_MONTH
    }
}

impl TryFrom<InstanceQuoteParts> for InstancePriceQuote {
    type Error = PricingError;

    fn try_from(parts: InstanceQuoteParts) -> Result<Self, Self::Error> {
        Self::new(parts)
    }
}

/// Construction input for [`StoragePriceQuote`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageQuoteParts {
    pub volume_type: String,
    pub region: String,
    pub price_per_gb_month: f64,
    pub currency: Currency,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default = "Utc::now")]
    pub resolved_at: DateTime<Utc>,
}

/// A resolved block-storage price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StorageQuoteParts")]
pub struct StoragePriceQuote {
    volume_type: String,
    region: String,
    price_per_gb_month: f64,
    currency: Currency,
    sku: Option<String>,
    resolved_at: DateTime<Utc>,
}

impl StoragePriceQuote {
    pub fn new(parts: StorageQuoteParts) -> PricingResult<Self> {
        validate_rate("price_per_gb_month", parts.price_per_gb_month)?;
        Ok(Self {
            volume_type: parts.volume_type,
            region: parts.region,
            price_per_gb_month: parts.price_per_gb_month,
            currency: parts.currency,
            sku: parts.sku,
            resolved_at: parts.resolved_at,
        })
    }

    pub fn volume_type(&self) -> &str {
        &self.volume_type
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn price_per_gb_month(&self) -> f64 {
        self.price_per_gb_month
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn sku(&self) -> Option<&str> {
        self.sku.as_deref()
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }

    pub fn monthly_cost(&self, size_gb: f64) -> f64 {
        self.price_per_gb_month * size_gb
    }
}

impl TryFrom<StorageQuoteParts> for StoragePriceQuote {
    type Error = PricingError;

    fn try_from(parts: StorageQuoteParts) -> Result<Self, Self::Error> {
        Self::new(parts)
    }
}

/// Construction input for [`CommitmentPlanQuote`]. Derived values are not part of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitmentPlanTerms {
    pub plan_type: PlanType,
    pub instance_family: String,
    pub region: String,
    pub term: Term,
    pub payment_option: PaymentOption,
    pub hourly_rate: f64,
    pub upfront_cost: f64,
    pub currency: Currency,
    /// On-demand hourly rate the savings are measured against
    pub on_demand_reference_rate: f64,
    #[serde(default = "Utc::now")]
    pub resolved_at: DateTime<Utc>,
}

/// A resolved commitment plan with its derived effective rate and savings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CommitmentPlanTerms")]
pub struct CommitmentPlanQuote {
    plan_type: PlanType,
    instance_family: String,
    region: String,
    term: Term,
    payment_option: PaymentOption,
    hourly_rate: f64,
    upfront_cost: f64,
    currency: Currency,
    on_demand_reference_rate: f64,
    effective_hourly_rate: f64,
    savings_percent: f64,
    resolved_at: DateTime<Utc>,
}

impl CommitmentPlanQuote {
    pub fn new(terms: CommitmentPlanTerms) -> PricingResult<Self> {
        validate_rate("hourly_rate", terms.hourly_rate)?;
        validate_rate("upfront_cost", terms.upfront_cost)?;
        validate_rate("on_demand_reference_rate", terms.on_demand_reference_rate)?;

        let effective_hourly_rate = terms.hourly_rate + terms.upfront_cost / terms.term.hours();
        let savings_percent = if terms.on_demand_reference_rate > 0.0 {
            (terms.on_demand_reference_rate - effective_hourly_rate)
                / terms.on_demand_reference_rate
                * 100.0
        } else {
            0.0
        };

        Ok(Self {
            plan_type: terms.plan_type,
            instance_family: terms.instance_family,
            region: terms.region,
            term: terms.term,
            payment_option: terms.payment_option,
            hourly_rate: terms.hourly_rate,
            upfront_cost: terms.upfront_cost,
            currency: terms.currency,
            on_demand_reference_rate: terms.on_demand_reference_rate,
            effective_hourly_rate,
            savings_percent,
            resolved_at: terms.resolved_at,
        })
    }

    pub fn plan_type(&self) -> PlanType {
        self.plan_type
    }

    pub fn instance_family(&self) -> &str {
        &self.instance_family
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn term(&self) -> Term {
        self.term
    }

    pub fn payment_option(&self) -> PaymentOption {
        self.payment_option
    }

    pub fn hourly_rate(&self) -> f64 {
        self.hourly_rate
    }

    pub fn upfront_cost(&self) -> f64 {
        self.upfront_cost
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn on_demand_reference_rate(&self) -> f64 {
        self.on_demand_reference_rate
    }

    /// Hourly rate plus upfront amortized over the term's hours
    pub fn effective_hourly_rate(&self) -> f64 {
        self.effective_hourly_rate
    }

    /// Savings versus the on-demand reference; negative when the plan costs more
    pub fn savings_percent(&self) -> f64 {
        self.savings_percent
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }
}

impl TryFrom<CommitmentPlanTerms> for CommitmentPlanQuote {
    type Error = PricingError;

    fn try_from(terms: CommitmentPlanTerms) -> Result<Self, Self::Error> {
        Self::new(terms)
    }
}

/// Any quote the cache can hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "quote", rename_all = "snake_case")]
pub enum Quote {
    Instance(InstancePriceQuote),
    Storage(StoragePriceQuote),
    Commitment(CommitmentPlanQuote),
}

impl Quote {
    pub fn into_instance(self) -> Option<InstancePriceQuote> {
        match self {
            Quote::Instance(q) => Some(q),
            _ => None,
        }
    }

    pub fn into_storage(self) -> Option<StoragePriceQuote> {
        match self {
            Quote::Storage(q) => Some(q),
            _ => None,
        }
    }

    pub fn into_commitment(self) -> Option<CommitmentPlanQuote> {
        match self {
            Quote::Commitment(q) => Some(q),
            _ => None,
        }
    }
}

/// A price that was estimated rather than quoted by the catalog.
///
/// Always approximate; never cached and never presented as a quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceEstimate {
    pub hourly_rate: f64,
    pub approximate: bool,
    /// How the estimate was derived, e.g. `m5.large in us-east-1 x 2`
    pub basis: String,
}

impl PriceEstimate {
    pub fn approximate(hourly_rate: f64, basis: impl Into<String>) -> Self {
        Self {
            hourly_rate,
            approximate: true,
            basis: basis.into(),
        }
    }
}
