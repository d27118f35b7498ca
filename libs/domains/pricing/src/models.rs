use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{PricingError, PricingResult};

/// Hours used to turn hourly rates into monthly estimates (~30.4 days * 24 hours)
pub const HOURS_PER_MONTH: f64 = 730.0;

/// Currency enumeration
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
    Gbp,
    Cny,
}

/// Operating system an instance is priced for
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OperatingSystem {
    #[default]
    Linux,
    Windows,
    Rhel,
    Suse,
}

impl OperatingSystem {
    /// Value of the catalog's `operatingSystem` attribute
    pub fn catalog_value(&self) -> &'static str {
        match self {
            OperatingSystem::Linux => "Linux",
            OperatingSystem::Windows => "Windows",
            OperatingSystem::Rhel => "RHEL",
            OperatingSystem::Suse => "SUSE",
        }
    }
}

/// How an instance is billed
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum BillingModel {
    #[default]
    OnDemand,
    Reserved,
    CommitmentPlan,
}

/// Commitment term length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum Term {
    #[serde(rename = "1yr")]
    #[strum(to_string = "1yr")]
    OneYear,
    #[serde(rename = "3yr")]
    #[strum(to_string = "3yr")]
    ThreeYear,
}

impl Term {
    pub fn hours(&self) -> f64 {
        match self {
            Term::OneYear => 8_760.0,
            Term::ThreeYear => 26_280.0,
        }
    }

    /// Value of the catalog's `LeaseContractLength` / `purchaseTerm` term attribute
    pub fn catalog_value(&self) -> &'static str {
        match self {
            Term::OneYear => "1yr",
            Term::ThreeYear => "3yr",
        }
    }
}

/// Upfront payment option for commitments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum PaymentOption {
    NoUpfront,
    PartialUpfront,
    AllUpfront,
}

impl PaymentOption {
    /// Value of the catalog's `PurchaseOption` term attribute
    pub fn catalog_value(&self) -> &'static str {
        match self {
            PaymentOption::NoUpfront => "No Upfront",
            PaymentOption::PartialUpfront => "Partial Upfront",
            PaymentOption::AllUpfront => "All Upfront",
        }
    }
}

/// Kind of commitment plan
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum PlanType {
    #[default]
    StandardReserved,
    ConvertibleReserved,
    ComputeSavingsPlan,
    InstanceSavingsPlan,
}

impl PlanType {
    /// Reserved plans are priced from the compute catalog's reserved terms,
    /// savings plans from the savings-plan catalog.
    pub fn is_reserved(&self) -> bool {
        matches!(
            self,
            PlanType::StandardReserved | PlanType::ConvertibleReserved
        )
    }

    /// Value of the catalog's `OfferingClass` / `planType` attribute
    pub fn catalog_value(&self) -> &'static str {
        match self {
            PlanType::StandardReserved => "standard",
            PlanType::ConvertibleReserved => "convertible",
            PlanType::ComputeSavingsPlan => "ComputeSavingsPlans",
            PlanType::InstanceSavingsPlan => "EC2InstanceSavingsPlans",
        }
    }
}

/// Hardware specs reported by the catalog for an instance type
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceSpecs {
    pub vcpu: Option<u32>,
    pub memory_gib: Option<f64>,
}

/// Split `m5.xlarge` into (`m5`, `xlarge`)
pub fn split_instance_type(instance_type: &str) -> Option<(&str, &str)> {
    let (family, size) = instance_type.split_once('.')?;
    if family.is_empty() || size.is_empty() {
        return None;
    }
    Some((family, size))
}

fn require_non_empty(field: &str, value: &str) -> PricingResult<()> {
    if value.trim().is_empty() {
        return Err(PricingError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Request for one instance price
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceRequest {
    pub instance_type: String,
    pub region: String,
    pub operating_system: OperatingSystem,
    pub billing_model: BillingModel,
    pub term: Option<Term>,
    pub payment_option: Option<PaymentOption>,
}

impl InstanceRequest {
    pub fn on_demand(
        instance_type: impl Into<String>,
        region: impl Into<String>,
        operating_system: OperatingSystem,
    ) -> Self {
        Self {
            instance_type: instance_type.into(),
            region: region.into(),
            operating_system,
            billing_model: BillingModel::OnDemand,
            term: None,
            payment_option: None,
        }
    }

    pub fn with_commitment(
        mut self,
        billing_model: BillingModel,
        term: Term,
        payment_option: PaymentOption,
    ) -> Self {
        self.billing_model = billing_model;
        self.term = Some(term);
        self.payment_option = Some(payment_option);
        self
    }

    pub fn validate(&self) -> PricingResult<()> {
        require_non_empty("instance_type", &self.instance_type)?;
        require_non_empty("region", &self.region)?;
        if self.billing_model != BillingModel::OnDemand
            && (self.term.is_none() || self.payment_option.is_none())
        {
            return Err(PricingError::InvalidInput(format!(
                "{} pricing for {} requires a term and payment option",
                self.billing_model, self.instance_type
            )));
        }
        Ok(())
    }
}

/// Request for one block-storage price
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageRequest {
    pub volume_type: String,
    pub region: String,
}

impl StorageRequest {
    pub fn new(volume_type: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            volume_type: volume_type.into(),
            region: region.into(),
        }
    }

    pub fn validate(&self) -> PricingResult<()> {
        require_non_empty("volume_type", &self.volume_type)?;
        require_non_empty("region", &self.region)
    }
}

/// Request for one commitment-plan price
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitmentRequest {
    pub instance_type: String,
    pub region: String,
    pub operating_system: OperatingSystem,
    pub plan_type: PlanType,
    pub term: Term,
    pub payment_option: PaymentOption,
}

impl CommitmentRequest {
    pub fn validate(&self) -> PricingResult<()> {
        require_non_empty("instance_type", &self.instance_type)?;
        require_non_empty("region", &self.region)?;
        if split_instance_type(&self.instance_type).is_none() {
            return Err(PricingError::InvalidInput(format!(
                "cannot derive an instance family from '{}'",
                self.instance_type
            )));
        }
        Ok(())
    }
}

/// Any request the engine can resolve and cache
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceRequest {
    Instance(InstanceRequest),
    Storage(StorageRequest),
    Commitment(CommitmentRequest),
}

impl PriceRequest {
    /// Cache namespace, kept outside the (possibly hashed) key body so
    /// invalidation patterns like `instance:*` always work.
    pub fn namespace(&self) -> &'static str {
        match self {
            PriceRequest::Instance(_) => "instance",
            PriceRequest::Storage(_) => "storage",
            PriceRequest::Commitment(_) => "commitment",
        }
    }

    /// Named parameters that identify the request, in no particular order
    pub fn key_params(&self) -> Vec<(&'static str, String)> {
        match self {
            PriceRequest::Instance(r) => {
                let mut params = vec![
                    ("instance_type", r.instance_type.clone()),
                    ("region", r.region.clone()),
                    ("os", r.operating_system.to_string()),
                    ("billing", r.billing_model.to_string()),
                ];
                if let Some(term) = r.term {
                    params.push(("term", term.to_string()));
                }
                if let Some(payment) = r.payment_option {
                    params.push(("payment", payment.to_string()));
                }
                params
            }
            PriceRequest::Storage(r) => vec![
                ("volume_type", r.volume_type.clone()),
                ("region", r.region.clone()),
            ],
            PriceRequest::Commitment(r) => vec![
                ("instance_type", r.instance_type.clone()),
                ("region", r.region.clone()),
                ("os", r.operating_system.to_string()),
                ("plan", r.plan_type.to_string()),
                ("term", r.term.to_string()),
                ("payment", r.payment_option.to_string()),
            ],
        }
    }

    pub fn validate(&self) -> PricingResult<()> {
        match self {
            PriceRequest::Instance(r) => r.validate(),
            PriceRequest::Storage(r) => r.validate(),
            PriceRequest::Commitment(r) => r.validate(),
        }
    }

    /// Short human label for logs
    pub fn label(&self) -> String {
        match self {
            PriceRequest::Instance(r) => format!("{}@{}", r.instance_type, r.region),
            PriceRequest::Storage(r) => format!("{}@{}", r.volume_type, r.region),
            PriceRequest::Commitment(r) => {
                format!("{}@{} ({})", r.instance_type, r.region, r.plan_type)
            }
        }
    }
}
