//! Upstream pricing catalog access
//!
//! The catalog is an external collaborator: it answers attribute-filtered
//! queries with zero or more loosely structured candidate records. This
//! module holds the wire model, the [`PriceCatalog`] seam, and the
//! [`PriceSourceAdapter`] that walks fallback filter strategies.

pub mod adapter;
pub mod http;
pub mod memory;
pub mod parse;
pub mod regions;
pub mod strategy;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

use crate::error::PricingResult;

pub use adapter::PriceSourceAdapter;
pub use http::HttpCatalogClient;
pub use memory::InMemoryCatalog;

/// Catalog service a query is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum ServiceCode {
    /// Compute instances and block storage
    #[serde(rename = "AmazonEC2")]
    #[strum(to_string = "AmazonEC2")]
    Compute,
    /// Savings-plan commitment rates
    #[serde(rename = "AWSComputeSavingsPlan")]
    #[strum(to_string = "AWSComputeSavingsPlan")]
    SavingsPlans,
}

/// Exact-match attribute filter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub field: String,
    pub value: String,
}

/// One catalog query: a service plus a conjunction of attribute filters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogQuery {
    pub service: ServiceCode,
    pub filters: Vec<AttributeFilter>,
    /// The caller needs every matching record, not just enough to pick one
    pub complete_listing: bool,
}

impl CatalogQuery {
    pub fn new(service: ServiceCode) -> Self {
        Self {
            service,
            filters: Vec::new(),
            complete_listing: false,
        }
    }

    /// Ask for the larger listing page budget
    pub fn complete_listing(mut self) -> Self {
        self.complete_listing = true;
        self
    }

    /// Add an exact-match filter
    pub fn term(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(AttributeFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn filter_value(&self, field: &str) -> Option<&str> {
        self.filters
            .iter()
            .find(|f| f.field == field)
            .map(|f| f.value.as_str())
    }
}

/// Product block of a raw candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProduct {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub product_family: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// A single price dimension of a term
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPriceDimension {
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub price_per_unit: BTreeMap<String, String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A billing term (on-demand offer, reserved offer, savings-plan offer)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTerm {
    #[serde(default)]
    pub price_dimensions: BTreeMap<String, RawPriceDimension>,
    #[serde(default)]
    pub term_attributes: BTreeMap<String, String>,
}

/// Terms grouped by billing kind; offers are keyed by offer code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTerms {
    #[serde(rename = "OnDemand", default)]
    pub on_demand: BTreeMap<String, RawTerm>,
    #[serde(rename = "Reserved", default)]
    pub reserved: BTreeMap<String, RawTerm>,
    #[serde(rename = "SavingsPlan", default)]
    pub savings_plan: BTreeMap<String, RawTerm>,
}

/// A raw, not-yet-validated record returned by the catalog.
///
/// Every field is optional on the wire; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCandidate {
    #[serde(default)]
    pub product: RawProduct,
    #[serde(default)]
    pub terms: RawTerms,
    #[serde(default)]
    pub service_code: Option<String>,
}

impl RawCandidate {
    /// Look up a product attribute; `productFamily` is served from the product block
    pub fn attribute(&self, name: &str) -> Option<&str> {
        if name == "productFamily" {
            return self.product.product_family.as_deref();
        }
        self.product.attributes.get(name).map(String::as_str)
    }

    pub fn sku(&self) -> Option<&str> {
        self.product.sku.as_deref()
    }
}

/// The upstream pricing catalog.
///
/// Implementations must classify failures: network / timeout / 5xx as
/// [`PricingError::TransientUpstream`](crate::PricingError::TransientUpstream),
/// throttling as `RateLimited`, and malformed requests as `PermanentUpstream`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceCatalog: Send + Sync {
    /// Return every candidate matching all filters of the query
    async fn query(&self, query: &CatalogQuery) -> PricingResult<Vec<RawCandidate>>;
}
