//! Extract prices and specs from raw candidates.
//!
//! Every extractor returns `Result<_, PriceParseError>`. A catalog amount of
//! `"0.0000000000"` parses to an explicit zero; a missing or unreadable amount
//! is an error. The two are never conflated.

use std::str::FromStr;
use thiserror::Error;

use super::{RawCandidate, RawPriceDimension, RawTerm};
use crate::models::{Currency, InstanceSpecs, PaymentOption, Term};

/// Currencies tried in order when reading `pricePerUnit`
const CURRENCY_PREFERENCE: &[Currency] = &[Currency::Usd, Currency::Cny, Currency::Eur, Currency::Gbp];

const UPFRONT_UNIT: &str = "Quantity";

/// Why a price could not be read from a candidate
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PriceParseError {
    #[error("candidate has no {0} terms")]
    MissingTerm(&'static str),

    #[error("no {kind} term matches {wanted}")]
    NoMatchingTerm { kind: &'static str, wanted: String },

    #[error("term has no {0} price dimension")]
    MissingDimension(&'static str),

    #[error("unreadable amount '{raw}' ({currency})")]
    InvalidAmount { raw: String, currency: String },

    #[error("price dimension carries no supported currency")]
    UnsupportedCurrency,
}

/// Price read from one billing term
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermPrice {
    /// Recurring rate: per hour for compute, per GB-month for storage
    pub recurring: f64,
    pub upfront: f64,
    pub currency: Currency,
}

fn dimension_amount(dimension: &RawPriceDimension) -> Result<(f64, Currency), PriceParseError> {
    for currency in CURRENCY_PREFERENCE {
        if let Some(raw) = dimension.price_per_unit.get(&currency.to_string()) {
            let amount = f64::from_str(raw.trim()).map_err(|_| PriceParseError::InvalidAmount {
                raw: raw.clone(),
                currency: currency.to_string(),
            })?;
            if !amount.is_finite() || amount < 0.0 {
                return Err(PriceParseError::InvalidAmount {
                    raw: raw.clone(),
                    currency: currency.to_string(),
                });
            }
            return Ok((amount, *currency));
        }
    }
    Err(PriceParseError::UnsupportedCurrency)
}

fn is_upfront(dimension: &RawPriceDimension) -> bool {
    dimension
        .unit
        .as_deref()
        .is_some_and(|u| u.eq_ignore_ascii_case(UPFRONT_UNIT))
}

/// Read the first recurring dimension of a term (dimensions are key-ordered)
fn recurring_amount(term: &RawTerm) -> Option<Result<(f64, Currency), PriceParseError>> {
    term.price_dimensions
        .values()
        .find(|d| !is_upfront(d))
        .map(dimension_amount)
}

fn upfront_amount(term: &RawTerm) -> Option<Result<(f64, Currency), PriceParseError>> {
    term.price_dimensions
        .values()
        .find(|d| is_upfront(d))
        .map(dimension_amount)
}

/// On-demand price: the first on-demand offer with a readable recurring dimension
pub fn on_demand_price(candidate: &RawCandidate) -> Result<TermPrice, PriceParseError> {
    if candidate.terms.on_demand.is_empty() {
        return Err(PriceParseError::MissingTerm("on-demand"));
    }

    let mut last_error = PriceParseError::MissingDimension("recurring");
    for term in candidate.terms.on_demand.values() {
        match recurring_amount(term) {
            Some(Ok((recurring, currency))) => {
                return Ok(TermPrice {
                    recurring,
                    upfront: 0.0,
                    currency,
                });
            }
            Some(Err(e)) => last_error = e,
            None => {}
        }
    }
    Err(last_error)
}

/// Whether the candidate carries a usable on-demand price
pub fn has_on_demand_price(candidate: &RawCandidate) -> bool {
    on_demand_price(candidate).is_ok()
}

fn term_matches(
    term: &RawTerm,
    lease: Term,
    payment: PaymentOption,
    offering_class: Option<&str>,
) -> bool {
    let attr = |name: &str| term.term_attributes.get(name).map(String::as_str);
    let lease_ok = attr("LeaseContractLength")
        .is_some_and(|v| v.eq_ignore_ascii_case(lease.catalog_value()));
    let payment_ok = attr("PurchaseOption")
        .is_some_and(|v| v.eq_ignore_ascii_case(payment.catalog_value()));
    let class_ok = match offering_class {
        Some(class) => attr("OfferingClass").is_some_and(|v| v.eq_ignore_ascii_case(class)),
        None => true,
    };
    lease_ok && payment_ok && class_ok
}

fn commitment_price(
    terms: &std::collections::BTreeMap<String, RawTerm>,
    kind: &'static str,
    lease: Term,
    payment: PaymentOption,
    offering_class: Option<&str>,
) -> Result<TermPrice, PriceParseError> {
    if terms.is_empty() {
        return Err(PriceParseError::MissingTerm(kind));
    }

    let term = terms
        .values()
        .find(|t| term_matches(t, lease, payment, offering_class))
        .ok_or_else(|| PriceParseError::NoMatchingTerm {
            kind,
            wanted: format!(
                "{} / {}{}",
                lease.catalog_value(),
                payment.catalog_value(),
                offering_class.map(|c| format!(" / {c}")).unwrap_or_default()
            ),
        })?;

    let recurring = recurring_amount(term).transpose()?;
    let upfront = upfront_amount(term).transpose()?;

    // All-upfront offers may omit the hourly dimension; no-upfront offers may
    // omit the upfront dimension. Anything else missing is an error.
    let (recurring, recurring_currency) = match (recurring, payment) {
        (Some(value), _) => (value.0, Some(value.1)),
        (None, PaymentOption::AllUpfront) => (0.0, None),
        (None, _) => return Err(PriceParseError::MissingDimension("hourly")),
    };
    let (upfront, upfront_currency) = match (upfront, payment) {
        (Some(value), _) => (value.0, Some(value.1)),
        (None, PaymentOption::NoUpfront) => (0.0, None),
        (None, _) => return Err(PriceParseError::MissingDimension("upfront")),
    };

    let currency = recurring_currency
        .or(upfront_currency)
        .ok_or(PriceParseError::MissingDimension("priced"))?;

    Ok(TermPrice {
        recurring,
        upfront,
        currency,
    })
}

/// Reserved-instance price for a lease length, purchase option and offering class
pub fn reserved_price(
    candidate: &RawCandidate,
    lease: Term,
    payment: PaymentOption,
    offering_class: &str,
) -> Result<TermPrice, PriceParseError> {
    commitment_price(
        &candidate.terms.reserved,
        "reserved",
        lease,
        payment,
        Some(offering_class),
    )
}

/// Savings-plan rate for a lease length and purchase option
pub fn savings_plan_price(
    candidate: &RawCandidate,
    lease: Term,
    payment: PaymentOption,
) -> Result<TermPrice, PriceParseError> {
    commitment_price(
        &candidate.terms.savings_plan,
        "savings-plan",
        lease,
        payment,
        None,
    )
}

/// vCPU and memory from `vcpu` / `memory` attributes (`"8 GiB"`, `"0.5 GiB"`)
pub fn instance_specs(candidate: &RawCandidate) -> InstanceSpecs {
    let vcpu = candidate
        .attribute("vcpu")
        .and_then(|v| v.trim().parse::<u32>().ok());
    let memory_gib = candidate.attribute("memory").and_then(|m| {
        m.trim()
            .split_whitespace()
            .next()
            .and_then(|n| n.replace(',', "").parse::<f64>().ok())
    });
    InstanceSpecs { vcpu, memory_gib }
}
