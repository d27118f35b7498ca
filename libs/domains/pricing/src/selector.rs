//! Candidate scoring.
//!
//! A loose catalog filter can return several records for one request (other
//! tenancies, licensed software bundles, capacity reservations). The selector
//! scores each record by preferred attribute values and keeps the best one.
//! Ties go to the earliest candidate, so the same input always yields the
//! same pick.

use crate::catalog::RawCandidate;
use crate::catalog::parse::{PriceParseError, TermPrice, has_on_demand_price};

/// Points awarded per preferred attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreWeights {
    pub operating_system: i32,
    pub shared_tenancy: i32,
    pub no_preinstalled_software: i32,
    pub used_capacity: i32,
    pub on_demand_term: i32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            operating_system: 10,
            shared_tenancy: 5,
            no_preinstalled_software: 3,
            used_capacity: 2,
            on_demand_term: 20,
        }
    }
}

/// What the request is looking for
#[derive(Debug, Clone, Copy)]
pub struct SelectionTarget<'a> {
    /// Attribute that must match exactly, e.g. `instanceType` or `volumeApiName`
    pub identity_field: &'static str,
    pub identity: &'a str,
    /// Catalog `operatingSystem` value to prefer, if any
    pub operating_system: Option<&'a str>,
}

impl<'a> SelectionTarget<'a> {
    pub fn instance(instance_type: &'a str, operating_system: &'a str) -> Self {
        Self {
            identity_field: "instanceType",
            identity: instance_type,
            operating_system: Some(operating_system),
        }
    }

    pub fn volume(volume_type: &'a str) -> Self {
        Self {
            identity_field: "volumeApiName",
            identity: volume_type,
            operating_system: None,
        }
    }
}

/// The winning candidate together with its extracted price
#[derive(Debug, Clone, PartialEq)]
pub struct Selection<'c> {
    pub candidate: &'c RawCandidate,
    pub index: usize,
    pub score: i32,
    pub price: TermPrice,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProductSelector {
    weights: ScoreWeights,
}

impl ProductSelector {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    /// Score a single candidate; `None` when its identity does not match
    pub fn score(&self, candidate: &RawCandidate, target: &SelectionTarget<'_>) -> Option<i32> {
        if candidate.attribute(target.identity_field) != Some(target.identity) {
            return None;
        }

        let has = |name: &str, wanted: &str| {
            candidate
                .attribute(name)
                .is_some_and(|v| v.eq_ignore_ascii_case(wanted))
        };

        let mut score = 0;
        if let Some(os) = target.operating_system {
            if has("operatingSystem", os) {
                score += self.weights.operating_system;
            }
        }
        if has("tenancy", "Shared") {
            score += self.weights.shared_tenancy;
        }
        if has("preInstalledSw", "NA") {
            score += self.weights.no_preinstalled_software;
        }
        if has("capacitystatus", "Used") {
            score += self.weights.used_capacity;
        }
        if has_on_demand_price(candidate) {
            score += self.weights.on_demand_term;
        }
        Some(score)
    }

    /// Pick the best candidate that matches the target and has a readable price.
    ///
    /// `price` decides what "readable price" means for the billing model being
    /// resolved. Candidates it rejects are never selected.
    pub fn select<'c, F>(
        &self,
        candidates: &'c [RawCandidate],
        target: &SelectionTarget<'_>,
        price: F,
    ) -> Option<Selection<'c>>
    where
        F: Fn(&RawCandidate) -> Result<TermPrice, PriceParseError>,
    {
        let mut best: Option<Selection<'c>> = None;

        for (index, candidate) in candidates.iter().enumerate() {
            let Some(score) = self.score(candidate, target) else {
                continue;
            };
            if best.as_ref().is_some_and(|b| score <= b.score) {
                continue;
            }
            let Ok(price) = price(candidate) else {
                tracing::trace!(index, "Skipping candidate without a usable price");
                continue;
            };
            best = Some(Selection {
                candidate,
                index,
                score,
                price,
            });
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::parse::on_demand_price;
    use crate::catalog::{RawPriceDimension, RawTerm};
    use std::collections::BTreeMap;

    fn candidate(attrs: &[(&str, &str)], hourly: Option<&str>) -> RawCandidate {
        let mut c = RawCandidate::default();
        for (k, v) in attrs {
            c.product.attributes.insert(k.to_string(), v.to_string());
        }
        if let Some(usd) = hourly {
            c.terms.on_demand.insert(
                "OD".to_string(),
                RawTerm {
                    price_dimensions: BTreeMap::from([(
                        "D".to_string(),
                        RawPriceDimension {
                            unit: Some("Hrs".to_string()),
                            price_per_unit: BTreeMap::from([("USD".to_string(), usd.to_string())]),
                            description: None,
                        },
                    )]),
                    term_attributes: BTreeMap::new(),
                },
            );
        }
        c
    }

    fn target() -> SelectionTarget<'static> {
        SelectionTarget::instance("m5.large", "Linux")
    }

    #[test]
    fn test_prefers_shared_linux_without_software() {
        let candidates = vec![
            candidate(
                &[
                    ("instanceType", "m5.large"),
                    ("operatingSystem", "Linux"),
                    ("tenancy", "Dedicated"),
                    ("preInstalledSw", "SQL Std"),
                ],
                Some("0.50"),
            ),
            candidate(
                &[
                    ("instanceType", "m5.large"),
                    ("operatingSystem", "Linux"),
                    ("tenancy", "Shared"),
                    ("preInstalledSw", "NA"),
                    ("capacitystatus", "Used"),
                ],
                Some("0.096"),
            ),
        ];

        let selection = ProductSelector::default()
            .select(&candidates, &target(), on_demand_price)
            .unwrap();
        assert_eq!(selection.index, 1);
        assert_eq!(selection.score, 10 + 5 + 3 + 2 + 20);
        assert!((selection.price.recurring - 0.096).abs() < 1e-12);
    }

    #[test]
    fn test_ties_go_to_first_seen_and_are_reproducible() {
        let attrs = [("instanceType", "m5.large"), ("tenancy", "Shared")];
        let candidates = vec![
            candidate(&attrs, Some("0.2")),
            candidate(&attrs, Some("0.1")),
            candidate(&attrs, Some("0.3")),
        ];
        let selector = ProductSelector::default();

        for _ in 0..10 {
            let selection = selector
                .select(&candidates, &target(), on_demand_price)
                .unwrap();
            assert_eq!(selection.index, 0);
        }
    }

    #[test]
    fn test_identity_must_match_exactly() {
        let candidates = vec![
            candidate(&[("instanceType", "m5.large.metal")], Some("1.0")),
            candidate(&[("instanceType", "M5.LARGE")], Some("1.0")),
        ];
        assert!(
            ProductSelector::default()
                .select(&candidates, &target(), on_demand_price)
                .is_none()
        );
    }

    #[test]
    fn test_never_selects_candidate_without_price() {
        let candidates = vec![
            candidate(
                &[
                    ("instanceType", "m5.large"),
                    ("operatingSystem", "Linux"),
                    ("tenancy", "Shared"),
                ],
                None,
            ),
            candidate(&[("instanceType", "m5.large")], Some("0.096")),
        ];
        let selection = ProductSelector::default()
            .select(&candidates, &target(), on_demand_price)
            .unwrap();
        assert_eq!(selection.index, 1);

        let unpriced = vec![candidate(&[("instanceType", "m5.large")], Some("n/a"))];
        assert!(
            ProductSelector::default()
                .select(&unpriced, &target(), on_demand_price)
                .is_none()
        );
    }

    #[test]
    fn test_volume_target_ignores_operating_system() {
        let candidates = vec![candidate(&[("volumeApiName", "gp3")], Some("0.08"))];
        let selection = ProductSelector::default()
            .select(&candidates, &SelectionTarget::volume("gp3"), on_demand_price)
            .unwrap();
        assert_eq!(selection.score, 20);
    }

    #[test]
    fn test_custom_weights() {
        let selector = ProductSelector::new(ScoreWeights {
            on_demand_term: 0,
            ..ScoreWeights::default()
        });
        let c = candidate(&[("instanceType", "m5.large")], Some("0.1"));
        assert_eq!(selector.score(&c, &target()), Some(0));
    }
}
