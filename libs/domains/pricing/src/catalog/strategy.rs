//! Ordered fallback filter strategies.
//!
//! Catalog records are inconsistently attributed: recent records carry
//! `regionCode`, older ones only the human `location`, and some lack the
//! tenancy / pre-installed software markers entirely. Each request kind has a
//! list of query builders ordered from most specific to most general. A
//! builder returns `None` when it cannot be applied (for example, no known
//! location name for the region) and is skipped.

use super::regions::location_for;
use super::{CatalogQuery, ServiceCode};
use crate::models::{CommitmentRequest, InstanceRequest, OperatingSystem, StorageRequest};

/// One named way of turning a request into a catalog query
pub struct FilterStrategy<R: 'static> {
    pub name: &'static str,
    pub build: fn(&R) -> Option<CatalogQuery>,
}

impl<R> std::fmt::Debug for FilterStrategy<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterStrategy")
            .field("name", &self.name)
            .finish()
    }
}

/// Region-scoped request used to enumerate the instance types offered in a region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionRequest {
    pub region: String,
}

fn compute_shared(query: CatalogQuery) -> CatalogQuery {
    query
        .term("tenancy", "Shared")
        .term("preInstalledSw", "NA")
        .term("capacitystatus", "Used")
}

fn instance_by_region_code(req: &InstanceRequest) -> Option<CatalogQuery> {
    Some(compute_shared(
        CatalogQuery::new(ServiceCode::Compute)
            .term("instanceType", &req.instance_type)
            .term("regionCode", &req.region)
            .term("operatingSystem", req.operating_system.catalog_value()),
    ))
}

fn instance_by_location(req: &InstanceRequest) -> Option<CatalogQuery> {
    let location = location_for(&req.region)?;
    Some(
        CatalogQuery::new(ServiceCode::Compute)
            .term("instanceType", &req.instance_type)
            .term("location", location)
            .term("operatingSystem", req.operating_system.catalog_value())
            .term("tenancy", "Shared"),
    )
}

fn instance_by_type_and_location(req: &InstanceRequest) -> Option<CatalogQuery> {
    let location = location_for(&req.region)?;
    Some(
        CatalogQuery::new(ServiceCode::Compute)
            .term("instanceType", &req.instance_type)
            .term("location", location),
    )
}

/// Instance queries, most specific first
pub const INSTANCE_STRATEGIES: &[FilterStrategy<InstanceRequest>] = &[
    FilterStrategy {
        name: "region-code",
        build: instance_by_region_code,
    },
    FilterStrategy {
        name: "location",
        build: instance_by_location,
    },
    FilterStrategy {
        name: "type-and-location",
        build: instance_by_type_and_location,
    },
];

fn storage_by_region_code(req: &StorageRequest) -> Option<CatalogQuery> {
    Some(
        CatalogQuery::new(ServiceCode::Compute)
            .term("volumeApiName", &req.volume_type)
            .term("regionCode", &req.region),
    )
}

fn storage_by_location(req: &StorageRequest) -> Option<CatalogQuery> {
    let location = location_for(&req.region)?;
    Some(
        CatalogQuery::new(ServiceCode::Compute)
            .term("volumeApiName", &req.volume_type)
            .term("location", location),
    )
}

fn storage_family_in_location(req: &StorageRequest) -> Option<CatalogQuery> {
    let location = location_for(&req.region)?;
    Some(
        CatalogQuery::new(ServiceCode::Compute)
            .term("productFamily", "Storage")
            .term("location", location),
    )
}

/// Block-storage queries, most specific first
pub const STORAGE_STRATEGIES: &[FilterStrategy<StorageRequest>] = &[
    FilterStrategy {
        name: "region-code",
        build: storage_by_region_code,
    },
    FilterStrategy {
        name: "location",
        build: storage_by_location,
    },
    FilterStrategy {
        name: "storage-family",
        build: storage_family_in_location,
    },
];

fn commitment_as_instance(req: &CommitmentRequest) -> InstanceRequest {
    InstanceRequest::on_demand(&req.instance_type, &req.region, req.operating_system)
}

fn reserved_by_region_code(req: &CommitmentRequest) -> Option<CatalogQuery> {
    instance_by_region_code(&commitment_as_instance(req))
}

fn reserved_by_location(req: &CommitmentRequest) -> Option<CatalogQuery> {
    instance_by_location(&commitment_as_instance(req))
}

/// Reserved plans are read from the compute catalog's reserved terms
pub const RESERVED_STRATEGIES: &[FilterStrategy<CommitmentRequest>] = &[
    FilterStrategy {
        name: "region-code",
        build: reserved_by_region_code,
    },
    FilterStrategy {
        name: "location",
        build: reserved_by_location,
    },
];

fn savings_plan_by_region_code(req: &CommitmentRequest) -> Option<CatalogQuery> {
    Some(
        CatalogQuery::new(ServiceCode::SavingsPlans)
            .term("productFamily", req.plan_type.catalog_value())
            .term("instanceType", &req.instance_type)
            .term("regionCode", &req.region)
            .term("operatingSystem", req.operating_system.catalog_value())
            .term("tenancy", "Shared"),
    )
}

fn savings_plan_by_location(req: &CommitmentRequest) -> Option<CatalogQuery> {
    let location = location_for(&req.region)?;
    Some(
        CatalogQuery::new(ServiceCode::SavingsPlans)
            .term("productFamily", req.plan_type.catalog_value())
            .term("instanceType", &req.instance_type)
            .term("location", location),
    )
}

/// Savings-plan rates live in their own catalog service
pub const SAVINGS_PLAN_STRATEGIES: &[FilterStrategy<CommitmentRequest>] = &[
    FilterStrategy {
        name: "region-code",
        build: savings_plan_by_region_code,
    },
    FilterStrategy {
        name: "location",
        build: savings_plan_by_location,
    },
];

fn offered_by_region_code(req: &RegionRequest) -> Option<CatalogQuery> {
    Some(compute_shared(
        CatalogQuery::new(ServiceCode::Compute)
            .term("productFamily", "Compute Instance")
            .term("regionCode", &req.region)
            .term("operatingSystem", OperatingSystem::Linux.catalog_value())
            .complete_listing(),
    ))
}

fn offered_by_location(req: &RegionRequest) -> Option<CatalogQuery> {
    let location = location_for(&req.region)?;
    Some(
        CatalogQuery::new(ServiceCode::Compute)
            .term("productFamily", "Compute Instance")
            .term("location", location)
            .term("operatingSystem", OperatingSystem::Linux.catalog_value())
            .complete_listing(),
    )
}

/// Instance types offered in a region
pub const AVAILABILITY_STRATEGIES: &[FilterStrategy<RegionRequest>] = &[
    FilterStrategy {
        name: "region-code",
        build: offered_by_region_code,
    },
    FilterStrategy {
        name: "location",
        build: offered_by_location,
    },
];
