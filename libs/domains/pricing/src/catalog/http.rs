//! GetProducts-compatible catalog client
//!
//! Speaks the price list query protocol: a JSON POST carrying the service
//! code, `TERM_MATCH` filters and a pagination token, answered with a
//! `PriceList` whose items are JSON documents (usually encoded as strings).
//! Requests are not signed; point the endpoint at a compatible service or a
//! signing proxy.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CatalogQuery, PriceCatalog, RawCandidate};
use crate::error::PricingResult;

const TARGET_HEADER: &str = "X-Amz-Target";
const GET_PRODUCTS_TARGET: &str = "AWSPriceListService.GetProducts";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const FORMAT_VERSION: &str = "aws_v1";
const PAGE_SIZE: u32 = 100;
/// Page budget for queries that need every matching record
pub const DEFAULT_LISTING_PAGES: usize = 200;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireFilter<'a> {
    #[serde(rename = "Type")]
    kind: &'static str,
    field: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetProductsRequest<'a> {
    service_code: String,
    filters: Vec<WireFilter<'a>>,
    format_version: &'static str,
    max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetProductsResponse {
    #[serde(default)]
    price_list: Vec<serde_json::Value>,
    #[serde(default)]
    next_token: Option<String>,
}

/// HTTP implementation of [`PriceCatalog`]
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    client: Client,
    endpoint: String,
    max_pages: usize,
    listing_pages: usize,
}

impl HttpCatalogClient {
    pub fn new(endpoint: impl Into<String>, max_pages: usize) -> Self {
        Self::with_client(Client::new(), endpoint, max_pages)
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>, max_pages: usize) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            max_pages: max_pages.max(1),
            listing_pages: DEFAULT_LISTING_PAGES.max(max_pages),
        }
    }

    /// Page budget for complete listings such as a region's instance types
    pub fn with_listing_pages(mut self, pages: usize) -> Self {
        self.listing_pages = pages.max(self.max_pages);
        self
    }

    fn page_limit(&self, query: &CatalogQuery) -> usize {
        if query.complete_listing {
            self.listing_pages
        } else {
            self.max_pages
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn fetch_page(
        &self,
        query: &CatalogQuery,
        next_token: Option<String>,
    ) -> PricingResult<GetProductsResponse> {
        let body = GetProductsRequest {
            service_code: query.service.to_string(),
            filters: query
                .filters
                .iter()
                .map(|f| WireFilter {
                    kind: "TERM_MATCH",
                    field: &f.field,
                    value: &f.value,
                })
                .collect(),
            format_version: FORMAT_VERSION,
            max_results: PAGE_SIZE,
            next_token,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(TARGET_HEADER, GET_PRODUCTS_TARGET)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<GetProductsResponse>().await?)
    }
}

/// Decode one `PriceList` item, which may be a JSON string or an inline object
fn decode_item(item: serde_json::Value) -> Result<RawCandidate, serde_json::Error> {
    match item {
        serde_json::Value::String(encoded) => serde_json::from_str(&encoded),
        other => serde_json::from_value(other),
    }
}

#[async_trait]
impl PriceCatalog for HttpCatalogClient {
    async fn query(&self, query: &CatalogQuery) -> PricingResult<Vec<RawCandidate>> {
        let mut candidates = Vec::new();
        let mut next_token = None;
        let page_limit = self.page_limit(query);

        for page in 0..page_limit {
            let response = self.fetch_page(query, next_token.take()).await?;

            for item in response.price_list {
                match decode_item(item) {
                    Ok(candidate) => candidates.push(candidate),
                    Err(e) => warn!(error = %e, service = %query.service, "Skipping malformed price list item"),
                }
            }

            match response.next_token {
                Some(token) if !token.is_empty() => {
                    if page + 1 == page_limit {
                        warn!(
                            service = %query.service,
                            page_limit,
                            complete_listing = query.complete_listing,
                            "Price list truncated at page limit"
                        );
                    }
                    next_token = Some(token);
                }
                _ => break,
            }
        }

        debug!(
            service = %query.service,
            filters = query.filters.len(),
            candidates = candidates.len(),
            "Catalog query complete"
        );
        Ok(candidates)
    }
}
