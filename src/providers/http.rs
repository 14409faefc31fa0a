//! Listing acquisition over plain HTTP.
//!
//! Reads structured fields from any schema.org JSON-LD blocks embedded in the
//! page. Nothing site-specific is scraped.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::pipeline::UNKNOWN_EXTERNAL_ID;

use super::{DataAcquisitionProvider, ItemData};

const LD_JSON_BLOCK: &str =
    r#"(?i)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>([\s\S]*?)</script>"#;

/// Raw page content kept on the item, in bytes.
pub const MAX_RAW_CONTENT: usize = 64 * 1024;

/// Listing id from a `/<digits>_zpid` path segment, `"unknown"` otherwise.
pub fn extract_external_id(source_ref: &str) -> String {
    Regex::new(r"/(\d+)_zpid")
        .ok()
        .and_then(|re| re.captures(source_ref))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_EXTERNAL_ID.to_string())
}

/// Fetches listing pages with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpListingFetcher {
    client: Client,
}

impl HttpListingFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("estate-forge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Acquisition {
                source_ref: String::new(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DataAcquisitionProvider for HttpListingFetcher {
    async fn fetch(&self, source_ref: &str) -> Result<ItemData, ProviderError> {
        let acquisition_error = |reason: String| ProviderError::Acquisition {
            source_ref: source_ref.to_string(),
            reason,
        };

        let response = self
            .client
            .get(source_ref)
            .send()
            .await
            .map_err(|e| acquisition_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(source_ref, status = status.as_u16(), "Listing fetch rejected");
            return Err(acquisition_error(format!("HTTP {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| acquisition_error(e.to_string()))?;
        debug!(source_ref, bytes = body.len(), "Fetched listing page");

        Ok(parse_listing_page(source_ref, &body))
    }
}

/// Builds item data from a fetched page.
pub fn parse_listing_page(source_ref: &str, body: &str) -> ItemData {
    let mut data = ItemData::new(source_ref, extract_external_id(source_ref));

    for node in json_ld_nodes(body) {
        apply_json_ld(&mut data, &node);
    }

    data.attributes
        .insert("raw_content".to_string(), Value::String(truncate(body, MAX_RAW_CONTENT).to_string()));
    data
}

fn json_ld_nodes(body: &str) -> Vec<Value> {
    let Ok(re) = Regex::new(LD_JSON_BLOCK) else {
        return Vec::new();
    };

    let mut nodes = Vec::new();
    for caps in re.captures_iter(body) {
        let Some(block) = caps.get(1) else { continue };
        let Ok(value) = serde_json::from_str::<Value>(block.as_str().trim()) else {
            continue;
        };
        flatten_nodes(value, &mut nodes);
    }
    nodes
}

fn flatten_nodes(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| flatten_nodes(v, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_nodes(graph, out);
            }
            out.push(Value::Object(map));
        }
        _ => {}
    }
}

fn apply_json_ld(data: &mut ItemData, node: &Value) {
    if data.address.is_none() {
        data.address = node.get("address").and_then(format_address);
    }
    if data.price.is_none() {
        data.price = node
            .get("offers")
            .and_then(|offers| offers.get("price"))
            .and_then(number);
    }
    if data.bedrooms.is_none() {
        data.bedrooms = node
            .get("numberOfBedrooms")
            .or_else(|| node.get("numberOfRooms"))
            .and_then(number);
    }
    if data.bathrooms.is_none() {
        data.bathrooms = node
            .get("numberOfBathroomsTotal")
            .or_else(|| node.get("numberOfFullBathrooms"))
            .and_then(number);
    }
    if data.living_area.is_none() {
        data.living_area = node
            .get("floorSize")
            .and_then(|size| size.get("value").or(Some(size)))
            .and_then(number);
    }
    if data.property_type.is_none() {
        data.property_type = node
            .get("@type")
            .and_then(Value::as_str)
            .filter(|t| !matches!(*t, "WebPage" | "BreadcrumbList" | "Organization" | "Offer"))
            .map(str::to_string);
    }
}

fn format_address(value: &Value) -> Option<String> {
    if let Some(s) = value.as_str() {
        return Some(s.trim().to_string()).filter(|s| !s.is_empty());
    }

    let field = |key: &str| value.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty());
    let street = field("streetAddress");
    let locality = field("addressLocality");
    let region_zip = match (field("addressRegion"), field("postalCode")) {
        (Some(region), Some(zip)) => Some(format!("{} {}", region, zip)),
        (Some(region), None) => Some(region.to_string()),
        (None, Some(zip)) => Some(zip.to_string()),
        (None, None) => None,
    };

    let parts: Vec<String> = [street.map(str::to_string), locality.map(str::to_string), region_zip]
        .into_iter()
        .flatten()
        .collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.replace([',', '$'], "").trim().parse().ok(),
        _ => None,
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
