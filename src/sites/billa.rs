//! Billa (shop.billa.cz)
//!
//! The start page is HTML; every category card links to a slug that is
//! turned into a call to the JSON category API. API pages report `total` and
//! `count`, so listings paginate with the counted-total policy. Prices come
//! in hundredths of a crown.

use crate::config::{PaginationConfig, SiteConfig};
use crate::crawler::{
    Document, ExtractError, Extraction, Item, Label, PageCounts, Request, Router, UserData,
};
use crate::sites::{base_url, selector};
use crate::url::last_path_segment;
use crate::ConfigError;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

pub const NAME: &str = "billa";

const DEFAULT_BASE_URL: &str = "https://shop.billa.cz";

const CATEGORY_CARD: &str = r#"a[href*="/produkty/"].ws-card[data-teaser-name]"#;

/// Builds the Billa routing table
pub fn router(site: &SiteConfig) -> Result<Router, ConfigError> {
    let page_size = match &site.pagination {
        PaginationConfig::CountedTotal { page_size, .. } => *page_size,
        PaginationConfig::DerivedPageCount { .. } => {
            return Err(ConfigError::Routing(
                "billa listings use the counted-total pagination policy".to_string(),
            ))
        }
    };

    let base = base_url(site, DEFAULT_BASE_URL);
    let product_base = base.clone();

    Router::builder(NAME, &[Label::Start, Label::Category])
        .html(Label::Start, move |doc, _| start(doc, &base, page_size))
        .json(Label::Category, move |doc, request| {
            category(doc, request, &product_base)
        })
        .build()
}

/// Turns category cards into API listing requests
fn start(doc: &Document, base: &str, page_size: u32) -> Result<Extraction, ExtractError> {
    let html = doc.as_html()?;
    let cards = selector(CATEGORY_CARD)?;
    let root = Url::parse(base).map_err(|e| ExtractError::Malformed {
        field: "base URL".to_string(),
        value: format!("{} ({})", base, e),
    })?;

    let requests: Vec<Request> = html
        .select(&cards)
        .filter_map(|card| card.value().attr("href"))
        .filter_map(|href| root.join(href).ok())
        .filter_map(|url| last_path_segment(&url).map(|slug| category_request(base, slug, page_size)))
        .collect();

    tracing::info!("Found {} categories", requests.len());
    Ok(Extraction::requests(requests))
}

fn category_request(base: &str, slug: &str, page_size: u32) -> Request {
    Request::new(
        format!(
            "{}/api/categories/{}/products?pageSize={}&page=0",
            base, slug, page_size
        ),
        Label::Category,
    )
    .with_header("Accept", "application/json")
    .with_user_data(UserData {
        page: Some(0),
        page_size: Some(page_size),
        category_path: Vec::new(),
    })
}

#[derive(Debug, Deserialize)]
struct ListingPage {
    total: u64,
    count: u64,
    #[serde(default)]
    results: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiProduct {
    sku: String,
    slug: String,
    name: String,
    #[serde(default)]
    parent_categories: Vec<Vec<ApiCategory>>,
    #[serde(default)]
    images: Vec<String>,
    price: ApiPrice,
    #[serde(default)]
    weight_piece_article: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ApiCategory {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPrice {
    regular: ApiRegularPrice,
    #[serde(default)]
    base_unit_short: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiRegularPrice {
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    per_standardized_quantity: Option<f64>,
}

/// Extracts products and page counts from one API listing page
fn category(doc: &Document, request: &Request, base: &str) -> Result<Extraction, ExtractError> {
    let page: ListingPage = serde_json::from_value(doc.as_json()?.clone())?;

    let mut items = Vec::new();
    for raw in page.results.unwrap_or_default() {
        match serde_json::from_value::<ApiProduct>(raw) {
            Ok(product) => items.push(to_item(product, base)),
            Err(e) => tracing::warn!("{} - skipping malformed product: {}", request.url(), e),
        }
    }

    Ok(Extraction::items(items).with_pagination(PageCounts {
        observed: page.count,
        reported_total: page.total,
        category_id: None,
    }))
}

/// Converts a price in hundredths to crowns, rounded to two decimals
fn to_czk(minor: Option<f64>) -> Option<f64> {
    minor
        .filter(|value| *value != 0.0)
        .map(|value| value.round() / 100.0)
}

fn to_item(product: ApiProduct, base: &str) -> Item {
    let item_id = product.sku.replace('-', "");
    let mut item = Item::new(
        item_id,
        product.name,
        format!("{}/produkt/{}", base, product.slug),
    );

    item.bread_crumbs = product
        .parent_categories
        .first()
        .map(|path| {
            path.iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(" > ")
        })
        .unwrap_or_default();
    item.img = product.images.into_iter().next();
    item.current_price = to_czk(product.price.regular.value);
    item.current_unit_price = to_czk(product.price.regular.per_standardized_quantity);
    // Promotion prices are in the data but not shown on the shop
    item.original_price = None;
    item.original_unit_price = None;
    item.discounted = false;
    item.use_unit_price = product.weight_piece_article.unwrap_or(false);
    item.unit = product.price.base_unit_short;
    item
}
