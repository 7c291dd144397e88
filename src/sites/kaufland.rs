//! Kaufland (www.kaufland.cz)
//!
//! Everything is HTML. The footer lists top-level categories; a category
//! page either shows a category tree to descend into or a product listing.
//! Listing tiles carry name, image and list price, while id, URL, price and
//! availability come from a JSON script embedded in the same page and are
//! joined to tiles by image URL. Listings report a total product count, and
//! further pages are synthesized from a category id (derived page count).

use crate::config::{PaginationConfig, SiteConfig};
use crate::crawler::{
    clean_price, Document, ExtractError, Extraction, Item, Label, PageCounts, Request, Router,
    UserData,
};
use crate::sites::{base_url, selector, text_of};
use crate::ConfigError;
use regex::Regex;
use scraper::Html;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;
use url::Url;

pub const NAME: &str = "kaufland";

const DEFAULT_BASE_URL: &str = "https://www.kaufland.cz";

const FOOTER_CATEGORY: &str = "li.rd-footer_navigation-link-list-item > a";
const CATEGORY_TREE: &str = "div.rd-category-tree__nav";
const SUBCATEGORY: &str = "li.rd-category-tree__list-item > a.rd-category-tree__anchor--level-1";
const PRODUCT_TILE: &str = "article.product";
const SPONSORED_LABEL: &str = ".product__sponsored-ad-label";
const PRODUCT_COUNT: &str = ".product-count";
const IN_STOCK: &str = "https://schema.org/InStock";

/// Category link inside an inline script, slashes escaped or plain
static RE_CATEGORY_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url:"(?:\\u002F|/)category(?:\\u002F|/)(\d+)"#).expect("valid category id regex")
});

static RE_LEADING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+").expect("valid digits regex"));

/// Builds the Kaufland routing table
pub fn router(site: &SiteConfig) -> Result<Router, ConfigError> {
    if !matches!(site.pagination, PaginationConfig::DerivedPageCount { .. }) {
        return Err(ConfigError::Routing(
            "kaufland listings use the derived-page-count pagination policy".to_string(),
        ));
    }

    let base = Url::parse(&base_url(site, DEFAULT_BASE_URL))
        .map_err(|e| ConfigError::InvalidUrl(format!("kaufland base URL: {}", e)))?;
    let category_base = base.clone();

    Router::builder(NAME, &Label::ALL)
        .html(Label::Start, move |doc, _| start(doc, &base))
        .html(Label::Category, move |doc, request| {
            category(doc, request, &category_base)
        })
        .html(Label::Page, |doc, request| {
            let products = listing_products(doc.as_html()?, &request.user_data().category_path)?;
            tracing::info!(
                "{} - Found {} products",
                request.url(),
                products.items.len()
            );
            Ok(Extraction::items(products.items))
        })
        .build()
}

/// Top-level categories from the page footer
fn start(doc: &Document, base: &Url) -> Result<Extraction, ExtractError> {
    let html = doc.as_html()?;
    let links = selector(FOOTER_CATEGORY)?;
    let span = selector("span")?;

    let mut requests = Vec::new();
    for link in html.select(&links) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Ok(url) = base.join(href) else {
            tracing::warn!("Skipping category link with invalid href {}", href);
            continue;
        };
        let name = link.select(&span).next().map(text_of).unwrap_or_default();

        requests.push(
            Request::new(url.as_str(), Label::Category).with_user_data(UserData {
                category_path: vec![name],
                ..UserData::default()
            }),
        );
    }

    tracing::info!("Found {} categories", requests.len());
    Ok(Extraction::requests(requests))
}

/// A category page: descend into subcategories or read the product listing
fn category(doc: &Document, request: &Request, base: &Url) -> Result<Extraction, ExtractError> {
    let html = doc.as_html()?;
    let path = &request.user_data().category_path;

    if html.select(&selector(CATEGORY_TREE)?).next().is_some() {
        let requests = subcategories(html, path, base)?;
        tracing::info!("{} - Found {} categories", request.url(), requests.len());
        return Ok(Extraction::requests(requests));
    }

    let products = listing_products(html, path)?;
    let reported_total = product_count(html)?;
    tracing::info!(
        "{} - Found {} products of {}",
        request.url(),
        products.items.len(),
        reported_total
    );

    let category_id = if reported_total > products.tiles {
        let id = category_id(request.url(), html)?;
        if let Some(id) = &id {
            tracing::debug!("{} - Found category ID: {}", request.url(), id);
        }
        id
    } else {
        None
    };

    Ok(Extraction::items(products.items).with_pagination(PageCounts {
        observed: products.tiles,
        reported_total,
        category_id,
    }))
}

fn subcategories(html: &Html, path: &[String], base: &Url) -> Result<Vec<Request>, ExtractError> {
    let links = selector(SUBCATEGORY)?;

    let requests = html
        .select(&links)
        .filter_map(|link| {
            let url = base.join(link.value().attr("href")?).ok()?;
            let mut category_path = path.to_vec();
            category_path.push(text_of(link));
            Some(
                Request::new(url.as_str(), Label::Category).with_user_data(UserData {
                    category_path,
                    ..UserData::default()
                }),
            )
        })
        .collect();

    Ok(requests)
}

/// Fields of a product taken from the embedded JSON script
#[derive(Debug, Clone, PartialEq)]
struct ScriptProduct {
    item_id: String,
    item_url: String,
    in_stock: bool,
    current_price: Option<f64>,
}

/// Products of one listing page
struct ListingProducts {
    items: Vec<Item>,
    /// Non-sponsored tiles on the page, including ones that could not be joined
    tiles: u64,
}

fn listing_products(html: &Html, path: &[String]) -> Result<ListingProducts, ExtractError> {
    let script_products = script_products(html)?;

    let tiles = selector(PRODUCT_TILE)?;
    let sponsored = selector(SPONSORED_LABEL)?;
    let title = selector(".product__title")?;
    let source = selector("source")?;
    let rrp = selector(".price__note--rrp")?;
    let bread_crumbs = path.join(" > ");

    let mut items = Vec::new();
    let mut tile_count = 0;

    for tile in html.select(&tiles) {
        if tile.select(&sponsored).next().is_some() {
            continue;
        }
        tile_count += 1;

        let img = tile
            .select(&source)
            .next()
            .and_then(|s| s.value().attr("srcset"))
            .map(|srcset| srcset.trim().to_string());
        let Some(info) = img.as_ref().and_then(|img| script_products.get(img)) else {
            tracing::warn!("Skipping product tile without matching product data: {:?}", img);
            continue;
        };

        let name = tile.select(&title).next().map(text_of).unwrap_or_default();
        let list_price = tile.select(&rrp).next();

        let mut item = Item::new(info.item_id.as_str(), name, info.item_url.as_str());
        item.img = img;
        item.current_price = info.current_price;
        item.discounted = list_price.is_some();
        item.original_price = list_price.and_then(|e| clean_price(&text_of(e)));
        item.in_stock = info.in_stock;
        item.bread_crumbs = bread_crumbs.clone();
        items.push(item);
    }

    Ok(ListingProducts {
        items,
        tiles: tile_count,
    })
}

/// Reads the embedded product JSON, keyed by image URL
fn script_products(html: &Html) -> Result<HashMap<String, ScriptProduct>, ExtractError> {
    let scripts = selector("script[data-n-head]")?;
    let script = html
        .select(&scripts)
        .nth(1)
        .ok_or_else(|| ExtractError::Missing("embedded product data".to_string()))?;

    let value: Value = serde_json::from_str(&script.text().collect::<String>())?;
    let entries = value.as_array().ok_or_else(|| ExtractError::Malformed {
        field: "embedded product data".to_string(),
        value: "expected an array".to_string(),
    })?;

    let mut products = HashMap::new();
    for entry in entries {
        let image = match &entry["image"] {
            Value::Array(images) => images.first().and_then(Value::as_str),
            other => other.as_str(),
        };
        let (Some(image), Some(item_id)) = (image, value_to_string(&entry["sku"])) else {
            continue;
        };

        let offers = &entry["offers"];
        products.insert(
            image.to_string(),
            ScriptProduct {
                item_id,
                item_url: offers["url"].as_str().unwrap_or_default().to_string(),
                in_stock: offers["availability"].as_str() == Some(IN_STOCK),
                current_price: match &offers["price"] {
                    Value::String(s) => clean_price(s),
                    other => other.as_f64(),
                },
            },
        );
    }

    Ok(products)
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Total products in the listing, from the page counter
fn product_count(html: &Html) -> Result<u64, ExtractError> {
    let counter = html
        .select(&selector(PRODUCT_COUNT)?)
        .next()
        .ok_or_else(|| ExtractError::Missing(PRODUCT_COUNT.to_string()))?;

    let text: String = counter
        .text()
        .collect::<String>()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    parse_leading_count(&text).ok_or(ExtractError::Malformed {
        field: PRODUCT_COUNT.to_string(),
        value: text,
    })
}

/// Reads the digits a counter starts with, ignoring any trailing words
fn parse_leading_count(text: &str) -> Option<u64> {
    RE_LEADING_DIGITS.find(text)?.as_str().parse().ok()
}

/// Category id for page URLs, from the request URL or the page's scripts
fn category_id(request_url: &str, html: &Html) -> Result<Option<String>, ExtractError> {
    if request_url.contains("category") {
        let id = Url::parse(request_url)
            .ok()
            .and_then(|url| url.path_segments()?.nth(1).map(str::to_string))
            .filter(|id| !id.is_empty());
        return Ok(id);
    }

    let scripts = selector("script")?;
    let id = html
        .select(&scripts)
        .filter(|s| {
            let attrs = s.value();
            attrs.attr("src").is_none()
                && attrs.attr("data-n-head").is_none()
                && attrs.attr("type").is_none()
        })
        .find_map(|s| category_id_in_script(&s.text().collect::<String>()));

    Ok(id)
}

fn category_id_in_script(text: &str) -> Option<String> {
    RE_CATEGORY_ID
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
