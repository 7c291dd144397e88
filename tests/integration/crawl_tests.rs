//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end against a temporary database.

use catalog_crawler::config::{
    Config, CrawlerConfig, OutputConfig, PaginationConfig, SiteConfig, StartEntry,
    UserAgentConfig,
};
use catalog_crawler::crawler::{
    Document, ExtractError, Extraction, Item, Label, Orchestrator, PageCounts, Request, Router,
};
use catalog_crawler::output::MemorySink;
use catalog_crawler::sites::{billa, kaufland};
use catalog_crawler::state::counters::{CATEGORIES, DUPLICATES, PRODUCTS};
use catalog_crawler::storage::{RunStatus, SqliteStorage, Storage};
use catalog_crawler::CrawlError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration writing into `dir`
fn create_test_config(dir: &Path, start: Vec<StartEntry>, pagination: PaginationConfig) -> Config {
    Config {
        crawler: CrawlerConfig {
            max_retries: 3,
            max_requests_per_minute: 60_000,
            max_concurrent_requests: 4,
            retry_delay_ms: 10,
            checkpoint_interval_secs: 60,
            request_timeout_secs: 5,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: dir.join("crawl.db").to_string_lossy().into_owned(),
            dataset_path: dir.join("dataset.jsonl").to_string_lossy().into_owned(),
        },
        site: SiteConfig {
            name: "test".to_string(),
            base_url: None,
            start,
            pagination,
        },
    }
}

fn counted(page_size: u32) -> PaginationConfig {
    PaginationConfig::CountedTotal {
        page_size,
        page_param: "page".to_string(),
    }
}

fn start(url: String, label: Label) -> StartEntry {
    StartEntry { url, label }
}

#[derive(Deserialize)]
struct Listing {
    total: u64,
    count: u64,
    ids: Vec<String>,
}

/// JSON listing: one item per id, paginated by the reported counts
fn listing(doc: &Document, request: &Request) -> Result<Extraction, ExtractError> {
    let listing: Listing = serde_json::from_value(doc.as_json()?.clone())?;
    let items = listing
        .ids
        .iter()
        .map(|id| {
            Item::new(
                id.as_str(),
                format!("Product {}", id),
                format!("{}#{}", request.url(), id),
            )
        })
        .collect();

    Ok(Extraction::items(items).with_pagination(PageCounts {
        observed: listing.count,
        reported_total: listing.total,
        category_id: None,
    }))
}

fn listing_router() -> Router {
    Router::builder("test", &[Label::Category])
        .json(Label::Category, listing)
        .build()
        .expect("Failed to build router")
}

fn listing_body(total: u64, ids: &[String]) -> String {
    serde_json::json!({
        "total": total,
        "count": ids.len(),
        "ids": ids,
    })
    .to_string()
}

fn ids(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}-{}", prefix, i)).collect()
}

async fn mount_listing(server: &MockServer, route: &str, page: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(query_param("page", page))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_counted_pagination_walks_every_page() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    mount_listing(&mock_server, "/api/products", "0", listing_body(1200, &ids("p0", 500))).await;
    mount_listing(&mock_server, "/api/products", "1", listing_body(1200, &ids("p1", 500))).await;
    mount_listing(&mock_server, "/api/products", "2", listing_body(1200, &ids("p2", 200))).await;

    let config = create_test_config(
        temp_dir.path(),
        vec![start(
            format!("{}/api/products?page=0", mock_server.uri()),
            Label::Category,
        )],
        counted(500),
    );
    let sink = MemorySink::new();

    let report = Orchestrator::new(config, listing_router(), Box::new(sink.clone()))
        .run()
        .await
        .expect("Crawl failed");

    assert_eq!(report.requests_processed, 3);
    assert_eq!(report.requests_failed, 0);
    assert_eq!(report.counter(PRODUCTS), 1200);
    assert_eq!(report.counter(DUPLICATES), 0);
    assert_eq!(report.counter(CATEGORIES), 1);
    assert_eq!(report.processed_ids, 1200);
    assert_eq!(sink.len(), 1200);

    let storage = SqliteStorage::new(&temp_dir.path().join("crawl.db")).unwrap();
    let run = storage.get_run(report.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(storage.load_processed_ids().unwrap().len(), 1200);
    assert_eq!(storage.load_stats(report.run_id).unwrap()[PRODUCTS], 1200);
}

fn kaufland_listing(skus: &[&str], total: Option<u64>, category_id: Option<&str>) -> String {
    let entries: Vec<serde_json::Value> = skus
        .iter()
        .map(|sku| {
            serde_json::json!({
                "sku": sku,
                "image": format!("https://img.test/{}.jpg", sku),
                "offers": {
                    "url": format!("https://shop.test/product/{}/", sku),
                    "price": 10.5,
                    "availability": "https://schema.org/InStock",
                },
            })
        })
        .collect();

    let tiles: String = skus
        .iter()
        .map(|sku| {
            format!(
                r#"<article class="product">
                     <picture><source srcset="https://img.test/{sku}.jpg"></picture>
                     <div class="product__title">Product {sku}</div>
                   </article>"#,
                sku = sku
            )
        })
        .collect();

    let counter = total
        .map(|total| format!(r#"<span class="product-count">{}</span>"#, total))
        .unwrap_or_default();
    let nuxt = category_id
        .map(|id| format!(r#"<script>window.__NUXT__={{route:{{url:"/category/{}/"}}}}</script>"#, id))
        .unwrap_or_default();

    format!(
        r#"<html><head>
             <script data-n-head="ssr" type="application/ld+json">{{"@type": "Organization"}}</script>
             <script data-n-head="ssr" type="application/ld+json">{}</script>
             {}
           </head><body>{}{}</body></html>"#,
        serde_json::Value::Array(entries),
        nuxt,
        counter,
        tiles
    )
}

async fn mount_html(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_kaufland_derived_pagination() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let base_url = mock_server.uri();

    mount_html(
        &mock_server,
        "/",
        r#"<html><body><ul>
             <li class="rd-footer_navigation-link-list-item"><a href="/elektronika/"><span>Elektronika</span></a></li>
           </ul></body></html>"#
            .to_string(),
    )
    .await;
    mount_html(
        &mock_server,
        "/elektronika/",
        kaufland_listing(&["1", "2"], Some(5), Some("42")),
    )
    .await;
    mount_html(
        &mock_server,
        "/category/42/p2/",
        kaufland_listing(&["3", "4"], None, None),
    )
    .await;
    mount_html(
        &mock_server,
        "/category/42/p3/",
        kaufland_listing(&["5"], None, None),
    )
    .await;

    let mut config = create_test_config(
        temp_dir.path(),
        vec![start(format!("{}/", base_url), Label::Start)],
        PaginationConfig::DerivedPageCount {
            page_url_template: format!("{}/category/{{category}}/p{{page}}/", base_url),
        },
    );
    config.site.name = kaufland::NAME.to_string();
    config.site.base_url = Some(base_url.clone());

    let router = kaufland::router(&config.site).expect("Failed to build router");
    let sink = MemorySink::new();

    let report = Orchestrator::new(config, router, Box::new(sink.clone()))
        .run()
        .await
        .expect("Crawl failed");

    assert_eq!(report.requests_processed, 4);
    assert_eq!(report.counter(CATEGORIES), 1);
    assert_eq!(report.counter(PRODUCTS), 5);

    let mut item_ids: Vec<String> = sink.items().into_iter().map(|i| i.item_id).collect();
    item_ids.sort();
    assert_eq!(item_ids, vec!["1", "2", "3", "4", "5"]);
    assert!(sink
        .items()
        .iter()
        .all(|item| item.bread_crumbs == "Elektronika"));
}

#[tokio::test]
async fn test_billa_start_page_to_api_listing() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let base_url = mock_server.uri();

    mount_html(
        &mock_server,
        "/",
        r#"<html><body>
             <a class="ws-card" data-teaser-name="Pečivo" href="/produkty/pecivo-1200">Pečivo</a>
           </body></html>"#
            .to_string(),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/api/categories/pecivo-1200/products"))
        .and(query_param("page", "0"))
        .and(query_param("pageSize", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"total": 2, "count": 2, "results": [
                {"sku": "100-1", "slug": "rohlik", "name": "Rohlík",
                 "price": {"regular": {"value": 390}}},
                {"sku": "100-2", "slug": "chleb", "name": "Chléb",
                 "price": {"regular": {"value": 3990}}}
            ]}"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(
        temp_dir.path(),
        vec![start(format!("{}/", base_url), Label::Start)],
        counted(2),
    );
    config.site.name = billa::NAME.to_string();
    config.site.base_url = Some(base_url.clone());

    let router = billa::router(&config.site).expect("Failed to build router");
    let sink = MemorySink::new();

    let report = Orchestrator::new(config, router, Box::new(sink.clone()))
        .run()
        .await
        .expect("Crawl failed");

    assert_eq!(report.counter(CATEGORIES), 1);
    assert_eq!(report.counter(PRODUCTS), 2);

    let items = sink.items();
    let rohlik = items.iter().find(|i| i.item_id == "1001").unwrap();
    assert_eq!(rohlik.item_url, format!("{}/produkt/rohlik", base_url));
    assert_eq!(rohlik.current_price, Some(3.9));
}

#[tokio::test]
async fn test_exhausted_retries_do_not_stop_the_crawl() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/api/broken"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;
    mount_listing(&mock_server, "/api/ok", "0", listing_body(2, &ids("ok", 2))).await;

    let config = create_test_config(
        temp_dir.path(),
        vec![
            start(format!("{}/api/broken?page=0", mock_server.uri()), Label::Category),
            start(format!("{}/api/ok?page=0", mock_server.uri()), Label::Category),
        ],
        counted(500),
    );

    let abandoned = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&abandoned);

    let report = Orchestrator::new(config, listing_router(), Box::new(MemorySink::new()))
        .with_failure_handler(move |_, failure| {
            assert_eq!(failure.attempts, 3);
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .run()
        .await
        .expect("Crawl failed");

    assert_eq!(abandoned.load(Ordering::SeqCst), 1);
    assert_eq!(report.requests_failed, 1);
    assert_eq!(report.requests_processed, 1);
    assert_eq!(report.counter(PRODUCTS), 2);

    let storage = SqliteStorage::new(&temp_dir.path().join("crawl.db")).unwrap();
    let failures = storage.get_failed_requests(report.run_id).unwrap();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].url.ends_with("/api/broken?page=0"));
    assert_eq!(failures[0].label, "category");
    assert_eq!(failures[0].attempts, 3);
}

#[tokio::test]
async fn test_second_run_over_same_input_saves_nothing() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/api/products"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_body(4, &ids("x", 4))))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = create_test_config(
        temp_dir.path(),
        vec![start(
            format!("{}/api/products?page=0", mock_server.uri()),
            Label::Category,
        )],
        counted(500),
    );

    let first_sink = MemorySink::new();
    let first = Orchestrator::new(config.clone(), listing_router(), Box::new(first_sink.clone()))
        .run()
        .await
        .expect("First crawl failed");
    assert_eq!(first.counter(PRODUCTS), 4);
    assert_eq!(first_sink.len(), 4);

    let second_sink = MemorySink::new();
    let second = Orchestrator::new(config, listing_router(), Box::new(second_sink.clone()))
        .run()
        .await
        .expect("Second crawl failed");

    assert_ne!(second.run_id, first.run_id);
    assert!(!second.resumed);
    assert_eq!(second.counter(PRODUCTS), 0);
    assert_eq!(second.counter(DUPLICATES), 4);
    assert!(second_sink.is_empty());
}

#[tokio::test]
async fn test_fresh_run_forgets_processed_ids() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/api/products"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_body(3, &ids("f", 3))))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = create_test_config(
        temp_dir.path(),
        vec![start(
            format!("{}/api/products?page=0", mock_server.uri()),
            Label::Category,
        )],
        counted(500),
    );

    Orchestrator::new(config.clone(), listing_router(), Box::new(MemorySink::new()))
        .run()
        .await
        .expect("First crawl failed");

    let sink = MemorySink::new();
    let report = Orchestrator::new(config, listing_router(), Box::new(sink.clone()))
        .fresh(true)
        .run()
        .await
        .expect("Fresh crawl failed");

    assert_eq!(report.counter(PRODUCTS), 3);
    assert_eq!(report.counter(DUPLICATES), 0);
    assert_eq!(sink.len(), 3);
}

#[tokio::test]
async fn test_interrupted_run_resumes_with_its_state() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("crawl.db");

    // A crashed run: still marked running, two items already emitted
    let run_id = {
        let mut storage = SqliteStorage::new(&db_path).unwrap();
        let run_id = storage.create_run("").unwrap();
        let mut stats = BTreeMap::new();
        stats.insert(PRODUCTS.to_string(), 2);
        stats.insert(CATEGORIES.to_string(), 1);
        storage
            .save_checkpoint(run_id, &stats, &["A".to_string(), "B".to_string()])
            .unwrap();
        run_id
    };

    let crawl_ids = vec!["A".to_string(), "B".to_string(), "C".to_string()];
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_body(3, &crawl_ids)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(
        temp_dir.path(),
        vec![start(
            format!("{}/api/products?page=0", mock_server.uri()),
            Label::Category,
        )],
        counted(500),
    );
    let sink = MemorySink::new();

    let report = Orchestrator::new(config, listing_router(), Box::new(sink.clone()))
        .run()
        .await
        .expect("Crawl failed");

    assert!(report.resumed);
    assert_eq!(report.run_id, run_id);
    assert_eq!(report.counter(PRODUCTS), 3);
    assert_eq!(report.counter(DUPLICATES), 2);
    assert_eq!(report.counter(CATEGORIES), 2);
    assert_eq!(report.processed_ids, 3);

    let emitted: Vec<String> = sink.items().into_iter().map(|i| i.item_id).collect();
    assert_eq!(emitted, vec!["C"]);
}

#[tokio::test]
async fn test_counters_match_observed_items() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let shared = |extra: &str| {
        vec![
            "shared-1".to_string(),
            "shared-2".to_string(),
            extra.to_string(),
        ]
    };
    mount_listing(&mock_server, "/api/a", "0", listing_body(3, &shared("a-only"))).await;
    mount_listing(&mock_server, "/api/b", "0", listing_body(3, &shared("b-only"))).await;
    mount_listing(&mock_server, "/api/c", "0", listing_body(3, &shared("c-only"))).await;

    let config = create_test_config(
        temp_dir.path(),
        ["a", "b", "c"]
            .iter()
            .map(|c| start(format!("{}/api/{}?page=0", mock_server.uri(), c), Label::Category))
            .collect(),
        counted(500),
    );
    let sink = MemorySink::new();

    let report = Orchestrator::new(config, listing_router(), Box::new(sink.clone()))
        .run()
        .await
        .expect("Crawl failed");

    assert_eq!(report.counter(CATEGORIES), 3);
    assert_eq!(report.counter(PRODUCTS) + report.counter(DUPLICATES), 9);
    assert_eq!(report.counter(PRODUCTS), 5);
    assert_eq!(sink.len(), 5);
    assert_eq!(report.processed_ids, 5);
}

#[tokio::test]
async fn test_extraction_failure_skips_only_that_page() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/api/garbled"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_listing(&mock_server, "/api/ok", "0", listing_body(2, &ids("ok", 2))).await;

    let config = create_test_config(
        temp_dir.path(),
        vec![
            start(format!("{}/api/garbled?page=0", mock_server.uri()), Label::Category),
            start(format!("{}/api/ok?page=0", mock_server.uri()), Label::Category),
        ],
        counted(500),
    );

    let report = Orchestrator::new(config, listing_router(), Box::new(MemorySink::new()))
        .run()
        .await
        .expect("Crawl failed");

    assert_eq!(report.extraction_failures, 1);
    assert_eq!(report.requests_processed, 1);
    assert_eq!(report.requests_failed, 0);
    assert_eq!(report.counter(PRODUCTS), 2);
    assert_eq!(report.counter(CATEGORIES), 1);
}

fn start_with_unrouted_link(doc: &Document, request: &Request) -> Result<Extraction, ExtractError> {
    let html = doc.as_html()?;
    let products = scraper::Selector::parse("li.product").unwrap();
    let links = scraper::Selector::parse("a.next").unwrap();

    let items = html
        .select(&products)
        .filter_map(|li| li.value().attr("data-id"))
        .map(|id| Item::new(id, id, format!("{}#{}", request.url(), id)))
        .collect();
    let requests = html
        .select(&links)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| Request::new(href, Label::Page))
        .collect();

    Ok(Extraction {
        items,
        requests,
        pagination: None,
    })
}

#[tokio::test]
async fn test_unrouted_label_is_fatal_but_state_is_flushed() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let base_url = mock_server.uri();

    mount_html(
        &mock_server,
        "/",
        format!(
            r#"<html><body><ul>
                 <li class="product" data-id="X">X</li>
                 <li class="product" data-id="Y">Y</li>
               </ul><a class="next" href="{}/more">more</a></body></html>"#,
            base_url
        ),
    )
    .await;
    mount_html(&mock_server, "/more", "<html></html>".to_string()).await;

    let router = Router::builder("test", &[Label::Start, Label::Category])
        .html(Label::Start, start_with_unrouted_link)
        .json(Label::Category, listing)
        .build()
        .expect("Failed to build router");

    let config = create_test_config(
        temp_dir.path(),
        vec![start(format!("{}/", base_url), Label::Start)],
        counted(500),
    );

    let result = Orchestrator::new(config, router, Box::new(MemorySink::new()))
        .run()
        .await;

    match result {
        Err(CrawlError::UnroutedLabel { label, url }) => {
            assert_eq!(label, Label::Page);
            assert!(url.ends_with("/more"));
        }
        other => panic!("expected an unrouted label error, got {:?}", other.map(|r| r.run_id)),
    }

    let storage = SqliteStorage::new(&temp_dir.path().join("crawl.db")).unwrap();
    let mut ids = storage.load_processed_ids().unwrap();
    ids.sort();
    assert_eq!(ids, vec!["X", "Y"]);

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(storage.load_stats(run.id).unwrap()[PRODUCTS], 2);
}

#[tokio::test]
async fn test_start_label_without_handler_is_rejected_up_front() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(
        temp_dir.path(),
        vec![start("http://127.0.0.1:1/".to_string(), Label::Start)],
        counted(500),
    );

    let result = Orchestrator::new(config, listing_router(), Box::new(MemorySink::new()))
        .run()
        .await;

    assert!(matches!(result, Err(CrawlError::Config(_))));
}
