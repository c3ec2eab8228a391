//! Integration tests for metadata resolution against a mock registry.

mod support;

use paperbot_core::cache::{CacheEntry, CacheStore, MetadataCache, now_timestamp};
use paperbot_core::{MetadataResolver, Record, Resolution, normalize_title};
use serde_json::json;
use support::socket_guard::start_mock_server_or_skip;
use support::{bibtex_for, crossref_ok, crossref_work, mock_config};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TITLE: &str = "Deep Learning Survey";

async fn mount_registry(server: &MockServer, search_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/works"))
        .and(query_param("query.bibliographic", "deep learning survey"))
        .respond_with(ResponseTemplate::new(200).set_body_json(crossref_ok(json!({
            "items": [
                crossref_work("10.1000/other", "Shallow Learning Notes", "Doe", "A", 2019),
                crossref_work("10.1000/DLS", TITLE, "Smith", "Jane", 2020),
            ]
        }))))
        .expect(search_calls)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/works/10\.1000(%2F|/)dls/transform/application/x-bibtex$"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(bibtex_for("Smith_2020", TITLE, 2020)),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/graph/v1/paper/DOI:"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "abstract": "We <i>survey</i> deep learning." })),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_title_resolution_fills_record_and_cache() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_registry(&server, 1).await;
    let dir = TempDir::new().unwrap();
    let config = mock_config(dir.path(), &server.uri());
    let resolver = MetadataResolver::from_config(&config).unwrap();

    let mut record = Record::with_title(TITLE);
    let mut cache = MetadataCache::new();
    let resolution = resolver.resolve(&mut record, &mut cache).await;

    assert!(matches!(resolution, Resolution::Matched { .. }));
    assert_eq!(record.identifier.as_deref(), Some("10.1000/dls"));
    assert_eq!(record.authors, vec!["Smith, Jane"]);
    assert_eq!(record.year.as_deref(), Some("2020"));
    assert_eq!(record.journal.as_deref(), Some("Journal of Tests"));
    let bibtex = record.bibtex.as_deref().unwrap();
    assert!(bibtex.contains("abstract"));
    assert!(bibtex.contains("We survey deep learning."));

    let entry = cache.get(&normalize_title(TITLE)).unwrap();
    assert_eq!(entry.identifier.as_deref(), Some("10.1000/dls"));
    assert_eq!(entry.authors.as_deref(), Some("Smith, Jane"));
}

#[tokio::test]
async fn test_second_run_is_served_from_persisted_cache() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_registry(&server, 1).await;
    let dir = TempDir::new().unwrap();
    let config = mock_config(dir.path(), &server.uri());
    let store = CacheStore::new(&config.cache_path);

    let resolver = MetadataResolver::from_config(&config).unwrap();
    let mut cache = store.load().await;
    let mut first = Record::with_title(TITLE);
    resolver.resolve(&mut first, &mut cache).await;
    store.save(&cache).await.unwrap();

    let mut reloaded = store.load().await;
    assert_eq!(reloaded.len(), 1);
    let mut second = Record::with_title("deep learning survey!");
    let resolution = resolver.resolve(&mut second, &mut reloaded).await;

    assert_eq!(resolution, Resolution::Cached);
    assert_eq!(second.identifier, first.identifier);
    assert_eq!(second.authors, first.authors);
}

#[tokio::test]
async fn test_stale_cache_entry_is_refreshed() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_registry(&server, 1).await;
    let dir = TempDir::new().unwrap();
    let config = mock_config(dir.path(), &server.uri());
    let resolver = MetadataResolver::from_config(&config).unwrap();

    let mut cache = MetadataCache::new();
    cache.insert(
        normalize_title(TITLE),
        CacheEntry {
            timestamp: now_timestamp() - config.cache_horizon.as_secs_f64() - 1.0,
            identifier: Some("10.1000/stale".to_string()),
            authors: Some("Old, Author".to_string()),
            bibtex: None,
            normalized_title: Some(normalize_title(TITLE)),
        },
    );

    let mut record = Record::with_title(TITLE);
    let resolution = resolver.resolve(&mut record, &mut cache).await;

    assert!(matches!(resolution, Resolution::Matched { .. }));
    assert_eq!(record.identifier.as_deref(), Some("10.1000/dls"));
    assert_eq!(
        cache.get(&normalize_title(TITLE)).unwrap().identifier.as_deref(),
        Some("10.1000/dls")
    );
}

#[tokio::test]
async fn test_unmatched_title_leaves_cache_untouched() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/works"))
        .respond_with(ResponseTemplate::new(200).set_body_json(crossref_ok(json!({
            "items": [crossref_work("10.1000/x", "Something Else Entirely", "Doe", "A", 2019)]
        }))))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let config = mock_config(dir.path(), &server.uri());
    let resolver = MetadataResolver::from_config(&config).unwrap();

    let mut record = Record::with_title("Quantum Gardening Handbook");
    let mut cache = MetadataCache::new();
    let resolution = resolver.resolve(&mut record, &mut cache).await;

    assert_eq!(resolution, Resolution::Unmatched);
    assert!(record.identifier.is_none());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_registry_outage_is_not_fatal() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let config = mock_config(dir.path(), &server.uri());
    let resolver = MetadataResolver::from_config(&config).unwrap();

    let mut record = Record::with_title(TITLE);
    let mut cache = MetadataCache::new();
    assert_eq!(
        resolver.resolve(&mut record, &mut cache).await,
        Resolution::Unmatched
    );

    let mut by_id = Record::with_identifier("10.1000/dls");
    assert_eq!(resolver.resolve_identifier(&mut by_id).await, Resolution::Unmatched);
    assert_eq!(by_id.identifier.as_deref(), Some("10.1000/dls"));
    assert!(by_id.is_acquirable());
}

#[tokio::test]
async fn test_identifier_lookup_fills_title_authors_and_year() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path_regex(r"^/works/10\.1000(%2F|/)dls$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(crossref_ok(crossref_work(
            "10.1000/dls",
            TITLE,
            "Smith",
            "Jane",
            2020,
        ))))
        .mount(&server)
        .await;
    mount_registry(&server, 0).await;
    let dir = TempDir::new().unwrap();
    let config = mock_config(dir.path(), &server.uri());
    let resolver = MetadataResolver::from_config(&config).unwrap();

    let mut record = Record::with_identifier("10.1000/DLS");
    let resolution = resolver.resolve_identifier(&mut record).await;

    assert!(resolution.is_resolved());
    assert_eq!(record.title.as_deref(), Some(TITLE));
    assert_eq!(record.authors, vec!["Smith, Jane"]);
    assert_eq!(record.year.as_deref(), Some("2020"));
    assert!(record.bibtex.is_some());
}
