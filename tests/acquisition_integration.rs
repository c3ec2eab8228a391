//! Integration tests for the acquisition chain against mock sources.
//!
//! Every source lives on one mock server; unmounted paths answer 404, which
//! the strategies treat as "nothing here".

mod support;

use paperbot_core::{AcquisitionResult, PipelineConfig, Record, StrategyChain};
use serde_json::json;
use support::socket_guard::start_mock_server_or_skip;
use support::{html_response, mock_config, pdf_bytes, pdf_response};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOI: &str = "10.1000/xyz";

fn keyed_record() -> Record {
    let mut record = Record::with_identifier(DOI);
    record.assign_citekey("Smith2020Dee");
    record
}

async fn unpaywall_points_at(server: &MockServer, url: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/{DOI}")))
        .and(query_param("email", "paperbot@example.org"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "doi": DOI,
            "best_oa_location": { "url_for_pdf": url, "url": null }
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn acquire(config: &PipelineConfig, record: &mut Record) -> AcquisitionResult {
    let chain = StrategyChain::from_config(config).unwrap();
    chain.acquire(record, config.output_dir()).await
}

#[tokio::test]
async fn test_unpaywall_pdf_is_saved_under_citekey() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let pdf_url = format!("{}/oa/xyz.pdf", server.uri());
    unpaywall_points_at(&server, &pdf_url).await;
    Mock::given(method("GET"))
        .and(path("/oa/xyz.pdf"))
        .respond_with(pdf_response(4096))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = mock_config(dir.path(), &server.uri());
    std::fs::create_dir_all(config.output_dir()).unwrap();
    let mut record = keyed_record();

    let result = acquire(&config, &mut record).await;

    let expected = config.output_dir().join("Smith2020Dee.pdf");
    assert_eq!(
        result,
        AcquisitionResult::Downloaded {
            source: "Unpaywall".to_string(),
            path: expected.clone(),
        }
    );
    assert_eq!(std::fs::read(&expected).unwrap(), pdf_bytes(4096));
    assert_eq!(record.acquisition().source(), Some("Unpaywall"));
    assert_eq!(record.acquisition().local_path(), Some(expected.as_path()));
}

#[tokio::test]
async fn test_landing_page_meta_link_is_followed_once() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let landing = format!("{}/article/xyz", server.uri());
    unpaywall_points_at(&server, &landing).await;
    Mock::given(method("GET"))
        .and(path("/article/xyz"))
        .respond_with(html_response(
            r#"<html><head><meta name="citation_pdf_url" content="/content/xyz.pdf"></head></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/content/xyz.pdf"))
        .respond_with(pdf_response(2048))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = mock_config(dir.path(), &server.uri());
    std::fs::create_dir_all(config.output_dir()).unwrap();
    let mut record = keyed_record();

    let result = acquire(&config, &mut record).await;
    assert!(matches!(result, AcquisitionResult::Downloaded { ref source, .. } if source == "Unpaywall"));
}

#[tokio::test]
async fn test_undersized_payload_falls_through_to_doi_link() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let tiny_url = format!("{}/oa/tiny.pdf", server.uri());
    unpaywall_points_at(&server, &tiny_url).await;
    Mock::given(method("GET"))
        .and(path("/oa/tiny.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF".to_vec(), "application/pdf"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{DOI}")))
        .respond_with(html_response(
            r#"<a href="/files/paper.pdf?download=1">Download PDF</a>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/paper.pdf"))
        .respond_with(pdf_response(8192))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = mock_config(dir.path(), &server.uri());
    std::fs::create_dir_all(config.output_dir()).unwrap();
    let mut record = keyed_record();

    let result = acquire(&config, &mut record).await;
    assert!(matches!(result, AcquisitionResult::Downloaded { ref source, .. } if source == "DOI link"));
    let saved = std::fs::metadata(config.output_dir().join("Smith2020Dee.pdf")).unwrap();
    assert_eq!(saved.len(), 8192);
}

#[tokio::test]
async fn test_preprint_match_requires_similar_title() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let atom = format!(
        r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom"><entry>
<id>http://arxiv.org/abs/2001.00001v1</id>
<title>Deep Learning
  Survey</title>
<link title="pdf" href="{}/arxiv/pdf/2001.00001v1" rel="related" type="application/pdf"/>
</entry></feed>"#,
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(atom, "application/atom+xml"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/arxiv/pdf/2001.00001v1"))
        .respond_with(pdf_response(4096))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = mock_config(dir.path(), &server.uri());
    std::fs::create_dir_all(config.output_dir()).unwrap();

    let mut matching = Record::with_title("Deep Learning Survey");
    matching.set_authors_joined("Smith, Jane");
    matching.origin_link = Some("https://scholar.example/deep".to_string());
    matching.assign_citekey("Smith2020Dee");
    let result = acquire(&config, &mut matching).await;
    assert!(matches!(result, AcquisitionResult::Downloaded { ref source, .. } if source == "arXiv"));

    let mut unrelated = Record::with_title("Protein Folding at Scale");
    unrelated.origin_link = Some("https://scholar.example/protein".to_string());
    unrelated.assign_citekey("Doe2021Pro");
    let result = acquire(&config, &mut unrelated).await;
    assert!(matches!(result, AcquisitionResult::Exhausted { .. }));
    assert!(!unrelated.acquisition().is_downloaded());
}

#[tokio::test]
async fn test_tertiary_mirror_iframe_is_scraped() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path(format!("/fixed-mirror/{DOI}")))
        .respond_with(html_response(
            r#"<div id="article"><iframe id="pdf" src="/storage/xyz.pdf#view=FitH"></iframe></div>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/storage/xyz.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_bytes(4096), "application/octet-stream"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = mock_config(dir.path(), &server.uri());
    config.endpoints.scihub_override = Some(format!("{}/fixed-mirror", server.uri()));
    std::fs::create_dir_all(config.output_dir()).unwrap();
    let mut record = keyed_record();

    let result = acquire(&config, &mut record).await;
    assert!(matches!(result, AcquisitionResult::Downloaded { ref source, .. } if source == "SciHub"));
}

#[tokio::test]
async fn test_html_disguised_as_pdf_is_rejected() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let fake = format!("{}/oa/fake.pdf", server.uri());
    unpaywall_points_at(&server, &fake).await;
    let mut page = b"<!DOCTYPE html><html><body>Access denied".to_vec();
    page.resize(4096, b' ');
    Mock::given(method("GET"))
        .and(path("/oa/fake.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(page, "application/pdf"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = mock_config(dir.path(), &server.uri());
    std::fs::create_dir_all(config.output_dir()).unwrap();
    let mut record = keyed_record();

    let result = acquire(&config, &mut record).await;
    assert!(matches!(result, AcquisitionResult::Exhausted { .. }));
    assert!(!config.output_dir().join("Smith2020Dee.pdf").exists());
}

#[tokio::test]
async fn test_existing_file_gets_counter_prefix() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let pdf_url = format!("{}/oa/xyz.pdf", server.uri());
    unpaywall_points_at(&server, &pdf_url).await;
    Mock::given(method("GET"))
        .and(path("/oa/xyz.pdf"))
        .respond_with(pdf_response(4096))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = mock_config(dir.path(), &server.uri());
    std::fs::create_dir_all(config.output_dir()).unwrap();
    std::fs::write(config.output_dir().join("Smith2020Dee.pdf"), b"older copy").unwrap();
    let mut record = keyed_record();

    let result = acquire(&config, &mut record).await;
    assert_eq!(
        result,
        AcquisitionResult::Downloaded {
            source: "Unpaywall".to_string(),
            path: config.output_dir().join("(2)Smith2020Dee.pdf"),
        }
    );
    assert_eq!(
        std::fs::read(config.output_dir().join("Smith2020Dee.pdf")).unwrap(),
        b"older copy"
    );
}

#[tokio::test]
async fn test_record_without_identifier_or_link_is_ineligible() {
    let dir = TempDir::new().unwrap();
    let config = mock_config(dir.path(), "http://127.0.0.1:9");
    let mut record = Record::with_title("Orphan");
    assert_eq!(acquire(&config, &mut record).await, AcquisitionResult::Ineligible);
}
