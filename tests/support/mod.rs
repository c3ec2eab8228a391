//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use std::path::Path;

use paperbot_core::PipelineConfig;
use serde_json::{Value, json};
use wiremock::ResponseTemplate;

/// A PDF-looking body of `len` bytes.
pub fn pdf_bytes(len: usize) -> Vec<u8> {
    let mut body = b"%PDF-1.4\n".to_vec();
    body.resize(len, b'0');
    body
}

pub fn pdf_response(len: usize) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(pdf_bytes(len), "application/pdf")
}

pub fn html_response(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/html; charset=utf-8")
}

/// Offline-safe configuration: every endpoint at `base`, cache and output under `dir`.
pub fn mock_config(dir: &Path, base: &str) -> PipelineConfig {
    let mut config = PipelineConfig::for_mock_server(dir.join("papers"), base);
    config.cache_path = dir.join("cache").join("metadata.json");
    config
}

/// A Crossref envelope around `message`.
pub fn crossref_ok(message: Value) -> Value {
    json!({ "status": "ok", "message-type": "work-list", "message": message })
}

pub fn crossref_work(doi: &str, title: &str, family: &str, given: &str, year: i32) -> Value {
    json!({
        "DOI": doi,
        "title": [title],
        "author": [{ "family": family, "given": given }],
        "created": { "date-parts": [[year, 1, 15]] }
    })
}

pub fn bibtex_for(key: &str, title: &str, year: i32) -> String {
    format!(
        "@article{{{key}, title={{{title}}}, author={{Smith, Jane}}, journal={{Journal of Tests}}, year={year}}}"
    )
}
