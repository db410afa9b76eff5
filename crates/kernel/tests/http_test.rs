#![allow(clippy::unwrap_used, clippy::expect_used)]
//! HTTP integration tests for the listing API.
//!
//! These run the real router and listing registry; agreements and
//! preventive maintenance are served from fixtures, and the database pool
//! points at a closed port.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;

#[tokio::test]
async fn lists_registered_listings() {
    let app = TestApp::new();
    let (status, body) = app.get_json("/api/listings").await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["agreements", "preventive_maintenance", "service_records"]
    );
    assert_eq!(body[0]["levels"].as_array().unwrap().len(), 4);
    assert_eq!(body[1]["flat"], json!(true));
}

#[tokio::test]
async fn unknown_listing_is_404() {
    let app = TestApp::new();
    let (status, body) = app.get_json("/api/listings/invoices").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("listing 'invoices' not found"));

    let (status, _) = app.get_json("/api/listings/invoices/export").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pages_fan_out_listing() {
    let app = TestApp::new();
    let (status, body) = app
        .get_json("/api/listings/agreements?sort=unit:asc,bogus&per_page=4&page=2")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["listing"], json!("agreements"));
    assert_eq!(body["sort"], json!([{"field": "unit", "direction": "asc"}]));
    assert_eq!(body["total"], json!(6));
    assert_eq!(body["total_pages"], json!(2));
    assert_eq!(body["page"], json!(2));
    assert_eq!(body["has_prev"], json!(true));
    assert_eq!(body["has_next"], json!(false));

    let units: Vec<_> = body["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["unit_number"].clone())
        .collect();
    assert_eq!(units, vec![json!("TRK-5"), json!("TRL-1")]);
}

#[tokio::test]
async fn filters_reach_the_listing() {
    let app = TestApp::new();
    let (status, body) = app
        .get_json("/api/listings/agreements?status=active&unit=trk-3")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(1));
    assert_eq!(body["rows"][0]["agreement_number"], json!("AG-003"));
    assert_eq!(body["rows"][0]["unit_number"], json!("TRK-3"));
}

#[tokio::test]
async fn malformed_paging_is_clamped() {
    let app = TestApp::new();
    let (status, body) = app
        .get_json("/api/listings/preventive_maintenance?page=abc&per_page=5000")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page"], json!(1));
    assert_eq!(body["per_page"], json!(100));
    assert_eq!(body["rows"].as_array().unwrap().len(), 7);

    let (_, body) = app
        .get_json("/api/listings/preventive_maintenance?per_page=-3")
        .await;
    assert_eq!(body["per_page"], json!(1));
    assert_eq!(body["total_pages"], json!(7));
}

#[tokio::test]
async fn default_sort_is_reported() {
    let app = TestApp::new();
    let (_, body) = app.get_json("/api/listings/preventive_maintenance").await;

    assert_eq!(body["sort"], json!([{"field": "id", "direction": "desc"}]));
    assert_eq!(body["per_page"], json!(25));
    assert_eq!(body["rows"][0]["schedule_id"], json!(7));
}

#[tokio::test]
async fn export_matches_listing_order() {
    let app = TestApp::new();
    let (status, body) = app
        .get_json("/api/listings/agreements/export?sort=unit:desc")
        .await;

    assert_eq!(status, StatusCode::OK);
    let labels: Vec<_> = body["columns"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["label"].as_str().unwrap().to_string())
        .collect();
    let unit = labels.iter().position(|l| l == "Unit").unwrap();

    let rows = body["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[0][unit], json!("TRL-1"));
    assert_eq!(rows[5][unit], json!("TRK-1"));
}

#[tokio::test]
async fn database_backed_listing_reports_fetch_failure() {
    let app = TestApp::new();
    let (status, body) = app.get_json("/api/listings/service_records").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("internal server error"));
}

#[tokio::test]
async fn health_reports_unreachable_database() {
    let app = TestApp::new();
    let (status, body) = app.get_json("/health").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["postgres"], json!(false));
}
