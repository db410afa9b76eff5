#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Fixtures are built with the REAL listing definitions and served through
//! the in-memory tree fetcher, so the engine, the registered listings and
//! the HTTP handlers are exercised without a database.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use fleetdesk_kernel::listing::{EntityNode, FlatRow, MemoryTreeFetcher, PagingLimits};
use fleetdesk_kernel::listings::{ListingRegistry, agreements, preventive_maintenance};
use fleetdesk_kernel::routes;
use fleetdesk_kernel::state::AppState;

/// Equipment assignment leaf.
pub fn assignment(id: i64, unit_number: &str) -> EntityNode {
    EntityNode::from_json(json!({
        "id": id,
        "unit_number": unit_number,
        "vin": format!("VIN{id:05}"),
        "assigned_at": format!("2026-01-{:02}", id % 28 + 1),
    }))
}

pub fn allocation(id: i64, quantity: i64, assignments: Vec<EntityNode>) -> EntityNode {
    EntityNode::from_json(json!({"id": id, "quantity": quantity})).with_children(assignments)
}

pub fn line_item(id: i64, description: &str, allocations: Vec<EntityNode>) -> EntityNode {
    EntityNode::from_json(json!({
        "id": id,
        "description": description,
        "monthly_rate": 100 + id,
    }))
    .with_children(allocations)
}

pub fn agreement(
    id: i64,
    number: &str,
    status: &str,
    account: &str,
    line_items: Vec<EntityNode>,
) -> EntityNode {
    EntityNode::from_json(json!({
        "id": id,
        "number": number,
        "status": status,
        "start_date": format!("2026-0{}-01", id % 9 + 1),
        "end_date": null,
        "account": {"id": id * 10, "name": account},
        "signer": {"id": id * 7, "first_name": "Sam", "last_name": format!("Signer{id}")},
    }))
    .with_children(line_items)
}

/// Three agreements contributing 3, 0 and 3 assignment rows.
///
/// - AG-001 (closed, Acme): Tractors [TRK-1, TRK-2], Trailers [TRL-1]
/// - AG-002 (active, Beta): Reefers with an empty allocation
/// - AG-003 (active, Core): Tractors [TRK-5, TRK-3, TRK-4]
pub fn fleet() -> Vec<EntityNode> {
    vec![
        agreement(
            1,
            "AG-001",
            "closed",
            "Acme",
            vec![
                line_item(
                    10,
                    "Tractors",
                    vec![allocation(100, 2, vec![assignment(1000, "TRK-1"), assignment(1001, "TRK-2")])],
                ),
                line_item(11, "Trailers", vec![allocation(110, 1, vec![assignment(1100, "TRL-1")])]),
            ],
        ),
        agreement(
            2,
            "AG-002",
            "active",
            "Beta",
            vec![line_item(20, "Reefers", vec![allocation(200, 0, Vec::new())])],
        ),
        agreement(
            3,
            "AG-003",
            "active",
            "Core",
            vec![line_item(
                30,
                "Tractors",
                vec![allocation(
                    300,
                    3,
                    vec![
                        assignment(3000, "TRK-5"),
                        assignment(3001, "TRK-3"),
                        assignment(3002, "TRK-4"),
                    ],
                )],
            )],
        ),
    ]
}

/// Seven preventive maintenance schedules with shuffled unit numbers.
pub fn schedules() -> Vec<EntityNode> {
    let units = ["TRK-4", "TRK-1", "TRK-7", "TRK-2", "TRK-6", "TRK-3", "TRK-5"];
    units
        .iter()
        .enumerate()
        .map(|(i, unit)| {
            let id = i as i64 + 1;
            EntityNode::from_json(json!({
                "id": id,
                "title": format!("Service {unit}"),
                "interval_days": 90,
                "next_due_on": format!("2026-11-{:02}", 10 + id),
                "last_completed_on": null,
                "status": if id % 2 == 0 { "due" } else { "scheduled" },
                "equipment": {"id": id * 100, "unit_number": unit},
                "technician": {"id": 9, "first_name": "Ada", "last_name": "Tech"},
            }))
        })
        .collect()
}

/// Values of one row field, in row order.
pub fn column(rows: &[FlatRow], field: &str) -> Vec<Value> {
    rows.iter()
        .map(|row| row.get(field).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Test application: the real router over the real listing registry, with
/// agreements and preventive maintenance served from fixtures.
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    /// Build the app. Must run inside a Tokio runtime.
    ///
    /// The pool is lazy and points at a closed port, so anything that
    /// reaches PostgreSQL fails fast.
    pub fn new() -> Self {
        let db = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(250))
            .connect_lazy("postgres://fleetdesk@127.0.0.1:1/fleetdesk")
            .expect("Failed to build lazy pool");

        let state = AppState::from_parts(
            db,
            ListingRegistry::with_defaults().expect("Failed to register listings"),
            PagingLimits::default(),
            Duration::from_secs(1),
        )
        .with_preloaded(agreements::NAME, Arc::new(MemoryTreeFetcher::new(fleet())))
        .and_then(|state| {
            state.with_preloaded(
                preventive_maintenance::NAME,
                Arc::new(MemoryTreeFetcher::new(schedules())),
            )
        })
        .expect("State is not shared yet");

        let router = routes::router().with_state(state.clone());
        Self { state, router }
    }

    /// Send a request to the test application.
    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    /// GET `uri` and return status and JSON body.
    pub async fn get_json(&self, uri: &str) -> (axum::http::StatusCode, Value) {
        let response = self
            .request(Request::get(uri).body(Body::empty()).unwrap())
            .await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }
}
