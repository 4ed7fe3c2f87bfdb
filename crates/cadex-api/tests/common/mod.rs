//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use cadex_core::rng::DeterministicRng;
use cadex_core::store::DocumentStore;
use cadex_store::memory::InMemoryDocumentStore;
use cadex_story::application::coordinator::RetryPolicy;
use cadex_story::application::reconciler::FanoutReconciler;
use cadex_story::domain::codec::PrivacyCodec;
use cadex_test_support::MockRng;
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use cadex_api::build_router;
use cadex_api::state::AppState;

/// Secret shared by every integration test.
pub const TEST_SECRET: &str = "integration-secret";

/// A running test app together with the store behind it.
pub struct TestApp {
    /// The router, cloned for each request.
    pub router: Router,
    /// The store the router writes to.
    pub store: Arc<dyn DocumentStore>,
    /// The codec the router uses.
    pub codec: Arc<PrivacyCodec>,
}

impl TestApp {
    /// Runs the fan-out for `story_id` the way the background task does.
    pub async fn reconcile(&self, story_id: Uuid) {
        let report = FanoutReconciler::new(self.store.as_ref(), self.codec.as_ref())
            .reconcile_story(story_id)
            .await
            .unwrap();
        assert!(report.is_clean(), "reconciliation failed: {report:?}");
    }
}

/// Build the full app router over a fresh in-memory store with a
/// deterministic RNG. Uses the same route structure as `main.rs`.
pub fn build_test_app() -> TestApp {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let codec = Arc::new(PrivacyCodec::new(TEST_SECRET));
    let rng: Arc<Mutex<dyn DeterministicRng + Send>> = Arc::new(Mutex::new(MockRng));
    let app_state = AppState::new(
        Arc::clone(&store),
        Arc::clone(&codec),
        rng,
        RetryPolicy::default(),
    );

    TestApp {
        router: build_router(app_state),
        store,
        codec,
    }
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Polls `check` until it returns `true`, failing after five seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
