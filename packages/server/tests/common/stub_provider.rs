//! Local stand-in for the geocoding provider's HTTP API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A request as the stub saw it
#[derive(Debug, Clone)]
pub struct StubRequest {
    pub query: String,
    pub params: HashMap<String, String>,
}

#[derive(Clone, Default)]
struct StubState {
    requests: Arc<Mutex<Vec<StubRequest>>>,
}

/// Routes by query text:
/// - contains "nowhere": empty feature collection
/// - contains "explode": 503
/// - contains "slow": sleeps 5s before answering
/// - otherwise: one feature centered on Austin, TX
pub struct StubProvider {
    pub base_url: String,
    state: StubState,
}

impl StubProvider {
    pub async fn start() -> Self {
        let state = StubState::default();
        let app = Router::new()
            .route("/geocoding/v5/mapbox.places/:query", get(places))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub provider");
        let addr = listener.local_addr().expect("stub provider address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn requests(&self) -> Vec<StubRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn places(
    State(state): State<StubState>,
    Path(raw): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let query = raw.trim_end_matches(".json").to_string();
    state.requests.lock().unwrap().push(StubRequest {
        query: query.clone(),
        params,
    });

    let lowered = query.to_lowercase();
    if lowered.contains("explode") {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "message": "upstream unavailable" })),
        );
    }
    if lowered.contains("slow") {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    if lowered.contains("nowhere") {
        return (
            StatusCode::OK,
            Json(serde_json::json!({ "type": "FeatureCollection", "features": [] })),
        );
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "type": "FeatureCollection",
            "features": [{ "center": [-97.74306, 30.26715], "place_name": query }]
        })),
    )
}
