// 🌐 HTTP API - JSON front end over the ledger
//
// Routes (nested under /api by `router`):
//   GET  /health
//   GET  /participants
//   GET  /participants/:name
//   POST /participants/:name/delta   {delta, items?}
//   POST /participants               {name, splits?, date?, items?}
//   POST /normalize                  {items}

use crate::items;
use crate::ledger::{CreateOutcome, Ledger, NewParticipant};
use crate::sheet::{StoreError, Worksheet};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Worksheet handle type chosen at runtime
pub type SharedLedger = Arc<Mutex<Ledger<Box<dyn Worksheet + Send>>>>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ledger: SharedLedger,
}

impl AppState {
    pub fn new(ledger: Ledger<Box<dyn Worksheet + Send>>) -> Self {
        AppState {
            ledger: Arc::new(Mutex::new(ledger)),
        }
    }
}

/// API Response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DeltaRequest {
    pub delta: i64,
    #[serde(default)]
    pub items: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    #[serde(default)]
    pub splits: i64,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub items: String,
}

#[derive(Debug, Deserialize)]
pub struct NormalizeRequest {
    pub items: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::err(message))).into_response()
}

fn store_error_response(err: StoreError) -> Response {
    tracing::error!(error = %err, "store operation failed");
    let status = match &err {
        e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}

fn lock_error() -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "ledger lock poisoned")
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/participants - Every participant, ordered by row
async fn list_participants(State(state): State<AppState>) -> Response {
    let Ok(mut ledger) = state.ledger.lock() else {
        return lock_error();
    };
    match ledger.roster() {
        Ok(records) => Json(ApiResponse::ok(records)).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// GET /api/participants/:name - Exact lookup
async fn get_participant(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let Ok(mut ledger) = state.ledger.lock() else {
        return lock_error();
    };
    match ledger.lookup(&name) {
        Ok(Some(record)) => Json(ApiResponse::ok(record)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("No participant named {:?}", name)),
        Err(e) => store_error_response(e),
    }
}

/// POST /api/participants/:name/delta - Balance update with optional items
async fn apply_delta(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<DeltaRequest>,
) -> Response {
    let Ok(mut ledger) = state.ledger.lock() else {
        return lock_error();
    };
    match ledger.apply_delta(&name, req.delta, req.items.as_deref()) {
        Ok(Some(outcome)) => Json(ApiResponse::ok(outcome)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("No participant named {:?}", name)),
        Err(e) => store_error_response(e),
    }
}

/// POST /api/participants - Create a participant
async fn create_participant(State(state): State<AppState>, Json(req): Json<CreateRequest>) -> Response {
    let new = NewParticipant {
        name: req.name,
        balance: req.splits,
        date: req.date,
        items: req.items,
    };

    let Ok(mut ledger) = state.ledger.lock() else {
        return lock_error();
    };
    match ledger.create_participant(&new) {
        Ok(CreateOutcome::Created(record)) => {
            (StatusCode::CREATED, Json(ApiResponse::ok(record))).into_response()
        }
        Ok(CreateOutcome::AlreadyExists) => error_response(
            StatusCode::CONFLICT,
            format!("Participant {:?} already exists", new.name),
        ),
        Err(e) => store_error_response(e),
    }
}

/// POST /api/normalize - Canonical form of an item blob
async fn normalize_items(Json(req): Json<NormalizeRequest>) -> impl IntoResponse {
    Json(ApiResponse::ok(items::normalize(&req.items)))
}

/// Build the application router (API under /api)
pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/participants", get(list_participants).post(create_participant))
        .route("/participants/:name", get(get_participant))
        .route("/participants/:name/delta", post(apply_delta))
        .route("/normalize", post(normalize_items))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ParticipantRecord;
    use crate::sheet::MemorySheet;
    use axum::body::Body;
    use axum::http::Request;
    use serde::de::DeserializeOwned;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn app() -> Router {
        let sheet: Box<dyn Worksheet + Send> = Box::new(MemorySheet::from_rows(&[
            &["Ghost", "1000", "Abyssal Whip", "01/02/2020", "General", "", "900"],
            &["Zezima", "N/A"],
            &["Lynx Titan", "$1,200", "Zenyte x2"],
        ]));
        router(AppState::new(Ledger::new(sheet)))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn data<T: DeserializeOwned>(bytes: &[u8]) -> T {
        let parsed: ApiResponse<T> = serde_json::from_slice(bytes).unwrap();
        assert!(parsed.success);
        parsed.data.unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(app(), "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data::<String>(&body), "OK");
    }

    #[tokio::test]
    async fn test_list_skips_bad_balances() {
        let (status, body) = send(app(), "GET", "/api/participants", None).await;
        assert_eq!(status, StatusCode::OK);

        let records: Vec<ParticipantRecord> = data(&body);
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Ghost", "Lynx Titan"]);
        assert_eq!(records[1].balance, 1200);
    }

    #[tokio::test]
    async fn test_lookup_by_encoded_name() {
        let (status, body) = send(app(), "GET", "/api/participants/Lynx%20Titan", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data::<ParticipantRecord>(&body).row_index, 3);

        let (status, _) = send(app(), "GET", "/api/participants/lynx%20titan", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delta() {
        let (status, body) = send(
            app(),
            "POST",
            "/api/participants/Ghost/delta",
            Some(r#"{"delta": 500, "items": "abyssal whip"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let outcome: crate::ledger::DeltaOutcome = data(&body);
        assert_eq!(outcome.prev_balance, 1000);
        assert_eq!(outcome.new_balance, 1500);
        assert_eq!(outcome.new_items, "Abyssal Whip x2");

        let (status, _) = send(
            app(),
            "POST",
            "/api/participants/NoSuchName/delta",
            Some(r#"{"delta": 100}"#),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_and_conflict() {
        let app = app();

        let (status, body) = send(
            app.clone(),
            "POST",
            "/api/participants",
            Some(r#"{"name": "Woox", "splits": 10, "items": "elder maul, elder maul"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let record: ParticipantRecord = data(&body);
        assert_eq!(record.row_index, 4);
        assert_eq!(record.item_text, "Elder Maul x2");

        let (status, _) = send(app, "POST", "/api/participants", Some(r#"{"name": "Woox"}"#)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_create_empty_name_is_bad_request() {
        let (status, _) = send(app(), "POST", "/api/participants", Some(r#"{"name": ""}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    /// Store that never answers a read
    struct DownSheet {
        reconnects: Arc<AtomicUsize>,
    }

    impl Worksheet for DownSheet {
        fn reconnect(&mut self) -> crate::sheet::StoreResult<()> {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn get_all_values(&self) -> crate::sheet::StoreResult<Vec<Vec<String>>> {
            Err(StoreError::Transient("quota exceeded".to_string()))
        }

        fn update_cell(&mut self, _row: usize, _col: usize, _value: &str) -> crate::sheet::StoreResult<()> {
            Err(StoreError::Transient("quota exceeded".to_string()))
        }
    }

    #[tokio::test]
    async fn test_persistent_store_failure_is_unavailable() {
        let reconnects = Arc::new(AtomicUsize::new(0));
        let sheet: Box<dyn Worksheet + Send> = Box::new(DownSheet {
            reconnects: Arc::clone(&reconnects),
        });
        let app = router(AppState::new(Ledger::new(sheet)));

        let (status, body) = send(app, "GET", "/api/participants/Ghost", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(reconnects.load(Ordering::SeqCst), 1);

        let parsed: ApiResponse<ParticipantRecord> = serde_json::from_slice(&body).unwrap();
        assert!(!parsed.success);
        assert!(parsed.error.unwrap().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_normalize() {
        let (status, body) = send(
            app(),
            "POST",
            "/api/normalize",
            Some(r#"{"items": "Thanoscopter Blade x3, thanoscopter blade"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data::<String>(&body), "Thanoscopter Blade x4");
    }
}
