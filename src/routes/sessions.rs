//! Session Routes
//!
//! HTTP endpoints over the chunked session store.
//!
//! Endpoints:
//! - POST /api/v1/users/:user_id/sessions - Upload one or more captures
//! - GET /api/v1/users/:user_id/sessions - List session metadata
//! - GET /api/v1/users/:user_id/sessions/:session_id - Single record
//! - GET /api/v1/users/:user_id/sessions/:session_id/payload - Reassembled document

use axum::{
    extract::{Multipart, Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;
use crate::store::SessionRecord;
use crate::telemetry::TelemetryDocument;
use crate::upload::{BatchOutcome, UploadError};

// ============================================================================
// Error Response
// ============================================================================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the session router
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/users/:user_id/sessions",
            get(list_sessions).post(upload_sessions),
        )
        .route("/users/:user_id/sessions/:session_id", get(get_session))
        .route(
            "/users/:user_id/sessions/:session_id/payload",
            get(get_session_payload),
        )
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/users/:user_id/sessions
///
/// Multipart upload; every `file` part is one telemetry capture. Returns
/// one outcome per part, in order, plus aggregate counts. A failing part
/// never aborts the rest of the batch.
async fn upload_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<BatchOutcome>, UploadError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Validation(format!("malformed multipart body: {e}")))?
    {
        let file_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "upload.json".to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| UploadError::Validation(format!("unreadable part {file_name}: {e}")))?;
        files.push((file_name, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(UploadError::Validation(
            "no files in upload body".to_string(),
        ));
    }

    // Tied to the server shutdown token, so a draining server stops the
    // batch cooperatively instead of dropping it mid-write.
    let cancel = state.shutdown().child_token();

    let batch = state
        .orchestrator()
        .upload_batch(&user_id, files, &cancel)
        .await;

    Ok(Json(batch))
}

/// GET /api/v1/users/:user_id/sessions
///
/// Metadata only, newest first; list views never pull payloads.
async fn list_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<SessionRecord>>, AppError> {
    let records = state.records().list_metadata(&user_id).await?;
    Ok(Json(records))
}

/// GET /api/v1/users/:user_id/sessions/:session_id
async fn get_session(
    State(state): State<AppState>,
    Path((user_id, session_id)): Path<(String, String)>,
) -> Result<Json<SessionRecord>, AppError> {
    let record = state
        .records()
        .read_metadata(&user_id, &session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("session {session_id}")))?;

    Ok(Json(record))
}

/// GET /api/v1/users/:user_id/sessions/:session_id/payload
///
/// Fetches every chunk, verifies completeness, reassembles and parses.
async fn get_session_payload(
    State(state): State<AppState>,
    Path((user_id, session_id)): Path<(String, String)>,
) -> Result<Json<TelemetryDocument>, AppError> {
    let document = state
        .records()
        .read_full_payload(&user_id, &session_id)
        .await?;

    Ok(Json(document))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::db::create_pool;
    use crate::routes;
    use crate::state::AppState;
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;

    async fn test_server() -> TestServer {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let state = AppState::new(Config::default(), pool);
        TestServer::new(routes::app(state)).unwrap()
    }

    fn capture_part(bytes: &[u8], file_name: &str) -> Part {
        Part::bytes(bytes.to_vec())
            .file_name(file_name)
            .mime_type("application/json")
    }

    fn capture_bytes() -> Vec<u8> {
        br#"{"track": "Suzuka", "car": "GR010", "sessionType": 2,
             "laps": [{"lapTimeMs": 95410}, {"lapTimeMs": 94730}]}"#
            .to_vec()
    }

    #[tokio::test]
    async fn test_upload_list_fetch_flow() {
        let server = test_server().await;

        let form = MultipartForm::new()
            .add_part("file", capture_part(&capture_bytes(), "race.json"));
        let response = server.post("/api/v1/users/maria/sessions").multipart(form).await;
        response.assert_status_ok();

        let body: serde_json::Value = response.json();
        assert_eq!(body["counts"]["ok"], 1);
        assert_eq!(body["results"][0]["status"], "ok");
        let session_id = body["results"][0]["sessionId"].as_str().unwrap().to_string();

        let listed: serde_json::Value = server
            .get("/api/v1/users/maria/sessions")
            .await
            .json();
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["meta"]["track"], "Suzuka");

        let payload: serde_json::Value = server
            .get(&format!("/api/v1/users/maria/sessions/{session_id}/payload"))
            .await
            .json();
        assert_eq!(payload["track"], "Suzuka");
        assert_eq!(payload["laps"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_upload_reports_existing_session() {
        let server = test_server().await;

        let first = server
            .post("/api/v1/users/maria/sessions")
            .multipart(
                MultipartForm::new().add_part("file", capture_part(&capture_bytes(), "a.json")),
            )
            .await;
        let first_body: serde_json::Value = first.json();

        let second = server
            .post("/api/v1/users/maria/sessions")
            .multipart(
                MultipartForm::new().add_part("file", capture_part(&capture_bytes(), "b.json")),
            )
            .await;
        let second_body: serde_json::Value = second.json();

        assert_eq!(second_body["results"][0]["status"], "duplicate");
        assert_eq!(
            second_body["results"][0]["sessionId"],
            first_body["results"][0]["sessionId"]
        );
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let server = test_server().await;

        let response = server.get("/api/v1/users/maria/sessions/ghost").await;
        response.assert_status_not_found();

        let payload = server
            .get("/api/v1/users/maria/sessions/ghost/payload")
            .await;
        payload.assert_status_not_found();
    }

    #[tokio::test]
    async fn test_empty_upload_body_is_rejected() {
        let server = test_server().await;

        let response = server
            .post("/api/v1/users/maria/sessions")
            .multipart(MultipartForm::new())
            .await;

        assert!(response.status_code().is_client_error());
    }

    #[tokio::test]
    async fn test_sessions_are_namespaced_per_user() {
        let server = test_server().await;

        server
            .post("/api/v1/users/maria/sessions")
            .multipart(
                MultipartForm::new().add_part("file", capture_part(&capture_bytes(), "a.json")),
            )
            .await
            .assert_status_ok();

        let other_user: serde_json::Value =
            server.get("/api/v1/users/jo/sessions").await.json();
        assert!(other_user.as_array().unwrap().is_empty());
    }
}
