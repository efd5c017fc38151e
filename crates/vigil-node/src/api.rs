//! HTTP API for Vigil.
//!
//! Identity arrives from the fronting auth collaborator as two headers,
//! `x-vigil-user` and `x-vigil-role`. Routes that mutate require the user
//! header; read routes accept anonymous callers.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::{Error, ErrorKind};
use crate::identity::{Identity, Role};
use crate::lifecycle::{IncidentFilter, IncidentSummary};
use crate::models::{
    Comment, FalseReport, Incident, NewComment, NewIncident, ReportReceipt, ReportStatus,
    TallyView, VoteKind, VoteOutcome,
};
use crate::moderation::{ModerationOutcome, Verdict};
use crate::node::NodeState;
use crate::ws::ws_handler;

pub const USER_HEADER: &str = "x-vigil-user";
pub const ROLE_HEADER: &str = "x-vigil-role";

type AppState = Arc<NodeState>;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        .route("/ready", get(ready))
        // Incidents
        .route("/api/v1/incidents", get(list_incidents).post(create_incident))
        .route("/api/v1/incidents/:id", get(get_incident).delete(delete_incident))
        // Votes
        .route("/api/v1/incidents/:id/votes", post(cast_vote).get(get_tally))
        // False reports
        .route("/api/v1/incidents/:id/reports", post(file_report).get(list_reports))
        .route("/api/v1/incidents/:id/reports/status", get(report_status))
        // Moderation
        .route("/api/v1/incidents/:id/moderation", post(moderate))
        .route("/api/v1/moderation/flagged", get(flagged_incidents))
        // Comments
        .route("/api/v1/incidents/:id/comments", get(list_comments).post(add_comment))
        .route(
            "/api/v1/incidents/:id/comments/:comment_id",
            delete(delete_comment),
        )
        // Real-time fan-out
        .route("/api/v1/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// --- Errors ---

/// Failure surfaced to an HTTP client.
#[derive(Debug)]
pub enum ApiError {
    Core(Error),
    /// No `x-vigil-user` header on a route that needs one.
    Unauthenticated,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
    retryable: bool,
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Core(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Core(Error::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Core(Error::Validation(rejection.body_text()))
    }
}

fn status_of(kind: ErrorKind) -> (StatusCode, &'static str) {
    match kind {
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        ErrorKind::Conflict => (StatusCode::CONFLICT, "conflict"),
        ErrorKind::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
        ErrorKind::Validation => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
        ErrorKind::Transient => (StatusCode::SERVICE_UNAVAILABLE, "transient"),
        ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    kind: "unauthenticated",
                    message: format!("missing {USER_HEADER} header"),
                    retryable: false,
                },
            ),
            ApiError::Core(e) => {
                let (status, kind) = status_of(e.kind());
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(error = %e, "request failed");
                }
                (
                    status,
                    ErrorBody {
                        kind,
                        message: e.to_string(),
                        retryable: e.is_retryable(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// --- Identity ---

fn header<'a>(headers: &'a HeaderMap, name: &str) -> ApiResult<Option<&'a str>> {
    headers
        .get(name)
        .map(|v| v.to_str())
        .transpose()
        .map(|v| v.map(str::trim).filter(|v| !v.is_empty()))
        .map_err(|_| Error::Validation(format!("{name} header is not valid text")).into())
}

/// The authenticated caller; fails 401 when absent.
fn caller(headers: &HeaderMap) -> ApiResult<Identity> {
    let id = header(headers, USER_HEADER)?.ok_or(ApiError::Unauthenticated)?;
    let role = match header(headers, ROLE_HEADER)? {
        Some(role) => role.parse::<Role>()?,
        None => Role::User,
    };
    Ok(Identity::new(id, role)?)
}

/// The viewer's id, if any. Anonymous viewing is allowed.
fn viewer(headers: &HeaderMap) -> ApiResult<Option<String>> {
    Ok(header(headers, USER_HEADER)?.map(str::to_string))
}

// --- Health endpoints ---

async fn health() -> &'static str {
    "OK"
}

async fn ready(State(state): State<AppState>) -> ApiResult<&'static str> {
    state
        .engine
        .records()
        .run("ready", |s| s.get_incident("__ready__").map(|_| ()))
        .await?;
    Ok("OK")
}

// --- Incident endpoints ---

async fn list_incidents(
    State(state): State<AppState>,
    filter: Result<Query<IncidentFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<IncidentSummary>>> {
    let Query(filter) = filter?;
    Ok(Json(state.engine.incidents.list_incidents(filter).await?))
}

async fn create_incident(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<NewIncident>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Incident>)> {
    let author = caller(&headers)?;
    let Json(fields) = body?;
    let incident = state.engine.incidents.create_incident(&author, fields).await?;
    Ok((StatusCode::CREATED, Json(incident)))
}

async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<IncidentSummary>> {
    Ok(Json(state.engine.incidents.get_incident(&id).await?))
}

async fn delete_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let who = caller(&headers)?;
    state.engine.incidents.delete_incident(&id, &who).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Vote endpoints ---

#[derive(Debug, Deserialize)]
struct CastVoteRequest {
    kind: VoteKind,
}

async fn cast_vote(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<CastVoteRequest>, JsonRejection>,
) -> ApiResult<Json<VoteOutcome>> {
    let voter = caller(&headers)?;
    let Json(req) = body?;
    Ok(Json(state.engine.votes.cast_vote(&id, &voter, req.kind).await?))
}

async fn get_tally(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<TallyView>> {
    let viewer = viewer(&headers)?;
    Ok(Json(
        state.engine.votes.get_tally(&id, viewer.as_deref()).await?,
    ))
}

// --- Report endpoints ---

#[derive(Debug, Default, Deserialize)]
struct FileReportRequest {
    #[serde(default)]
    reason: Option<String>,
}

async fn file_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<FileReportRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ReportReceipt>)> {
    let reporter = caller(&headers)?;
    let req = match body {
        Ok(Json(req)) => req,
        // A bare POST with no body files a report with the default reason.
        Err(JsonRejection::MissingJsonContentType(_)) => FileReportRequest::default(),
        Err(e) => return Err(e.into()),
    };
    let report = state.engine.reports.file_report(&id, &reporter, req.reason).await?;
    Ok((StatusCode::CREATED, Json(report.receipt())))
}

async fn report_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<ReportStatus>> {
    let reporter = caller(&headers)?;
    Ok(Json(
        state.engine.reports.get_report_status(&id, &reporter.id).await?,
    ))
}

async fn list_reports(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<FalseReport>>> {
    let who = caller(&headers)?;
    Ok(Json(state.engine.reports.list_reports(&id, &who).await?))
}

// --- Moderation endpoints ---

#[derive(Debug, Deserialize)]
struct ModerationRequest {
    verdict: Verdict,
}

async fn moderate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<ModerationRequest>, JsonRejection>,
) -> ApiResult<Json<ModerationOutcome>> {
    let moderator = caller(&headers)?;
    let Json(req) = body?;
    Ok(Json(
        state.engine.moderation.decide(&id, req.verdict, &moderator).await?,
    ))
}

async fn flagged_incidents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Incident>>> {
    let moderator = caller(&headers)?;
    Ok(Json(
        state.engine.moderation.flagged_incidents(&moderator).await?,
    ))
}

// --- Comment endpoints ---

async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Comment>>> {
    Ok(Json(state.engine.comments.list_comments(&id).await?))
}

async fn add_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<NewComment>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let author = caller(&headers)?;
    let Json(fields) = body?;
    let comment = state.engine.comments.add_comment(&id, &author, fields).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn delete_comment(
    State(state): State<AppState>,
    Path((id, comment_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let who = caller(&headers)?;
    state
        .engine
        .comments
        .delete_comment(&id, &comment_id, &who)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeConfig, NodeState};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        build_router(Arc::new(NodeState::in_memory(NodeConfig::default())))
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        user: Option<(&str, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = user {
            req = req.header(USER_HEADER, id).header(ROLE_HEADER, role);
        }
        let req = match body {
            Some(body) => req
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn incident_body() -> Value {
        json!({
            "title": "Water main burst",
            "description": "Flooding on the corner",
            "location": {"address": "4 Mill Lane", "latitude": 52.2, "longitude": 0.12},
            "category": "utility"
        })
    }

    #[test]
    fn router_builds() {
        let _ = app();
    }

    #[tokio::test]
    async fn health_and_ready() {
        let app = app();
        assert_eq!(send(&app, "GET", "/health", None, None).await.0, StatusCode::OK);
        assert_eq!(send(&app, "GET", "/ready", None, None).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn vote_report_moderate_over_http() {
        let app = app();
        let alice = Some(("alice", "user"));
        let bob = Some(("bob", "user"));
        let moderator = Some(("mod", "moderator"));

        let (status, incident) =
            send(&app, "POST", "/api/v1/incidents", alice, Some(incident_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(incident["severity"], "medium");
        let id = incident["id"].as_str().unwrap().to_string();

        let votes = format!("/api/v1/incidents/{id}/votes");
        let (status, outcome) = send(&app, "POST", &votes, bob, Some(json!({"kind": "up"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["action"], "added");
        assert_eq!(outcome["tally"]["upvotes"], 1);
        assert_eq!(outcome["viewerVote"], "up");

        let (_, anon) = send(&app, "GET", &votes, None, None).await;
        assert_eq!(anon["total"], 1);
        assert!(anon["viewerVote"].is_null());

        let reports = format!("/api/v1/incidents/{id}/reports");
        let (status, body) = send(&app, "POST", &reports, alice, Some(json!({}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "forbidden");
        assert_eq!(body["retryable"], false);

        let (status, receipt) =
            send(&app, "POST", &reports, bob, Some(json!({"reason": "spam"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(receipt["reason"], "spam");
        assert!(receipt["reportId"].is_string());

        let (status, body) = send(&app, "POST", &reports, bob, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "conflict");

        let moderation = format!("/api/v1/incidents/{id}/moderation");
        let (status, _) =
            send(&app, "POST", &moderation, bob, Some(json!({"verdict": "accept"}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, verdict) =
            send(&app, "POST", &moderation, moderator, Some(json!({"verdict": "accept"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(verdict, json!({"isFlagged": false, "verifiedFalse": true}));

        let (status, _) =
            send(&app, "DELETE", &format!("/api/v1/incidents/{id}"), moderator, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send(&app, "GET", &votes, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn mutations_need_identity() {
        let app = app();
        let (status, body) =
            send(&app, "POST", "/api/v1/incidents", None, Some(incident_body())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "unauthenticated");
    }

    #[tokio::test]
    async fn malformed_input_is_validation() {
        let app = app();
        let mut bad = incident_body();
        bad["category"] = json!("weather");
        let (status, body) =
            send(&app, "POST", "/api/v1/incidents", Some(("alice", "user")), Some(bad)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "validation");

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/incidents",
            Some(("alice", "overlord")),
            Some(incident_body()),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(&app, "GET", "/api/v1/incidents?limit=lots", None, None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn listing_and_comments() {
        let app = app();
        let alice = Some(("alice", "user"));
        let (_, incident) =
            send(&app, "POST", "/api/v1/incidents", alice, Some(incident_body())).await;
        let id = incident["id"].as_str().unwrap().to_string();

        let (status, list) =
            send(&app, "GET", "/api/v1/incidents?category=utility&limit=5", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list[0]["id"], id.as_str());
        assert_eq!(list[0]["tally"]["total"], 0);

        let comments = format!("/api/v1/incidents/{id}/comments");
        let (status, comment) =
            send(&app, "POST", &comments, alice, Some(json!({"text": "still flooding"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let comment_id = comment["id"].as_str().unwrap();

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("{comments}/{comment_id}"),
            Some(("bob", "user")),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, listed) = send(&app, "GET", &comments, None, None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }
}
