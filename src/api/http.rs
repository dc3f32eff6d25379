//! HTTP API Server
//!
//! REST API over the election-day operations: event lifecycle, vote
//! recording, voter lookup and finalization jobs.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::{ActivationPolicy, ApiConfig};
use crate::error::{Error, Result};
use crate::event::{ElectionEvent, EventRegistry, EventSummary, NewElectionEvent};
use crate::finalize::{Job, JobDispatcher, JobStatus};
use crate::history::{ValidationHistory, ValidationType};
use crate::id::{CampaignId, EventId, UserId, VoteRecordId, VoterId};
use crate::store::Store;
use crate::vote::VoteRecorder;
use crate::voter::{NewVoter, Voter, VoterDirectory, VoterStatus};

/// Shared application state
pub struct AppState {
    pub registry: EventRegistry,
    pub directory: VoterDirectory,
    pub recorder: VoteRecorder,
    pub jobs: JobDispatcher,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every component onto one store and clock
    pub fn new(
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        policy: ActivationPolicy,
        jobs: JobDispatcher,
    ) -> Self {
        Self {
            registry: EventRegistry::new(Arc::clone(&store), Arc::clone(&clock), policy),
            directory: VoterDirectory::new(Arc::clone(&store), Arc::clone(&clock)),
            recorder: VoteRecorder::new(store, clock),
            jobs,
            started_at: Instant::now(),
        }
    }
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Get the state for sharing with other components
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Create the router
    pub fn create_router(state: Arc<AppState>, cors_enabled: bool) -> Router {
        let router = Router::new()
            .route("/health", get(handle_health))
            // Voters
            .route("/voters", post(handle_register_voter))
            .route("/voters/:voter_id", get(handle_get_voter))
            .route("/voters/:voter_id/history", get(handle_voter_history))
            .route("/voters/:voter_id/transition", post(handle_transition))
            .route("/voters/:voter_id/did-not-vote", post(handle_did_not_vote))
            .route("/campaigns/:campaign_id/voters/search", get(handle_search_voter))
            // Events
            .route("/events", post(handle_create_event))
            .route("/events/:event_id", get(handle_get_event).delete(handle_delete_event))
            .route("/events/:event_id/activate", post(handle_activate))
            .route("/events/:event_id/deactivate", post(handle_deactivate))
            .route("/events/:event_id/close", post(handle_close))
            .route("/events/:event_id/finalize", post(handle_finalize))
            .route("/events/:event_id/votes", post(handle_record_vote))
            .route("/campaigns/:campaign_id/events", get(handle_list_events))
            .route("/campaigns/:campaign_id/events/active", get(handle_active_event))
            // Jobs
            .route("/jobs/:job_id", get(handle_job_status))
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        if cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let app = Self::create_router(Arc::clone(&self.state), self.config.cors_enabled);

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Internal(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// Pipeline transition request
#[derive(Debug, Deserialize, Serialize)]
pub struct TransitionRequest {
    pub status: VoterStatus,
    pub validated_by: UserId,
    pub validation_type: ValidationType,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Document search query
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub document: String,
}

/// Vote request, by voter id or by document number
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RecordVoteRequest {
    #[serde(default)]
    pub voter_id: Option<VoterId>,
    #[serde(default)]
    pub document_number: Option<String>,
}

/// Close/finalize request
#[derive(Debug, Deserialize, Serialize)]
pub struct FinalizeRequest {
    pub validated_by: UserId,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub uptime_seconds: u64,
}

/// Created voter
#[derive(Debug, Serialize)]
pub struct VoterCreatedResponse {
    pub voter_id: VoterId,
}

/// Created event
#[derive(Debug, Serialize)]
pub struct EventCreatedResponse {
    pub event_id: EventId,
}

/// Recorded vote
#[derive(Debug, Serialize)]
pub struct VoteRecordedResponse {
    pub vote_record_id: VoteRecordId,
    pub event_id: EventId,
    pub message: String,
}

/// Accepted background job
#[derive(Debug, Serialize)]
pub struct JobAcceptedResponse {
    pub job_id: Uuid,
}

/// Lifecycle action outcome
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::EventNotFound(_) | Error::VoterNotFound(_) => StatusCode::NOT_FOUND,
            Error::NotEligibleToday { .. }
            | Error::AnotherEventActive(_)
            | Error::EventNotAdmittingVotes(_)
            | Error::DuplicateVote { .. }
            | Error::CannotDeleteActive(_)
            | Error::EventStillActive(_)
            | Error::VoterNotInCampaign { .. }
            | Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if self.is_business() {
            tracing::debug!("Request rejected: {}", self);
        } else {
            tracing::error!("Request failed: {}", self);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.user_message(),
                code: self.code().to_string(),
            }),
        )
            .into_response()
    }
}

fn action(message: &str) -> Json<ActionResponse> {
    Json(ActionResponse {
        success: true,
        message: message.to_string(),
    })
}

// ============ Handlers ============

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

async fn handle_register_voter(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewVoter>,
) -> Result<impl IntoResponse> {
    let voter_id = state.directory.register(req).await?;
    Ok((StatusCode::CREATED, Json(VoterCreatedResponse { voter_id })))
}

async fn handle_get_voter(
    State(state): State<Arc<AppState>>,
    Path(voter_id): Path<VoterId>,
) -> Result<Json<Voter>> {
    state
        .directory
        .get(voter_id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::VoterNotFound(voter_id.to_string()))
}

async fn handle_voter_history(
    State(state): State<Arc<AppState>>,
    Path(voter_id): Path<VoterId>,
) -> Result<Json<Vec<ValidationHistory>>> {
    Ok(Json(state.directory.history(voter_id).await?))
}

async fn handle_transition(
    State(state): State<Arc<AppState>>,
    Path(voter_id): Path<VoterId>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<Voter>> {
    let voter = state
        .directory
        .transition(voter_id, req.status, req.validated_by, req.validation_type, req.notes.as_deref())
        .await?;
    Ok(Json(voter))
}

async fn handle_did_not_vote(
    State(state): State<Arc<AppState>>,
    Path(voter_id): Path<VoterId>,
) -> Result<Json<ActionResponse>> {
    state.recorder.mark_did_not_vote(voter_id).await?;
    Ok(action("Votante marcado como no votó"))
}

async fn handle_search_voter(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<CampaignId>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Voter>> {
    state
        .directory
        .find_by_document(campaign_id, &query.document)
        .await?
        .map(Json)
        .ok_or_else(|| Error::VoterNotFound(query.document.trim().to_string()))
}

async fn handle_create_event(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewElectionEvent>,
) -> Result<impl IntoResponse> {
    let event_id = state.registry.create_event(req).await?;
    Ok((StatusCode::CREATED, Json(EventCreatedResponse { event_id })))
}

async fn handle_get_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
) -> Result<Json<EventSummary>> {
    Ok(Json(state.registry.event_summary(event_id).await?))
}

async fn handle_delete_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
) -> Result<Json<ActionResponse>> {
    state.registry.delete_event(event_id).await?;
    Ok(action("Evento eliminado"))
}

async fn handle_activate(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
) -> Result<Json<ActionResponse>> {
    state.registry.activate_event(event_id).await?;
    Ok(action("Evento activado"))
}

async fn handle_deactivate(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
) -> Result<Json<ActionResponse>> {
    state.registry.deactivate_event(event_id).await?;
    Ok(action("Evento desactivado"))
}

/// Deactivate the event and queue its finalization
async fn handle_close(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
    Json(req): Json<FinalizeRequest>,
) -> Result<impl IntoResponse> {
    // Queue capacity first, so a stopping queue leaves the event untouched
    let slot = state.jobs.reserve().await?;
    state.registry.deactivate_event(event_id).await?;
    let ticket = slot
        .send(Job::FinalizeEvent { event_id, validated_by: req.validated_by })
        .await;
    Ok((StatusCode::ACCEPTED, Json(JobAcceptedResponse { job_id: ticket.id })))
}

async fn handle_finalize(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
    Json(req): Json<FinalizeRequest>,
) -> Result<impl IntoResponse> {
    // Fails fast on unknown or still active events; the job re-checks
    let event = state.registry.get_event(event_id).await?;
    if event.is_active {
        return Err(Error::EventStillActive(event_id));
    }
    let ticket = state
        .jobs
        .dispatch(Job::FinalizeEvent { event_id, validated_by: req.validated_by })
        .await?;
    Ok((StatusCode::ACCEPTED, Json(JobAcceptedResponse { job_id: ticket.id })))
}

async fn handle_record_vote(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
    Json(req): Json<RecordVoteRequest>,
) -> Result<impl IntoResponse> {
    let vote_record_id = match (req.voter_id, req.document_number.as_deref()) {
        (Some(voter_id), _) => state.recorder.record_vote(voter_id, event_id).await?,
        (None, Some(document)) if !document.trim().is_empty() => {
            state.recorder.record_vote_by_document(event_id, document).await?
        }
        _ => {
            return Err(Error::Validation(
                "se requiere voter_id o document_number".into(),
            ))
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(VoteRecordedResponse {
            vote_record_id,
            event_id,
            message: "Voto registrado".to_string(),
        }),
    ))
}

async fn handle_list_events(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<CampaignId>,
) -> Result<Json<Vec<EventSummary>>> {
    Ok(Json(state.registry.list_events(campaign_id).await?))
}

async fn handle_active_event(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<CampaignId>,
) -> Result<Json<Option<ElectionEvent>>> {
    Ok(Json(state.registry.get_active_event(campaign_id).await?))
}

async fn handle_job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Response {
    match state.jobs.status(job_id).await {
        Some(status) => Json::<JobStatus>(status).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "El trabajo no existe".to_string(),
                code: "JOB_NOT_FOUND".to_string(),
            }),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finalize::WorkerPool;
    use crate::testutil::{Fixture, TODAY};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(fx: &Fixture) -> (Router, WorkerPool) {
        let (jobs, pool) = WorkerPool::start(Arc::new(fx.finalizer(50)), &fx.finalization_config());
        (app_with_jobs(fx, jobs), pool)
    }

    fn app_with_jobs(fx: &Fixture, jobs: JobDispatcher) -> Router {
        let clock: Arc<dyn Clock> = fx.clock.clone();
        let state = Arc::new(AppState::new(
            Arc::clone(&fx.store),
            clock,
            ActivationPolicy::DeactivateOthers,
            jobs,
        ));
        HttpServer::create_router(state, false)
    }

    async fn wait_for_job(app: &Router, job_id: &str) -> Value {
        let mut state = Value::Null;
        for _ in 0..100 {
            let (_, body) = send(app, "GET", &format!("/jobs/{}", job_id), None).await;
            state = body["state"].clone();
            if state == "succeeded" || state == "failed" {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        state
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_event_lifecycle_and_vote() {
        let fx = Fixture::new();
        let voter = fx.voter(CampaignId(1), "1020304050", VoterStatus::Confirmed).await;
        let (app, _pool) = app(&fx);

        let (status, body) = send(
            &app,
            "POST",
            "/events",
            Some(json!({
                "campaign_id": 1,
                "name": "Día D",
                "event_type": "real",
                "date": TODAY,
                "start_time": "08:00:00",
                "end_time": "18:00:00"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let event_id = body["event_id"].as_i64().unwrap();

        let (status, body) = send(&app, "POST", &format!("/events/{}/votes", event_id), Some(json!({ "voter_id": voter.0 }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "EVENT_NOT_ADMITTING_VOTES");
        assert_eq!(body["error"], "No hay ningún evento electoral activo en este momento");

        let (status, _) = send(&app, "POST", &format!("/events/{}/activate", event_id), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", "/campaigns/1/events/active", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"].as_i64(), Some(event_id));

        let uri = format!("/events/{}/votes", event_id);
        let (status, _) = send(&app, "POST", &uri, Some(json!({ "document_number": "1020304050" }))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, "POST", &uri, Some(json!({ "voter_id": voter.0 }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Este votante ya tiene un registro de voto");

        let (_, body) = send(&app, "GET", &format!("/events/{}", event_id), None).await;
        assert_eq!(body["vote_count"], 1);
        assert_eq!(body["admitting_votes"], true);

        let (status, body) = send(&app, "DELETE", &format!("/events/{}", event_id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CANNOT_DELETE_ACTIVE");
    }

    #[tokio::test]
    async fn test_create_event_validation() {
        let fx = Fixture::new();
        let (app, _pool) = app(&fx);

        let (status, body) = send(
            &app,
            "POST",
            "/events",
            Some(json!({ "campaign_id": 1, "name": "Sin fecha", "event_type": "real" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, _) = send(&app, "POST", "/events/404/activate", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, "POST", "/events/1/votes", Some(json!({}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_close_runs_finalization() {
        let fx = Fixture::new();
        let voter = fx.voter(CampaignId(1), "100", VoterStatus::Confirmed).await;
        let event = fx.active_event(CampaignId(1)).await;
        let (app, _pool) = app(&fx);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/events/{}/close", event),
            Some(json!({ "validated_by": 7 })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let job_id = body["job_id"].as_str().unwrap().to_string();
        assert_eq!(wait_for_job(&app, &job_id).await, "succeeded");

        let (_, body) = send(&app, "GET", &format!("/voters/{}", voter), None).await;
        assert_eq!(body["status"], "did_not_vote");
        let (_, body) = send(&app, "GET", &format!("/voters/{}/history", voter), None).await;
        assert_eq!(body[0]["validated_by"], 7);
        assert_eq!(body[0]["validation_type"], "election");

        let (_, body) = send(&app, "GET", &format!("/events/{}", event), None).await;
        assert_eq!(body["is_active"], false);

        let (status, _) = send(&app, "GET", &format!("/jobs/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_voter_endpoints() {
        let fx = Fixture::new();
        let (app, _pool) = app(&fx);

        let (status, body) = send(
            &app,
            "POST",
            "/voters",
            Some(json!({ "campaign_id": 3, "document_number": "42", "full_name": "Luis Pérez" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let voter_id = body["voter_id"].as_i64().unwrap();

        let (status, body) = send(&app, "GET", "/campaigns/3/voters/search?document=42", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"].as_i64(), Some(voter_id));

        let (status, _) = send(&app, "GET", "/campaigns/4/voters/search?document=42", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/voters/{}/transition", voter_id);
        let (status, body) = send(
            &app,
            "POST",
            &uri,
            Some(json!({ "status": "verified_census", "validated_by": 1, "validation_type": "census" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "verified_census");

        let (status, body) = send(
            &app,
            "POST",
            &uri,
            Some(json!({ "status": "voted", "validated_by": 1, "validation_type": "census" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "INVALID_TRANSITION");

        let (status, _) = send(&app, "POST", &format!("/voters/{}/did-not-vote", voter_id), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&app, "GET", &format!("/voters/{}", voter_id), None).await;
        assert_eq!(body["status"], "did_not_vote");
    }

    #[tokio::test]
    async fn test_finalize_refused_while_event_admits_votes() {
        let fx = Fixture::new();
        let voter = fx.voter(CampaignId(1), "100", VoterStatus::Confirmed).await;
        let event = fx.active_event(CampaignId(1)).await;
        let (app, _pool) = app(&fx);
        let uri = format!("/events/{}/finalize", event);

        let (status, body) = send(&app, "POST", &uri, Some(json!({ "validated_by": 7 }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "EVENT_STILL_ACTIVE");

        // Still open for voting, and nobody was marked
        let (_, body) = send(&app, "GET", &format!("/events/{}", event), None).await;
        assert_eq!(body["admitting_votes"], true);
        let (status, _) = send(
            &app,
            "POST",
            &format!("/events/{}/votes", event),
            Some(json!({ "voter_id": voter.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, body) = send(&app, "GET", &format!("/voters/{}/history", voter), None).await;
        assert_eq!(body, json!([]));

        let (status, _) = send(&app, "POST", &format!("/events/{}/deactivate", event), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, "POST", &uri, Some(json!({ "validated_by": 7 }))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let job_id = body["job_id"].as_str().unwrap().to_string();
        assert_eq!(wait_for_job(&app, &job_id).await, "succeeded");

        let (_, body) = send(&app, "GET", &format!("/voters/{}", voter), None).await;
        assert_eq!(body["status"], "voted");
    }

    #[tokio::test]
    async fn test_close_keeps_event_active_when_queue_is_stopped() {
        let fx = Fixture::new();
        let event = fx.active_event(CampaignId(1)).await;
        let app = app_with_jobs(&fx, JobDispatcher::closed());

        let (status, body) = send(
            &app,
            "POST",
            &format!("/events/{}/close", event),
            Some(json!({ "validated_by": 7 })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "SHUTTING_DOWN");

        let (_, body) = send(&app, "GET", &format!("/events/{}", event), None).await;
        assert_eq!(body["is_active"], true);
    }
}
