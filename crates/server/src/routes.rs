//! Interactive API routes for the chat widget.
//!
//! Endpoints:
//! - `POST /chat`            — one conversational exchange with the assistant
//! - `POST /lead`            — on-demand lead creation for the current session
//! - `POST /sweeps/creation` — trigger a creation reconciliation pass
//! - `POST /sweeps/update`   — trigger an update reconciliation pass

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use leadflow_agent::llm::LlmClient;
use leadflow_agent::suggestions;
use leadflow_core::domain::lead::SessionId;
use leadflow_core::domain::transcript::{clean_user_query, Transcript, Turn};
use leadflow_core::errors::{ApplicationError, InterfaceError};
use leadflow_db::repositories::TranscriptRepository;
use leadflow_engine::{OnDemandOutcome, ReconcileEngine, SweepReport};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReconcileEngine>,
    pub llm: Arc<dyn LlmClient>,
    pub transcripts: Arc<dyn TranscriptRepository>,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub user_query: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub pretype_prompts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LeadRequest {
    pub session_id: String,
    /// Optional in-flight user message that has not reached the transcript
    /// yet. Counted towards qualification but never persisted here.
    pub user_query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LeadResponse {
    pub lead_type: String,
    pub lead_creation_message: String,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub scanned: usize,
    pub created: usize,
    pub merged: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl From<SweepReport> for SweepResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            scanned: report.scanned,
            created: report.created,
            merged: report.merged,
            updated: report.updated,
            skipped: report.skipped,
            failed: report.failed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/lead", post(lead))
        .route("/sweeps/creation", post(creation_sweep))
        .route("/sweeps/update", post(update_sweep))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// One exchange: append the user turn, ask the model for a reply, append it,
/// persist the transcript, and offer three follow-up prompts. Failures never
/// surface internals to the widget; the apology string goes in `response` and
/// the diagnostic goes in `error_message`.
async fn chat(State(state): State<AppState>, Json(body): Json<ChatRequest>) -> Json<ChatResponse> {
    let correlation_id = new_correlation_id();
    let query = clean_user_query(&body.user_query);
    let session_id = SessionId(body.session_id.trim().to_string());

    if query.is_empty() || session_id.0.is_empty() {
        let interface = ApplicationError::Domain(
            leadflow_core::errors::DomainError::InvariantViolation(
                "session_id and user_query are required".to_string(),
            ),
        )
        .into_interface(correlation_id.clone());
        warn!(
            event_name = "chat.request.rejected",
            correlation_id = %correlation_id,
            "blank session id or user query"
        );
        return Json(ChatResponse {
            response: interface.user_message().to_string(),
            pretype_prompts: suggestions::opening_prompts(),
            error_message: Some(interface.to_string()),
        });
    }

    match chat_exchange(&state, &session_id, &query).await {
        Ok(response) => {
            let pretype_prompts = suggestions::pretype_prompts(state.llm.as_ref(), &response).await;
            info!(
                event_name = "chat.exchange.completed",
                correlation_id = %correlation_id,
                session_id = %session_id,
            );
            Json(ChatResponse { response, pretype_prompts, error_message: None })
        }
        Err(application_error) => {
            error!(
                event_name = "chat.exchange.failed",
                correlation_id = %correlation_id,
                session_id = %session_id,
                error = %application_error,
            );
            let interface: InterfaceError = application_error.into_interface(correlation_id);
            Json(ChatResponse {
                response: interface.user_message().to_string(),
                pretype_prompts: suggestions::opening_prompts(),
                error_message: Some(interface.to_string()),
            })
        }
    }
}

async fn chat_exchange(
    state: &AppState,
    session_id: &SessionId,
    query: &str,
) -> Result<String, ApplicationError> {
    let mut transcript = state
        .transcripts
        .find(session_id)
        .await
        .map_err(|error| ApplicationError::Persistence(error.to_string()))?
        .unwrap_or_else(|| Transcript::new(session_id.clone()));

    transcript.push(Turn::user(query));

    let response = state
        .llm
        .converse(leadflow_agent::prompts::SYSTEM_INSTRUCTIONS, &transcript.turns)
        .await
        .map_err(|error| ApplicationError::Llm(error.to_string()))?;
    let response = response.trim().to_string();

    transcript.push(Turn::assistant(response.clone()));
    state
        .transcripts
        .save(transcript)
        .await
        .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

    Ok(response)
}

/// On-demand lead creation for the session behind the chat widget.
async fn lead(
    State(state): State<AppState>,
    Json(body): Json<LeadRequest>,
) -> Result<Json<LeadResponse>, (StatusCode, Json<ApiError>)> {
    let correlation_id = new_correlation_id();
    let session_id = SessionId(body.session_id.trim().to_string());

    if session_id.0.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError { error: "session_id is required".to_string(), correlation_id }),
        ));
    }

    let outcome = state
        .engine
        .create_on_demand(&session_id, body.user_query.as_deref())
        .await
        .map_err(|error| {
            error!(
                event_name = "lead.on_demand.failed",
                correlation_id = %correlation_id,
                session_id = %session_id,
                error = %error,
            );
            let interface: InterfaceError = error.into_interface(correlation_id.clone());
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiError { error: interface.to_string(), correlation_id: correlation_id.clone() }),
            )
        })?;

    info!(
        event_name = "lead.on_demand.completed",
        correlation_id = %correlation_id,
        session_id = %session_id,
        outcome = ?outcome,
    );

    // Conversations above the turn threshold report as qualified even when
    // the attempt itself did not produce a lead; the sweeps keep retrying.
    let (lead_type, lead_creation_message) = match outcome {
        OnDemandOutcome::NotEnoughTurns => (
            "Not Qualified",
            "User conversation not Qualified for creating salesforce lead".to_string(),
        ),
        OnDemandOutcome::AlreadyRecorded => (
            "Qualified",
            format!("session id {session_id} is already present in leads table"),
        ),
        OnDemandOutcome::Created { message, .. }
        | OnDemandOutcome::MergedDuplicate { message, .. }
        | OnDemandOutcome::NotQualified { message }
        | OnDemandOutcome::Failed { message } => ("Qualified", message),
    };

    Ok(Json(LeadResponse { lead_type: lead_type.to_string(), lead_creation_message }))
}

async fn creation_sweep(
    State(state): State<AppState>,
) -> Result<Json<SweepResponse>, (StatusCode, Json<ApiError>)> {
    run_sweep(&state, "creation").await
}

async fn update_sweep(
    State(state): State<AppState>,
) -> Result<Json<SweepResponse>, (StatusCode, Json<ApiError>)> {
    run_sweep(&state, "update").await
}

async fn run_sweep(
    state: &AppState,
    kind: &'static str,
) -> Result<Json<SweepResponse>, (StatusCode, Json<ApiError>)> {
    let correlation_id = new_correlation_id();

    let result = match kind {
        "creation" => state.engine.run_creation_sweep().await,
        _ => state.engine.run_update_sweep().await,
    };

    match result {
        Ok(report) => {
            info!(
                event_name = "sweep.completed",
                correlation_id = %correlation_id,
                sweep = kind,
                scanned = report.scanned,
                failed = report.failed,
            );
            Ok(Json(SweepResponse::from(report)))
        }
        Err(error) => {
            error!(
                event_name = "sweep.failed",
                correlation_id = %correlation_id,
                sweep = kind,
                error = %error,
            );
            let interface: InterfaceError = error.into_interface(correlation_id.clone());
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiError { error: interface.to_string(), correlation_id }),
            ))
        }
    }
}

fn new_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}
