use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::EngineError,
    progress::{
        dto::{CompletionOutcome, SubmitScoreRequest},
        repo::UserProgress,
        services,
    },
    state::AppState,
};

pub fn progress_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/courses/:course_id/assessments/:assessment_id/submissions",
            post(submit_score),
        )
        .route("/courses/:course_id/evaluation", post(evaluate))
        .route("/courses/:course_id/progress", get(get_progress))
}

#[instrument(skip(state, body))]
pub async fn submit_score(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((course_id, assessment_id)): Path<(Uuid, Uuid)>,
    body: Option<Json<SubmitScoreRequest>>,
) -> Result<Json<UserProgress>, Response> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let ratio = request
        .resolve_ratio()
        .map_err(|msg| (StatusCode::BAD_REQUEST, msg).into_response())?;

    let mut result =
        services::submit_component_score(&state.db, user_id, course_id, assessment_id, ratio)
            .await;

    // One retry on a serialization conflict, then surface the failure.
    if matches!(&result, Err(e) if e.is_retryable()) {
        warn!(user_id = %user_id, course_id = %course_id, "score submission conflicted, retrying");
        result =
            services::submit_component_score(&state.db, user_id, course_id, assessment_id, ratio)
                .await;
    }

    result.map(Json).map_err(EngineError::into_response)
}

#[instrument(skip(state))]
pub async fn evaluate(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(course_id): Path<Uuid>,
) -> Result<Json<CompletionOutcome>, EngineError> {
    let mut result = services::evaluate_completion(&state.db, user_id, course_id).await;

    if matches!(&result, Err(e) if e.is_retryable()) {
        warn!(user_id = %user_id, course_id = %course_id, "evaluation conflicted, retrying");
        result = services::evaluate_completion(&state.db, user_id, course_id).await;
    }

    result.map(Json)
}

#[instrument(skip(state))]
pub async fn get_progress(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(course_id): Path<Uuid>,
) -> Result<Json<UserProgress>, EngineError> {
    services::get_progress(&state.db, user_id, course_id)
        .await
        .map(Json)
}
