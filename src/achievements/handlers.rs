use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{error, instrument};

use crate::{
    achievements::{dto::EarnedAchievement, repo},
    auth::AuthUser,
    state::AppState,
};

pub fn achievement_routes() -> Router<AppState> {
    Router::new().route("/me/achievements", get(my_achievements))
}

#[instrument(skip(state))]
pub async fn my_achievements(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<EarnedAchievement>>, (StatusCode, String)> {
    let achievements = repo::list_for_user(&state.db, user_id)
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %user_id, "list achievements failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something went wrong".to_string(),
            )
        })?;
    Ok(Json(achievements))
}
