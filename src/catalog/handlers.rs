use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    catalog::{
        dto::{CourseDetail, CourseSummary, TrackCoursesResponse},
        repo::{Assessment, Course, LearningPath, Track},
    },
    progress::{self, UserProgress},
    state::AppState,
};

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/paths", get(list_paths))
        .route("/paths/:path_id/tracks", get(list_tracks))
        .route("/tracks/:track_id/courses", get(track_courses))
        .route("/courses/:course_id", get(course_detail))
}

#[instrument(skip(state))]
pub async fn list_paths(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
) -> Result<Json<Vec<LearningPath>>, (StatusCode, String)> {
    let paths = LearningPath::list(&state.db).await.map_err(internal)?;
    Ok(Json(paths))
}

#[instrument(skip(state))]
pub async fn list_tracks(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(path_id): Path<Uuid>,
) -> Result<Json<Vec<Track>>, (StatusCode, String)> {
    let path = LearningPath::get(&state.db, path_id)
        .await
        .map_err(internal)?;
    if path.is_none() {
        return Err((StatusCode::NOT_FOUND, "Learning path not found".into()));
    }

    let tracks = Track::list_by_path(&state.db, path_id)
        .await
        .map_err(internal)?;
    Ok(Json(tracks))
}

/// The track's course list is where per-track progress is lazily created:
/// first view materializes a row per course, first course unlocked.
#[instrument(skip(state))]
pub async fn track_courses(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(track_id): Path<Uuid>,
) -> Result<Json<TrackCoursesResponse>, Response> {
    let track = Track::get(&state.db, track_id)
        .await
        .map_err(|e| internal(e).into_response())?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Track not found".to_string()).into_response())?;

    progress::services::initialize_progress_for_track(&state.db, user_id, track_id)
        .await
        .map_err(IntoResponse::into_response)?;

    let courses = Course::list_by_track(&state.db, track_id)
        .await
        .map_err(|e| internal(e).into_response())?;
    let progress_rows = UserProgress::map_for_track(&state.db, user_id, track_id)
        .await
        .map_err(|e| internal(e).into_response())?;
    let by_course: HashMap<Uuid, UserProgress> = progress_rows
        .into_iter()
        .map(|p| (p.course_id, p))
        .collect();

    let courses = courses
        .into_iter()
        .map(|c| {
            let progress = by_course.get(&c.id);
            CourseSummary::new(c, progress)
        })
        .collect();

    Ok(Json(TrackCoursesResponse { track, courses }))
}

#[instrument(skip(state))]
pub async fn course_detail(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(course_id): Path<Uuid>,
) -> Result<Json<CourseDetail>, (StatusCode, String)> {
    let course = Course::get(&state.db, course_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Course not found".to_string()))?;

    let progress = UserProgress::get(&state.db, user_id, course_id)
        .await
        .map_err(internal)?
        .ok_or((
            StatusCode::NOT_FOUND,
            "Course progress not initialized. Visit the track page first.".to_string(),
        ))?;

    if progress.status == progress::ProgressStatus::Locked {
        return Err((
            StatusCode::FORBIDDEN,
            "This course is currently locked. Complete previous courses to unlock.".to_string(),
        ));
    }

    let assessments = Assessment::list_by_course(&state.db, course_id)
        .await
        .map_err(internal)?;

    Ok(Json(CourseDetail {
        course,
        assessments,
        progress,
    }))
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    error!(error = %e, "catalog query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Something went wrong".to_string(),
    )
}
