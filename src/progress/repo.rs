use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::catalog::AssessmentKind;

/// Lifecycle of a learner's attempt at a course.
/// Only moves forward: locked → unlocked → in_progress → {completed, failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "progress_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Locked,
    Unlocked,
    InProgress,
    Completed,
    Failed,
}

impl ProgressStatus {
    /// Completed and failed are terminal; nothing moves out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Component scores may only be submitted while the course is open.
    pub fn accepts_submissions(&self) -> bool {
        matches!(self, Self::Unlocked | Self::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProgress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub status: ProgressStatus,
    pub theory_score: i32,
    pub practice_score: i32,
    pub project_score: i32,
    pub live_coding_score: i32,
    pub total_score: i32,
    pub attempts: i32,
    pub unlocked_at: Option<OffsetDateTime>,
    pub last_attempt_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
}

const PROGRESS_COLUMNS: &str = "id, user_id, course_id, status, theory_score, practice_score, \
     project_score, live_coding_score, total_score, attempts, unlocked_at, last_attempt_at, \
     completed_at";

/// Column holding the score for a given assessment kind.
fn score_column(kind: AssessmentKind) -> &'static str {
    match kind {
        AssessmentKind::Theory => "theory_score",
        AssessmentKind::Practice => "practice_score",
        AssessmentKind::Project => "project_score",
        AssessmentKind::LiveCoding => "live_coding_score",
    }
}

impl UserProgress {
    pub async fn get(
        db: &PgPool,
        user_id: Uuid,
        course_id: Uuid,
    ) -> sqlx::Result<Option<UserProgress>> {
        sqlx::query_as::<_, UserProgress>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM user_progress WHERE user_id = $1 AND course_id = $2"
        ))
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(db)
        .await
    }

    /// Row-locked read. Serializes the whole submit/evaluate/award sequence
    /// per (user, course).
    pub async fn get_for_update(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        course_id: Uuid,
    ) -> sqlx::Result<Option<UserProgress>> {
        sqlx::query_as::<_, UserProgress>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM user_progress \
             WHERE user_id = $1 AND course_id = $2 FOR UPDATE"
        ))
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&mut **tx)
        .await
    }

    /// Lazy per-track initialization. `ON CONFLICT DO NOTHING` makes
    /// concurrent first views of the same track race-safe.
    pub async fn insert_if_absent(
        db: &PgPool,
        user_id: Uuid,
        course_id: Uuid,
        status: ProgressStatus,
        unlocked_at: Option<OffsetDateTime>,
    ) -> sqlx::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_progress (user_id, course_id, status, unlocked_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, course_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .bind(status)
        .bind(unlocked_at)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Defensive creation of an already-unlocked row for the next course
    /// when the lazy initializer has not run for it yet.
    pub async fn insert_unlocked_tx(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        course_id: Uuid,
        now: OffsetDateTime,
    ) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_progress (user_id, course_id, status, unlocked_at)
            VALUES ($1, $2, 'unlocked', $3)
            ON CONFLICT (user_id, course_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Write one component score and the recomputed total in a single
    /// statement, so the sum invariant holds in every committed state.
    pub async fn record_component_score(
        tx: &mut Transaction<'_, Postgres>,
        progress_id: Uuid,
        kind: AssessmentKind,
        points: i32,
        total_score: i32,
        status: ProgressStatus,
        now: OffsetDateTime,
    ) -> sqlx::Result<UserProgress> {
        let column = score_column(kind);
        sqlx::query_as::<_, UserProgress>(&format!(
            "UPDATE user_progress \
             SET {column} = $1, total_score = $2, status = $3, last_attempt_at = $4 \
             WHERE id = $5 \
             RETURNING {PROGRESS_COLUMNS}"
        ))
        .bind(points)
        .bind(total_score)
        .bind(status)
        .bind(now)
        .bind(progress_id)
        .fetch_one(&mut **tx)
        .await
    }

    /// Persist the result of a completion evaluation. Attempts and
    /// last_attempt_at move on every call; completed_at only on success.
    pub async fn record_evaluation(
        tx: &mut Transaction<'_, Postgres>,
        progress_id: Uuid,
        status: ProgressStatus,
        attempts: i32,
        now: OffsetDateTime,
        completed_at: Option<OffsetDateTime>,
    ) -> sqlx::Result<UserProgress> {
        sqlx::query_as::<_, UserProgress>(&format!(
            "UPDATE user_progress \
             SET status = $1, attempts = $2, last_attempt_at = $3, \
                 completed_at = COALESCE($4, completed_at) \
             WHERE id = $5 \
             RETURNING {PROGRESS_COLUMNS}"
        ))
        .bind(status)
        .bind(attempts)
        .bind(now)
        .bind(completed_at)
        .bind(progress_id)
        .fetch_one(&mut **tx)
        .await
    }

    pub async fn mark_unlocked_tx(
        tx: &mut Transaction<'_, Postgres>,
        progress_id: Uuid,
        now: OffsetDateTime,
    ) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            UPDATE user_progress
            SET status = 'unlocked', unlocked_at = $1
            WHERE id = $2 AND status = 'locked'
            "#,
        )
        .bind(now)
        .bind(progress_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn is_completed_tx(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        course_id: Uuid,
    ) -> sqlx::Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM user_progress
                WHERE user_id = $1 AND course_id = $2 AND status = 'completed'
            )
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(exists)
    }

    /// Completed courses for the user across all tracks.
    pub async fn count_completed_tx(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
    ) -> sqlx::Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT count(*) FROM user_progress
            WHERE user_id = $1 AND status = 'completed'
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(count)
    }

    /// For all courses in the track: the user's progress keyed by course.
    pub async fn map_for_track(
        db: &PgPool,
        user_id: Uuid,
        track_id: Uuid,
    ) -> sqlx::Result<Vec<UserProgress>> {
        sqlx::query_as::<_, UserProgress>(&format!(
            "SELECT up.{} FROM user_progress up \
             JOIN courses c ON c.id = up.course_id \
             WHERE up.user_id = $1 AND c.track_id = $2",
            PROGRESS_COLUMNS.replace(", ", ", up.")
        ))
        .bind(user_id)
        .bind(track_id)
        .fetch_all(db)
        .await
    }
}

/// Completed vs. total course counts for one user in one track.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct TrackCompletion {
    pub completed: i64,
    pub total: i64,
}

pub async fn track_completion_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    track_id: Uuid,
) -> sqlx::Result<TrackCompletion> {
    sqlx::query_as::<_, TrackCompletion>(
        r#"
        SELECT
            count(*) FILTER (WHERE up.status = 'completed') AS completed,
            count(*) AS total
        FROM courses c
        LEFT JOIN user_progress up ON up.course_id = c.id AND up.user_id = $1
        WHERE c.track_id = $2
        "#,
    )
    .bind(user_id)
    .bind(track_id)
    .fetch_one(&mut **tx)
    .await
}
