use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Graded component kind. `Project` also covers the "Mini Challenge"
/// assessments of the single-language tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "assessment_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssessmentKind {
    Theory,
    Practice,
    Project,
    LiveCoding,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LearningPath {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Track {
    pub id: Uuid,
    pub path_id: Uuid,
    pub name: String,
    pub description: String,
    pub total_duration_weeks: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: Uuid,
    pub track_id: Uuid,
    pub name: String,
    pub level_number: i32,
    pub duration_days: i32,
    pub core_concepts: String,
    pub order_in_track: i32,
    pub milestone_tag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assessment {
    pub id: Uuid,
    pub course_id: Uuid,
    pub kind: AssessmentKind,
    pub description: String,
    pub weight_percentage: i32,
}

impl LearningPath {
    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<LearningPath>> {
        let rows = sqlx::query_as::<_, LearningPath>(
            r#"
            SELECT id, name, description
            FROM learning_paths
            ORDER BY name
            "#,
        )
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn get(db: &PgPool, id: Uuid) -> anyhow::Result<Option<LearningPath>> {
        let row = sqlx::query_as::<_, LearningPath>(
            r#"
            SELECT id, name, description
            FROM learning_paths
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }
}

impl Track {
    pub async fn list_by_path(db: &PgPool, path_id: Uuid) -> anyhow::Result<Vec<Track>> {
        let rows = sqlx::query_as::<_, Track>(
            r#"
            SELECT id, path_id, name, description, total_duration_weeks
            FROM tracks
            WHERE path_id = $1
            ORDER BY name
            "#,
        )
        .bind(path_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn get(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Track>> {
        let row = sqlx::query_as::<_, Track>(
            r#"
            SELECT id, path_id, name, description, total_duration_weeks
            FROM tracks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }
}

const COURSE_COLUMNS: &str =
    "id, track_id, name, level_number, duration_days, core_concepts, order_in_track, milestone_tag";

impl Course {
    pub async fn list_by_track(db: &PgPool, track_id: Uuid) -> sqlx::Result<Vec<Course>> {
        sqlx::query_as::<_, Course>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE track_id = $1 ORDER BY order_in_track"
        ))
        .bind(track_id)
        .fetch_all(db)
        .await
    }

    pub async fn get(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Course>> {
        let row = sqlx::query_as::<_, Course>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn get_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> sqlx::Result<Option<Course>> {
        sqlx::query_as::<_, Course>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
    }

    /// The course directly after `order_in_track` in the same track, if any.
    pub async fn next_in_track_tx(
        tx: &mut Transaction<'_, Postgres>,
        track_id: Uuid,
        order_in_track: i32,
    ) -> sqlx::Result<Option<Course>> {
        sqlx::query_as::<_, Course>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE track_id = $1 AND order_in_track = $2"
        ))
        .bind(track_id)
        .bind(order_in_track + 1)
        .fetch_optional(&mut **tx)
        .await
    }

    pub async fn find_by_milestone_tag_tx(
        tx: &mut Transaction<'_, Postgres>,
        tag: &str,
    ) -> sqlx::Result<Option<Course>> {
        sqlx::query_as::<_, Course>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE milestone_tag = $1"
        ))
        .bind(tag)
        .fetch_optional(&mut **tx)
        .await
    }
}

impl Assessment {
    pub async fn list_by_course(db: &PgPool, course_id: Uuid) -> anyhow::Result<Vec<Assessment>> {
        let rows = sqlx::query_as::<_, Assessment>(
            r#"
            SELECT id, course_id, kind, description, weight_percentage
            FROM assessments
            WHERE course_id = $1
            ORDER BY kind, description
            "#,
        )
        .bind(course_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Fetch an assessment only if it belongs to the given course.
    pub async fn get_for_course_tx(
        tx: &mut Transaction<'_, Postgres>,
        assessment_id: Uuid,
        course_id: Uuid,
    ) -> sqlx::Result<Option<Assessment>> {
        sqlx::query_as::<_, Assessment>(
            r#"
            SELECT id, course_id, kind, description, weight_percentage
            FROM assessments
            WHERE id = $1 AND course_id = $2
            "#,
        )
        .bind(assessment_id)
        .bind(course_id)
        .fetch_optional(&mut **tx)
        .await
    }
}

/// A track whose course ordering violates the contiguity invariant
/// (orders must run 1..=n with no gaps or duplicates).
#[derive(Debug)]
pub struct OrderViolation {
    pub track_id: Uuid,
    pub track_name: String,
    pub orders: Vec<i32>,
}

/// The unlock propagator assumes `order_in_track` is contiguous starting
/// at 1. Checked once at startup instead of silently at runtime.
pub async fn verify_order_contiguity(db: &PgPool) -> anyhow::Result<Vec<OrderViolation>> {
    let rows: Vec<(Uuid, String, Vec<i32>)> = sqlx::query_as(
        r#"
        SELECT t.id, t.name, array_agg(c.order_in_track ORDER BY c.order_in_track)
        FROM tracks t
        JOIN courses c ON c.track_id = t.id
        GROUP BY t.id, t.name
        "#,
    )
    .fetch_all(db)
    .await?;

    let violations = rows
        .into_iter()
        .filter(|(_, _, orders)| !orders_are_contiguous(orders))
        .map(|(track_id, track_name, orders)| OrderViolation {
            track_id,
            track_name,
            orders,
        })
        .collect();
    Ok(violations)
}

fn orders_are_contiguous(orders: &[i32]) -> bool {
    orders
        .iter()
        .enumerate()
        .all(|(i, &o)| o == i as i32 + 1)
}

#[cfg(test)]
mod ordering_tests {
    use super::orders_are_contiguous;

    #[test]
    fn contiguous_orders_pass() {
        assert!(orders_are_contiguous(&[1, 2, 3, 4]));
        assert!(orders_are_contiguous(&[1]));
    }

    #[test]
    fn empty_track_passes() {
        assert!(orders_are_contiguous(&[]));
    }

    #[test]
    fn gaps_and_duplicates_fail() {
        assert!(!orders_are_contiguous(&[1, 3, 4]));
        assert!(!orders_are_contiguous(&[1, 2, 2, 3]));
        assert!(!orders_are_contiguous(&[2, 3, 4]));
    }
}
