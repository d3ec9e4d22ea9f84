use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::achievements::dto::EarnedAchievement;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Achievement {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub criteria: String,
    pub xp_bonus: i32,
    pub kind: String,
}

impl Achievement {
    pub async fn find_by_name_tx(
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
    ) -> sqlx::Result<Option<Achievement>> {
        sqlx::query_as::<_, Achievement>(
            r#"
            SELECT id, name, description, criteria, xp_bonus, kind
            FROM achievements
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&mut **tx)
        .await
    }
}

/// Insert the (user, achievement) pair unless it already exists. Returns
/// whether a row was inserted; the unique constraint keeps the award
/// at-most-once under concurrent completion evaluations.
pub async fn try_award_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    achievement_id: Uuid,
    now: OffsetDateTime,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO user_achievements (user_id, achievement_id, unlocked_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, achievement_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(achievement_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// All achievements a user has earned, newest first.
pub async fn list_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<EarnedAchievement>> {
    let rows = sqlx::query_as::<_, EarnedAchievement>(
        r#"
        SELECT a.name, a.description, a.xp_bonus, ua.unlocked_at
        FROM achievements a
        JOIN user_achievements ua ON ua.achievement_id = a.id
        WHERE ua.user_id = $1
        ORDER BY ua.unlocked_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
