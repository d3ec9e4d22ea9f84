use serde::Serialize;
use time::OffsetDateTime;

/// An achievement granted during the current completion event.
#[derive(Debug, Clone, Serialize)]
pub struct AwardedAchievement {
    pub name: String,
    pub xp_bonus: i32,
}

/// One entry of a user's trophy list.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EarnedAchievement {
    pub name: String,
    pub description: String,
    pub xp_bonus: i32,
    pub unlocked_at: OffsetDateTime,
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn awarded_achievement_serializes_name_and_bonus() {
        let a = AwardedAchievement {
            name: "First Track Completed!".into(),
            xp_bonus: 200,
        };
        let json = serde_json::to_string(&a).unwrap();
        assert!(json.contains("First Track Completed!"));
        assert!(json.contains("200"));
    }
}
