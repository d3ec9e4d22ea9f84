use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::achievements::dto::AwardedAchievement;
use crate::achievements::repo::{self, Achievement};
use crate::auth::repo::User;
use crate::catalog::Course;
use crate::progress::repo::{self as progress_repo, UserProgress};

/// Per-course milestones, matched on the course's stable `milestone_tag`
/// rather than its display name, so renaming a course in the catalog does
/// not detach its achievement.
const COURSE_MILESTONES: &[(&str, &str)] = &[
    ("js-fundamentals", "JavaScript Novice"),
    ("php-fundamentals", "PHP Beginner"),
    ("html5-semantics", "Web Dev Starter"),
    ("js-functions-scope", "JS Functions Pro"),
    ("js-dom-manipulation", "DOM Manipulator"),
    ("php-oop-basic", "PHP OOP Basics"),
];

/// Cross-course rule: completing the integration course awards the
/// foundation achievement only when the DOM course is also completed.
const FULLSTACK_TRIGGER_TAG: &str = "fullstack-integration";
const FULLSTACK_PREREQ_TAG: &str = "js-dom-events";
const FULLSTACK_ACHIEVEMENT: &str = "Full-Stack Foundation";

const FIVE_COURSES_ACHIEVEMENT: &str = "Five Courses Down!";
const FIVE_COURSES_THRESHOLD: i64 = 5;

const TRACK_COMPLETE_ACHIEVEMENT: &str = "First Track Completed!";

const HALFWAY_ACHIEVEMENT: &str = "Halfway There!";
const HALFWAY_MIN_TRACK_SIZE: i64 = 10;
const HALFWAY_COMPLETED: i64 = 6;

fn milestone_achievement(tag: &str) -> Option<&'static str> {
    COURSE_MILESTONES
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, name)| *name)
}

/// Aggregate rules over the user's completion counts, in evaluation order.
fn aggregate_achievements(
    completed_courses: i64,
    completed_in_track: i64,
    track_size: i64,
) -> Vec<&'static str> {
    let mut names = Vec::new();
    if completed_courses >= FIVE_COURSES_THRESHOLD {
        names.push(FIVE_COURSES_ACHIEVEMENT);
    }
    // An empty track never counts as completed.
    if track_size > 0 && completed_in_track == track_size {
        names.push(TRACK_COMPLETE_ACHIEVEMENT);
    }
    if track_size >= HALFWAY_MIN_TRACK_SIZE && completed_in_track >= HALFWAY_COMPLETED {
        names.push(HALFWAY_ACHIEVEMENT);
    }
    names
}

/// Run the full rule table for one completion event. Called only on the
/// completed transition, inside the completion transaction; the progress
/// row is already marked completed, so aggregates include this course.
pub async fn evaluate_on_completion(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    course: &Course,
) -> sqlx::Result<Vec<AwardedAchievement>> {
    let now = OffsetDateTime::now_utc();
    let mut awarded = Vec::new();

    if let Some(tag) = course.milestone_tag.as_deref() {
        if let Some(name) = milestone_achievement(tag) {
            if let Some(a) = award(tx, user_id, name, now).await? {
                awarded.push(a);
            }
        }

        if tag == FULLSTACK_TRIGGER_TAG {
            if let Some(prereq) = Course::find_by_milestone_tag_tx(tx, FULLSTACK_PREREQ_TAG).await?
            {
                if UserProgress::is_completed_tx(tx, user_id, prereq.id).await? {
                    if let Some(a) = award(tx, user_id, FULLSTACK_ACHIEVEMENT, now).await? {
                        awarded.push(a);
                    }
                }
            }
        }
    }

    let completed_courses = UserProgress::count_completed_tx(tx, user_id).await?;
    let track = progress_repo::track_completion_tx(tx, user_id, course.track_id).await?;

    for name in aggregate_achievements(completed_courses, track.completed, track.total) {
        if let Some(a) = award(tx, user_id, name, now).await? {
            awarded.push(a);
        }
    }

    Ok(awarded)
}

/// Idempotent award: a no-op when the user already holds the achievement.
/// An achievement name missing from the catalog is logged and skipped
/// rather than failing the surrounding completion transaction.
pub async fn award(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    name: &str,
    now: OffsetDateTime,
) -> sqlx::Result<Option<AwardedAchievement>> {
    let Some(achievement) = Achievement::find_by_name_tx(tx, name).await? else {
        warn!(achievement = name, "achievement not in catalog, skipping");
        return Ok(None);
    };

    if !repo::try_award_tx(tx, user_id, achievement.id, now).await? {
        return Ok(None);
    }

    User::credit_xp_tx(tx, user_id, achievement.xp_bonus).await?;

    info!(
        user_id = %user_id,
        achievement = %achievement.name,
        xp_bonus = achievement.xp_bonus,
        "achievement unlocked"
    );
    Ok(Some(AwardedAchievement {
        name: achievement.name,
        xp_bonus: achievement.xp_bonus,
    }))
}

#[cfg(test)]
mod rule_tests {
    use super::*;

    #[test]
    fn milestone_tags_map_to_their_achievements() {
        assert_eq!(
            milestone_achievement("js-fundamentals"),
            Some("JavaScript Novice")
        );
        assert_eq!(
            milestone_achievement("php-fundamentals"),
            Some("PHP Beginner")
        );
        assert_eq!(
            milestone_achievement("html5-semantics"),
            Some("Web Dev Starter")
        );
        assert_eq!(
            milestone_achievement("js-functions-scope"),
            Some("JS Functions Pro")
        );
        assert_eq!(
            milestone_achievement("js-dom-manipulation"),
            Some("DOM Manipulator")
        );
        assert_eq!(milestone_achievement("php-oop-basic"), Some("PHP OOP Basics"));
    }

    #[test]
    fn unknown_tags_match_nothing() {
        assert_eq!(milestone_achievement("js-dom-events"), None);
        assert_eq!(milestone_achievement(""), None);
        assert_eq!(milestone_achievement("fullstack-integration"), None);
    }

    #[test]
    fn five_completed_courses_hit_the_universal_milestone() {
        assert!(aggregate_achievements(5, 1, 12).contains(&FIVE_COURSES_ACHIEVEMENT));
        assert!(!aggregate_achievements(4, 1, 12).contains(&FIVE_COURSES_ACHIEVEMENT));
    }

    #[test]
    fn finishing_a_whole_track_awards_track_complete() {
        // A 6-course track, all six completed.
        let names = aggregate_achievements(6, 6, 6);
        assert!(names.contains(&TRACK_COMPLETE_ACHIEVEMENT));
    }

    #[test]
    fn an_empty_track_is_never_complete() {
        assert!(!aggregate_achievements(0, 0, 0).contains(&TRACK_COMPLETE_ACHIEVEMENT));
    }

    #[test]
    fn halfway_requires_a_substantial_track() {
        assert!(aggregate_achievements(6, 6, 12).contains(&HALFWAY_ACHIEVEMENT));
        assert!(aggregate_achievements(6, 6, 10).contains(&HALFWAY_ACHIEVEMENT));
        // Six of a short track is not "halfway".
        assert!(!aggregate_achievements(6, 6, 9).contains(&HALFWAY_ACHIEVEMENT));
        assert!(!aggregate_achievements(5, 5, 12).contains(&HALFWAY_ACHIEVEMENT));
    }

    #[test]
    fn aggregate_rules_keep_their_evaluation_order() {
        let names = aggregate_achievements(12, 12, 12);
        assert_eq!(
            names,
            vec![
                FIVE_COURSES_ACHIEVEMENT,
                TRACK_COMPLETE_ACHIEVEMENT,
                HALFWAY_ACHIEVEMENT
            ]
        );
    }
}
