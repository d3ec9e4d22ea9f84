use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::achievements;
use crate::auth::repo::User;
use crate::catalog::{Assessment, AssessmentKind, Course};
use crate::error::EngineError;
use crate::progress::dto::CompletionOutcome;
use crate::progress::repo::{ProgressStatus, UserProgress};

/// Fixed policy, not per-course configuration. A natural extension point
/// would move these onto the course or track rows.
pub const PASS_THRESHOLD: i32 = 70;
pub const MAX_ATTEMPTS: i32 = 3;
pub const COURSE_COMPLETION_XP: i32 = 100;

/// Stand-in grade for assessment kinds without a real grading collaborator.
pub const MOCK_PERFORMANCE_RATIO: f64 = 0.80;

/// Points earned on one component: the performance ratio applied to the
/// assessment's weight, rounded to the nearest whole point.
fn score_points(ratio: f64, weight_percentage: i32) -> i32 {
    (ratio * f64::from(weight_percentage)).round() as i32
}

/// The four component scores of a progress row. Total is always derived,
/// never stored independently of the components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scorecard {
    theory: i32,
    practice: i32,
    project: i32,
    live_coding: i32,
}

impl Scorecard {
    fn of(progress: &UserProgress) -> Self {
        Self {
            theory: progress.theory_score,
            practice: progress.practice_score,
            project: progress.project_score,
            live_coding: progress.live_coding_score,
        }
    }

    fn set(&mut self, kind: AssessmentKind, points: i32) {
        match kind {
            AssessmentKind::Theory => self.theory = points,
            AssessmentKind::Practice => self.practice = points,
            AssessmentKind::Project => self.project = points,
            AssessmentKind::LiveCoding => self.live_coding = points,
        }
    }

    fn total(&self) -> i32 {
        self.theory + self.practice + self.project + self.live_coding
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompletionDecision {
    Completed,
    Retry { attempts_remaining: i32 },
    Failed,
}

/// Pass/retry/fail decision for one evaluation. `new_attempts` is the
/// attempt count including the evaluation being decided. The fourth
/// evaluation fails regardless of score.
fn decide_completion(total_score: i32, new_attempts: i32) -> CompletionDecision {
    if new_attempts > MAX_ATTEMPTS {
        CompletionDecision::Failed
    } else if total_score >= PASS_THRESHOLD {
        CompletionDecision::Completed
    } else {
        CompletionDecision::Retry {
            attempts_remaining: MAX_ATTEMPTS - new_attempts,
        }
    }
}

/// Create missing progress rows for every course of a track, first course
/// unlocked, the rest locked. Idempotent; never deletes or regresses.
pub async fn initialize_progress_for_track(
    db: &PgPool,
    user_id: Uuid,
    track_id: Uuid,
) -> Result<(), EngineError> {
    let courses = Course::list_by_track(db, track_id).await?;

    let now = OffsetDateTime::now_utc();
    for course in &courses {
        let (status, unlocked_at) = if course.order_in_track == 1 {
            (ProgressStatus::Unlocked, Some(now))
        } else {
            (ProgressStatus::Locked, None)
        };
        let created =
            UserProgress::insert_if_absent(db, user_id, course.id, status, unlocked_at).await?;
        if created {
            debug!(user_id = %user_id, course_id = %course.id, status = status.as_str(),
                "initialized course progress");
        }
    }
    Ok(())
}

pub async fn get_progress(
    db: &PgPool,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<UserProgress, EngineError> {
    UserProgress::get(db, user_id, course_id)
        .await?
        .ok_or(EngineError::NotFound("course progress"))
}

/// Score Ledger entry point: write one graded component and recompute the
/// total, marking the attempt as begun on the first graded activity.
/// The whole update happens inside one transaction with the progress row
/// locked, so no partial component write can ever be observed.
pub async fn submit_component_score(
    db: &PgPool,
    user_id: Uuid,
    course_id: Uuid,
    assessment_id: Uuid,
    performance_ratio: f64,
) -> Result<UserProgress, EngineError> {
    let mut tx = db.begin().await?;

    let progress = UserProgress::get_for_update(&mut tx, user_id, course_id)
        .await?
        .ok_or(EngineError::NotFound("course progress"))?;

    if !progress.status.accepts_submissions() {
        return Err(EngineError::invalid_state(format!(
            "cannot submit a score for a course with status: {}",
            progress.status.as_str()
        )));
    }

    let assessment = Assessment::get_for_course_tx(&mut tx, assessment_id, course_id)
        .await?
        .ok_or(EngineError::NotFound("assessment"))?;

    let points = score_points(performance_ratio, assessment.weight_percentage);
    let mut scorecard = Scorecard::of(&progress);
    scorecard.set(assessment.kind, points);

    // First graded activity marks the attempt as begun.
    let status = if progress.status == ProgressStatus::Unlocked {
        ProgressStatus::InProgress
    } else {
        progress.status
    };

    let updated = UserProgress::record_component_score(
        &mut tx,
        progress.id,
        assessment.kind,
        points,
        scorecard.total(),
        status,
        OffsetDateTime::now_utc(),
    )
    .await?;

    tx.commit().await?;

    info!(
        user_id = %user_id,
        course_id = %course_id,
        kind = ?assessment.kind,
        points,
        total_score = updated.total_score,
        "component score recorded"
    );
    Ok(updated)
}

/// Progression State Machine entry point. Counts the attempt, decides
/// completed/retry/failed, and on completion awards the course XP and runs
/// the unlock propagator and achievement evaluator inside the same
/// transaction.
pub async fn evaluate_completion(
    db: &PgPool,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<CompletionOutcome, EngineError> {
    let mut tx = db.begin().await?;

    let progress = UserProgress::get_for_update(&mut tx, user_id, course_id)
        .await?
        .ok_or(EngineError::NotFound("course progress"))?;

    if progress.status.is_terminal() {
        return Err(EngineError::invalid_state(format!(
            "course already {}",
            progress.status.as_str()
        )));
    }

    let new_attempts = progress.attempts + 1;
    let now = OffsetDateTime::now_utc();
    let total_score = progress.total_score;

    let outcome = match decide_completion(total_score, new_attempts) {
        CompletionDecision::Completed => {
            let updated = UserProgress::record_evaluation(
                &mut tx,
                progress.id,
                ProgressStatus::Completed,
                new_attempts,
                now,
                Some(now),
            )
            .await?;

            let mut xp_total = User::credit_xp_tx(&mut tx, user_id, COURSE_COMPLETION_XP).await?;

            let course = Course::get_tx(&mut tx, course_id)
                .await?
                .ok_or(EngineError::NotFound("course"))?;

            let next_course_unlocked = unlock_next_course(&mut tx, user_id, &course, now).await?;

            let achievements_awarded =
                achievements::services::evaluate_on_completion(&mut tx, user_id, &course).await?;
            xp_total += achievements_awarded.iter().map(|a| a.xp_bonus).sum::<i32>();

            info!(
                user_id = %user_id,
                course_id = %course_id,
                total_score,
                attempts = new_attempts,
                achievements = achievements_awarded.len(),
                "course completed"
            );

            CompletionOutcome {
                status: updated.status,
                total_score,
                attempts: new_attempts,
                attempts_remaining: MAX_ATTEMPTS - new_attempts,
                xp_awarded: COURSE_COMPLETION_XP,
                xp_total: Some(xp_total),
                achievements_awarded,
                next_course_unlocked,
                notice: format!(
                    "Congratulations! Course passed with {total_score} points. \
                     You earned {COURSE_COMPLETION_XP} XP!"
                ),
            }
        }
        CompletionDecision::Retry { attempts_remaining } => {
            let updated = UserProgress::record_evaluation(
                &mut tx,
                progress.id,
                ProgressStatus::InProgress,
                new_attempts,
                now,
                None,
            )
            .await?;

            CompletionOutcome {
                status: updated.status,
                total_score,
                attempts: new_attempts,
                attempts_remaining,
                xp_awarded: 0,
                xp_total: None,
                achievements_awarded: Vec::new(),
                next_course_unlocked: None,
                notice: format!(
                    "Your score: {total_score}. You need {PASS_THRESHOLD} to pass. \
                     Attempts left: {attempts_remaining}. Keep trying!"
                ),
            }
        }
        CompletionDecision::Failed => {
            let updated = UserProgress::record_evaluation(
                &mut tx,
                progress.id,
                ProgressStatus::Failed,
                new_attempts,
                now,
                None,
            )
            .await?;

            info!(
                user_id = %user_id,
                course_id = %course_id,
                total_score,
                attempts = new_attempts,
                "course failed, attempt cap reached"
            );

            CompletionOutcome {
                status: updated.status,
                total_score,
                attempts: new_attempts,
                attempts_remaining: 0,
                xp_awarded: 0,
                xp_total: None,
                achievements_awarded: Vec::new(),
                next_course_unlocked: None,
                notice: format!(
                    "Your score: {total_score}. Maximum attempts ({MAX_ATTEMPTS}) reached \
                     for this course. This course is now marked as failed."
                ),
            }
        }
    };

    tx.commit().await?;
    Ok(outcome)
}

/// Unlock Propagator: advance the course at `order_in_track + 1` from
/// locked to unlocked. End of track is a silent no-op.
async fn unlock_next_course(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    completed: &Course,
    now: OffsetDateTime,
) -> sqlx::Result<Option<Uuid>> {
    let Some(next) = Course::next_in_track_tx(tx, completed.track_id, completed.order_in_track)
        .await?
    else {
        return Ok(None);
    };

    match UserProgress::get_for_update(tx, user_id, next.id).await? {
        Some(p) if p.status == ProgressStatus::Locked => {
            UserProgress::mark_unlocked_tx(tx, p.id, now).await?;
            info!(user_id = %user_id, course_id = %next.id, "next course unlocked");
            Ok(Some(next.id))
        }
        Some(_) => Ok(None),
        None => {
            // The lazy initializer normally creates the row as locked
            // beforehand; create it directly as unlocked when it has not.
            UserProgress::insert_unlocked_tx(tx, user_id, next.id, now).await?;
            info!(user_id = %user_id, course_id = %next.id, "next course unlocked (row created)");
            Ok(Some(next.id))
        }
    }
}

#[cfg(test)]
mod scorecard_tests {
    use super::*;

    fn blank_progress() -> UserProgress {
        UserProgress {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            status: ProgressStatus::Unlocked,
            theory_score: 0,
            practice_score: 0,
            project_score: 0,
            live_coding_score: 0,
            total_score: 0,
            attempts: 0,
            unlocked_at: None,
            last_attempt_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn perfect_theory_on_weight_20_scores_20() {
        assert_eq!(score_points(1.0, 20), 20);

        let mut card = Scorecard::of(&blank_progress());
        card.set(AssessmentKind::Theory, score_points(1.0, 20));
        assert_eq!(card.theory, 20);
        assert_eq!(card.total(), 20);
    }

    #[test]
    fn points_round_to_nearest() {
        assert_eq!(score_points(0.80, 25), 20);
        assert_eq!(score_points(0.80, 15), 12);
        assert_eq!(score_points(0.33, 40), 13);
        assert_eq!(score_points(0.0, 100), 0);
        assert_eq!(score_points(1.0, 0), 0);
    }

    #[test]
    fn total_is_always_the_component_sum() {
        let mut progress = blank_progress();
        progress.theory_score = 18;
        progress.practice_score = 32;

        let mut card = Scorecard::of(&progress);
        assert_eq!(card.total(), 50);

        card.set(AssessmentKind::Project, 21);
        card.set(AssessmentKind::LiveCoding, 12);
        assert_eq!(card.total(), 18 + 32 + 21 + 12);

        // Resubmission overwrites the component, not adds to it.
        card.set(AssessmentKind::Practice, 40);
        assert_eq!(card.total(), 18 + 40 + 21 + 12);
    }
}

#[cfg(test)]
mod state_machine_tests {
    use super::*;

    #[test]
    fn passing_score_on_first_attempt_completes() {
        assert_eq!(decide_completion(75, 1), CompletionDecision::Completed);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(decide_completion(70, 1), CompletionDecision::Completed);
        assert_eq!(
            decide_completion(69, 1),
            CompletionDecision::Retry {
                attempts_remaining: 2
            }
        );
    }

    #[test]
    fn third_try_is_still_allowed() {
        assert_eq!(
            decide_completion(50, 3),
            CompletionDecision::Retry {
                attempts_remaining: 0
            }
        );
        // A passing third evaluation still completes.
        assert_eq!(decide_completion(82, 3), CompletionDecision::Completed);
    }

    #[test]
    fn fourth_evaluation_fails_regardless_of_score() {
        assert_eq!(decide_completion(50, 4), CompletionDecision::Failed);
        assert_eq!(decide_completion(100, 4), CompletionDecision::Failed);
    }

    #[test]
    fn terminal_statuses_accept_no_submissions() {
        assert!(!ProgressStatus::Completed.accepts_submissions());
        assert!(!ProgressStatus::Failed.accepts_submissions());
        assert!(!ProgressStatus::Locked.accepts_submissions());
        assert!(ProgressStatus::Unlocked.accepts_submissions());
        assert!(ProgressStatus::InProgress.accepts_submissions());
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(ProgressStatus::Completed.is_terminal());
        assert!(ProgressStatus::Failed.is_terminal());
        assert!(!ProgressStatus::Locked.is_terminal());
        assert!(!ProgressStatus::Unlocked.is_terminal());
        assert!(!ProgressStatus::InProgress.is_terminal());
    }
}
