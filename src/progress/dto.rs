use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::achievements::dto::AwardedAchievement;
use crate::progress::repo::ProgressStatus;
use crate::progress::services::MOCK_PERFORMANCE_RATIO;

/// Body for a component score submission. An external grader reports how
/// the learner did either as a ready-made ratio or as test counts; with no
/// body at all the mocked grade is used, as for the assessment kinds this
/// system has no grader for yet.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitScoreRequest {
    pub performance_ratio: Option<f64>,
    pub passed_tests: Option<u32>,
    pub total_tests: Option<u32>,
}

impl SubmitScoreRequest {
    pub fn resolve_ratio(&self) -> Result<f64, String> {
        if let Some(ratio) = self.performance_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err("performance_ratio must be between 0.0 and 1.0".into());
            }
            return Ok(ratio);
        }
        match (self.passed_tests, self.total_tests) {
            (Some(passed), Some(total)) => {
                if total == 0 {
                    Ok(0.0)
                } else if passed > total {
                    Err("passed_tests cannot exceed total_tests".into())
                } else {
                    Ok(f64::from(passed) / f64::from(total))
                }
            }
            (None, None) => Ok(MOCK_PERFORMANCE_RATIO),
            _ => Err("passed_tests and total_tests must be provided together".into()),
        }
    }
}

/// Structured result of a completion evaluation. The notice is the
/// human-readable message the presentation layer shows as-is.
#[derive(Debug, Serialize)]
pub struct CompletionOutcome {
    pub status: ProgressStatus,
    pub total_score: i32,
    pub attempts: i32,
    pub attempts_remaining: i32,
    pub xp_awarded: i32,
    /// New experience total when any XP was credited; the caller refreshes
    /// its session-local display from this.
    pub xp_total: Option<i32>,
    pub achievements_awarded: Vec<AwardedAchievement>,
    pub next_course_unlocked: Option<Uuid>,
    pub notice: String,
}

#[cfg(test)]
mod submit_request_tests {
    use super::*;

    #[test]
    fn explicit_ratio_wins() {
        let req = SubmitScoreRequest {
            performance_ratio: Some(0.5),
            passed_tests: Some(1),
            total_tests: Some(10),
        };
        assert_eq!(req.resolve_ratio().unwrap(), 0.5);
    }

    #[test]
    fn ratio_out_of_range_is_rejected() {
        for bad in [-0.1, 1.01, 2.0] {
            let req = SubmitScoreRequest {
                performance_ratio: Some(bad),
                ..Default::default()
            };
            assert!(req.resolve_ratio().is_err());
        }
    }

    #[test]
    fn test_counts_become_a_ratio() {
        let req = SubmitScoreRequest {
            performance_ratio: None,
            passed_tests: Some(3),
            total_tests: Some(4),
        };
        assert_eq!(req.resolve_ratio().unwrap(), 0.75);
    }

    #[test]
    fn zero_total_tests_means_zero_ratio() {
        let req = SubmitScoreRequest {
            performance_ratio: None,
            passed_tests: Some(0),
            total_tests: Some(0),
        };
        assert_eq!(req.resolve_ratio().unwrap(), 0.0);
    }

    #[test]
    fn more_passed_than_total_is_rejected() {
        let req = SubmitScoreRequest {
            performance_ratio: None,
            passed_tests: Some(5),
            total_tests: Some(4),
        };
        assert!(req.resolve_ratio().is_err());
    }

    #[test]
    fn empty_body_falls_back_to_mock_grade() {
        let req = SubmitScoreRequest::default();
        assert_eq!(req.resolve_ratio().unwrap(), MOCK_PERFORMANCE_RATIO);
    }

    #[test]
    fn half_a_pair_is_rejected() {
        let req = SubmitScoreRequest {
            performance_ratio: None,
            passed_tests: Some(2),
            total_tests: None,
        };
        assert!(req.resolve_ratio().is_err());
    }
}
