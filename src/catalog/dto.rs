use serde::Serialize;
use uuid::Uuid;

use crate::catalog::repo::{Assessment, Course, Track};
use crate::progress::{ProgressStatus, UserProgress};

/// One row of a track's course list, joined with the caller's progress.
#[derive(Debug, Serialize)]
pub struct CourseSummary {
    pub id: Uuid,
    pub name: String,
    pub level_number: i32,
    pub duration_days: i32,
    pub order_in_track: i32,
    pub status: ProgressStatus,
    pub total_score: i32,
}

impl CourseSummary {
    pub fn new(course: Course, progress: Option<&UserProgress>) -> Self {
        Self {
            id: course.id,
            name: course.name,
            level_number: course.level_number,
            duration_days: course.duration_days,
            order_in_track: course.order_in_track,
            status: progress.map(|p| p.status).unwrap_or(ProgressStatus::Locked),
            total_score: progress.map(|p| p.total_score).unwrap_or(0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TrackCoursesResponse {
    pub track: Track,
    pub courses: Vec<CourseSummary>,
}

#[derive(Debug, Serialize)]
pub struct CourseDetail {
    pub course: Course,
    pub assessments: Vec<Assessment>,
    pub progress: UserProgress,
}
