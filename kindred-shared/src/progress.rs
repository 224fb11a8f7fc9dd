//! Lesson progress computation
//!
//! Pure functions over the module → lesson tree stored in
//! [`CourseProgress`](crate::models::course_progress::CourseProgress). The
//! HTTP layer loads the tree, applies one [`LessonUpdate`], and saves it back;
//! the summary columns are derived here and nowhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::documents::Course;
use crate::models::course_progress::{LessonProgress, ModuleProgress};

/// Errors from applying a lesson update
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgressError {
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Unknown lesson {lesson} in module {module}")]
    UnknownLesson { module: String, lesson: String },

    #[error("time_spent_seconds must not be negative")]
    NegativeTime,
}

/// A client's change to one lesson
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonUpdate {
    pub module_key: String,
    pub lesson_key: String,

    /// New completion flag; `None` leaves it unchanged
    #[serde(default)]
    pub completed: Option<bool>,

    /// Seconds to add to the lesson's running total
    #[serde(default)]
    pub time_spent_seconds: i64,
}

/// Values derived from a lesson tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub completed_lessons: usize,
    pub total_lessons: usize,
    pub overall_progress: i32,
    pub total_time_spent_seconds: i64,
    pub certificate_eligible: bool,
}

/// Builds the initial lesson tree for a course, everything incomplete
pub fn outline_to_progress(course: &Course) -> Vec<ModuleProgress> {
    course
        .modules
        .iter()
        .map(|module| ModuleProgress {
            module_key: module.key.clone(),
            title: module.title.clone(),
            lessons: module
                .lessons
                .iter()
                .map(|lesson| LessonProgress {
                    lesson_key: lesson.key.clone(),
                    title: lesson.title.clone(),
                    completed: false,
                    completion_date: None,
                    time_spent_seconds: 0,
                })
                .collect(),
        })
        .collect()
}

/// Applies one lesson update in place
///
/// `completion_date` is stamped the first time a lesson becomes complete and
/// cleared when it is marked incomplete again. Re-completing an already
/// complete lesson keeps the original date.
pub fn apply_lesson_update(
    modules: &mut [ModuleProgress],
    update: &LessonUpdate,
    now: DateTime<Utc>,
) -> Result<(), ProgressError> {
    if update.time_spent_seconds < 0 {
        return Err(ProgressError::NegativeTime);
    }

    let module = modules
        .iter_mut()
        .find(|m| m.module_key == update.module_key)
        .ok_or_else(|| ProgressError::UnknownModule(update.module_key.clone()))?;

    let lesson = module
        .lessons
        .iter_mut()
        .find(|l| l.lesson_key == update.lesson_key)
        .ok_or_else(|| ProgressError::UnknownLesson {
            module: update.module_key.clone(),
            lesson: update.lesson_key.clone(),
        })?;

    match update.completed {
        Some(true) if !lesson.completed => {
            lesson.completed = true;
            lesson.completion_date = Some(now);
        }
        Some(false) => {
            lesson.completed = false;
            lesson.completion_date = None;
        }
        _ => {}
    }

    lesson.time_spent_seconds = lesson
        .time_spent_seconds
        .saturating_add(update.time_spent_seconds);

    Ok(())
}

/// Derives the summary columns from a lesson tree
pub fn summarize(modules: &[ModuleProgress]) -> ProgressSummary {
    let lessons = modules.iter().flat_map(|m| m.lessons.iter());

    let mut total = 0usize;
    let mut completed = 0usize;
    let mut time = 0i64;

    for lesson in lessons {
        total += 1;
        if lesson.completed {
            completed += 1;
        }
        time = time.saturating_add(lesson.time_spent_seconds.max(0));
    }

    let overall_progress = if total == 0 {
        0
    } else {
        (completed * 100 / total) as i32
    };

    ProgressSummary {
        completed_lessons: completed,
        total_lessons: total,
        overall_progress,
        total_time_spent_seconds: time,
        certificate_eligible: total > 0 && completed == total,
    }
}
