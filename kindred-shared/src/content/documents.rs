//! Typed CMS documents
//!
//! Field names match the projections in [`super::cms`], so the JSON coming
//! back from the CMS deserializes straight into these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A course offered in exchange for a donation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub slug: String,
    pub title: String,

    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub image_url: Option<String>,

    /// Suggested donation in minor units of `currency`
    #[serde(default)]
    pub suggested_donation_minor: i64,

    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default)]
    pub modules: Vec<CourseModule>,
}

impl Course {
    pub fn lesson_count(&self) -> usize {
        self.modules.iter().map(|m| m.lessons.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseModule {
    pub key: String,
    pub title: String,

    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub key: String,
    pub title: String,

    #[serde(default)]
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    pub role: String,

    #[serde(default)]
    pub bio: String,

    #[serde(default)]
    pub photo_url: Option<String>,

    /// Display position, ascending
    #[serde(default)]
    pub order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub slug: String,
    pub title: String,

    #[serde(default)]
    pub description: String,

    pub starts_at: DateTime<Utc>,

    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub registration_url: Option<String>,
}

/// An open position on the careers page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOpening {
    pub slug: String,
    pub title: String,

    #[serde(default)]
    pub department: String,

    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub employment_type: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub apply_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Testimonial {
    pub author: String,

    #[serde(default)]
    pub role: Option<String>,

    pub quote: String,

    #[serde(default)]
    pub course_slug: Option<String>,
}

/// A named price point offered as a shortcut to a custom amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationTier {
    pub slug: String,
    pub name: String,
    pub amount_minor: i64,

    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default)]
    pub benefits: Vec<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_course_defaults() {
        let course: Course = serde_json::from_value(json!({
            "slug": "data-basics",
            "title": "Data Basics",
            "modules": [{
                "key": "intro",
                "title": "Intro",
                "lessons": [{ "key": "welcome", "title": "Welcome" }]
            }]
        }))
        .unwrap();

        assert_eq!(course.currency, "USD");
        assert_eq!(course.suggested_donation_minor, 0);
        assert_eq!(course.lesson_count(), 1);
        assert_eq!(course.modules[0].lessons[0].duration_minutes, 0);
    }

    #[test]
    fn test_event_requires_start() {
        let result: Result<Event, _> = serde_json::from_value(json!({
            "slug": "open-day",
            "title": "Open Day"
        }));
        assert!(result.is_err());
    }
}
