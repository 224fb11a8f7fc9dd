//! Static content served when the CMS has nothing
//!
//! Keeps the public pages and the donation flow usable on a fresh deployment
//! before any documents have been published.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value as JsonValue;

use super::documents::{
    Course, CourseModule, DonationTier, Event, JobOpening, Lesson, TeamMember, Testimonial,
};
use super::{ContentError, ContentKind, ContentSource};

/// Source for deployments without a CMS: every query comes back empty, so
/// the repository serves the documents below
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticContent;

#[async_trait]
impl ContentSource for StaticContent {
    async fn query(
        &self,
        _kind: ContentKind,
        _slug: Option<&str>,
    ) -> Result<Vec<JsonValue>, ContentError> {
        Ok(Vec::new())
    }
}

fn lesson(key: &str, title: &str, duration_minutes: u32) -> Lesson {
    Lesson {
        key: key.to_string(),
        title: title.to_string(),
        duration_minutes,
    }
}

fn module(key: &str, title: &str, lessons: Vec<Lesson>) -> CourseModule {
    CourseModule {
        key: key.to_string(),
        title: title.to_string(),
        lessons,
    }
}

pub fn courses() -> Vec<Course> {
    vec![
        Course {
            slug: "digital-literacy".to_string(),
            title: "Digital Literacy Foundations".to_string(),
            summary: "Confident, safe everyday computing.".to_string(),
            description: "Email, documents, online safety and finding reliable \
                          information, taught at your own pace."
                .to_string(),
            image_url: None,
            suggested_donation_minor: 2_500,
            currency: "USD".to_string(),
            modules: vec![
                module(
                    "getting-started",
                    "Getting Started",
                    vec![
                        lesson("using-a-computer", "Using a Computer", 20),
                        lesson("files-and-folders", "Files and Folders", 25),
                    ],
                ),
                module(
                    "online-safety",
                    "Staying Safe Online",
                    vec![
                        lesson("passwords", "Strong Passwords", 15),
                        lesson("spotting-scams", "Spotting Scams", 20),
                    ],
                ),
            ],
        },
        Course {
            slug: "intro-to-web-development".to_string(),
            title: "Introduction to Web Development".to_string(),
            summary: "Build and publish your first web page.".to_string(),
            description: "HTML, CSS and a first taste of JavaScript, ending with \
                          a published personal page."
                .to_string(),
            image_url: None,
            suggested_donation_minor: 5_000,
            currency: "USD".to_string(),
            modules: vec![
                module(
                    "html",
                    "HTML",
                    vec![
                        lesson("structure", "Page Structure", 30),
                        lesson("links-and-images", "Links and Images", 25),
                    ],
                ),
                module(
                    "css",
                    "CSS",
                    vec![
                        lesson("selectors", "Selectors", 30),
                        lesson("layout", "Layout", 40),
                    ],
                ),
                module(
                    "javascript",
                    "JavaScript",
                    vec![lesson("first-script", "Your First Script", 35)],
                ),
            ],
        },
    ]
}

pub fn team() -> Vec<TeamMember> {
    vec![
        TeamMember {
            name: "Programs Team".to_string(),
            role: "Curriculum and Learner Support".to_string(),
            bio: "Designs our courses and answers learner questions.".to_string(),
            photo_url: None,
            order: 1,
        },
        TeamMember {
            name: "Operations Team".to_string(),
            role: "Partnerships and Finance".to_string(),
            bio: "Keeps donations flowing to the programs that need them.".to_string(),
            photo_url: None,
            order: 2,
        },
    ]
}

pub fn events() -> Vec<Event> {
    vec![Event {
        slug: "community-open-day".to_string(),
        title: "Community Open Day".to_string(),
        description: "Meet the team and try a lesson.".to_string(),
        starts_at: Utc.with_ymd_and_hms(2030, 1, 15, 10, 0, 0).single().unwrap_or_else(Utc::now),
        ends_at: None,
        location: "Online".to_string(),
        registration_url: None,
    }]
}

pub fn careers() -> Vec<JobOpening> {
    vec![JobOpening {
        slug: "volunteer-mentor".to_string(),
        title: "Volunteer Mentor".to_string(),
        department: "Programs".to_string(),
        location: "Remote".to_string(),
        employment_type: "Volunteer".to_string(),
        description: "Support learners through weekly check-ins.".to_string(),
        apply_url: None,
    }]
}

pub fn testimonials() -> Vec<Testimonial> {
    vec![Testimonial {
        author: "A former learner".to_string(),
        role: None,
        quote: "I built my first website in four weeks.".to_string(),
        course_slug: Some("intro-to-web-development".to_string()),
    }]
}

pub fn donation_tiers() -> Vec<DonationTier> {
    vec![
        DonationTier {
            slug: "supporter".to_string(),
            name: "Supporter".to_string(),
            amount_minor: 2_500,
            currency: "USD".to_string(),
            benefits: vec!["Full course access".to_string()],
        },
        DonationTier {
            slug: "champion".to_string(),
            name: "Champion".to_string(),
            amount_minor: 10_000,
            currency: "USD".to_string(),
            benefits: vec![
                "Full course access".to_string(),
                "Sponsors a second learner".to_string(),
            ],
        },
        DonationTier {
            slug: "patron".to_string(),
            name: "Patron".to_string(),
            amount_minor: 50_000,
            currency: "USD".to_string(),
            benefits: vec![
                "Full course access".to_string(),
                "Sponsors five learners".to_string(),
                "Named on the supporters page".to_string(),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentRepository;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_static_source_serves_fallback_content() {
        let repo = ContentRepository::new(Arc::new(StaticContent), Duration::from_secs(60));
        assert_eq!(repo.courses().await, courses());
        assert!(repo.course("digital-literacy").await.is_some());
        assert!(repo.course("no-such-course").await.is_none());
    }

    #[test]
    fn test_fallback_courses_have_lessons_and_unique_keys() {
        for course in courses() {
            assert!(course.lesson_count() > 0, "{} has no lessons", course.slug);

            let mut keys = HashSet::new();
            for m in &course.modules {
                assert!(keys.insert(m.key.clone()), "duplicate module {}", m.key);
                let lesson_keys: HashSet<_> = m.lessons.iter().map(|l| &l.key).collect();
                assert_eq!(lesson_keys.len(), m.lessons.len());
            }
        }
    }

    #[test]
    fn test_donation_tiers_are_ascending() {
        let tiers = donation_tiers();
        assert!(tiers.windows(2).all(|w| w[0].amount_minor < w[1].amount_minor));
    }
}
