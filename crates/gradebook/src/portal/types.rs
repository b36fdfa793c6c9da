/// Types for grade portal data
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Login credentials for one portal account.
///
/// Never persisted; the `Debug` impl redacts the password.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub portal_base_url: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("portal_base_url", &self.portal_base_url)
            .finish()
    }
}

/// A single assignment row from a course's assignment table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub date_assigned: String,
    pub date_due: String,
    pub name: String,
    pub category: String,
    /// Raw score text ("N/A", "95.00", "87%"); interpretation is left to consumers
    pub score: String,
    pub total_points: Option<f64>,
    pub weight: Option<f64>,
}

/// One course from the grades page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub course_id: String,
    pub name: String,
    pub course_code: Option<String>,
    pub period: Option<String>,
    pub teacher: Option<String>,
    pub room: Option<String>,
    /// Display string exactly as the portal rendered it
    pub grade: String,
    pub numeric_grade: Option<f64>,
    pub gpa: Option<f64>,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradesResponse {
    pub grades: Vec<Course>,
    pub overall_average: Option<f64>,
    pub highlighted_course: Option<Course>,
}

/// One course row of a single report card cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardCourse {
    pub course: String,
    pub course_code: String,
    /// Cycle grade; null for a blank cell, never 0
    pub grade: Option<f64>,
    pub numeric_grade: Option<f64>,
    /// Grade cell exactly as the portal rendered it
    pub display_grade: String,
    pub gpa: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardCycle {
    pub cycle_name: String,
    pub courses: Vec<ReportCardCourse>,
    pub average_gpa: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub cycles: Vec<ReportCardCycle>,
    pub overall_gpa: Option<f64>,
}

/// A grading cycle offered by the report card's run selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

impl CycleOption {
    /// Human readable cycle name ("Cycle 3" for a bare "3").
    pub fn display_name(&self) -> String {
        let label = self.label.trim();
        if !label.is_empty() && label.chars().all(|c| c.is_ascii_digit()) {
            format!("Cycle {label}")
        } else if label.is_empty() {
            format!("Cycle {}", self.value.trim())
        } else {
            label.to_string()
        }
    }
}

/// Raw page returned by the transport after redirects were followed.
#[derive(Debug, Clone)]
pub struct PortalPage {
    pub status: u16,
    /// Final URL after redirects
    pub url: Url,
    pub body: String,
}

/// Row from the classes page, used to enrich grades with schedule details.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassInfo {
    pub course_code: String,
    pub period: Option<String>,
    pub teacher: Option<String>,
    pub room: Option<String>,
}
