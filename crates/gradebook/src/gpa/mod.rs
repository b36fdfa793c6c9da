//! GPA engine: per-course points, cumulative and per-cycle GPA, and
//! assignment category averages.

pub mod level;
pub mod scale;

pub use level::{classify_course, CourseLevel, LevelClassification, LevelSource};
pub use scale::{GpaScale, ScaleRegistry};

use crate::portal::grades::{parse_number, MAX_GRADE};
use crate::portal::{Assignment, Course, PortalError, ReportCard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rounds half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Arithmetic mean of the present values, or `None` when there are none.
pub fn mean(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// One course as supplied to a GPA calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CourseInput {
    pub name: String,
    #[serde(default)]
    pub course_code: Option<String>,
    /// Percentage grade; null when the portal had none
    pub grade: Option<f64>,
    #[serde(default)]
    pub level: Option<CourseLevel>,
    #[serde(default)]
    pub credits: Option<f64>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

impl From<&Course> for CourseInput {
    fn from(course: &Course) -> Self {
        Self {
            name: course.name.clone(),
            course_code: course.course_code.clone(),
            grade: course.numeric_grade,
            level: None,
            credits: None,
            assignments: course.assignments.clone(),
        }
    }
}

/// Body of a GPA calculation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GpaRequest {
    /// Scale preset name; the configured default when absent
    #[serde(default)]
    pub scale: Option<String>,
    #[serde(default)]
    pub excluded_courses: Vec<String>,
    /// When present, only these courses count
    #[serde(default)]
    pub selected_courses: Option<Vec<String>>,
    /// Cached entities; when absent the session's current grades are fetched
    #[serde(default)]
    pub courses: Option<Vec<CourseInput>>,
    /// Course name or code → level
    #[serde(default)]
    pub level_overrides: BTreeMap<String, CourseLevel>,
    #[serde(default)]
    pub include_report_card: bool,
}

impl GpaRequest {
    /// Rejects values the calculation cannot interpret.
    pub fn validate(&self) -> Result<(), PortalError> {
        for course in self.courses.iter().flatten() {
            if course.name.trim().is_empty() {
                return Err(PortalError::invalid_input("course name must not be empty"));
            }
            if let Some(grade) = course.grade {
                if !grade.is_finite() || !(0.0..=MAX_GRADE).contains(&grade) {
                    return Err(PortalError::invalid_input(format!(
                        "grade for '{}' must lie in [0, {MAX_GRADE}], got {grade}",
                        course.name
                    )));
                }
            }
            if let Some(credits) = course.credits {
                if !credits.is_finite() || credits <= 0.0 {
                    return Err(PortalError::invalid_input(format!(
                        "credits for '{}' must be positive, got {credits}",
                        course.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAverage {
    pub category: String,
    pub average: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseGpa {
    pub name: String,
    pub course_code: Option<String>,
    pub grade: Option<f64>,
    pub classification: LevelClassification,
    pub credits: f64,
    pub gpa: Option<f64>,
    pub excluded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub category_averages: Vec<CategoryAverage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleGpa {
    pub cycle_name: String,
    pub gpa: Option<f64>,
    pub included_courses: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaSummary {
    pub scale: String,
    pub courses: Vec<CourseGpa>,
    pub cumulative_gpa: Option<f64>,
    pub included_courses: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycles: Option<Vec<CycleGpa>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_card_gpa: Option<f64>,
}

/// Decides which courses count and at what level.
///
/// Names and codes are compared case-insensitively after trimming.
#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    excluded: Vec<String>,
    selected: Option<Vec<String>>,
    overrides: Vec<(String, CourseLevel)>,
}

impl CourseFilter {
    pub fn from_request(request: &GpaRequest) -> Self {
        Self {
            excluded: request.excluded_courses.iter().map(|s| key(s)).collect(),
            selected: request
                .selected_courses
                .as_ref()
                .map(|names| names.iter().map(|s| key(s)).collect()),
            overrides: request
                .level_overrides
                .iter()
                .map(|(name, level)| (key(name), *level))
                .collect(),
        }
    }

    pub fn is_included(&self, name: &str, code: Option<&str>) -> bool {
        let matches = |list: &[String]| {
            list.iter()
                .any(|k| *k == key(name) || code.is_some_and(|c| *k == key(c)))
        };
        if matches(self.excluded.as_slice()) {
            return false;
        }
        self.selected.as_deref().map_or(true, matches)
    }

    /// Classification for a course: an explicit level beats an override,
    /// which beats keyword detection.
    pub fn classify(
        &self,
        name: &str,
        code: Option<&str>,
        explicit: Option<CourseLevel>,
    ) -> LevelClassification {
        if let Some(level) = explicit {
            return LevelClassification::overridden(level);
        }
        let overridden = self
            .overrides
            .iter()
            .find(|(k, _)| *k == key(name) || code.is_some_and(|c| *k == key(c)));
        match overridden {
            Some((_, level)) => LevelClassification::overridden(*level),
            None => classify_course(name, code),
        }
    }
}

fn key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// GPA for an optional grade; null grades stay null.
pub fn course_gpa(scale: &GpaScale, grade: Option<f64>, level: CourseLevel) -> Option<f64> {
    grade.map(|g| scale.course_gpa(g, level))
}

/// Computes per-course and cumulative GPA.
///
/// Excluded courses and courses without a grade contribute to neither the
/// numerator nor the denominator. Credits default to 1.
pub fn summarize(scale: &GpaScale, courses: &[CourseInput], filter: &CourseFilter) -> GpaSummary {
    let rows: Vec<CourseGpa> = courses
        .iter()
        .map(|course| {
            let code = course.course_code.as_deref();
            let classification = filter.classify(&course.name, code, course.level);
            CourseGpa {
                name: course.name.clone(),
                course_code: course.course_code.clone(),
                grade: course.grade,
                gpa: course_gpa(scale, course.grade, classification.level),
                classification,
                credits: course.credits.unwrap_or(1.0),
                excluded: !filter.is_included(&course.name, code),
                category_averages: category_averages(&course.assignments),
            }
        })
        .collect();

    let (points, credits, included) = rows
        .iter()
        .filter(|row| !row.excluded)
        .filter_map(|row| row.gpa.map(|gpa| (gpa, row.credits)))
        .fold((0.0, 0.0, 0usize), |(p, c, n), (gpa, credits)| {
            (p + gpa * credits, c + credits, n + 1)
        });

    GpaSummary {
        scale: scale.name.clone(),
        courses: rows,
        cumulative_gpa: (credits > 0.0).then(|| round_to(points / credits, 2)),
        included_courses: included,
        cycles: None,
        report_card_gpa: None,
    }
}

/// Per-cycle GPA over the included report card courses.
pub fn cycle_gpas(scale: &GpaScale, report: &ReportCard, filter: &CourseFilter) -> Vec<CycleGpa> {
    report
        .cycles
        .iter()
        .map(|cycle| {
            let gpas: Vec<Option<f64>> = cycle
                .courses
                .iter()
                .filter(|c| filter.is_included(&c.course, Some(&c.course_code)))
                .map(|c| {
                    let level = filter.classify(&c.course, Some(&c.course_code), None).level;
                    course_gpa(scale, c.numeric_grade, level)
                })
                .collect();
            CycleGpa {
                cycle_name: cycle.cycle_name.clone(),
                included_courses: gpas.iter().flatten().count(),
                gpa: mean(gpas).map(|g| round_to(g, 2)),
            }
        })
        .collect()
}

/// Fills `gpa` on fetched courses using their detected level.
pub fn apply_course_gpas(scale: &GpaScale, courses: &mut [Course]) {
    for course in courses.iter_mut() {
        let level = classify_course(&course.name, course.course_code.as_deref()).level;
        course.gpa = course_gpa(scale, course.numeric_grade, level);
    }
}

/// Fills course GPAs, cycle averages, and the overall report card GPA.
pub fn apply_report_card_gpas(scale: &GpaScale, report: &mut ReportCard) {
    for cycle in report.cycles.iter_mut() {
        for course in cycle.courses.iter_mut() {
            let level = classify_course(&course.course, Some(&course.course_code)).level;
            course.gpa = course_gpa(scale, course.numeric_grade, level);
        }
        cycle.average_gpa = mean(cycle.courses.iter().map(|c| c.gpa)).map(|g| round_to(g, 2));
    }
    report.overall_gpa = mean(report.cycles.iter().map(|c| c.average_gpa)).map(|g| round_to(g, 2));
}

/// Weighted average per assignment category, in first-seen order.
///
/// An assignment counts only when its category is a real label (not blank,
/// not a stray number) and its score yields a percentage in [0, 150].
pub fn category_averages(assignments: &[Assignment]) -> Vec<CategoryAverage> {
    let mut order: Vec<String> = Vec::new();
    let mut totals: BTreeMap<String, (f64, f64, usize)> = BTreeMap::new();

    for assignment in assignments {
        let category = assignment.category.trim();
        if category.is_empty() || parse_number(category).is_some() {
            continue;
        }
        let Some(percent) = assignment_percentage(assignment) else {
            continue;
        };
        let weight = assignment.weight.filter(|w| *w > 0.0).unwrap_or(1.0);

        let entry = totals.entry(category.to_string()).or_insert_with(|| {
            order.push(category.to_string());
            (0.0, 0.0, 0)
        });
        entry.0 += percent * weight;
        entry.1 += weight;
        entry.2 += 1;
    }

    order
        .into_iter()
        .filter_map(|category| {
            let (sum, weight, count) = totals.remove(&category)?;
            Some(CategoryAverage {
                category,
                average: round_to(sum / weight, 2),
                count,
            })
        })
        .collect()
}

/// Percentage earned on one assignment.
///
/// `None` unless the score itself is a number in [0, 150]; the range applies
/// to the raw score, before any conversion against total points.
fn assignment_percentage(assignment: &Assignment) -> Option<f64> {
    let score = assignment.score.trim();
    let value = parse_number(score).filter(|v| (0.0..=MAX_GRADE).contains(v))?;
    if score.ends_with('%') {
        return Some(value);
    }
    match assignment.total_points {
        Some(total) if total > 0.0 => Some(value / total * 100.0),
        _ => Some(value),
    }
}
