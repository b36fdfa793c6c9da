//! Parsing for the assignments (grades) page and the classes page.

use super::error::PortalError;
use super::table::{cell, cell_text, HeaderedTable};
use super::types::{Assignment, ClassInfo, Course};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::LazyLock;

static COURSE_BLOCK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.AssignmentClass").unwrap());
static HEADING_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.sg-header-heading").unwrap());
static AVERAGE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span.sg-header-heading.sg-right, [id*='lblHdrAverage']").unwrap()
});
static TABLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static PAGE_ROOT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[id$='pnlFullPage']").unwrap());

static HEADING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<code>[A-Za-z0-9]+\s*-\s*[A-Za-z0-9]+)\s+(?P<name>.+?)\s*$").unwrap()
});
static AVERAGE_LABEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(cycle\s+)?(average|avg)\s*:?\s*").unwrap());
static NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*%?\s*$").unwrap());

/// Highest grade accepted as numeric; extra credit can push averages past 100.
pub const MAX_GRADE: f64 = 150.0;

/// Parses a grade cell into a number in `[0, MAX_GRADE]`.
///
/// Anything else (blank, letter grades, "N/A", out-of-range values) is `None`,
/// never zero.
pub fn parse_grade(text: &str) -> Option<f64> {
    parse_number(text).filter(|g| (0.0..=MAX_GRADE).contains(g))
}

/// Parses a plain non-negative number, allowing a trailing percent sign.
pub fn parse_number(text: &str) -> Option<f64> {
    NUMBER_REGEX
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

/// Splits a course heading ("2073C - 1    AP Calculus AB") into code and name.
pub fn split_course_heading(heading: &str) -> (Option<String>, String) {
    match HEADING_REGEX.captures(heading) {
        Some(caps) => {
            let code = caps["code"].split_whitespace().collect::<Vec<_>>().join(" ");
            (Some(code), caps["name"].to_string())
        }
        None => (None, heading.trim().to_string()),
    }
}

/// Normalises a course code for joins across pages ("2073C - 1" == "2073c-1").
pub fn normalize_course_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Parses every course block on the assignments page.
///
/// Assignments are included for each course. `gpa` is left unset; the
/// GPA engine fills it in.
pub fn parse_grades_page(html: &str) -> Result<Vec<Course>, PortalError> {
    let document = Html::parse_document(html);
    let blocks: Vec<ElementRef> = document.select(&COURSE_BLOCK_SELECTOR).collect();

    if blocks.is_empty() {
        // A student with no courses still gets the page frame
        if document.select(&PAGE_ROOT_SELECTOR).next().is_some() {
            return Ok(Vec::new());
        }
        return Err(PortalError::page_shape(
            "assignments page has no course blocks",
        ));
    }

    blocks
        .iter()
        .enumerate()
        .map(|(index, block)| parse_course_block(block, index))
        .collect()
}

/// Parses the assignments of the course at `index` (0-based, page order).
pub fn parse_course_assignments(html: &str, index: usize) -> Result<Vec<Assignment>, PortalError> {
    let document = Html::parse_document(html);
    let blocks: Vec<ElementRef> = document.select(&COURSE_BLOCK_SELECTOR).collect();

    if blocks.is_empty() && document.select(&PAGE_ROOT_SELECTOR).next().is_none() {
        return Err(PortalError::page_shape(
            "assignments page has no course blocks",
        ));
    }

    let block = blocks.get(index).ok_or(PortalError::InvalidCourseIndex {
        index,
        count: blocks.len(),
    })?;
    parse_assignments(block)
}

fn parse_course_block(block: &ElementRef, index: usize) -> Result<Course, PortalError> {
    let heading = block
        .select(&HEADING_SELECTOR)
        .next()
        .map(|el| cell_text(&el))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PortalError::page_shape(format!("course block {index} has no heading")))?;

    let (course_code, name) = split_course_heading(&heading);

    let grade = block
        .select(&AVERAGE_SELECTOR)
        .next()
        .map(|el| AVERAGE_LABEL_REGEX.replace(&cell_text(&el), "").trim().to_string())
        .unwrap_or_default();
    let numeric_grade = parse_grade(&grade);

    let assignments = parse_assignments(block)?;

    Ok(Course {
        course_id: course_code
            .clone()
            .unwrap_or_else(|| format!("course-{index}")),
        name,
        course_code,
        period: None,
        teacher: None,
        room: None,
        grade,
        numeric_grade,
        gpa: None,
        assignments,
    })
}

/// Reads the assignment table of one course block.
///
/// The block also carries a category summary table; the assignment table is
/// the one with an "Assignment" column. A block without one has no
/// assignments yet.
fn parse_assignments(block: &ElementRef) -> Result<Vec<Assignment>, PortalError> {
    let Some(table) = block
        .select(&TABLE_SELECTOR)
        .filter_map(HeaderedTable::parse)
        .find(|t| t.has_column(&["assignment"]))
    else {
        return Ok(Vec::new());
    };

    let name_col = table.column(&["assignment"]);
    let due_col = table.column(&["date due"]);
    let assigned_col = table.column(&["date assigned"]);
    let category_col = table.column(&["category"]);
    let score_col = table.column(&["score"]);
    let total_col = table.column(&["total points"]);
    let weight_col = table.column(&["weight"]);

    if score_col.is_none() {
        return Err(PortalError::page_shape(
            "assignment table has no Score column",
        ));
    }

    Ok(table
        .rows()
        .iter()
        .filter(|row| !cell(row, name_col).is_empty())
        .map(|row| Assignment {
            date_assigned: cell(row, assigned_col).to_string(),
            date_due: cell(row, due_col).to_string(),
            name: cell(row, name_col).trim_end_matches('*').trim().to_string(),
            category: cell(row, category_col).to_string(),
            score: cell(row, score_col).to_string(),
            total_points: parse_number(cell(row, total_col)),
            weight: parse_number(cell(row, weight_col)),
        })
        .collect())
}

/// Parses the classes page into schedule details keyed by course code.
pub fn parse_classes_page(html: &str) -> Result<Vec<ClassInfo>, PortalError> {
    let document = Html::parse_document(html);

    let table = document
        .select(&TABLE_SELECTOR)
        .filter_map(HeaderedTable::parse)
        .find(|t| t.has_column(&["course"]) && t.has_column(&["teacher"]))
        .ok_or_else(|| PortalError::page_shape("classes page has no course/teacher table"))?;

    let course_col = table.column(&["course"]);
    let period_col = table.column(&["periods", "period"]);
    let teacher_col = table.column(&["teacher"]);
    let room_col = table.column(&["room"]);

    let non_empty = |s: &str| Some(s.to_string()).filter(|s| !s.is_empty());

    Ok(table
        .rows()
        .iter()
        .filter(|row| !cell(row, course_col).is_empty())
        .map(|row| ClassInfo {
            course_code: cell(row, course_col).to_string(),
            period: non_empty(cell(row, period_col)),
            teacher: non_empty(cell(row, teacher_col)),
            room: non_empty(cell(row, room_col)),
        })
        .collect())
}

/// Copies period, teacher, and room onto courses with a matching code.
pub fn apply_class_info(courses: &mut [Course], classes: &[ClassInfo]) {
    let by_code: HashMap<String, &ClassInfo> = classes
        .iter()
        .map(|c| (normalize_course_code(&c.course_code), c))
        .collect();

    for course in courses.iter_mut() {
        let Some(code) = course.course_code.as_deref() else {
            continue;
        };
        if let Some(info) = by_code.get(&normalize_course_code(code)) {
            course.period = info.period.clone();
            course.teacher = info.teacher.clone();
            course.room = info.room.clone();
        }
    }
}
