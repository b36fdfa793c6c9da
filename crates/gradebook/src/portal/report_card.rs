//! Report card page: cycle selector, per-cycle postbacks, and course rows.

use super::error::PortalError;
use super::form::{
    extract_form, PostbackForm, EVENT_ARGUMENT, EVENT_TARGET, EVENT_VALIDATION, VIEWSTATE,
    VIEWSTATE_GENERATOR,
};
use super::grades::parse_grade;
use super::table::{cell, cell_text, HeaderedTable};
use super::types::{CycleOption, ReportCardCourse};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use url::Url;

static RUN_SELECT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("select[name$='ddlRCRuns']").unwrap());
static OPTION_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("option").unwrap());
static TABLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static FIRST_NUMBER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Hidden fields a cycle postback has to replay.
pub const POSTBACK_FIELDS: [&str; 3] = [VIEWSTATE, VIEWSTATE_GENERATOR, EVENT_VALIDATION];

/// The grading-cycle dropdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSelector {
    /// Form field name of the `<select>`, also the postback event target
    pub field_name: String,
    pub options: Vec<CycleOption>,
}

impl CycleSelector {
    /// The option the page is currently rendering.
    ///
    /// Browsers render the first option when none is marked selected.
    pub fn selected(&self) -> Option<&CycleOption> {
        self.options
            .iter()
            .find(|o| o.selected)
            .or_else(|| self.options.first())
    }
}

/// Reads the cycle dropdown from a report card page.
pub fn parse_cycle_selector(html: &str) -> Result<CycleSelector, PortalError> {
    let document = Html::parse_document(html);
    let select = document
        .select(&RUN_SELECT_SELECTOR)
        .next()
        .ok_or_else(|| PortalError::page_shape("report card page has no cycle selector"))?;

    let field_name = select
        .value()
        .attr("name")
        .unwrap_or_default()
        .to_string();

    let options: Vec<CycleOption> = select
        .select(&OPTION_SELECTOR)
        .filter_map(|option| {
            let label = cell_text(&option);
            let value = option
                .value()
                .attr("value")
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|| label.clone());
            if value.is_empty() {
                return None;
            }
            Some(CycleOption {
                value,
                label,
                selected: option.value().attr("selected").is_some(),
            })
        })
        .collect();

    if options.is_empty() {
        return Err(PortalError::page_shape("cycle selector has no options"));
    }

    Ok(CycleSelector {
        field_name,
        options,
    })
}

/// Builds the postback that asks the portal to render `option`.
///
/// The hidden fields come from `page_html`, which must be the latest page
/// served on this session; older tokens are rejected by the portal.
pub fn build_cycle_postback(
    page_html: &str,
    page_url: &Url,
    selector: &CycleSelector,
    option: &CycleOption,
) -> Result<PostbackForm, PortalError> {
    let mut form = extract_form(page_html, page_url, &POSTBACK_FIELDS)?;
    form.set(EVENT_TARGET, selector.field_name.as_str());
    form.set(EVENT_ARGUMENT, "");
    form.set(selector.field_name.as_str(), option.value.as_str());
    Ok(form)
}

/// Parses the course rows for one cycle from the page that renders it.
///
/// The page must show `option` as its selected cycle; anything else means the
/// postback was not honoured.
pub fn parse_cycle_courses(
    html: &str,
    option: &CycleOption,
) -> Result<Vec<ReportCardCourse>, PortalError> {
    let rendered = parse_cycle_selector(html)?;
    if let Some(selected) = rendered.selected() {
        if selected.value != option.value {
            return Err(PortalError::page_shape(format!(
                "portal rendered cycle '{}' instead of '{}'",
                selected.value, option.value
            )));
        }
    }

    let document = Html::parse_document(html);
    let table = document
        .select(&TABLE_SELECTOR)
        .filter_map(HeaderedTable::parse)
        .find(|t| t.has_column(&["course"]) && t.has_column(&["description"]))
        .ok_or_else(|| PortalError::page_shape("report card page has no course table"))?;

    let grade_col = grade_column(&table, option).ok_or_else(|| {
        PortalError::page_shape(format!(
            "no grade column for cycle '{}'",
            option.display_name()
        ))
    })?;
    let code_col = table.column(&["course"]);
    let name_col = table.column(&["description"]);

    Ok(table
        .rows()
        .iter()
        .filter(|row| !cell(row, code_col).is_empty())
        .map(|row| {
            let display_grade = cell(row, Some(grade_col)).to_string();
            let grade = parse_grade(&display_grade);
            ReportCardCourse {
                course: cell(row, name_col).to_string(),
                course_code: cell(row, code_col).to_string(),
                grade,
                numeric_grade: grade,
                display_grade,
                gpa: None,
            }
        })
        .collect())
}

/// Locates a cycle's grade column.
///
/// A header equal to the option value wins. Otherwise the first number in the
/// option text names the column, either bare ("2") or as an ordinal ("2nd").
fn grade_column(table: &HeaderedTable, option: &CycleOption) -> Option<usize> {
    let mut candidates = vec![option.value.clone()];
    if let Some(n) = FIRST_NUMBER_REGEX
        .find(&option.label)
        .or_else(|| FIRST_NUMBER_REGEX.find(&option.value))
        .and_then(|m| m.as_str().parse::<u32>().ok())
    {
        candidates.push(n.to_string());
        candidates.push(ordinal(n));
        candidates.push(format!("cycle {n}"));
    }

    let wanted: Vec<String> = candidates.iter().map(|c| c.to_lowercase()).collect();
    table
        .headers()
        .iter()
        .position(|h| wanted.contains(h))
}

fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(selected: &str) -> String {
        let option = |value: &str, label: &str| {
            let sel = if value == selected { " selected=\"selected\"" } else { "" };
            format!("<option{sel} value=\"{value}\">{label}</option>")
        };
        format!(
            r#"<html><body>
            <form method="post" action="./ReportCards.aspx" id="aspnetForm">
              <input type="hidden" name="__EVENTTARGET" id="__EVENTTARGET" value="" />
              <input type="hidden" name="__EVENTARGUMENT" id="__EVENTARGUMENT" value="" />
              <input type="hidden" name="__VIEWSTATE" id="__VIEWSTATE" value="vs-{selected}" />
              <input type="hidden" name="__VIEWSTATEGENERATOR" value="A1B2C3D4" />
              <input type="hidden" name="__EVENTVALIDATION" value="ev-{selected}" />
              <select name="ctl00$plnMain$ddlRCRuns" id="plnMain_ddlRCRuns">
                {}{}
              </select>
              <table class="sg-asp-table" id="plnMain_dgReportCard">
                <tr class="sg-asp-table-header-row">
                  <td>Course</td><td>Description</td><td>Period</td><td>Teacher</td><td>Room</td>
                  <td>Att. Credit</td><td>Ern. Credit</td><td>1st</td><td>2nd</td><td>Exam1</td>
                </tr>
                <tr class="sg-asp-table-data-row">
                  <td>2073C - 1</td><td>AP Calculus AB</td><td>1</td><td>Nguyen, Linh</td><td>B214</td>
                  <td>0.50</td><td></td><td>97</td><td>94</td><td></td>
                </tr>
                <tr class="sg-asp-table-data-row">
                  <td>1121A - 3</td><td>English II</td><td>3</td><td>Patel, Riya</td><td>C108</td>
                  <td>0.50</td><td></td><td>84</td><td></td><td></td>
                </tr>
              </table>
            </form></body></html>"#,
            option("1-2026", "1"),
            option("2-2026", "2"),
        )
    }

    fn base() -> Url {
        Url::parse("https://hac.example.org/HomeAccess/Content/Student/ReportCards.aspx").unwrap()
    }

    #[test]
    fn test_cycle_selector_options() {
        let selector = parse_cycle_selector(&page("2-2026")).unwrap();
        assert_eq!(selector.field_name, "ctl00$plnMain$ddlRCRuns");
        assert_eq!(selector.options.len(), 2);
        assert_eq!(selector.selected().unwrap().value, "2-2026");
        assert_eq!(selector.options[0].display_name(), "Cycle 1");
    }

    #[test]
    fn test_cycle_postback_replays_latest_tokens() {
        let html = page("2-2026");
        let selector = parse_cycle_selector(&html).unwrap();
        let form = build_cycle_postback(&html, &base(), &selector, &selector.options[0]).unwrap();

        assert_eq!(form.get(VIEWSTATE), Some("vs-2-2026"));
        assert_eq!(form.get(EVENT_TARGET), Some("ctl00$plnMain$ddlRCRuns"));
        assert_eq!(form.get("ctl00$plnMain$ddlRCRuns"), Some("1-2026"));
        assert_eq!(form.action, base());
    }

    #[test]
    fn test_cycle_grades_use_ordinal_column() {
        let selector = parse_cycle_selector(&page("1-2026")).unwrap();
        let courses = parse_cycle_courses(&page("1-2026"), &selector.options[0]).unwrap();
        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].course, "AP Calculus AB");
        assert_eq!(courses[0].course_code, "2073C - 1");
        assert_eq!(courses[0].numeric_grade, Some(97.0));

        let cycle2 = parse_cycle_courses(&page("2-2026"), &selector.options[1]).unwrap();
        assert_eq!(cycle2[0].grade, Some(94.0));
        assert_eq!(cycle2[0].display_grade, "94");
        assert_eq!(cycle2[1].grade, None);
        assert_eq!(cycle2[1].display_grade, "");
        assert_eq!(cycle2[1].numeric_grade, None);
    }

    #[test]
    fn test_page_for_other_cycle_is_rejected() {
        let selector = parse_cycle_selector(&page("1-2026")).unwrap();
        let err = parse_cycle_courses(&page("1-2026"), &selector.options[1]).unwrap_err();
        assert!(matches!(err, PortalError::UnexpectedPageShape { .. }));
    }

    #[test]
    fn test_missing_selector_is_unexpected_shape() {
        let err = parse_cycle_selector("<html><body>Report cards are not available.</body></html>")
            .unwrap_err();
        assert!(matches!(err, PortalError::UnexpectedPageShape { .. }));
    }

    #[test]
    fn test_ordinals() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(22), "22nd");
    }
}
