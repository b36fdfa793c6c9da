/// Course-level classification from course names and codes
use serde::{Deserialize, Serialize};
use std::fmt;

/// Academic rigor tier used to pick a scale maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CourseLevel {
    #[serde(alias = "Regular")]
    Regular,
    #[serde(alias = "PreAP", alias = "preAP", alias = "honors", alias = "Honors")]
    PreAp,
    #[serde(alias = "AP", alias = "Ap")]
    Ap,
    #[serde(alias = "DualCredit", alias = "dual")]
    DualCredit,
}

impl fmt::Display for CourseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CourseLevel::Regular => "Regular",
            CourseLevel::PreAp => "PreAP/Honors",
            CourseLevel::Ap => "AP",
            CourseLevel::DualCredit => "Dual Credit",
        };
        f.write_str(name)
    }
}

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LevelSource {
    /// A keyword in the name or code matched
    Detected,
    /// The caller supplied the level
    Override,
    /// Nothing matched; the course is assumed Regular
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelClassification {
    pub level: CourseLevel,
    pub source: LevelSource,
    /// The keyword that decided a detected level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
}

impl LevelClassification {
    pub fn overridden(level: CourseLevel) -> Self {
        Self {
            level,
            source: LevelSource::Override,
            matched: None,
        }
    }
}

/// Keyword table in precedence order. Phrases match whole words after
/// punctuation is folded to spaces, so "Pre-AP" reads as "pre ap".
const KEYWORDS: &[(CourseLevel, &[&str])] = &[
    (
        CourseLevel::DualCredit,
        &["dual credit", "dual", "onramps", "college", "dc"],
    ),
    (CourseLevel::PreAp, &["pre ap", "preap"]),
    (CourseLevel::Ap, &["advanced placement", "ap"]),
    (
        CourseLevel::PreAp,
        &["honors", "hon", "gt", "ib", "advanced"],
    ),
];

/// Classifies a course by keyword heuristics over its name and code.
pub fn classify_course(name: &str, code: Option<&str>) -> LevelClassification {
    let haystack = fold(&format!("{} {}", name, code.unwrap_or_default()));

    for (level, phrases) in KEYWORDS {
        if let Some(phrase) = phrases
            .iter()
            .find(|p| haystack.contains(&format!(" {p} ")))
        {
            return LevelClassification {
                level: *level,
                source: LevelSource::Detected,
                matched: Some((*phrase).to_string()),
            };
        }
    }

    LevelClassification {
        level: CourseLevel::Regular,
        source: LevelSource::Default,
        matched: None,
    }
}

/// Lowercases, turns punctuation into spaces, and pads with one space on each
/// side so whole-word lookups need no special cases at the edges.
fn fold(text: &str) -> String {
    let words: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    format!(" {} ", words.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(name: &str) -> CourseLevel {
        classify_course(name, None).level
    }

    #[test]
    fn test_keyword_levels() {
        assert_eq!(level("AP Calculus AB"), CourseLevel::Ap);
        assert_eq!(level("Advanced Placement Biology"), CourseLevel::Ap);
        assert_eq!(level("Pre-AP Chemistry"), CourseLevel::PreAp);
        assert_eq!(level("English II Honors"), CourseLevel::PreAp);
        assert_eq!(level("Algebra II GT"), CourseLevel::PreAp);
        assert_eq!(level("IB History of the Americas"), CourseLevel::PreAp);
        assert_eq!(level("OnRamps Precalculus"), CourseLevel::DualCredit);
        assert_eq!(level("Dual Credit Government"), CourseLevel::DualCredit);
        assert_eq!(level("College Algebra"), CourseLevel::DualCredit);
    }

    #[test]
    fn test_whole_words_only() {
        // "ap" inside "Apparel" or "Chapter" is not a match
        let result = classify_course("Apparel Design", None);
        assert_eq!(result.level, CourseLevel::Regular);
        assert_eq!(result.source, LevelSource::Default);
        assert_eq!(level("Geography"), CourseLevel::Regular);
    }

    #[test]
    fn test_dual_credit_beats_ap_and_records_match() {
        let result = classify_course("AP English Dual Credit", None);
        assert_eq!(result.level, CourseLevel::DualCredit);
        assert_eq!(result.source, LevelSource::Detected);
        assert_eq!(result.matched.as_deref(), Some("dual credit"));
    }

    #[test]
    fn test_code_is_searched_too() {
        let result = classify_course("Calculus BC", Some("AP-2075"));
        assert_eq!(result.level, CourseLevel::Ap);
    }

    #[test]
    fn test_level_names_deserialize_with_aliases() {
        let levels: Vec<CourseLevel> =
            serde_json::from_str(r#"["regular", "PreAP", "honors", "AP", "dualCredit"]"#).unwrap();
        assert_eq!(
            levels,
            vec![
                CourseLevel::Regular,
                CourseLevel::PreAp,
                CourseLevel::PreAp,
                CourseLevel::Ap,
                CourseLevel::DualCredit
            ]
        );
    }
}
