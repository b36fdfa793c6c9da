//! GPA scale presets and the registry that holds them.
//!
//! A scale maps each course level to its maximum GPA and carries the slope
//! and failing floor of the grade-to-GPA formula. New presets are plain JSON
//! files, loaded at startup; the formula itself never changes.

use super::level::CourseLevel;
use super::round_to;
use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const fn default_points_per_grade() -> f64 {
    0.1
}

const fn default_failing_below() -> f64 {
    70.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaScale {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub regular: f64,
    pub pre_ap: f64,
    pub ap: f64,
    pub dual_credit: f64,
    /// GPA lost per percentage point below 100
    #[serde(default = "default_points_per_grade")]
    pub points_per_grade: f64,
    /// Grades below this earn zero points at every level
    #[serde(default = "default_failing_below")]
    pub failing_below: f64,
}

impl GpaScale {
    /// Regular 5.0, PreAP 5.5, AP and dual credit 6.0.
    pub fn six_point() -> Self {
        Self {
            name: "six_point".to_string(),
            description: "Weighted 6.0 scale".to_string(),
            regular: 5.0,
            pre_ap: 5.5,
            ap: 6.0,
            dual_credit: 6.0,
            points_per_grade: default_points_per_grade(),
            failing_below: default_failing_below(),
        }
    }

    /// Regular 4.0, PreAP 4.5, AP and dual credit 5.0.
    pub fn five_point() -> Self {
        Self {
            name: "five_point".to_string(),
            description: "Weighted 5.0 scale".to_string(),
            regular: 4.0,
            pre_ap: 4.5,
            ap: 5.0,
            dual_credit: 5.0,
            points_per_grade: default_points_per_grade(),
            failing_below: default_failing_below(),
        }
    }

    pub fn max_for(&self, level: CourseLevel) -> f64 {
        match level {
            CourseLevel::Regular => self.regular,
            CourseLevel::PreAp => self.pre_ap,
            CourseLevel::Ap => self.ap,
            CourseLevel::DualCredit => self.dual_credit,
        }
    }

    /// GPA points for a percentage grade, rounded to one decimal.
    ///
    /// Extra credit above 100 is capped at 100 before the slope applies.
    pub fn course_gpa(&self, grade: f64, level: CourseLevel) -> f64 {
        if grade < self.failing_below {
            return 0.0;
        }
        let gpa = self.max_for(level) - (100.0 - grade.min(100.0)) * self.points_per_grade;
        round_to(gpa.max(0.0), 1)
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("scale name is empty".to_string());
        }
        for (field, value) in [
            ("regular", self.regular),
            ("preAp", self.pre_ap),
            ("ap", self.ap),
            ("dualCredit", self.dual_credit),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{field} must be a positive number, got {value}"));
            }
        }
        if !self.points_per_grade.is_finite() || self.points_per_grade < 0.0 {
            return Err("pointsPerGrade must be zero or positive".to_string());
        }
        if !(0.0..=100.0).contains(&self.failing_below) {
            return Err("failingBelow must lie in [0, 100]".to_string());
        }
        Ok(())
    }
}

/// Named scales available to GPA requests.
#[derive(Debug, Clone)]
pub struct ScaleRegistry {
    scales: BTreeMap<String, GpaScale>,
}

impl Default for ScaleRegistry {
    fn default() -> Self {
        let mut scales = BTreeMap::new();
        for scale in [GpaScale::six_point(), GpaScale::five_point()] {
            scales.insert(scale.name.clone(), scale);
        }
        Self { scales }
    }
}

impl ScaleRegistry {
    /// Registry holding only the built-in presets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every `*.json` scale in `dir`, replacing presets of the same name.
    ///
    /// Returns how many scales were loaded.
    pub fn load_from_directory(&mut self, dir: &Path) -> Result<usize, ConfigError> {
        let io_err = |e: std::io::Error| ConfigError::Io {
            path: dir.display().to_string(),
            message: e.to_string(),
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        // Deterministic override order when two files share a name
        paths.sort();

        for path in &paths {
            let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            let scale: GpaScale =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            scale.validate().map_err(|message| ConfigError::InvalidValue {
                key: path.display().to_string(),
                message,
            })?;
            debug!(scale = %scale.name, path = %path.display(), "Loaded GPA scale");
            self.scales.insert(scale.name.clone(), scale);
        }

        info!(count = paths.len(), dir = %dir.display(), "Loaded GPA scale presets");
        Ok(paths.len())
    }

    pub fn get(&self, name: &str) -> Option<&GpaScale> {
        self.scales.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scales.keys().map(String::as_str)
    }

    pub fn scales(&self) -> impl Iterator<Item = &GpaScale> {
        self.scales.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_examples() {
        let six = GpaScale::six_point();
        assert_eq!(six.course_gpa(95.0, CourseLevel::Ap), 5.5);
        assert_eq!(six.course_gpa(95.0, CourseLevel::Regular), 4.5);
        assert_eq!(six.course_gpa(100.0, CourseLevel::Ap), 6.0);
        assert_eq!(six.course_gpa(70.0, CourseLevel::Regular), 2.0);
        assert_eq!(six.course_gpa(69.9, CourseLevel::DualCredit), 0.0);
        assert_eq!(six.course_gpa(112.0, CourseLevel::PreAp), 5.5);
    }

    #[test]
    fn test_formula_holds_across_passing_range() {
        let scale = GpaScale::five_point();
        for level in [
            CourseLevel::Regular,
            CourseLevel::PreAp,
            CourseLevel::Ap,
            CourseLevel::DualCredit,
        ] {
            let max = scale.max_for(level);
            for grade in 70..=100 {
                let expected = ((max - (100 - grade) as f64 * 0.1) * 10.0).round() / 10.0;
                assert_eq!(scale.course_gpa(grade as f64, level), expected);
            }
            for grade in [0.0, 35.5, 69.0] {
                assert_eq!(scale.course_gpa(grade, level), 0.0);
            }
        }
    }

    #[test]
    fn test_custom_slope_and_floor() {
        let scale = GpaScale {
            name: "strict".to_string(),
            points_per_grade: 0.2,
            failing_below: 75.0,
            ..GpaScale::five_point()
        };
        assert_eq!(scale.course_gpa(90.0, CourseLevel::Regular), 2.0);
        assert_eq!(scale.course_gpa(74.0, CourseLevel::Ap), 0.0);
    }

    #[test]
    fn test_registry_builtins() {
        let registry = ScaleRegistry::new();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["five_point", "six_point"]
        );
        assert_eq!(registry.get("six_point").unwrap().ap, 6.0);
        assert!(registry.get("seven_point").is_none());
    }

    #[test]
    fn test_load_presets_from_directory() {
        let dir = std::env::temp_dir().join(format!("gradebook-scales-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("four.json"),
            r#"{ "name": "four_point", "regular": 4.0, "preAp": 4.0, "ap": 4.0, "dualCredit": 4.0 }"#,
        )
        .unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut registry = ScaleRegistry::new();
        let loaded = registry.load_from_directory(&dir).unwrap();
        assert_eq!(loaded, 1);

        let four = registry.get("four_point").unwrap();
        assert_eq!(four.points_per_grade, 0.1);
        assert_eq!(four.course_gpa(90.0, CourseLevel::Ap), 3.0);

        fs::write(
            dir.join("zero.json"),
            r#"{ "name": "broken", "regular": 0, "preAp": 4.0, "ap": 4.0, "dualCredit": 4.0 }"#,
        )
        .unwrap();
        let err = registry.load_from_directory(&dir).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        fs::remove_dir_all(&dir).unwrap();
    }
}
