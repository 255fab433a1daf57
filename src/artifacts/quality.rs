//! Quality scoring for stored artifacts.
//!
//! Each checker scores four dimensions in [0, 100]; the overall score is the
//! weighted sum `0.4·completeness + 0.3·accuracy + 0.2·consistency + 0.1·timeliness`.
//! Requirements, plans, code and test results have dedicated checkers; every
//! other type uses `GenericChecker`.

use super::types::{ArtifactContent, ArtifactType, QualityLevel, ValidationResults};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

const COMPLETENESS_WEIGHT: f64 = 0.4;
const ACCURACY_WEIGHT: f64 = 0.3;
const CONSISTENCY_WEIGHT: f64 = 0.2;
const TIMELINESS_WEIGHT: f64 = 0.1;

const PLACEHOLDERS: &[&str] = &["todo", "tbd", "fixme", "lorem ipsum", "xxx", "???"];

#[derive(Debug, Clone, PartialEq)]
pub struct QualityAssessment {
    pub validation: ValidationResults,
    pub overall: f64,
    pub level: QualityLevel,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl QualityAssessment {
    pub fn from_dimensions(
        completeness: f64,
        accuracy: f64,
        consistency: f64,
        timeliness: f64,
    ) -> Self {
        let validation = ValidationResults {
            completeness: clamp(completeness),
            accuracy: clamp(accuracy),
            consistency: clamp(consistency),
            timeliness: clamp(timeliness),
        };
        let overall = overall_score(&validation);
        Self {
            validation,
            overall,
            level: QualityLevel::from_score(overall),
            issues: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    fn with_notes(mut self, issues: Vec<String>, recommendations: Vec<String>) -> Self {
        self.issues = issues;
        self.recommendations = recommendations;
        self
    }
}

/// Weighted overall score, rounded to two decimals.
pub fn overall_score(v: &ValidationResults) -> f64 {
    let raw = COMPLETENESS_WEIGHT * v.completeness
        + ACCURACY_WEIGHT * v.accuracy
        + CONSISTENCY_WEIGHT * v.consistency
        + TIMELINESS_WEIGHT * v.timeliness;
    (raw * 100.0).round() / 100.0
}

fn clamp(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

/// Timeliness from artifact age.
pub fn timeliness(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days = (now - created_at).num_days();
    match days {
        d if d <= 7 => 100.0,
        d if d <= 30 => 90.0,
        d if d <= 90 => 75.0,
        _ => 50.0,
    }
}

/// Scores one artifact type.
pub trait QualityChecker: Send + Sync {
    fn assess(
        &self,
        content: &ArtifactContent,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> QualityAssessment;
}

fn placeholder_count(text: &str) -> usize {
    let lower = text.to_lowercase();
    PLACEHOLDERS.iter().map(|p| lower.matches(p).count()).sum()
}

/// 100 minus 10 per placeholder marker.
fn accuracy_from_placeholders(text: &str, issues: &mut Vec<String>) -> f64 {
    let count = placeholder_count(text);
    if count > 0 {
        issues.push(format!("{} placeholder marker(s) (TODO/TBD/FIXME) remain", count));
    }
    100.0 - 10.0 * count as f64
}

/// Share of non-empty lines that are not duplicates of an earlier line.
fn line_uniqueness(text: &str) -> f64 {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return 0.0;
    }
    let unique: HashSet<&str> = lines.iter().copied().collect();
    100.0 * unique.len() as f64 / lines.len() as f64
}

/// Fraction of `sections` present, as JSON keys or text headings/labels.
fn section_coverage(content: &ArtifactContent, sections: &[&[&str]]) -> (f64, Vec<String>) {
    let mut missing = Vec::new();
    let mut found = 0usize;
    for aliases in sections {
        let present = match content.as_json() {
            Some(Value::Object(map)) => aliases.iter().any(|k| {
                map.get(*k)
                    .map(|v| !v.is_null() && v != &Value::String(String::new()))
                    .unwrap_or(false)
            }),
            _ => {
                let lower = content.as_text().to_lowercase().replace('_', " ");
                aliases
                    .iter()
                    .any(|k| lower.contains(&k.replace('_', " ")))
            }
        };
        if present {
            found += 1;
        } else {
            missing.push(aliases[0].to_string());
        }
    }
    let score = if sections.is_empty() {
        100.0
    } else {
        100.0 * found as f64 / sections.len() as f64
    };
    (score, missing)
}

/// Fallback checker for types without a dedicated one.
pub struct GenericChecker;

impl QualityChecker for GenericChecker {
    fn assess(
        &self,
        content: &ArtifactContent,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> QualityAssessment {
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        let (completeness, consistency) = match content.as_json() {
            Some(Value::Object(map)) => {
                if map.is_empty() {
                    issues.push("Content is an empty object".to_string());
                    (0.0, 100.0)
                } else {
                    let filled = map.values().filter(|v| !v.is_null()).count();
                    (100.0 * filled as f64 / map.len() as f64, 100.0)
                }
            }
            Some(Value::Array(items)) => {
                if items.is_empty() {
                    issues.push("Content is an empty list".to_string());
                    (0.0, 100.0)
                } else {
                    (100.0, 100.0)
                }
            }
            Some(Value::Null) => {
                issues.push("Content is null".to_string());
                (0.0, 0.0)
            }
            Some(_) => (60.0, 100.0),
            None => {
                let text = content.as_text();
                let len = text.trim().len();
                if len == 0 {
                    issues.push("Content is empty".to_string());
                }
                let completeness = if len >= 200 {
                    100.0
                } else {
                    (len as f64 / 2.0).max(if len > 0 { 40.0 } else { 0.0 })
                };
                (completeness, line_uniqueness(&text))
            }
        };

        if completeness < 70.0 {
            recommendations.push("Add more detail to the artifact".to_string());
        }

        let accuracy = accuracy_from_placeholders(&content.as_text(), &mut issues);
        if accuracy < 100.0 {
            recommendations.push("Resolve remaining placeholders".to_string());
        }

        QualityAssessment::from_dimensions(
            completeness,
            accuracy,
            consistency,
            timeliness(created_at, now),
        )
        .with_notes(issues, recommendations)
    }
}

/// Requirements: problem statement, requirements list and acceptance criteria.
pub struct RequirementsChecker;

impl QualityChecker for RequirementsChecker {
    fn assess(
        &self,
        content: &ArtifactContent,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> QualityAssessment {
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        let (completeness, missing) = section_coverage(
            content,
            &[
                &["problem_statement", "problem", "overview"],
                &["requirements", "functional_requirements"],
                &["acceptance_criteria", "acceptance"],
            ],
        );
        for section in &missing {
            issues.push(format!("Missing section: {}", section));
            recommendations.push(format!("Add a {} section", section.replace('_', " ")));
        }

        let text = content.as_text();
        let accuracy = accuracy_from_placeholders(&text, &mut issues);

        // Requirement statements should use normative language.
        let statements: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with('-') || l.starts_with('*') || l.starts_with('"'))
            .collect();
        let consistency = if statements.is_empty() {
            70.0
        } else {
            let normative = statements
                .iter()
                .filter(|l| {
                    let lower = l.to_lowercase();
                    lower.contains("must") || lower.contains("shall") || lower.contains("should")
                })
                .count();
            60.0 + 40.0 * normative as f64 / statements.len() as f64
        };
        if consistency < 80.0 {
            recommendations.push("Phrase requirements with must/shall/should".to_string());
        }

        QualityAssessment::from_dimensions(
            completeness,
            accuracy,
            consistency,
            timeliness(created_at, now),
        )
        .with_notes(issues, recommendations)
    }
}

/// Plans: objective, steps, risks and estimates; steps numbered in order.
pub struct PlanChecker;

impl QualityChecker for PlanChecker {
    fn assess(
        &self,
        content: &ArtifactContent,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> QualityAssessment {
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        let (completeness, missing) = section_coverage(
            content,
            &[
                &["objective", "goal", "summary"],
                &["steps", "tasks", "milestones"],
                &["risks", "risk"],
                &["timeline", "estimate", "schedule"],
            ],
        );
        for section in &missing {
            issues.push(format!("Missing section: {}", section));
        }
        if !missing.is_empty() {
            recommendations.push(format!("Add {} to the plan", missing.join(", ")));
        }

        let text = content.as_text();
        let accuracy = accuracy_from_placeholders(&text, &mut issues);

        let consistency = match content.as_json() {
            Some(value) => {
                let steps = value
                    .get("steps")
                    .or_else(|| value.get("tasks"))
                    .and_then(Value::as_array);
                match steps {
                    Some(steps) if !steps.is_empty() => 100.0,
                    Some(_) => {
                        issues.push("Plan has an empty step list".to_string());
                        40.0
                    }
                    None => 70.0,
                }
            }
            None => {
                let numbers: Vec<u32> = text
                    .lines()
                    .filter_map(|l| {
                        let l = l.trim_start();
                        let digits: String = l.chars().take_while(|c| c.is_ascii_digit()).collect();
                        if digits.is_empty() || !l[digits.len()..].starts_with('.') {
                            return None;
                        }
                        digits.parse().ok()
                    })
                    .collect();
                if numbers.is_empty() {
                    80.0
                } else if numbers.iter().zip(1..).all(|(n, expected)| *n == expected) {
                    100.0
                } else {
                    issues.push("Plan steps are not numbered sequentially".to_string());
                    60.0
                }
            }
        };

        QualityAssessment::from_dimensions(
            completeness,
            accuracy,
            consistency,
            timeliness(created_at, now),
        )
        .with_notes(issues, recommendations)
    }
}

/// Source code: no stubs, balanced delimiters, consistent indentation.
pub struct CodeChecker;

impl CodeChecker {
    fn balanced(text: &str) -> bool {
        let mut stack = Vec::new();
        for ch in text.chars() {
            match ch {
                '(' | '[' | '{' => stack.push(ch),
                ')' => {
                    if stack.pop() != Some('(') {
                        return false;
                    }
                }
                ']' => {
                    if stack.pop() != Some('[') {
                        return false;
                    }
                }
                '}' => {
                    if stack.pop() != Some('{') {
                        return false;
                    }
                }
                _ => {}
            }
        }
        stack.is_empty()
    }
}

impl QualityChecker for CodeChecker {
    fn assess(
        &self,
        content: &ArtifactContent,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> QualityAssessment {
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        let text = content.as_text();

        let stubs = ["todo!()", "unimplemented!()", "raise NotImplementedError", "pass  #"]
            .iter()
            .map(|s| text.matches(s).count())
            .sum::<usize>();
        let completeness = if text.trim().is_empty() {
            issues.push("No code present".to_string());
            0.0
        } else {
            if stubs > 0 {
                issues.push(format!("{} unimplemented stub(s)", stubs));
                recommendations.push("Implement stubbed functions".to_string());
            }
            (100.0 - 20.0 * stubs as f64).max(20.0)
        };

        let mut accuracy = accuracy_from_placeholders(&text, &mut issues);
        if !Self::balanced(&text) {
            issues.push("Unbalanced brackets".to_string());
            accuracy -= 30.0;
        }

        let indented: Vec<&str> = text
            .lines()
            .filter(|l| l.starts_with(' ') || l.starts_with('\t'))
            .collect();
        let tabs = indented.iter().filter(|l| l.starts_with('\t')).count();
        let consistency = if indented.is_empty() || tabs == 0 || tabs == indented.len() {
            100.0
        } else {
            issues.push("Mixed tab and space indentation".to_string());
            recommendations.push("Run the project formatter".to_string());
            70.0
        };

        QualityAssessment::from_dimensions(
            completeness,
            accuracy,
            consistency,
            timeliness(created_at, now),
        )
        .with_notes(issues, recommendations)
    }
}

/// Test results: counts must add up, failures and low coverage lower the score.
pub struct TestResultsChecker;

impl QualityChecker for TestResultsChecker {
    fn assess(
        &self,
        content: &ArtifactContent,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> QualityAssessment {
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        let Some(value) = content.as_json() else {
            issues.push("Test results are not structured JSON".to_string());
            recommendations.push("Store test results as JSON with passed/failed/total".to_string());
            return QualityAssessment::from_dimensions(
                40.0,
                accuracy_from_placeholders(&content.as_text(), &mut issues),
                50.0,
                timeliness(created_at, now),
            )
            .with_notes(issues, recommendations);
        };

        let field = |key: &str| value.get(key).and_then(Value::as_f64);
        let (completeness, _missing) = section_coverage(
            content,
            &[&["passed"], &["failed"], &["total"], &["coverage"]],
        );

        let passed = field("passed").unwrap_or(0.0);
        let failed = field("failed").unwrap_or(0.0);
        let total = field("total").unwrap_or(passed + failed);

        let accuracy = if (passed + failed - total).abs() < f64::EPSILON {
            100.0
        } else {
            issues.push(format!(
                "passed ({}) + failed ({}) does not equal total ({})",
                passed, failed, total
            ));
            60.0
        };

        let consistency = if total > 0.0 {
            if failed > 0.0 {
                issues.push(format!("{} failing test(s)", failed));
                recommendations.push("Fix failing tests before promotion".to_string());
            }
            100.0 * passed / total
        } else {
            issues.push("No tests were run".to_string());
            0.0
        };

        if let Some(coverage) = field("coverage") {
            if coverage < 80.0 {
                recommendations.push(format!("Raise coverage from {:.1}% to at least 80%", coverage));
            }
        }

        QualityAssessment::from_dimensions(
            completeness,
            accuracy,
            consistency,
            timeliness(created_at, now),
        )
        .with_notes(issues, recommendations)
    }
}

/// Quality checkers keyed by artifact type, with the generic fallback.
pub struct QualityCheckers {
    checkers: HashMap<ArtifactType, Box<dyn QualityChecker>>,
    generic: GenericChecker,
}

impl Default for QualityCheckers {
    fn default() -> Self {
        let mut checkers: HashMap<ArtifactType, Box<dyn QualityChecker>> = HashMap::new();
        checkers.insert(ArtifactType::Requirements, Box::new(RequirementsChecker));
        checkers.insert(ArtifactType::Plan, Box::new(PlanChecker));
        checkers.insert(ArtifactType::Code, Box::new(CodeChecker));
        checkers.insert(ArtifactType::TestResults, Box::new(TestResultsChecker));
        Self {
            checkers,
            generic: GenericChecker,
        }
    }
}

impl QualityCheckers {
    pub fn register(&mut self, artifact_type: ArtifactType, checker: Box<dyn QualityChecker>) {
        self.checkers.insert(artifact_type, checker);
    }

    pub fn assess(
        &self,
        artifact_type: ArtifactType,
        content: &ArtifactContent,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> QualityAssessment {
        match self.checkers.get(&artifact_type) {
            Some(checker) => checker.assess(content, created_at, now),
            None => self.generic.assess(content, created_at, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_weighted_overall_score() {
        let a = QualityAssessment::from_dimensions(80.0, 90.0, 85.0, 100.0);
        assert_eq!(a.overall, 86.0);
        assert_eq!(a.level, QualityLevel::Good);
    }

    #[test]
    fn test_dimensions_are_clamped() {
        let a = QualityAssessment::from_dimensions(150.0, -20.0, 100.0, 100.0);
        assert_eq!(a.validation.completeness, 100.0);
        assert_eq!(a.validation.accuracy, 0.0);
    }

    #[test]
    fn test_timeliness_decays_with_age() {
        let now = Utc::now();
        assert_eq!(timeliness(now, now), 100.0);
        assert_eq!(timeliness(now - Duration::days(20), now), 90.0);
        assert_eq!(timeliness(now - Duration::days(60), now), 75.0);
        assert_eq!(timeliness(now - Duration::days(365), now), 50.0);
    }

    #[test]
    fn test_requirements_checker_flags_missing_sections() {
        let now = Utc::now();
        let content = ArtifactContent::from(
            "# Problem statement\nUsers lose work.\n\n## Requirements\n- The editor must autosave\n",
        );
        let a = RequirementsChecker.assess(&content, now, now);
        assert!(a.issues.iter().any(|i| i.contains("acceptance_criteria")));
        assert!((a.validation.completeness - 66.67).abs() < 0.1);
    }

    #[test]
    fn test_complete_requirements_validate() {
        let now = Utc::now();
        let content = ArtifactContent::from(json!({
            "problem_statement": "Users lose unsaved work when the editor crashes",
            "requirements": ["The editor must autosave every 30s"],
            "acceptance_criteria": ["Crash loses at most 30s of work"]
        }));
        let a = RequirementsChecker.assess(&content, now, now);
        assert!(a.overall >= 70.0, "score {}", a.overall);
    }

    #[test]
    fn test_plan_checker_sequential_steps() {
        let now = Utc::now();
        let good = ArtifactContent::from(
            "Objective: ship retries\nSteps:\n1. add state\n2. add backoff\nRisks: none\nEstimate: 2d\n",
        );
        let bad = ArtifactContent::from(
            "Objective: ship retries\nSteps:\n1. add state\n3. add backoff\nRisks: none\nEstimate: 2d\n",
        );
        let good = PlanChecker.assess(&good, now, now);
        let bad = PlanChecker.assess(&bad, now, now);
        assert_eq!(good.validation.consistency, 100.0);
        assert_eq!(bad.validation.consistency, 60.0);
        assert_eq!(good.validation.completeness, 100.0);
    }

    #[test]
    fn test_code_checker_penalizes_stubs_and_unbalanced() {
        let now = Utc::now();
        let clean = ArtifactContent::from("fn main() {\n    println!(\"hi\");\n}\n");
        let broken = ArtifactContent::from("fn main() {\n    todo!()\n");
        let clean = CodeChecker.assess(&clean, now, now);
        let broken = CodeChecker.assess(&broken, now, now);
        assert_eq!(clean.level, QualityLevel::Excellent);
        assert!(broken.overall < clean.overall);
        assert!(broken.issues.iter().any(|i| i.contains("Unbalanced")));
    }

    #[test]
    fn test_test_results_checker() {
        let now = Utc::now();
        let green = ArtifactContent::from(json!({"passed": 40, "failed": 0, "total": 40, "coverage": 91.0}));
        let red = ArtifactContent::from(json!({"passed": 30, "failed": 10, "total": 40}));
        let green = TestResultsChecker.assess(&green, now, now);
        let red = TestResultsChecker.assess(&red, now, now);
        assert_eq!(green.level, QualityLevel::Excellent);
        assert!(red.issues.iter().any(|i| i.contains("10 failing")));
        assert!(red.overall < green.overall);
    }

    #[test]
    fn test_generic_checker_used_for_other_types() {
        let now = Utc::now();
        let checkers = QualityCheckers::default();
        let a = checkers.assess(
            ArtifactType::DeploymentConfig,
            &ArtifactContent::from(json!({"target": "prod", "replicas": 3})),
            now,
            now,
        );
        assert_eq!(a.validation.completeness, 100.0);
        assert_eq!(a.level, QualityLevel::Excellent);

        let empty = checkers.assess(
            ArtifactType::Documentation,
            &ArtifactContent::from(""),
            now,
            now,
        );
        assert_eq!(empty.level, QualityLevel::Failed);
    }
}
