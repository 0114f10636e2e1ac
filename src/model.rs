use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Reading,
    Phonics,
    Writing,
    Speaking,
    Language,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::Reading,
        Domain::Phonics,
        Domain::Writing,
        Domain::Speaking,
        Domain::Language,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Phonics => "phonics",
            Self::Writing => "writing",
            Self::Speaking => "speaking",
            Self::Language => "language",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Formative,
    Summative,
    PerformanceTask,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::Formative,
        Category::Summative,
        Category::PerformanceTask,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Formative => "formative",
            Self::Summative => "summative",
            Self::PerformanceTask => "performance_task",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_code: Option<String>,
    pub max_points: f64,
}

/// How an assessment is scored. Sectioned assessments derive their maximum
/// from the section list; there is no separately stored maximum to drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Scoring {
    #[serde(rename_all = "camelCase")]
    Simple { max_score: f64 },
    #[serde(rename_all = "camelCase")]
    Sectioned { sections: Vec<Section> },
}

impl Scoring {
    pub fn max_score(&self) -> f64 {
        match self {
            Self::Simple { max_score } => *max_score,
            Self::Sectioned { sections } => sections.iter().map(|s| s.max_points).sum(),
        }
    }

    pub fn sections(&self) -> &[Section] {
        match self {
            Self::Simple { .. } => &[],
            Self::Sectioned { sections } => sections,
        }
    }

    /// Builds the scoring variant from a raw max and an optional section list.
    /// An empty section list means a simple assessment.
    pub fn from_parts(max_score: f64, sections: Vec<Section>) -> Self {
        if sections.is_empty() {
            Self::Simple { max_score }
        } else {
            Self::Sectioned { sections }
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            Self::Simple { max_score } => {
                if !max_score.is_finite() || *max_score <= 0.0 {
                    return Err(EngineError::InvalidAssessment(format!(
                        "maxScore must be a positive number, got {max_score}"
                    )));
                }
            }
            Self::Sectioned { sections } => {
                if sections.is_empty() {
                    return Err(EngineError::InvalidAssessment(
                        "sectioned assessment needs at least one section".to_string(),
                    ));
                }
                for (i, s) in sections.iter().enumerate() {
                    if !s.max_points.is_finite() || s.max_points <= 0.0 {
                        return Err(EngineError::InvalidAssessment(format!(
                            "section {i} maxPoints must be a positive number"
                        )));
                    }
                    if s.label.trim().is_empty() {
                        return Err(EngineError::InvalidAssessment(format!(
                            "section {i} label must not be empty"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardTag {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dok_level: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub name: String,
    pub domain: Domain,
    pub category: Category,
    pub grade_level: String,
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub scoring: Scoring,
    #[serde(default)]
    pub standards: Vec<StandardTag>,
}

/// Canonical stored form of a grade level: trimmed and uppercased, so "k"
/// and " K " name the same grade in filters and band lookups.
pub fn normalize_grade_level(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

impl Assessment {
    pub fn max_score(&self) -> f64 {
        self.scoring.max_score()
    }
}

/// One student's stored result on one assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub assessment_id: String,
    pub student_id: String,
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_scores: Option<BTreeMap<usize, Option<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric_levels: Option<Vec<Option<u8>>>,
    #[serde(default)]
    pub is_absent: bool,
    #[serde(default)]
    pub is_exempt: bool,
}

impl Grade {
    pub fn new(assessment_id: &str, student_id: &str) -> Self {
        Self {
            assessment_id: assessment_id.to_string(),
            student_id: student_id.to_string(),
            score: None,
            section_scores: None,
            rubric_levels: None,
            is_absent: false,
            is_exempt: false,
        }
    }

    /// Absent and exempt grades never reach aggregation.
    pub fn counts_toward_aggregation(&self) -> bool {
        !self.is_absent && !self.is_exempt && self.score.is_some()
    }

    /// Applies an absent/exempt status change, nulling the score when either is set.
    /// Rubric levels describe a score, so they go with it.
    pub fn set_status(&mut self, absent: bool, exempt: bool) -> Result<(), EngineError> {
        if absent && exempt {
            return Err(EngineError::StatusConflict);
        }
        self.is_absent = absent;
        self.is_exempt = exempt;
        if absent || exempt {
            self.score = None;
            self.rubric_levels = None;
        }
        Ok(())
    }

    /// Stores a score typed directly against the assessment max. Sub-scores and
    /// rubric levels from an earlier entry no longer add up to it and are dropped.
    pub fn set_direct_score(&mut self, score: Option<f64>) {
        if score.is_some() {
            self.is_absent = false;
            self.is_exempt = false;
        }
        self.score = score;
        self.section_scores = None;
        self.rubric_levels = None;
    }

    /// Stores a rubric total together with the levels that produced it.
    pub fn set_rubric_score(&mut self, total: f64, levels: Vec<Option<u8>>) {
        self.is_absent = false;
        self.is_exempt = false;
        self.score = Some(total);
        self.section_scores = None;
        self.rubric_levels = Some(levels);
    }
}
