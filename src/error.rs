use thiserror::Error;

/// Failures raised by the scoring engine itself.
///
/// Parse leniency lives outside this type: malformed score text and
/// unrecognised standard codes degrade to "no value" / passthrough instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("sub-score for section {index} is negative: {value}")]
    NegativeSubScore { index: usize, value: f64 },

    #[error("section index {index} is outside the section list (len {len})")]
    SectionIndexOutOfRange { index: usize, len: usize },

    #[error("invalid assessment: {0}")]
    InvalidAssessment(String),

    #[error("rubric level for criterion {criterion} must be 1..=4, got {level}")]
    InvalidRubricLevel { criterion: usize, level: i64 },

    #[error("rubric session has {got} levels but template has {expected} criteria")]
    RubricShapeMismatch { expected: usize, got: usize },

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("no weight band configured for grade band {0:?}")]
    UnknownGradeBand(String),

    #[error("a grade cannot be both absent and exempt")]
    StatusConflict,
}

impl EngineError {
    /// Stable machine code, used verbatim as the IPC error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NegativeSubScore { .. } => "negative_sub_score",
            Self::SectionIndexOutOfRange { .. } => "section_index_out_of_range",
            Self::InvalidAssessment(_) => "invalid_assessment",
            Self::InvalidRubricLevel { .. } | Self::RubricShapeMismatch { .. } => {
                "invalid_rubric_level"
            }
            Self::InvalidPolicy(_) => "invalid_policy",
            Self::UnknownGradeBand(_) => "unknown_grade_band",
            Self::StatusConflict => "status_conflict",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::NegativeSubScore { index, value } => {
                Some(serde_json::json!({ "index": index, "value": value }))
            }
            Self::SectionIndexOutOfRange { index, len } => {
                Some(serde_json::json!({ "index": index, "len": len }))
            }
            Self::InvalidRubricLevel { criterion, level } => {
                Some(serde_json::json!({ "criterion": criterion, "level": level }))
            }
            Self::RubricShapeMismatch { expected, got } => {
                Some(serde_json::json!({ "expected": expected, "got": got }))
            }
            Self::UnknownGradeBand(band) => Some(serde_json::json!({ "band": band })),
            _ => None,
        }
    }
}
