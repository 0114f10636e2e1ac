use crate::error::EngineError;
use serde::{Deserialize, Serialize};

pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 4;
pub const LEVEL_LABELS: [&str; 4] = ["Beginning", "Developing", "Proficient", "Exemplary"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricCriterion {
    pub label: String,
    #[serde(default)]
    pub description: String,
}

/// Read-only reference data; the engine never mutates a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricTemplate {
    #[serde(default)]
    pub name: String,
    pub criteria: Vec<RubricCriterion>,
}

impl RubricTemplate {
    pub fn max_score(&self) -> f64 {
        f64::from(MAX_LEVEL) * self.criteria.len() as f64
    }
}

pub fn level_label(level: u8) -> Option<&'static str> {
    if (MIN_LEVEL..=MAX_LEVEL).contains(&level) {
        Some(LEVEL_LABELS[usize::from(level - MIN_LEVEL)])
    } else {
        None
    }
}

/// One student's selections, one slot per criterion. `None` is unscored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricSession {
    pub student_id: String,
    pub levels: Vec<Option<u8>>,
}

impl RubricSession {
    /// Builds a session from raw level input. `0` and null both mean unscored.
    pub fn from_raw(
        template: &RubricTemplate,
        student_id: &str,
        raw_levels: &[Option<i64>],
    ) -> Result<Self, EngineError> {
        if raw_levels.len() > template.criteria.len() {
            return Err(EngineError::RubricShapeMismatch {
                expected: template.criteria.len(),
                got: raw_levels.len(),
            });
        }
        let mut levels = vec![None; template.criteria.len()];
        for (criterion, raw) in raw_levels.iter().enumerate() {
            levels[criterion] = match raw {
                None | Some(0) => None,
                Some(l) if (i64::from(MIN_LEVEL)..=i64::from(MAX_LEVEL)).contains(l) => {
                    Some(*l as u8)
                }
                Some(l) => {
                    return Err(EngineError::InvalidRubricLevel {
                        criterion,
                        level: *l,
                    })
                }
            };
        }
        Ok(Self {
            student_id: student_id.to_string(),
            levels,
        })
    }

    pub fn total(&self) -> f64 {
        self.levels.iter().flatten().map(|l| f64::from(*l)).sum()
    }

    pub fn scored_count(&self) -> usize {
        self.levels.iter().filter(|l| l.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        !self.levels.is_empty() && self.levels.iter().all(|l| l.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricResult {
    pub student_id: String,
    pub levels: Vec<Option<u8>>,
    pub total: f64,
    pub max_score: f64,
    pub scored: usize,
    pub complete: bool,
}

pub fn score_session(template: &RubricTemplate, session: &RubricSession) -> RubricResult {
    RubricResult {
        student_id: session.student_id.clone(),
        levels: session.levels.clone(),
        total: session.total(),
        max_score: template.max_score(),
        scored: session.scored_count(),
        complete: session.is_complete(),
    }
}

/// What a class-wide apply would write back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPlan {
    /// The assessment maximum after the apply, always the rubric's own.
    pub max_score: f64,
    /// True when the assessment's configured maximum has to be replaced.
    pub max_changed: bool,
    pub writes: Vec<RubricResult>,
    pub skipped: Vec<String>,
}

/// Complete sessions become writes, incomplete ones are skipped silently.
pub fn plan_apply(
    template: &RubricTemplate,
    current_max: f64,
    sessions: &[RubricSession],
) -> ApplyPlan {
    let max_score = template.max_score();
    let mut writes = Vec::new();
    let mut skipped = Vec::new();
    for s in sessions {
        if s.is_complete() {
            writes.push(score_session(template, s));
        } else {
            skipped.push(s.student_id.clone());
        }
    }
    ApplyPlan {
        max_score,
        max_changed: (current_max - max_score).abs() > f64::EPSILON,
        writes,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(n: usize) -> RubricTemplate {
        RubricTemplate {
            name: "Narrative".to_string(),
            criteria: (0..n)
                .map(|i| RubricCriterion {
                    label: format!("Criterion {}", i + 1),
                    description: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn partial_session_totals_but_is_incomplete() {
        let t = template(4);
        let s = RubricSession::from_raw(&t, "s1", &[Some(3), Some(4), Some(2), None])
            .expect("session");
        let r = score_session(&t, &s);
        assert_eq!(r.total, 9.0);
        assert_eq!(r.max_score, 16.0);
        assert_eq!(r.scored, 3);
        assert!(!r.complete);
    }

    #[test]
    fn zero_means_unscored_and_short_input_pads() {
        let t = template(3);
        let s = RubricSession::from_raw(&t, "s1", &[Some(0), Some(2)]).expect("session");
        assert_eq!(s.levels, vec![None, Some(2), None]);
    }

    #[test]
    fn out_of_scale_levels_are_rejected() {
        let t = template(2);
        assert_eq!(
            RubricSession::from_raw(&t, "s1", &[Some(5), Some(1)]),
            Err(EngineError::InvalidRubricLevel {
                criterion: 0,
                level: 5
            })
        );
        assert!(RubricSession::from_raw(&t, "s1", &[Some(1), Some(1), Some(1)]).is_err());
    }

    #[test]
    fn apply_skips_incomplete_and_adopts_rubric_max() {
        let t = template(4);
        let done =
            RubricSession::from_raw(&t, "s1", &[Some(4), Some(4), Some(3), Some(1)]).expect("s1");
        let partial =
            RubricSession::from_raw(&t, "s2", &[Some(3), Some(4), Some(2), None]).expect("s2");
        let plan = plan_apply(&t, 20.0, &[done, partial]);
        assert_eq!(plan.max_score, 16.0);
        assert!(plan.max_changed);
        assert_eq!(plan.writes.len(), 1);
        assert_eq!(plan.writes[0].student_id, "s1");
        assert_eq!(plan.writes[0].total, 12.0);
        assert_eq!(plan.skipped, vec!["s2".to_string()]);
    }

    #[test]
    fn matching_max_is_left_alone() {
        let t = template(2);
        let plan = plan_apply(&t, 8.0, &[]);
        assert!(!plan.max_changed);
    }

    #[test]
    fn labels_cover_the_fixed_scale() {
        assert_eq!(level_label(1), Some("Beginning"));
        assert_eq!(level_label(4), Some("Exemplary"));
        assert_eq!(level_label(0), None);
    }
}
