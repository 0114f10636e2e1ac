use crate::error::EngineError;
use crate::model::Section;
use serde::Serialize;
use std::collections::BTreeMap;

pub type SectionScores = BTreeMap<usize, Option<f64>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionTotal {
    pub total: f64,
    pub max_score: f64,
    /// At least one section has a non-null sub-score.
    pub entered: bool,
    /// Sections whose sub-score is above that section's maxPoints.
    pub over_max_sections: Vec<usize>,
}

impl SectionTotal {
    /// Score to persist on the grade: `None` until something is entered.
    pub fn stored_score(&self) -> Option<f64> {
        self.entered.then_some(self.total)
    }
}

pub fn sections_max(sections: &[Section]) -> f64 {
    sections.iter().map(|s| s.max_points).sum()
}

/// Checks a sub-score map before it is allowed near storage.
pub fn validate_section_scores(
    sections: &[Section],
    scores: &SectionScores,
) -> Result<(), EngineError> {
    for (&index, value) in scores {
        if index >= sections.len() {
            return Err(EngineError::SectionIndexOutOfRange {
                index,
                len: sections.len(),
            });
        }
        if let Some(v) = value {
            if !v.is_finite() || *v < 0.0 {
                return Err(EngineError::NegativeSubScore { index, value: *v });
            }
        }
    }
    Ok(())
}

/// Sums per-section sub-scores; missing or null entries count as zero.
pub fn compose_total(
    sections: &[Section],
    scores: &SectionScores,
) -> Result<SectionTotal, EngineError> {
    validate_section_scores(sections, scores)?;

    let mut total = 0.0_f64;
    let mut entered = false;
    let mut over_max_sections = Vec::new();
    for (i, section) in sections.iter().enumerate() {
        let Some(v) = scores.get(&i).copied().flatten() else {
            continue;
        };
        entered = true;
        total += v;
        if v > section.max_points {
            over_max_sections.push(i);
        }
    }

    Ok(SectionTotal {
        total,
        max_score: sections_max(sections),
        entered,
        over_max_sections,
    })
}

pub fn has_entered_sections(scores: &SectionScores) -> bool {
    scores.values().any(|v| v.is_some())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryProgress {
    pub entered: usize,
    pub total: usize,
}

/// "N of M students entered". A roster member counts once they have a
/// score or at least one non-null sub-score.
pub fn entry_progress<'a, I>(roster_size: usize, grades: I) -> EntryProgress
where
    I: IntoIterator<Item = (Option<f64>, Option<&'a SectionScores>)>,
{
    let entered = grades
        .into_iter()
        .filter(|(score, sections)| {
            score.is_some() || sections.map(has_entered_sections).unwrap_or(false)
        })
        .count();
    EntryProgress {
        entered: entered.min(roster_size),
        total: roster_size,
    }
}
