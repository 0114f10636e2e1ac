use crate::config::MasteryThresholds;
use serde::Serialize;
use std::cmp::Ordering;

pub const HISTOGRAM_BUCKETS: usize = 5;
const BUCKET_WIDTH_PERCENT: f64 = 100.0 / HISTOGRAM_BUCKETS as f64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBucket {
    pub label: String,
    pub min_percent: f64,
    pub max_percent: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryBands {
    pub needs_reteach: usize,
    pub approaching: usize,
    pub proficient: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreStatistics {
    pub count: usize,
    pub max_score: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub mean_percent: f64,
    pub histogram: Vec<HistogramBucket>,
    pub bands: MasteryBands,
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[(n / 2) - 1] + sorted[n / 2]) / 2.0)
    }
}

/// Population standard deviation (divides by n).
pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

fn bucket_index(percent: f64) -> usize {
    if percent <= 0.0 {
        return 0;
    }
    ((percent / BUCKET_WIDTH_PERCENT).floor() as usize).min(HISTOGRAM_BUCKETS - 1)
}

pub fn percent_histogram(percents: &[f64]) -> Vec<HistogramBucket> {
    let mut counts = [0_usize; HISTOGRAM_BUCKETS];
    for p in percents {
        counts[bucket_index(*p)] += 1;
    }
    counts
        .iter()
        .enumerate()
        .map(|(i, count)| {
            let min_percent = i as f64 * BUCKET_WIDTH_PERCENT;
            let max_percent = min_percent + BUCKET_WIDTH_PERCENT;
            HistogramBucket {
                label: format!("{min_percent:.0}-{max_percent:.0}"),
                min_percent,
                max_percent,
                count: *count,
            }
        })
        .collect()
}

pub fn mastery_bands(percents: &[f64], thresholds: &MasteryThresholds) -> MasteryBands {
    let mut bands = MasteryBands {
        needs_reteach: 0,
        approaching: 0,
        proficient: 0,
    };
    for p in percents {
        if *p < thresholds.pass_percent {
            bands.needs_reteach += 1;
        } else if *p <= thresholds.approaching_max_percent {
            bands.approaching += 1;
        }
        if *p >= thresholds.proficient_percent {
            bands.proficient += 1;
        }
    }
    bands
}

/// Distribution summary for one assessment. `None` when there are no scores
/// or the maximum cannot produce percentages.
pub fn score_statistics(
    scores: &[f64],
    max_score: f64,
    thresholds: &MasteryThresholds,
) -> Option<ScoreStatistics> {
    if max_score <= 0.0 || !max_score.is_finite() {
        return None;
    }
    let mean_v = mean(scores)?;
    let percents: Vec<f64> = scores.iter().map(|s| 100.0 * s / max_score).collect();

    Some(ScoreStatistics {
        count: scores.len(),
        max_score,
        mean: mean_v,
        median: median(scores)?,
        std_dev: population_std_dev(scores)?,
        min: scores.iter().copied().fold(f64::INFINITY, f64::min),
        max: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean_percent: 100.0 * mean_v / max_score,
        histogram: percent_histogram(&percents),
        bands: mastery_bands(&percents, thresholds),
    })
}

/// One class grouping of a replicated assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonGroup {
    pub group: String,
    pub assessment_id: String,
    pub max_score: f64,
    pub scores: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMean {
    pub group: String,
    pub assessment_id: String,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    pub ranked: Vec<GroupMean>,
    /// Groups with no recorded scores; reported, never ranked as 0%.
    pub no_data: Vec<GroupMean>,
}

pub fn compare_groups(groups: &[ComparisonGroup]) -> ComparisonReport {
    let mut ranked = Vec::new();
    let mut no_data = Vec::new();
    for g in groups {
        let mean_percent = if g.max_score > 0.0 {
            mean(&g.scores).map(|m| 100.0 * m / g.max_score)
        } else {
            None
        };
        let row = GroupMean {
            group: g.group.clone(),
            assessment_id: g.assessment_id.clone(),
            count: g.scores.len(),
            mean_percent,
            rank: None,
        };
        if row.mean_percent.is_some() {
            ranked.push(row);
        } else {
            no_data.push(row);
        }
    }

    ranked.sort_by(|a, b| {
        let a_key = a.mean_percent.unwrap_or(f64::MIN);
        let b_key = b.mean_percent.unwrap_or(f64::MIN);
        b_key
            .partial_cmp(&a_key)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.group.cmp(&b.group))
    });
    for (i, row) in ranked.iter_mut().enumerate() {
        row.rank = Some(i + 1);
    }
    no_data.sort_by(|a, b| a.group.cmp(&b.group));

    ComparisonReport { ranked, no_data }
}
