use crate::db;
use crate::error::EngineError;
use crate::model::Category;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub const ENGINE_POLICY_KEY: &str = "engine.policy";
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CategoryWeights {
    pub formative: f64,
    pub summative: f64,
    pub performance_task: f64,
}

impl CategoryWeights {
    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Formative => self.formative,
            Category::Summative => self.summative,
            Category::PerformanceTask => self.performance_task,
        }
    }

    fn validate(&self, band: &str) -> Result<(), EngineError> {
        let all = [self.formative, self.summative, self.performance_task];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(EngineError::InvalidPolicy(format!(
                "band {band}: weights must be finite and non-negative"
            )));
        }
        let sum: f64 = all.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::InvalidPolicy(format!(
                "band {band}: weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub grades: Vec<String>,
    pub weights: CategoryWeights,
}

/// Grade-band to category weights. Injected per call, never global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightPolicy {
    pub bands: BTreeMap<String, GradeBand>,
}

impl WeightPolicy {
    pub fn weights_for_band(&self, band: &str) -> Result<&CategoryWeights, EngineError> {
        self.bands
            .get(band)
            .map(|b| &b.weights)
            .ok_or_else(|| EngineError::UnknownGradeBand(band.to_string()))
    }

    pub fn band_for_grade(&self, grade_level: &str) -> Option<&str> {
        let g = grade_level.trim();
        self.bands
            .iter()
            .find(|(_, b)| b.grades.iter().any(|x| x.eq_ignore_ascii_case(g)))
            .map(|(name, _)| name.as_str())
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.bands.is_empty() {
            return Err(EngineError::InvalidPolicy(
                "weight policy needs at least one band".to_string(),
            ));
        }
        let mut seen: HashSet<String> = HashSet::new();
        for (name, band) in &self.bands {
            band.weights.validate(name)?;
            for g in &band.grades {
                if !seen.insert(g.trim().to_ascii_uppercase()) {
                    return Err(EngineError::InvalidPolicy(format!(
                        "grade {g} is assigned to more than one band"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Mastery cutoffs, in percent of the assessment maximum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryThresholds {
    /// Below this is "needs reteaching".
    pub pass_percent: f64,
    /// From pass up to and including this is "approaching".
    pub approaching_max_percent: f64,
    /// At or above this is "proficient".
    pub proficient_percent: f64,
}

impl MasteryThresholds {
    pub fn validate(&self) -> Result<(), EngineError> {
        let ordered = 0.0 <= self.pass_percent
            && self.pass_percent <= self.approaching_max_percent
            && self.approaching_max_percent <= self.proficient_percent
            && self.proficient_percent <= 100.0;
        if !ordered {
            return Err(EngineError::InvalidPolicy(
                "thresholds must satisfy 0 <= pass <= approachingMax <= proficient <= 100"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MasteryThresholds {
    fn default() -> Self {
        Self {
            pass_percent: 60.0,
            approaching_max_percent: 70.0,
            proficient_percent: 80.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub weight_policy: WeightPolicy,
    pub thresholds: MasteryThresholds,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.weight_policy.validate()?;
        self.thresholds.validate()
    }
}

fn grades(list: &[&str]) -> Vec<String> {
    list.iter().map(|g| g.to_string()).collect()
}

impl Default for WeightPolicy {
    fn default() -> Self {
        let mut bands = BTreeMap::new();
        bands.insert(
            "primary".to_string(),
            GradeBand {
                grades: grades(&["K", "1", "2"]),
                weights: CategoryWeights {
                    formative: 0.5,
                    summative: 0.3,
                    performance_task: 0.2,
                },
            },
        );
        bands.insert(
            "intermediate".to_string(),
            GradeBand {
                grades: grades(&["3", "4", "5"]),
                weights: CategoryWeights {
                    formative: 0.4,
                    summative: 0.4,
                    performance_task: 0.2,
                },
            },
        );
        Self { bands }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weight_policy: WeightPolicy::default(),
            thresholds: MasteryThresholds::default(),
        }
    }
}

/// Loads the workspace policy. A missing or malformed stored document
/// falls back to defaults so reports still open.
pub fn load_engine_config(conn: &Connection) -> anyhow::Result<EngineConfig> {
    let Some(saved) = db::settings_get_json(conn, ENGINE_POLICY_KEY)? else {
        return Ok(EngineConfig::default());
    };
    match serde_json::from_value::<EngineConfig>(saved) {
        Ok(cfg) if cfg.validate().is_ok() => Ok(cfg),
        Ok(_) | Err(_) => {
            tracing::warn!(key = ENGINE_POLICY_KEY, "stored policy is invalid; using defaults");
            Ok(EngineConfig::default())
        }
    }
}

pub fn save_engine_config(conn: &Connection, cfg: &EngineConfig) -> anyhow::Result<()> {
    db::settings_set_json(conn, ENGINE_POLICY_KEY, &serde_json::to_value(cfg)?)
}
