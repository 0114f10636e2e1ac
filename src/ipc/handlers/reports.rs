use crate::aggregate::{self, DomainItem, DomainRollup, WeightedItem};
use crate::config::{self, EngineConfig};
use crate::error::EngineError;
use crate::ipc::error::{engine_err, ok};
use crate::ipc::helpers::{
    assessment_or_not_found, db_conn, db_query_err, optional_i64, optional_string_list,
    required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{normalize_grade_level, Assessment};
use crate::score::round_off_1_decimal;
use crate::stats::{self, ComparisonGroup};
use crate::store::{self, AssessmentFilter};
use rusqlite::Connection;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap};

fn load_config(conn: &Connection, req: &Request) -> Result<EngineConfig, serde_json::Value> {
    config::load_engine_config(conn).map_err(|e| db_query_err(req, e))
}

fn round_opt(v: Option<f64>) -> Option<f64> {
    v.map(round_off_1_decimal)
}

fn rollup_json(student_id: &str, rollup: &DomainRollup) -> serde_json::Value {
    let domains: Vec<serde_json::Value> = rollup
        .domains
        .iter()
        .map(|d| {
            let categories: Vec<serde_json::Value> = d
                .average
                .categories
                .iter()
                .map(|c| {
                    json!({
                        "category": c.category,
                        "average": round_off_1_decimal(c.average),
                        "itemCount": c.item_count,
                        "effectiveWeight": c.effective_weight,
                    })
                })
                .collect();
            json!({
                "domain": d.domain,
                "percent": round_off_1_decimal(d.average.percent),
                "categories": categories,
            })
        })
        .collect();
    json!({
        "studentId": student_id,
        "domains": domains,
        "overall": round_opt(rollup.overall),
    })
}

fn handle_student_averages(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let grade_level = match required_str(req, "gradeLevel") {
        Ok(v) => normalize_grade_level(&v),
        Err(e) => return e,
    };
    let class_name = match required_str(req, "className") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match optional_i64(req, "term") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_ids = match optional_string_list(req, "studentIds") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let cfg = match load_config(conn, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(band) = cfg.weight_policy.band_for_grade(&grade_level) else {
        return engine_err(&req.id, &EngineError::UnknownGradeBand(grade_level));
    };
    let weights = match cfg.weight_policy.weights_for_band(band) {
        Ok(w) => w,
        Err(e) => return engine_err(&req.id, &e),
    };

    let filter = AssessmentFilter {
        grade_level: Some(grade_level.clone()),
        class_name: Some(class_name.clone()),
        domain: None,
        term,
    };
    let assessments = match store::list_assessments(conn, &filter) {
        Ok(v) => v,
        Err(e) => return db_query_err(req, e),
    };
    let by_id: HashMap<&str, &Assessment> =
        assessments.iter().map(|a| (a.id.as_str(), a)).collect();
    let assessment_ids: Vec<String> = assessments.iter().map(|a| a.id.clone()).collect();
    let grades = match store::list_grades(conn, &assessment_ids, student_ids.as_deref()) {
        Ok(v) => v,
        Err(e) => return db_query_err(req, e),
    };

    // Requested students are always reported, even with no grades at all.
    let mut items: BTreeMap<String, Vec<DomainItem>> = BTreeMap::new();
    if let Some(ids) = &student_ids {
        for id in ids {
            items.entry(id.clone()).or_default();
        }
    }
    for g in &grades {
        let entry = items.entry(g.student_id.clone()).or_default();
        if !g.counts_toward_aggregation() {
            continue;
        }
        let (Some(score), Some(a)) = (g.score, by_id.get(g.assessment_id.as_str())) else {
            continue;
        };
        entry.push(DomainItem {
            domain: a.domain,
            item: WeightedItem {
                score,
                max_score: a.max_score(),
                category: a.category,
            },
        });
    }

    let mut students: Vec<serde_json::Value> = Vec::with_capacity(items.len());
    for (student_id, its) in &items {
        let mut row = rollup_json(student_id, &aggregate::domain_rollup(its, weights));
        // Category-weighted across every domain, for comparison with `overall`.
        let flat: Vec<WeightedItem> = its.iter().map(|d| d.item).collect();
        match aggregate::weighted_average_for_band(&flat, &cfg.weight_policy, band) {
            Ok(avg) => row["combined"] = json!(round_opt(avg.map(|a| a.percent))),
            Err(e) => return engine_err(&req.id, &e),
        }
        students.push(row);
    }

    ok(
        &req.id,
        json!({
            "gradeLevel": grade_level,
            "className": class_name,
            "band": band,
            "weights": weights,
            "assessmentCount": assessments.len(),
            "students": students,
        }),
    )
}

fn recorded_scores(
    conn: &Connection,
    req: &Request,
    assessment_id: &str,
) -> Result<Vec<f64>, serde_json::Value> {
    let grades = store::list_grades(conn, &[assessment_id.to_string()], None)
        .map_err(|e| db_query_err(req, e))?;
    Ok(grades
        .iter()
        .filter(|g| g.counts_toward_aggregation())
        .filter_map(|g| g.score)
        .collect())
}

fn handle_assessment_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let a = match assessment_or_not_found(conn, req, &assessment_id) {
        Ok(a) => a,
        Err(e) => return e,
    };
    let cfg = match load_config(conn, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let scores = match recorded_scores(conn, req, &a.id) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let Some(s) = stats::score_statistics(&scores, a.max_score(), &cfg.thresholds) else {
        return ok(
            &req.id,
            json!({
                "assessmentId": a.id,
                "maxScore": a.max_score(),
                "count": 0,
                "stats": null,
            }),
        );
    };

    ok(
        &req.id,
        json!({
            "assessmentId": a.id,
            "maxScore": a.max_score(),
            "count": s.count,
            "stats": {
                "mean": round_off_1_decimal(s.mean),
                "median": round_off_1_decimal(s.median),
                "stdDev": round_off_1_decimal(s.std_dev),
                "min": s.min,
                "max": s.max,
                "meanPercent": round_off_1_decimal(s.mean_percent),
                "histogram": s.histogram,
                "bands": s.bands,
            },
            "thresholds": cfg.thresholds,
        }),
    )
}

fn handle_compare_classes(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let a = match assessment_or_not_found(conn, req, &assessment_id) {
        Ok(a) => a,
        Err(e) => return e,
    };
    let replicas = match store::find_replicas(conn, &a) {
        Ok(v) => v,
        Err(e) => return db_query_err(req, e),
    };
    if replicas.is_empty() {
        return ok(
            &req.id,
            json!({
                "assessmentId": a.id,
                "name": a.name,
                "ranked": [],
                "noData": [],
            }),
        );
    }

    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut groups = Vec::with_capacity(replicas.len() + 1);
    for r in std::iter::once(&a).chain(replicas.iter()) {
        // One group per class; a class holding two copies keeps the first.
        if !seen.insert(r.class_name.clone()) {
            continue;
        }
        let scores = match recorded_scores(conn, req, &r.id) {
            Ok(v) => v,
            Err(e) => return e,
        };
        groups.push(ComparisonGroup {
            group: r.class_name.clone(),
            assessment_id: r.id.clone(),
            max_score: r.max_score(),
            scores,
        });
    }

    let report = stats::compare_groups(&groups);
    let ranked: Vec<serde_json::Value> = report
        .ranked
        .iter()
        .map(|g| {
            json!({
                "className": g.group,
                "assessmentId": g.assessment_id,
                "count": g.count,
                "meanPercent": round_opt(g.mean_percent),
                "rank": g.rank,
            })
        })
        .collect();
    let no_data: Vec<serde_json::Value> = report
        .no_data
        .iter()
        .map(|g| {
            json!({
                "className": g.group,
                "assessmentId": g.assessment_id,
                "count": g.count,
            })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "assessmentId": a.id,
            "name": a.name,
            "ranked": ranked,
            "noData": no_data,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.studentAverages" => Some(handle_student_averages(state, req)),
        "reports.assessmentStats" => Some(handle_assessment_stats(state, req)),
        "reports.compareClasses" => Some(handle_compare_classes(state, req)),
        _ => None,
    }
}
