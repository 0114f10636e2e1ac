use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{
    assessment_or_not_found, db_conn, db_query_err, db_update_err, optional_i64, optional_str,
    required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    normalize_grade_level, Assessment, Category, Domain, Scoring, Section, StandardTag,
};
use crate::standards::normalize_standard;
use crate::store::{self, AssessmentFilter};
use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;

pub fn assessment_json(a: &Assessment) -> serde_json::Value {
    let mut v = json!(a);
    v["maxScore"] = json!(a.max_score());
    v
}

fn parse_domain(req: &Request, raw: &str) -> Result<Domain, serde_json::Value> {
    Domain::parse(raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "domain must be one of: reading, phonics, writing, speaking, language",
            Some(json!({ "domain": raw })),
        )
    })
}

fn parse_category(req: &Request, raw: &str) -> Result<Category, serde_json::Value> {
    Category::parse(raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "category must be one of: formative, summative, performance_task",
            Some(json!({ "category": raw })),
        )
    })
}

fn parse_date(req: &Request) -> Result<Option<String>, serde_json::Value> {
    let Some(raw) = optional_str(req, "date") else {
        return Ok(None);
    };
    match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        Ok(d) => Ok(Some(d.format("%Y-%m-%d").to_string())),
        Err(_) => Err(err(
            &req.id,
            "bad_params",
            "date must be YYYY-MM-DD",
            Some(json!({ "date": raw })),
        )),
    }
}

fn parse_sections(
    req: &Request,
    raw: &serde_json::Value,
) -> Result<Vec<Section>, serde_json::Value> {
    let mut sections: Vec<Section> = serde_json::from_value(raw.clone()).map_err(|e| {
        err(
            &req.id,
            "bad_params",
            format!("sections[] is malformed: {e}"),
            None,
        )
    })?;
    for s in &mut sections {
        s.label = s.label.trim().to_string();
        s.standard_code = s
            .standard_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(normalize_standard);
    }
    Ok(sections)
}

/// Accepts bare code strings or `{ code, dokLevel }` objects; codes are normalized
/// and de-duplicated (last one wins).
fn parse_standards(
    req: &Request,
    raw: &serde_json::Value,
) -> Result<Vec<StandardTag>, serde_json::Value> {
    let Some(arr) = raw.as_array() else {
        return Err(err(&req.id, "bad_params", "standards must be an array", None));
    };
    let mut out: Vec<StandardTag> = Vec::with_capacity(arr.len());
    for v in arr {
        let tag = if let Some(s) = v.as_str() {
            StandardTag {
                code: s.to_string(),
                dok_level: None,
            }
        } else {
            serde_json::from_value::<StandardTag>(v.clone()).map_err(|e| {
                err(
                    &req.id,
                    "bad_params",
                    format!("standards[] entry is malformed: {e}"),
                    None,
                )
            })?
        };
        if let Some(d) = tag.dok_level {
            if !(1..=4).contains(&d) {
                return Err(err(
                    &req.id,
                    "bad_params",
                    "dokLevel must be 1..=4",
                    Some(json!({ "dokLevel": d })),
                ));
            }
        }
        let code = normalize_standard(&tag.code);
        if code.trim().is_empty() {
            continue;
        }
        out.retain(|t| t.code != code);
        out.push(StandardTag {
            code,
            dok_level: tag.dok_level,
        });
    }
    Ok(out)
}

fn handle_assessments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let domain = match required_str(req, "domain").and_then(|d| parse_domain(req, &d)) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let category = match required_str(req, "category").and_then(|c| parse_category(req, &c)) {
        Ok(v) => v,
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
    let date = match parse_date(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let sections = match req.params.get("sections").filter(|v| !v.is_null()) {
        Some(raw) => match parse_sections(req, raw) {
            Ok(v) => v,
            Err(e) => return e,
        },
        None => Vec::new(),
    };
    let standards = match req.params.get("standards").filter(|v| !v.is_null()) {
        Some(raw) => match parse_standards(req, raw) {
            Ok(v) => v,
            Err(e) => return e,
        },
        None => Vec::new(),
    };
    let max_score = req
        .params
        .get("maxScore")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);

    let scoring = Scoring::from_parts(max_score, sections);
    if let Err(e) = scoring.validate() {
        return engine_err(&req.id, &e);
    }

    let assessment = Assessment {
        id: Uuid::new_v4().to_string(),
        name,
        domain,
        category,
        grade_level,
        class_name,
        term,
        date,
        notes: optional_str(req, "notes"),
        scoring,
        standards,
    };
    if let Err(e) = store::save_assessment(conn, &assessment) {
        return err(&req.id, "db_insert_failed", format!("{e:#}"), None);
    }
    tracing::info!(assessment_id = %assessment.id, max = assessment.max_score(), "assessment created");
    ok(
        &req.id,
        json!({ "assessmentId": assessment.id, "assessment": assessment_json(&assessment) }),
    )
}

fn handle_assessments_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut a = match assessment_or_not_found(conn, req, &assessment_id) {
        Ok(a) => a,
        Err(e) => return e,
    };

    if let Some(v) = optional_str(req, "name") {
        a.name = v;
    }
    if let Some(v) = optional_str(req, "domain") {
        match parse_domain(req, &v) {
            Ok(d) => a.domain = d,
            Err(e) => return e,
        }
    }
    if let Some(v) = optional_str(req, "category") {
        match parse_category(req, &v) {
            Ok(c) => a.category = c,
            Err(e) => return e,
        }
    }
    if let Some(v) = optional_str(req, "gradeLevel") {
        a.grade_level = normalize_grade_level(&v);
    }
    if let Some(v) = optional_str(req, "className") {
        a.class_name = v;
    }
    if req.params.get("term").is_some() {
        match optional_i64(req, "term") {
            Ok(t) => a.term = t,
            Err(e) => return e,
        }
    }
    if req.params.get("date").is_some() {
        match parse_date(req) {
            Ok(d) => a.date = d,
            Err(e) => return e,
        }
    }
    if req.params.get("notes").is_some() {
        a.notes = optional_str(req, "notes");
    }
    if let Some(v) = req.params.get("maxScore").filter(|v| !v.is_null()) {
        if matches!(a.scoring, Scoring::Sectioned { .. }) {
            return err(
                &req.id,
                "bad_params",
                "maxScore is derived from sections; edit the sections instead",
                None,
            );
        }
        a.scoring = Scoring::Simple {
            max_score: v.as_f64().unwrap_or(f64::NAN),
        };
        if let Err(e) = a.scoring.validate() {
            return engine_err(&req.id, &e);
        }
    }

    if let Err(e) = store::save_assessment(conn, &a) {
        return db_update_err(req, e);
    }
    ok(&req.id, json!({ "assessment": assessment_json(&a) }))
}

/// Replaces the section list and recomputes the maximum. Stored grades keep
/// their scores; percentages are derived when read.
fn handle_assessments_set_sections(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut a = match assessment_or_not_found(conn, req, &assessment_id) {
        Ok(a) => a,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("sections") else {
        return err(&req.id, "bad_params", "missing sections[]", None);
    };
    let sections = match parse_sections(req, raw) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let previous_max = a.max_score();
    let fallback_max = req
        .params
        .get("maxScore")
        .and_then(|v| v.as_f64())
        .unwrap_or(previous_max);
    let scoring = Scoring::from_parts(fallback_max, sections);
    if let Err(e) = scoring.validate() {
        return engine_err(&req.id, &e);
    }
    a.scoring = scoring;

    if let Err(e) = store::save_assessment(conn, &a) {
        return db_update_err(req, e);
    }
    if (a.max_score() - previous_max).abs() > f64::EPSILON {
        tracing::info!(
            assessment_id = %a.id,
            previous_max,
            max = a.max_score(),
            "assessment max changed by section edit"
        );
    }
    ok(
        &req.id,
        json!({
            "assessment": assessment_json(&a),
            "maxScore": a.max_score(),
            "previousMaxScore": previous_max
        }),
    )
}

fn handle_assessments_set_standards(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut a = match assessment_or_not_found(conn, req, &assessment_id) {
        Ok(a) => a,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("standards") else {
        return err(&req.id, "bad_params", "missing standards[]", None);
    };
    a.standards = match parse_standards(req, raw) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = store::save_assessment(conn, &a) {
        return db_update_err(req, e);
    }
    ok(&req.id, json!({ "standards": a.standards }))
}

fn handle_assessments_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match assessment_or_not_found(conn, req, &assessment_id) {
        Ok(a) => ok(&req.id, json!({ "assessment": assessment_json(&a) })),
        Err(e) => e,
    }
}

fn handle_assessments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let domain = match optional_str(req, "domain") {
        Some(d) => match parse_domain(req, &d) {
            Ok(v) => Some(v),
            Err(e) => return e,
        },
        None => None,
    };
    let term = match optional_i64(req, "term") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filter = AssessmentFilter {
        grade_level: optional_str(req, "gradeLevel").map(|g| normalize_grade_level(&g)),
        class_name: optional_str(req, "className"),
        domain,
        term,
    };
    match store::list_assessments(conn, &filter) {
        Ok(list) => {
            let rows: Vec<serde_json::Value> = list.iter().map(assessment_json).collect();
            ok(&req.id, json!({ "assessments": rows }))
        }
        Err(e) => db_query_err(req, e),
    }
}

fn handle_assessments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = assessment_or_not_found(conn, req, &assessment_id) {
        return e;
    }
    match store::delete_assessment(conn, &assessment_id) {
        Ok(grades_deleted) => {
            tracing::info!(%assessment_id, grades_deleted, "assessment deleted");
            ok(&req.id, json!({ "ok": true, "gradesDeleted": grades_deleted }))
        }
        Err(e) => err(&req.id, "db_delete_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assessments.create" => Some(handle_assessments_create(state, req)),
        "assessments.update" => Some(handle_assessments_update(state, req)),
        "assessments.setSections" => Some(handle_assessments_set_sections(state, req)),
        "assessments.setStandards" => Some(handle_assessments_set_standards(state, req)),
        "assessments.get" => Some(handle_assessments_get(state, req)),
        "assessments.list" => Some(handle_assessments_list(state, req)),
        "assessments.delete" => Some(handle_assessments_delete(state, req)),
        _ => None,
    }
}
