use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{assessment_or_not_found, db_conn, db_query_err, db_update_err, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{Grade, Scoring};
use crate::rubric::{self, RubricSession, RubricTemplate, LEVEL_LABELS};
use crate::store;
use serde_json::json;

fn parse_template(req: &Request) -> Result<RubricTemplate, serde_json::Value> {
    let Some(raw) = req.params.get("template") else {
        return Err(err(&req.id, "bad_params", "missing template", None));
    };
    let template: RubricTemplate = serde_json::from_value(raw.clone()).map_err(|e| {
        err(
            &req.id,
            "bad_params",
            format!("template is malformed: {e}"),
            None,
        )
    })?;
    if template.criteria.is_empty() {
        return Err(err(
            &req.id,
            "bad_params",
            "template needs at least one criterion",
            None,
        ));
    }
    Ok(template)
}

/// Raw `(studentId, levels)` pairs; level validation happens per session.
fn parse_raw_sessions(
    req: &Request,
) -> Result<Vec<(String, Vec<Option<i64>>)>, serde_json::Value> {
    let Some(arr) = req.params.get("sessions").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "missing sessions[]", None));
    };
    let mut out = Vec::with_capacity(arr.len());
    for (i, s) in arr.iter().enumerate() {
        let student_id = s
            .get("studentId")
            .and_then(|v| v.as_str())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let levels = s.get("levels").and_then(|v| v.as_array());
        let (Some(student_id), Some(levels)) = (student_id, levels) else {
            return Err(err(
                &req.id,
                "bad_params",
                format!("session at index {} needs studentId and levels[]", i),
                None,
            ));
        };
        let mut parsed = Vec::with_capacity(levels.len());
        for l in levels {
            if l.is_null() {
                parsed.push(None);
                continue;
            }
            let Some(n) = l.as_i64() else {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("session {} levels must be integers or null", student_id),
                    None,
                ));
            };
            parsed.push(Some(n));
        }
        out.push((student_id, parsed));
    }
    Ok(out)
}

fn handle_rubric_preview(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let template = match parse_template(req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let raw_sessions = match parse_raw_sessions(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut results = Vec::with_capacity(raw_sessions.len());
    for (student_id, levels) in &raw_sessions {
        match RubricSession::from_raw(&template, student_id, levels) {
            Ok(session) => results.push(rubric::score_session(&template, &session)),
            Err(e) => return engine_err(&req.id, &e),
        }
    }
    let complete = results.iter().filter(|r| r.complete).count();
    ok(
        &req.id,
        json!({
            "maxScore": template.max_score(),
            "levelLabels": LEVEL_LABELS,
            "results": results,
            "completeCount": complete,
            "incompleteCount": results.len() - complete,
        }),
    )
}

/// Writes complete sessions as grades and adopts the rubric's maximum.
/// Incomplete sessions are skipped, invalid ones are reported as failures.
fn handle_rubric_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let template = match parse_template(req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let raw_sessions = match parse_raw_sessions(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let a = match assessment_or_not_found(conn, req, &assessment_id) {
        Ok(a) => a,
        Err(e) => return e,
    };
    if let Scoring::Sectioned { .. } = a.scoring {
        return err(
            &req.id,
            "bad_params",
            "rubric scoring needs an assessment without sections",
            Some(json!({ "assessmentId": assessment_id })),
        );
    }

    let mut errors: Vec<serde_json::Value> = Vec::new();
    let mut sessions: Vec<RubricSession> = Vec::with_capacity(raw_sessions.len());
    for (student_id, levels) in &raw_sessions {
        match RubricSession::from_raw(&template, student_id, levels) {
            Ok(s) => sessions.push(s),
            Err(e) => errors.push(json!({
                "studentId": student_id,
                "code": e.code(),
                "message": e.to_string(),
            })),
        }
    }

    let plan = rubric::plan_apply(&template, a.max_score(), &sessions);
    if plan.max_changed {
        if let Err(e) = store::set_assessment_max(conn, &a.id, plan.max_score) {
            return db_update_err(req, e);
        }
        tracing::info!(
            assessment_id = %a.id,
            previous_max = a.max_score(),
            max = plan.max_score,
            "assessment adopted rubric maximum"
        );
    }

    let mut applied: usize = 0;
    for write in &plan.writes {
        let existing = match store::load_grade(conn, &a.id, &write.student_id) {
            Ok(g) => g,
            Err(e) => {
                errors.push(json!({
                    "studentId": write.student_id,
                    "code": "db_query_failed",
                    "message": format!("{e:#}"),
                }));
                continue;
            }
        };
        let mut grade = existing.unwrap_or_else(|| Grade::new(&a.id, &write.student_id));
        grade.set_rubric_score(write.total, write.levels.clone());
        match store::upsert_grade(conn, &grade) {
            Ok(()) => applied += 1,
            Err(e) => errors.push(json!({
                "studentId": write.student_id,
                "code": "db_update_failed",
                "message": format!("{e:#}"),
            })),
        }
    }

    let failed = errors.len();
    if failed > 0 {
        tracing::warn!(assessment_id = %a.id, applied, failed, "rubric apply finished with failures");
    }
    ok(
        &req.id,
        json!({
            "applied": applied,
            "skipped": plan.skipped,
            "failed": failed,
            "errors": errors,
            "maxScore": plan.max_score,
            "maxChanged": plan.max_changed,
        }),
    )
}

fn handle_rubric_open(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let grades = match store::list_grades(conn, std::slice::from_ref(&a.id), None) {
        Ok(v) => v,
        Err(e) => return db_query_err(req, e),
    };
    let sessions: Vec<serde_json::Value> = grades
        .into_iter()
        .filter_map(|g| {
            let levels = g.rubric_levels?;
            let labels: Vec<Option<&str>> = levels
                .iter()
                .map(|l| l.and_then(rubric::level_label))
                .collect();
            Some(json!({
                "studentId": g.student_id,
                "levels": levels,
                "labels": labels,
                "total": g.score,
            }))
        })
        .collect();
    ok(
        &req.id,
        json!({
            "assessmentId": a.id,
            "maxScore": a.max_score(),
            "sessions": sessions,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rubric.preview" => Some(handle_rubric_preview(state, req)),
        "rubric.apply" => Some(handle_rubric_apply(state, req)),
        "rubric.open" => Some(handle_rubric_open(state, req)),
        _ => None,
    }
}
