use crate::error::EngineError;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    assessment_or_not_found, db_conn, db_query_err, optional_string_list, required_str,
    string_list,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Assessment, Grade, Scoring};
use crate::score::{parse_score, ParsedScore};
use crate::sections::{self, SectionScores};
use crate::store;
use rusqlite::Connection;
use serde_json::json;

const GRADES_BULK_SAVE_MAX_ENTRIES: usize = 5000;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    fn row(self, student_id: &str) -> serde_json::Value {
        let mut v = json!({
            "studentId": student_id,
            "code": self.code,
            "message": self.message,
        });
        if let Some(d) = self.details {
            v["details"] = d;
        }
        v
    }
}

impl From<EngineError> for HandlerErr {
    fn from(e: EngineError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

/// One student's edit, as it arrives from a single-cell or batch save.
enum EntryInput {
    Raw(String),
    Sections(SectionScores),
    Status { absent: bool, exempt: bool },
}

enum EntryOutcome {
    Saved { grade: Grade, exceeds_max: bool },
    /// Unparseable text: nothing written, the stored grade stays as it was.
    Unchanged,
}

fn parse_section_scores(raw: &serde_json::Value) -> Result<SectionScores, HandlerErr> {
    let Some(obj) = raw.as_object() else {
        return Err(HandlerErr::bad_params(
            "sectionScores must be an object of index -> number|null",
        ));
    };
    let mut out = SectionScores::new();
    for (k, v) in obj {
        let Ok(index) = k.trim().parse::<usize>() else {
            return Err(HandlerErr::bad_params(format!(
                "sectionScores key {k:?} is not a section index"
            )));
        };
        let value = if v.is_null() {
            None
        } else {
            match v.as_f64() {
                Some(n) => Some(n),
                None => {
                    return Err(HandlerErr::bad_params(format!(
                        "sectionScores[{index}] must be a number or null"
                    )))
                }
            }
        };
        out.insert(index, value);
    }
    Ok(out)
}

/// Raw cell text as typed. Null clears; a bare number is taken as its text.
fn raw_text(raw: &serde_json::Value) -> Result<String, HandlerErr> {
    match raw {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        _ => Err(HandlerErr::bad_params("raw must be a string, number or null")),
    }
}

fn parse_entry(obj: &serde_json::Map<String, serde_json::Value>) -> Result<EntryInput, HandlerErr> {
    let absent = obj.get("absent").and_then(|v| v.as_bool()).unwrap_or(false);
    let exempt = obj.get("exempt").and_then(|v| v.as_bool()).unwrap_or(false);
    if absent || exempt {
        return Ok(EntryInput::Status { absent, exempt });
    }
    if let Some(raw) = obj.get("sectionScores").filter(|v| !v.is_null()) {
        return parse_section_scores(raw).map(EntryInput::Sections);
    }
    if let Some(raw) = obj.get("raw") {
        return raw_text(raw).map(EntryInput::Raw);
    }
    if obj.contains_key("absent") || obj.contains_key("exempt") {
        return Ok(EntryInput::Status { absent, exempt });
    }
    Err(HandlerErr::bad_params(
        "entry needs raw, sectionScores, or absent/exempt",
    ))
}

/// Runs the entry through the parser or the section composer and produces
/// the grade to persist. Nothing here touches storage.
fn apply_entry(
    a: &Assessment,
    existing: Option<Grade>,
    student_id: &str,
    input: EntryInput,
) -> Result<EntryOutcome, HandlerErr> {
    let mut grade = existing.unwrap_or_else(|| Grade::new(&a.id, student_id));
    match input {
        EntryInput::Status { absent, exempt } => {
            grade.set_status(absent, exempt)?;
            if let Scoring::Simple { .. } = a.scoring {
                grade.section_scores = None;
            }
            Ok(EntryOutcome::Saved {
                grade,
                exceeds_max: false,
            })
        }
        EntryInput::Raw(raw) => {
            if let Scoring::Sectioned { .. } = a.scoring {
                return Err(HandlerErr::bad_params(
                    "assessment has sections; enter section sub-scores instead",
                ));
            }
            match parse_score(&raw, a.max_score()) {
                ParsedScore::Invalid => Ok(EntryOutcome::Unchanged),
                ParsedScore::Clear => {
                    grade.set_direct_score(None);
                    Ok(EntryOutcome::Saved {
                        grade,
                        exceeds_max: false,
                    })
                }
                ParsedScore::Score { value, exceeds_max } => {
                    grade.set_direct_score(Some(value));
                    Ok(EntryOutcome::Saved { grade, exceeds_max })
                }
            }
        }
        EntryInput::Sections(scores) => {
            let Scoring::Sectioned { sections } = &a.scoring else {
                return Err(HandlerErr::bad_params(
                    "assessment has no sections; enter a score instead",
                ));
            };
            let total = sections::compose_total(sections, &scores)?;
            if total.entered {
                grade.is_absent = false;
                grade.is_exempt = false;
            }
            grade.score = if grade.is_absent || grade.is_exempt {
                None
            } else {
                total.stored_score()
            };
            grade.section_scores = Some(scores);
            grade.rubric_levels = None;
            Ok(EntryOutcome::Saved {
                grade,
                exceeds_max: total.total > total.max_score || !total.over_max_sections.is_empty(),
            })
        }
    }
}

fn save_entry(
    conn: &Connection,
    a: &Assessment,
    student_id: &str,
    input: EntryInput,
) -> Result<(EntryOutcome, Option<Grade>), HandlerErr> {
    let existing = store::load_grade(conn, &a.id, student_id).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: format!("{e:#}"),
        details: None,
    })?;
    let before = existing.clone();
    let outcome = apply_entry(a, existing, student_id, input)?;
    if let EntryOutcome::Saved { grade, .. } = &outcome {
        store::upsert_grade(conn, grade).map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: format!("{e:#}"),
            details: Some(json!({ "table": "grades" })),
        })?;
    }
    Ok((outcome, before))
}

fn outcome_json(outcome: EntryOutcome, before: Option<Grade>) -> serde_json::Value {
    match outcome {
        EntryOutcome::Saved { grade, exceeds_max } => json!({
            "saved": true,
            "exceedsMax": exceeds_max,
            "grade": grade,
        }),
        EntryOutcome::Unchanged => json!({
            "saved": false,
            "parsed": ParsedScore::Invalid,
            "grade": before,
        }),
    }
}

fn single_entry(state: &mut AppState, req: &Request, input: EntryInput) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let a = match assessment_or_not_found(conn, req, &assessment_id) {
        Ok(a) => a,
        Err(e) => return e,
    };
    match save_entry(conn, &a, &student_id, input) {
        Ok((outcome, before)) => ok(&req.id, outcome_json(outcome, before)),
        Err(e) => {
            tracing::debug!(%assessment_id, %student_id, code = e.code, "grade entry rejected");
            e.response(&req.id)
        }
    }
}

fn handle_grades_enter(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("raw") else {
        return err(&req.id, "bad_params", "missing raw", None);
    };
    match raw_text(raw) {
        Ok(raw) => single_entry(state, req, EntryInput::Raw(raw)),
        Err(e) => e.response(&req.id),
    }
}

fn handle_grades_set_sections(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("sectionScores") else {
        return err(&req.id, "bad_params", "missing sectionScores", None);
    };
    match parse_section_scores(raw) {
        Ok(scores) => single_entry(state, req, EntryInput::Sections(scores)),
        Err(e) => e.response(&req.id),
    }
}

fn handle_grades_set_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let absent = req.params.get("absent").and_then(|v| v.as_bool()).unwrap_or(false);
    let exempt = req.params.get("exempt").and_then(|v| v.as_bool()).unwrap_or(false);
    single_entry(state, req, EntryInput::Status { absent, exempt })
}

/// Each entry is an independent upsert; one failure never stops the rest.
fn handle_grades_bulk_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(entries) = req.params.get("entries").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing entries[]", None);
    };
    if entries.len() > GRADES_BULK_SAVE_MAX_ENTRIES {
        return err(
            &req.id,
            "bad_params",
            format!(
                "bulk payload exceeds max entries: {} > {}",
                entries.len(),
                GRADES_BULK_SAVE_MAX_ENTRIES
            ),
            Some(json!({ "maxEntries": GRADES_BULK_SAVE_MAX_ENTRIES })),
        );
    }
    let a = match assessment_or_not_found(conn, req, &assessment_id) {
        Ok(a) => a,
        Err(e) => return e,
    };

    let mut succeeded: usize = 0;
    let mut unchanged: Vec<String> = Vec::new();
    let mut errors: Vec<serde_json::Value> = Vec::new();

    for (i, entry) in entries.iter().enumerate() {
        let Some(obj) = entry.as_object() else {
            errors.push(
                HandlerErr::bad_params(format!("entry at index {} must be an object", i)).row(""),
            );
            continue;
        };
        let student_id = match obj.get("studentId").and_then(|v| v.as_str()) {
            Some(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => {
                errors.push(
                    HandlerErr::bad_params(format!("entry at index {} missing studentId", i))
                        .row(""),
                );
                continue;
            }
        };
        let input = match parse_entry(obj) {
            Ok(v) => v,
            Err(e) => {
                errors.push(e.row(&student_id));
                continue;
            }
        };
        match save_entry(conn, &a, &student_id, input) {
            Ok((EntryOutcome::Saved { .. }, _)) => succeeded += 1,
            Ok((EntryOutcome::Unchanged, _)) => unchanged.push(student_id),
            Err(e) => errors.push(e.row(&student_id)),
        }
    }

    let failed = errors.len();
    if failed > 0 {
        tracing::warn!(%assessment_id, succeeded, failed, "bulk save finished with failures");
    } else {
        tracing::debug!(%assessment_id, succeeded, "bulk save finished");
    }
    ok(
        &req.id,
        json!({
            "succeeded": succeeded,
            "failed": failed,
            "unchanged": unchanged,
            "errors": errors,
        }),
    )
}

fn handle_grades_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_ids = match string_list(req, req.params.get("assessmentIds"), "assessmentIds")
    {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_ids = match optional_string_list(req, "studentIds") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match store::list_grades(conn, &assessment_ids, student_ids.as_deref()) {
        Ok(grades) => ok(&req.id, json!({ "grades": grades })),
        Err(e) => db_query_err(req, e),
    }
}

fn handle_grades_progress(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let roster = match string_list(req, req.params.get("studentIds"), "studentIds") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = assessment_or_not_found(conn, req, &assessment_id) {
        return e;
    }
    let grades = match store::list_grades(conn, &[assessment_id], Some(roster.as_slice())) {
        Ok(v) => v,
        Err(e) => return db_query_err(req, e),
    };
    let progress = sections::entry_progress(
        roster.len(),
        grades
            .iter()
            .map(|g| (g.score, g.section_scores.as_ref())),
    );
    ok(&req.id, json!(progress))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.list" => Some(handle_grades_list(state, req)),
        "grades.enter" => Some(handle_grades_enter(state, req)),
        "grades.setSections" => Some(handle_grades_set_sections(state, req)),
        "grades.setStatus" => Some(handle_grades_set_status(state, req)),
        "grades.bulkSave" => Some(handle_grades_bulk_save(state, req)),
        "grades.progress" => Some(handle_grades_progress(state, req)),
        _ => None,
    }
}
