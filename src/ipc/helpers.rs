use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::model::Assessment;
use crate::store;
use rusqlite::Connection;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be integer", key), None)),
    }
}

pub fn string_list(
    req: &Request,
    value: Option<&serde_json::Value>,
    key: &str,
) -> Result<Vec<String>, serde_json::Value> {
    let Some(arr) = value.and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", format!("missing {}[]", key), None));
    };
    let mut out = Vec::with_capacity(arr.len());
    for v in arr {
        let Some(s) = v.as_str() else {
            return Err(err(
                &req.id,
                "bad_params",
                format!("{}[] must contain strings", key),
                None,
            ));
        };
        out.push(s.to_string());
    }
    Ok(out)
}

pub fn optional_string_list(
    req: &Request,
    key: &str,
) -> Result<Option<Vec<String>>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => string_list(req, Some(v), key).map(Some),
    }
}

pub fn db_query_err(req: &Request, e: anyhow::Error) -> serde_json::Value {
    err(&req.id, "db_query_failed", format!("{e:#}"), None)
}

pub fn db_update_err(req: &Request, e: anyhow::Error) -> serde_json::Value {
    err(&req.id, "db_update_failed", format!("{e:#}"), None)
}

pub fn assessment_or_not_found(
    conn: &Connection,
    req: &Request,
    assessment_id: &str,
) -> Result<Assessment, serde_json::Value> {
    match store::load_assessment(conn, assessment_id) {
        Ok(Some(a)) => Ok(a),
        Ok(None) => Err(err(
            &req.id,
            "not_found",
            "assessment not found",
            Some(serde_json::json!({ "assessmentId": assessment_id })),
        )),
        Err(e) => Err(db_query_err(req, e)),
    }
}
