use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::score::parse_score;
use crate::standards::normalize_standard;
use serde_json::json;

// Pure previews: no workspace needed, never an error for malformed text.

fn handle_scores_parse(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("raw").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing raw", None);
    };
    let max_score = match req.params.get("maxScore").and_then(|v| v.as_f64()) {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => return err(&req.id, "bad_params", "maxScore must be a positive number", None),
    };
    let parsed = parse_score(raw, max_score);
    ok(
        &req.id,
        json!({
            "kind": parsed.kind(),
            "score": parsed.value(),
            "exceedsMax": parsed.exceeds_max(),
        }),
    )
}

fn handle_standards_normalize(_state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(code) = req.params.get("code").and_then(|v| v.as_str()) {
        return ok(&req.id, json!({ "code": normalize_standard(code) }));
    }
    let Some(codes) = req.params.get("codes").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing code or codes[]", None);
    };
    let normalized: Vec<serde_json::Value> = codes
        .iter()
        .map(|v| match v.as_str() {
            Some(s) => json!(normalize_standard(s)),
            None => v.clone(),
        })
        .collect();
    ok(&req.id, json!({ "codes": normalized }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.parse" => Some(handle_scores_parse(state, req)),
        "standards.normalize" => Some(handle_standards_normalize(state, req)),
        _ => None,
    }
}
