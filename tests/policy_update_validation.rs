mod test_support;

use serde_json::json;
use test_support::{create_assessment, error_code, request, request_ok, select_workspace, spawn_sidecar};

#[test]
fn defaults_are_served_until_a_policy_is_saved() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "scorebook-policy-defaults");

    let got = request_ok(&mut stdin, &mut reader, "get", "policy.get", json!({}));
    assert_eq!(
        got.pointer("/policy/thresholds/passPercent").and_then(|v| v.as_f64()),
        Some(60.0)
    );
    assert_eq!(
        got.pointer("/policy/weightPolicy/bands/primary/weights/formative")
            .and_then(|v| v.as_f64()),
        Some(0.5)
    );
    assert_eq!(
        got.pointer("/policy/weightPolicy/bands/intermediate/grades")
            .cloned(),
        Some(json!(["3", "4", "5"]))
    );
}

#[test]
fn invalid_updates_are_rejected_and_nothing_is_stored() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "scorebook-policy-invalid");

    let unordered = request(
        &mut stdin,
        &mut reader,
        "u1",
        "policy.update",
        json!({ "thresholds": { "passPercent": 90, "approachingMaxPercent": 70, "proficientPercent": 80 } }),
    );
    assert_eq!(error_code(&unordered), "invalid_policy");

    let bad_sum = request(
        &mut stdin,
        &mut reader,
        "u2",
        "policy.update",
        json!({
            "weightPolicy": { "bands": {
                "all": {
                    "grades": ["K", "1", "2", "3", "4", "5"],
                    "weights": { "formative": 0.5, "summative": 0.5, "performance_task": 0.5 }
                }
            } }
        }),
    );
    assert_eq!(error_code(&bad_sum), "invalid_policy");

    let overlapping = request(
        &mut stdin,
        &mut reader,
        "u3",
        "policy.update",
        json!({
            "weightPolicy": { "bands": {
                "a": { "grades": ["K"], "weights": { "formative": 1, "summative": 0, "performance_task": 0 } },
                "b": { "grades": ["k"], "weights": { "formative": 1, "summative": 0, "performance_task": 0 } }
            } }
        }),
    );
    assert_eq!(error_code(&overlapping), "invalid_policy");

    let empty = request(&mut stdin, &mut reader, "u4", "policy.update", json!({}));
    assert_eq!(error_code(&empty), "bad_params");

    let got = request_ok(&mut stdin, &mut reader, "get", "policy.get", json!({}));
    assert_eq!(
        got.pointer("/policy/thresholds/passPercent").and_then(|v| v.as_f64()),
        Some(60.0)
    );
}

#[test]
fn saved_thresholds_drive_mastery_bands() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "scorebook-policy-bands");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "u",
        "policy.update",
        json!({ "thresholds": { "passPercent": 50, "approachingMaxPercent": 60, "proficientPercent": 90 } }),
    );
    assert_eq!(
        updated.pointer("/policy/thresholds/proficientPercent").and_then(|v| v.as_f64()),
        Some(90.0)
    );

    let quiz = create_assessment(
        &mut stdin,
        &mut reader,
        "create",
        json!({
            "name": "Quiz",
            "domain": "reading",
            "category": "formative",
            "gradeLevel": "5",
            "className": "5A",
            "maxScore": 10
        }),
    );
    let entries: Vec<serde_json::Value> = ["4", "5", "9"]
        .iter()
        .enumerate()
        .map(|(i, raw)| json!({ "studentId": format!("s{}", i), "raw": raw }))
        .collect();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "bulk",
        "grades.bulkSave",
        json!({ "assessmentId": quiz, "entries": entries }),
    );
    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "stats",
        "reports.assessmentStats",
        json!({ "assessmentId": quiz }),
    );
    assert_eq!(
        stats.pointer("/stats/bands/needsReteach").and_then(|v| v.as_u64()),
        Some(1)
    );
    assert_eq!(
        stats.pointer("/stats/bands/approaching").and_then(|v| v.as_u64()),
        Some(1)
    );
    assert_eq!(
        stats.pointer("/stats/bands/proficient").and_then(|v| v.as_u64()),
        Some(1)
    );
}
