mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{
    create_assessment, error_code, request, request_ok, select_workspace, spawn_sidecar,
};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    let no_ws = request(&mut stdin, &mut reader, "2", "assessments.list", json!({}));
    assert_eq!(error_code(&no_ws), "no_workspace");

    // Pure previews work without a workspace.
    let parsed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "scores.parse",
        json!({ "raw": "8", "maxScore": 10 }),
    );
    assert_eq!(parsed.get("kind").and_then(|v| v.as_str()), Some("score"));

    let _ = select_workspace(&mut stdin, &mut reader, "scorebook-router-smoke");

    let assessment_id = create_assessment(
        &mut stdin,
        &mut reader,
        "4",
        json!({
            "name": "Smoke Quiz",
            "domain": "reading",
            "category": "formative",
            "gradeLevel": "3",
            "className": "3A",
            "maxScore": 10
        }),
    );

    let calls = [
        ("policy.get", json!({})),
        (
            "standards.normalize",
            json!({ "codes": ["rl31", "RI.4.2"] }),
        ),
        ("assessments.get", json!({ "assessmentId": assessment_id })),
        ("assessments.list", json!({ "gradeLevel": "3" })),
        (
            "grades.enter",
            json!({ "assessmentId": assessment_id, "studentId": "s1", "raw": "7" }),
        ),
        (
            "grades.list",
            json!({ "assessmentIds": [assessment_id] }),
        ),
        (
            "grades.progress",
            json!({ "assessmentId": assessment_id, "studentIds": ["s1", "s2"] }),
        ),
        (
            "rubric.preview",
            json!({
                "template": { "criteria": [{ "label": "Ideas" }] },
                "sessions": [{ "studentId": "s1", "levels": [3] }]
            }),
        ),
        ("rubric.open", json!({ "assessmentId": assessment_id })),
        (
            "reports.studentAverages",
            json!({ "gradeLevel": "3", "className": "3A" }),
        ),
        ("reports.assessmentStats", json!({ "assessmentId": assessment_id })),
        ("reports.compareClasses", json!({ "assessmentId": assessment_id })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let id = format!("call-{}", i);
        let _ = request_ok(&mut stdin, &mut reader, &id, method, params);
    }

    let unknown = request(&mut stdin, &mut reader, "99", "nope.nothing", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");
}

#[test]
fn malformed_line_gets_bad_json_and_loop_continues() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_json")
    );

    let _ = request_ok(&mut stdin, &mut reader, "after", "health", json!({}));
}
