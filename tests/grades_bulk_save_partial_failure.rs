mod test_support;

use serde_json::json;
use test_support::{
    create_assessment, error_code, request, request_ok, select_workspace, spawn_sidecar,
};

#[test]
fn bulk_save_commits_good_rows_and_reports_bad_ones() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "scorebook-bulk-save");
    let assessment_id = create_assessment(
        &mut stdin,
        &mut reader,
        "create",
        json!({
            "name": "Sight Words",
            "domain": "phonics",
            "category": "formative",
            "gradeLevel": "K",
            "className": "KA",
            "maxScore": 10
        }),
    );

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "bulk",
        "grades.bulkSave",
        json!({
            "assessmentId": assessment_id,
            "entries": [
                { "studentId": "s1", "raw": "8" },
                { "studentId": "s2", "raw": "4/5" },
                { "studentId": "s3", "absent": true, "exempt": true },
                { "studentId": "s4", "raw": "abc" },
                { "raw": "5" },
                { "studentId": "s5", "exempt": true }
            ]
        }),
    );
    assert_eq!(result.get("succeeded").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(result.get("failed").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        result.get("unchanged").cloned(),
        Some(json!(["s4"]))
    );
    let errors = result
        .get("errors")
        .and_then(|v| v.as_array())
        .expect("errors");
    assert_eq!(
        errors[0].get("studentId").and_then(|v| v.as_str()),
        Some("s3")
    );
    assert_eq!(
        errors[0].get("code").and_then(|v| v.as_str()),
        Some("status_conflict")
    );
    assert_eq!(
        errors[1].get("code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "list",
        "grades.list",
        json!({ "assessmentIds": [assessment_id] }),
    );
    let grades = listed.get("grades").and_then(|v| v.as_array()).expect("grades");
    let ids: Vec<&str> = grades
        .iter()
        .filter_map(|g| g.get("studentId").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(ids, vec!["s1", "s2", "s5"]);
    assert_eq!(grades[1].get("score").and_then(|v| v.as_f64()), Some(8.0));
}

#[test]
fn bulk_save_rejects_oversized_batches() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "scorebook-bulk-cap");
    let assessment_id = create_assessment(
        &mut stdin,
        &mut reader,
        "create",
        json!({
            "name": "Cap",
            "domain": "writing",
            "category": "formative",
            "gradeLevel": "2",
            "className": "2A",
            "maxScore": 4
        }),
    );
    let entries: Vec<serde_json::Value> = (0..5001)
        .map(|i| json!({ "studentId": format!("s{}", i), "raw": "1" }))
        .collect();
    let resp = request(
        &mut stdin,
        &mut reader,
        "big",
        "grades.bulkSave",
        json!({ "assessmentId": assessment_id, "entries": entries }),
    );
    assert_eq!(error_code(&resp), "bad_params");
    assert_eq!(
        resp.pointer("/error/details/maxEntries").and_then(|v| v.as_u64()),
        Some(5000)
    );
}
