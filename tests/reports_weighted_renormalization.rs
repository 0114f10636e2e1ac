mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{
    approx, create_assessment, error_code, request, request_ok, select_workspace, spawn_sidecar,
};

fn simple(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
    domain: &str,
    category: &str,
    max: f64,
) -> String {
    create_assessment(
        stdin,
        reader,
        id,
        json!({
            "name": name,
            "domain": domain,
            "category": category,
            "gradeLevel": "K",
            "className": "KA",
            "term": 1,
            "maxScore": max
        }),
    )
}

fn enter(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    assessment_id: &str,
    student_id: &str,
    raw: &str,
) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "grades.enter",
        json!({ "assessmentId": assessment_id, "studentId": student_id, "raw": raw }),
    );
}

#[test]
fn missing_categories_redistribute_their_weight() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "scorebook-report-renorm");

    let quiz = simple(&mut stdin, &mut reader, "a1", "Quiz", "reading", "formative", 10.0);
    let test = simple(&mut stdin, &mut reader, "a2", "Test", "reading", "summative", 100.0);
    let missed = simple(&mut stdin, &mut reader, "a3", "Check", "reading", "formative", 10.0);
    let story = simple(
        &mut stdin,
        &mut reader,
        "a4",
        "Story",
        "writing",
        "performance_task",
        10.0,
    );

    enter(&mut stdin, &mut reader, "g1", &quiz, "s1", "8");
    enter(&mut stdin, &mut reader, "g2", &test, "s1", "40");
    enter(&mut stdin, &mut reader, "g3", &story, "s1", "9");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "g4",
        "grades.setStatus",
        json!({ "assessmentId": missed, "studentId": "s1", "absent": true }),
    );

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "report",
        "reports.studentAverages",
        json!({ "gradeLevel": "K", "className": "KA", "studentIds": ["s1", "s2"] }),
    );
    assert_eq!(report.get("band").and_then(|v| v.as_str()), Some("primary"));

    let students = report.get("students").and_then(|v| v.as_array()).expect("students");
    assert_eq!(students.len(), 2);
    let s1 = &students[0];
    assert_eq!(s1.get("studentId").and_then(|v| v.as_str()), Some("s1"));

    let reading = s1.pointer("/domains/0").expect("reading");
    assert_eq!(reading.get("domain").and_then(|v| v.as_str()), Some("reading"));
    // 80% * 5/8 + 40% * 3/8; the absent check is ignored.
    assert_eq!(reading.get("percent").and_then(|v| v.as_f64()), Some(65.0));
    let formative_weight = reading
        .pointer("/categories/0/effectiveWeight")
        .and_then(|v| v.as_f64())
        .expect("weight");
    assert!(approx(formative_weight, 0.625));
    assert_eq!(
        reading.pointer("/categories/0/itemCount").and_then(|v| v.as_u64()),
        Some(1)
    );

    let writing = s1.pointer("/domains/1").expect("writing");
    assert_eq!(writing.get("percent").and_then(|v| v.as_f64()), Some(90.0));
    // Each domain counts once in the overall.
    assert_eq!(s1.get("overall").and_then(|v| v.as_f64()), Some(77.5));
    // All three categories present: 80*0.5 + 40*0.3 + 90*0.2.
    let combined = s1.get("combined").and_then(|v| v.as_f64()).expect("combined");
    assert!(approx(combined, 70.0));

    let s2 = &students[1];
    assert_eq!(s2.get("studentId").and_then(|v| v.as_str()), Some("s2"));
    assert!(s2.get("overall").map(|v| v.is_null()).unwrap_or(false));
    assert!(s2.get("combined").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(
        s2.get("domains").and_then(|v| v.as_array()).map(|d| d.len()),
        Some(0)
    );
}

#[test]
fn grade_level_matches_regardless_of_case() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "scorebook-report-case");
    let quiz = create_assessment(
        &mut stdin,
        &mut reader,
        "create",
        json!({
            "name": "Letter Sounds",
            "domain": "phonics",
            "category": "formative",
            "gradeLevel": " k ",
            "className": "KA",
            "maxScore": 10
        }),
    );
    enter(&mut stdin, &mut reader, "g1", &quiz, "s1", "8");

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "list",
        "assessments.list",
        json!({ "gradeLevel": "K" }),
    );
    assert_eq!(
        listed.pointer("/assessments/0/gradeLevel").and_then(|v| v.as_str()),
        Some("K")
    );

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "report",
        "reports.studentAverages",
        json!({ "gradeLevel": "k", "className": "KA" }),
    );
    assert_eq!(report.get("gradeLevel").and_then(|v| v.as_str()), Some("K"));
    assert_eq!(report.get("band").and_then(|v| v.as_str()), Some("primary"));
    assert_eq!(report.get("assessmentCount").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(
        report.pointer("/students/0/overall").and_then(|v| v.as_f64()),
        Some(80.0)
    );
}

#[test]
fn unknown_grade_band_is_an_error() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "scorebook-report-band");
    let resp = request(
        &mut stdin,
        &mut reader,
        "report",
        "reports.studentAverages",
        json!({ "gradeLevel": "9", "className": "9A" }),
    );
    assert_eq!(error_code(&resp), "unknown_grade_band");
}

#[test]
fn assessment_stats_match_the_ten_score_scenario() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "scorebook-report-stats");
    let quiz = simple(&mut stdin, &mut reader, "a1", "Quiz", "reading", "formative", 10.0);

    let scores = ["2", "3", "4", "5", "6", "7", "8", "9", "9", "10"];
    let entries: Vec<serde_json::Value> = scores
        .iter()
        .enumerate()
        .map(|(i, raw)| json!({ "studentId": format!("s{:02}", i), "raw": raw }))
        .chain(std::iter::once(
            json!({ "studentId": "s99", "exempt": true }),
        ))
        .collect();
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "bulk",
        "grades.bulkSave",
        json!({ "assessmentId": quiz, "entries": entries }),
    );
    assert_eq!(saved.get("succeeded").and_then(|v| v.as_u64()), Some(11));

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "stats",
        "reports.assessmentStats",
        json!({ "assessmentId": quiz }),
    );
    assert_eq!(stats.get("count").and_then(|v| v.as_u64()), Some(10));
    assert_eq!(stats.pointer("/stats/mean").and_then(|v| v.as_f64()), Some(6.3));
    assert_eq!(stats.pointer("/stats/median").and_then(|v| v.as_f64()), Some(6.5));
    assert_eq!(
        stats.pointer("/stats/bands/needsReteach").and_then(|v| v.as_u64()),
        Some(4)
    );
    assert_eq!(
        stats.pointer("/stats/bands/approaching").and_then(|v| v.as_u64()),
        Some(2)
    );
    assert_eq!(
        stats.pointer("/stats/bands/proficient").and_then(|v| v.as_u64()),
        Some(4)
    );
    assert_eq!(
        stats
            .pointer("/stats/histogram")
            .and_then(|v| v.as_array())
            .map(|h| h.len()),
        Some(5)
    );
}

#[test]
fn assessment_without_scores_has_no_stats() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "scorebook-report-empty");
    let quiz = simple(&mut stdin, &mut reader, "a1", "Quiz", "reading", "formative", 10.0);
    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "stats",
        "reports.assessmentStats",
        json!({ "assessmentId": quiz }),
    );
    assert_eq!(stats.get("count").and_then(|v| v.as_u64()), Some(0));
    assert!(stats.get("stats").map(|v| v.is_null()).unwrap_or(false));
}
