use crate::model::{Assessment, Category, Domain, Grade, Scoring, Section, StandardTag};
use anyhow::{anyhow, Context};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct AssessmentFilter {
    pub grade_level: Option<String>,
    pub class_name: Option<String>,
    pub domain: Option<Domain>,
    pub term: Option<i64>,
}

struct AssessmentRow {
    id: String,
    name: String,
    domain: String,
    category: String,
    grade_level: String,
    class_name: String,
    term: Option<i64>,
    date: Option<String>,
    notes: Option<String>,
    max_score: f64,
}

const ASSESSMENT_COLUMNS: &str =
    "id, name, domain, category, grade_level, class_name, term, date, notes, max_score";

fn read_assessment_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<AssessmentRow> {
    Ok(AssessmentRow {
        id: r.get(0)?,
        name: r.get(1)?,
        domain: r.get(2)?,
        category: r.get(3)?,
        grade_level: r.get(4)?,
        class_name: r.get(5)?,
        term: r.get(6)?,
        date: r.get(7)?,
        notes: r.get(8)?,
        max_score: r.get(9)?,
    })
}

fn load_sections(conn: &Connection, assessment_id: &str) -> anyhow::Result<Vec<Section>> {
    let mut stmt = conn.prepare(
        "SELECT label, standard_code, max_points
         FROM assessment_sections
         WHERE assessment_id = ?
         ORDER BY idx",
    )?;
    let rows = stmt
        .query_map([assessment_id], |r| {
            Ok(Section {
                label: r.get(0)?,
                standard_code: r.get(1)?,
                max_points: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_standards(conn: &Connection, assessment_id: &str) -> anyhow::Result<Vec<StandardTag>> {
    let mut stmt = conn.prepare(
        "SELECT code, dok_level
         FROM assessment_standards
         WHERE assessment_id = ?
         ORDER BY code",
    )?;
    let rows = stmt
        .query_map([assessment_id], |r| {
            Ok(StandardTag {
                code: r.get(0)?,
                dok_level: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn hydrate(conn: &Connection, row: AssessmentRow) -> anyhow::Result<Assessment> {
    let domain = Domain::parse(&row.domain)
        .ok_or_else(|| anyhow!("assessment {} has unknown domain {:?}", row.id, row.domain))?;
    let category = Category::parse(&row.category).ok_or_else(|| {
        anyhow!(
            "assessment {} has unknown category {:?}",
            row.id,
            row.category
        )
    })?;
    let sections = load_sections(conn, &row.id)?;
    let standards = load_standards(conn, &row.id)?;
    Ok(Assessment {
        scoring: Scoring::from_parts(row.max_score, sections),
        standards,
        id: row.id,
        name: row.name,
        domain,
        category,
        grade_level: row.grade_level,
        class_name: row.class_name,
        term: row.term,
        date: row.date,
        notes: row.notes,
    })
}

/// Writes the assessment, its sections and its standards atomically. The
/// stored `max_score` always equals the section sum for sectioned assessments.
pub fn save_assessment(conn: &Connection, a: &Assessment) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction().context("begin transaction")?;
    tx.execute(
        "INSERT INTO assessments(id, name, domain, category, grade_level, class_name,
                                 term, date, notes, max_score, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           domain = excluded.domain,
           category = excluded.category,
           grade_level = excluded.grade_level,
           class_name = excluded.class_name,
           term = excluded.term,
           date = excluded.date,
           notes = excluded.notes,
           max_score = excluded.max_score,
           updated_at = excluded.updated_at",
        (
            &a.id,
            &a.name,
            a.domain.as_str(),
            a.category.as_str(),
            &a.grade_level,
            &a.class_name,
            a.term,
            &a.date,
            &a.notes,
            a.max_score(),
        ),
    )?;

    tx.execute(
        "DELETE FROM assessment_sections WHERE assessment_id = ?",
        [&a.id],
    )?;
    for (i, s) in a.scoring.sections().iter().enumerate() {
        tx.execute(
            "INSERT INTO assessment_sections(assessment_id, idx, label, standard_code, max_points)
             VALUES(?, ?, ?, ?, ?)",
            (&a.id, i as i64, &s.label, &s.standard_code, s.max_points),
        )?;
    }

    tx.execute(
        "DELETE FROM assessment_standards WHERE assessment_id = ?",
        [&a.id],
    )?;
    for s in &a.standards {
        tx.execute(
            "INSERT INTO assessment_standards(assessment_id, code, dok_level)
             VALUES(?, ?, ?)
             ON CONFLICT(assessment_id, code) DO UPDATE SET dok_level = excluded.dok_level",
            (&a.id, &s.code, s.dok_level),
        )?;
    }

    tx.commit().context("commit assessment")?;
    Ok(())
}

pub fn load_assessment(conn: &Connection, id: &str) -> anyhow::Result<Option<Assessment>> {
    let sql = format!("SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE id = ?");
    let row = conn
        .query_row(&sql, [id], read_assessment_row)
        .optional()?;
    row.map(|r| hydrate(conn, r)).transpose()
}

pub fn list_assessments(
    conn: &Connection,
    filter: &AssessmentFilter,
) -> anyhow::Result<Vec<Assessment>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();
    if let Some(g) = &filter.grade_level {
        clauses.push("grade_level = ?");
        binds.push(Value::Text(g.clone()));
    }
    if let Some(c) = &filter.class_name {
        clauses.push("class_name = ?");
        binds.push(Value::Text(c.clone()));
    }
    if let Some(d) = filter.domain {
        clauses.push("domain = ?");
        binds.push(Value::Text(d.as_str().to_string()));
    }
    if let Some(t) = filter.term {
        clauses.push("term = ?");
        binds.push(Value::Integer(t));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {ASSESSMENT_COLUMNS} FROM assessments {where_sql}
         ORDER BY COALESCE(date, ''), name, id"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), read_assessment_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(|r| hydrate(conn, r)).collect()
}

/// Same name, domain, grade and term, taught in a different class.
pub fn find_replicas(conn: &Connection, a: &Assessment) -> anyhow::Result<Vec<Assessment>> {
    let sql = format!(
        "SELECT {ASSESSMENT_COLUMNS} FROM assessments
         WHERE name = ? AND domain = ? AND grade_level = ? AND term IS ? AND class_name != ?
         ORDER BY class_name, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            (
                &a.name,
                a.domain.as_str(),
                &a.grade_level,
                a.term,
                &a.class_name,
            ),
            read_assessment_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(|r| hydrate(conn, r)).collect()
}

/// Removes grades first, then the assessment's own rows, in one transaction.
/// Returns how many grades were deleted.
pub fn delete_assessment(conn: &Connection, id: &str) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction().context("begin transaction")?;
    let grades = tx.execute("DELETE FROM grades WHERE assessment_id = ?", [id])?;
    tx.execute(
        "DELETE FROM assessment_sections WHERE assessment_id = ?",
        [id],
    )?;
    tx.execute(
        "DELETE FROM assessment_standards WHERE assessment_id = ?",
        [id],
    )?;
    tx.execute("DELETE FROM assessments WHERE id = ?", [id])?;
    tx.commit().context("commit delete")?;
    Ok(grades)
}

fn encode_json<T: serde::Serialize>(v: &Option<T>) -> anyhow::Result<Option<String>> {
    v.as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(Into::into)
}

/// Last write wins on `(assessment_id, student_id)`.
pub fn upsert_grade(conn: &Connection, g: &Grade) -> anyhow::Result<()> {
    let grade_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO grades(id, assessment_id, student_id, score, section_scores, rubric_levels,
                            is_absent, is_exempt, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))
         ON CONFLICT(assessment_id, student_id) DO UPDATE SET
           score = excluded.score,
           section_scores = excluded.section_scores,
           rubric_levels = excluded.rubric_levels,
           is_absent = excluded.is_absent,
           is_exempt = excluded.is_exempt,
           updated_at = excluded.updated_at",
        (
            &grade_id,
            &g.assessment_id,
            &g.student_id,
            g.score,
            encode_json(&g.section_scores)?,
            encode_json(&g.rubric_levels)?,
            g.is_absent as i64,
            g.is_exempt as i64,
        ),
    )
    .with_context(|| format!("upsert grade for student {}", g.student_id))?;
    Ok(())
}

type GradeRow = (
    String,
    String,
    Option<f64>,
    Option<String>,
    Option<String>,
    i64,
    i64,
);

fn grade_from_row(row: GradeRow) -> anyhow::Result<Grade> {
    let (assessment_id, student_id, score, section_scores, rubric_levels, absent, exempt) = row;
    let section_scores = section_scores
        .map(|s| serde_json::from_str::<BTreeMap<usize, Option<f64>>>(&s))
        .transpose()
        .context("grades.section_scores is not valid JSON")?;
    let rubric_levels = rubric_levels
        .map(|s| serde_json::from_str::<Vec<Option<u8>>>(&s))
        .transpose()
        .context("grades.rubric_levels is not valid JSON")?;
    Ok(Grade {
        assessment_id,
        student_id,
        score,
        section_scores,
        rubric_levels,
        is_absent: absent != 0,
        is_exempt: exempt != 0,
    })
}

fn read_grade_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<GradeRow> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
        r.get(6)?,
    ))
}

const GRADE_COLUMNS: &str =
    "assessment_id, student_id, score, section_scores, rubric_levels, is_absent, is_exempt";

pub fn load_grade(
    conn: &Connection,
    assessment_id: &str,
    student_id: &str,
) -> anyhow::Result<Option<Grade>> {
    let sql = format!(
        "SELECT {GRADE_COLUMNS} FROM grades WHERE assessment_id = ? AND student_id = ?"
    );
    let row = conn
        .query_row(&sql, (assessment_id, student_id), read_grade_row)
        .optional()?;
    row.map(grade_from_row).transpose()
}

/// All grades for the given assessments, optionally restricted to a student set.
pub fn list_grades(
    conn: &Connection,
    assessment_ids: &[String],
    student_ids: Option<&[String]>,
) -> anyhow::Result<Vec<Grade>> {
    if assessment_ids.is_empty() || student_ids.map(|s| s.is_empty()).unwrap_or(false) {
        return Ok(Vec::new());
    }

    let assess_placeholders = vec!["?"; assessment_ids.len()].join(",");
    let mut sql = format!(
        "SELECT {GRADE_COLUMNS} FROM grades WHERE assessment_id IN ({})",
        assess_placeholders
    );
    let mut bind_values: Vec<Value> = assessment_ids
        .iter()
        .map(|id| Value::Text(id.clone()))
        .collect();
    if let Some(students) = student_ids {
        let stud_placeholders = vec!["?"; students.len()].join(",");
        sql.push_str(&format!(" AND student_id IN ({})", stud_placeholders));
        bind_values.extend(students.iter().map(|id| Value::Text(id.clone())));
    }
    sql.push_str(" ORDER BY assessment_id, student_id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind_values), read_grade_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(grade_from_row).collect()
}

pub fn set_assessment_max(conn: &Connection, id: &str, max_score: f64) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE assessments
         SET max_score = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (max_score, id),
    )?;
    Ok(())
}
