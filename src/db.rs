use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "scorebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            domain TEXT NOT NULL,
            category TEXT NOT NULL,
            grade_level TEXT NOT NULL,
            class_name TEXT NOT NULL,
            term INTEGER,
            date TEXT,
            notes TEXT,
            max_score REAL NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    ensure_assessments_updated_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_grade_class
         ON assessments(grade_level, class_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessment_sections(
            assessment_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            label TEXT NOT NULL,
            standard_code TEXT,
            max_points REAL NOT NULL,
            PRIMARY KEY(assessment_id, idx),
            FOREIGN KEY(assessment_id) REFERENCES assessments(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessment_standards(
            assessment_id TEXT NOT NULL,
            code TEXT NOT NULL,
            dok_level INTEGER,
            PRIMARY KEY(assessment_id, code),
            FOREIGN KEY(assessment_id) REFERENCES assessments(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            assessment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            score REAL,
            section_scores TEXT,
            rubric_levels TEXT,
            is_absent INTEGER NOT NULL DEFAULT 0,
            is_exempt INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT,
            FOREIGN KEY(assessment_id) REFERENCES assessments(id),
            UNIQUE(assessment_id, student_id)
        )",
        [],
    )?;
    ensure_grades_rubric_levels(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_assessment ON grades(assessment_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    // Older workspaces could hold a score on absent/exempt rows.
    migrate_status_scores(&conn)?;
    migrate_grade_levels(&conn)?;

    Ok(conn)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn ensure_assessments_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "assessments", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE assessments ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn ensure_grades_rubric_levels(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "grades", "rubric_levels")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE grades ADD COLUMN rubric_levels TEXT", [])?;
    Ok(())
}

fn migrate_status_scores(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE grades SET score = NULL
         WHERE (is_absent != 0 OR is_exempt != 0) AND score IS NOT NULL",
        [],
    )?;
    Ok(())
}

fn migrate_grade_levels(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE assessments SET grade_level = UPPER(TRIM(grade_level))
         WHERE grade_level != UPPER(TRIM(grade_level))",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
