use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("btq.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Idempotent schema setup shared by the workspace DB and in-memory test DBs.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            level INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS employees(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            nip TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS btq_groups(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            level INTEGER NOT NULL,
            teacher_id TEXT UNIQUE,
            target_surah TEXT,
            target_verse_start INTEGER,
            target_verse_end INTEGER,
            FOREIGN KEY(teacher_id) REFERENCES employees(id)
        )",
        [],
    )?;
    // Workspaces created before memorization targets moved onto the group
    // may lack the target columns.
    ensure_group_target_columns(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_btq_groups_teacher ON btq_groups(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            nis TEXT NOT NULL,
            name TEXT NOT NULL,
            class_id TEXT NOT NULL,
            group_id TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(group_id) REFERENCES btq_groups(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_group ON students(group_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS progress(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL UNIQUE,
            jilid INTEGER NOT NULL,
            halaman INTEGER NOT NULL,
            target_juz INTEGER,
            target_surah TEXT,
            target_verse TEXT,
            status TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_progress_status ON progress(status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activity_logs(
            id TEXT PRIMARY KEY,
            progress_id TEXT NOT NULL,
            type TEXT NOT NULL,
            jilid INTEGER NOT NULL,
            halaman INTEGER NOT NULL,
            surah TEXT,
            verse TEXT,
            recorded_at TEXT NOT NULL,
            FOREIGN KEY(progress_id) REFERENCES progress(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activity_logs_progress ON activity_logs(progress_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activity_logs_recorded ON activity_logs(recorded_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activity_logs_type ON activity_logs(type)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS promotion_reviews(
            id TEXT PRIMARY KEY,
            progress_id TEXT NOT NULL,
            decision TEXT NOT NULL,
            note TEXT,
            reviewer TEXT NOT NULL,
            reviewed_at TEXT NOT NULL,
            FOREIGN KEY(progress_id) REFERENCES progress(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_promotion_reviews_progress ON promotion_reviews(progress_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_promotion_reviews_reviewed ON promotion_reviews(reviewed_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS holidays(
            id TEXT PRIMARY KEY,
            date TEXT NOT NULL UNIQUE,
            label TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn ensure_group_target_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "btq_groups", "target_surah")? {
        conn.execute("ALTER TABLE btq_groups ADD COLUMN target_surah TEXT", [])?;
    }
    if !table_has_column(conn, "btq_groups", "target_verse_start")? {
        conn.execute(
            "ALTER TABLE btq_groups ADD COLUMN target_verse_start INTEGER",
            [],
        )?;
    }
    if !table_has_column(conn, "btq_groups", "target_verse_end")? {
        conn.execute(
            "ALTER TABLE btq_groups ADD COLUMN target_verse_end INTEGER",
            [],
        )?;
    }
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
