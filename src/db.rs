use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "portale.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            name TEXT PRIMARY KEY,
            color TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            subject TEXT NOT NULL,
            last_interrogation TEXT NOT NULL DEFAULT '9999-12-31',
            grades_count INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT,
            FOREIGN KEY(subject) REFERENCES subjects(name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_subject ON students(subject)",
        [],
    )?;
    // The hosted deployment created this lazily via a maintenance endpoint;
    // local workspaces get it up front.
    create_sorting_index(&conn)?;

    // Existing workspaces may predate the updated_at column. Add if needed.
    ensure_students_updated_at(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS archive_files(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            mime_type TEXT,
            size INTEGER NOT NULL,
            sha256 TEXT NOT NULL,
            content BLOB NOT NULL,
            upload_date TEXT NOT NULL
        )",
        [],
    )?;
    ensure_archive_files_sha256(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_archive_files_upload_date ON archive_files(upload_date)",
        [],
    )?;

    Ok(conn)
}

pub fn create_sorting_index(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_sorting
         ON students(grades_count, last_interrogation)",
        [],
    )?;
    Ok(())
}

fn ensure_students_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn ensure_archive_files_sha256(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "archive_files", "sha256")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE archive_files ADD COLUMN sha256 TEXT NOT NULL DEFAULT ''",
        [],
    )?;
    // Backfill digests for rows imported before the column existed.
    let mut stmt = conn.prepare("SELECT id, content FROM archive_files WHERE sha256 = ''")?;
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let content: Vec<u8> = row.get(1)?;
            Ok((id, content))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (id, content) in rows {
        conn.execute(
            "UPDATE archive_files SET sha256 = ? WHERE id = ?",
            (crate::content::sha256_hex(&content), id),
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
