use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use chrono::{Local, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

fn student_row_json(row: &Row<'_>, today: NaiveDate) -> rusqlite::Result<serde_json::Value> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let subject: String = row.get(2)?;
    let last_interrogation: String = row.get(3)?;
    let grades_count: i64 = row.get(4)?;
    let updated_at: Option<String> = row.get(5)?;
    Ok(json!({
        "id": id,
        "name": name,
        "subject": subject,
        "lastInterrogation": last_interrogation,
        "gradesCount": grades_count,
        "daysSince": roster::days_since(&last_interrogation, today),
        "updatedAt": updated_at,
    }))
}

fn fetch_student(
    conn: &Connection,
    id: &str,
    today: NaiveDate,
) -> rusqlite::Result<Option<serde_json::Value>> {
    conn.query_row(
        "SELECT id, name, subject, last_interrogation, grades_count, updated_at
         FROM students WHERE id = ?",
        [id],
        |row| student_row_json(row, today),
    )
    .optional()
}

// Wrong-typed fields are errors, not absences; the original API rejected
// them the same way it rejected out-of-range values.
fn opt_str_field(
    params: &serde_json::Value,
    key: &str,
    errors: &mut Vec<String>,
) -> Option<String> {
    match params.get(key) {
        None => None,
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.push(format!("'{}' must be a string", key));
            None
        }
    }
}

fn opt_int_field(params: &serde_json::Value, key: &str, errors: &mut Vec<String>) -> Option<i64> {
    match params.get(key) {
        None => None,
        Some(v) => match v.as_i64() {
            Some(n) => Some(n),
            None => {
                errors.push(format!("'{}' must be a non-negative number", key));
                None
            }
        },
    }
}

fn subject_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM subjects WHERE name = ?", [name], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let today = Local::now().date_naive();

    // "Who goes next" order; backed by idx_students_sorting.
    let mut stmt = match conn.prepare(
        "SELECT id, name, subject, last_interrogation, grades_count, updated_at
         FROM students
         ORDER BY grades_count ASC, last_interrogation ASC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| student_row_json(row, today))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut errors = Vec::new();
    let name = opt_str_field(&req.params, "name", &mut errors)
        .unwrap_or_default()
        .trim()
        .to_string();
    let subject = opt_str_field(&req.params, "subject", &mut errors)
        .unwrap_or_default()
        .trim()
        .to_string();
    let last_interrogation = opt_str_field(&req.params, "lastInterrogation", &mut errors);
    let grades_count = opt_int_field(&req.params, "gradesCount", &mut errors);

    errors.extend(roster::validate_new_student(
        &name,
        &subject,
        last_interrogation.as_deref(),
        grades_count,
    ));
    if !errors.is_empty() {
        return err(&req.id, "bad_params", errors.join(", "), None);
    }

    match subject_exists(conn, &subject) {
        Ok(true) => {}
        Ok(false) => {
            return err(
                &req.id,
                "unknown_subject",
                format!("subject not found: {}", subject),
                None,
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let student_id = Uuid::new_v4().to_string();
    let date = last_interrogation.unwrap_or_else(|| roster::NO_DATE_SENTINEL.to_string());
    let now = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, name, subject, last_interrogation, grades_count, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &name,
            &subject,
            &date,
            grades_count.unwrap_or(0),
            &now,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    let today = Local::now().date_naive();
    match fetch_student(conn, &student_id, today) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(&req.id, "not_found", "student vanished after insert", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let id = match req.params.get("id").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing id", None),
    };
    let patch = req.params.get("patch").cloned().unwrap_or(json!({}));
    if !patch.is_object() {
        return err(&req.id, "bad_params", "patch must be an object", None);
    }

    let mut errors = Vec::new();
    let name = opt_str_field(&patch, "name", &mut errors);
    // Explicit null resets the date to "never interrogated".
    let last_interrogation = match patch.get("lastInterrogation") {
        None => None,
        Some(serde_json::Value::Null) => Some(roster::NO_DATE_SENTINEL.to_string()),
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.push("'lastInterrogation' must be a string or null".to_string());
            None
        }
    };
    let grades_count = opt_int_field(&patch, "gradesCount", &mut errors);

    errors.extend(roster::validate_student_patch(
        name.as_deref(),
        last_interrogation.as_deref(),
        grades_count,
    ));
    if !errors.is_empty() {
        return err(&req.id, "bad_params", errors.join(", "), None);
    }

    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE students SET
            name = COALESCE(?, name),
            grades_count = COALESCE(?, grades_count),
            last_interrogation = COALESCE(?, last_interrogation),
            updated_at = ?
         WHERE id = ?",
        (&name, grades_count, &last_interrogation, &now, &id),
    );
    match changed {
        Ok(0) => return err(&req.id, "not_found", "student not found", None),
        Ok(_) => {}
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    }

    let today = Local::now().date_naive();
    match fetch_student(conn, &id, today) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let id = match req.params.get("id").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing id", None),
    };

    match conn.execute("DELETE FROM students WHERE id = ?", [&id]) {
        Ok(n) => ok(&req.id, json!({ "deleted": n > 0 })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

// "Interrogated today": stamp the date and bump the grade counter in one
// statement, so two devices registering at once cannot lose a grade.
fn handle_register_interrogation(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let id = match req.params.get("id").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing id", None),
    };
    let today = Local::now().date_naive();
    let date = match req.params.get("date") {
        None => roster::format_iso_date(today),
        Some(serde_json::Value::String(s)) => {
            // The sentinel parses as a calendar date but means "never
            // interrogated"; registering it would contradict the bumped
            // grade counter.
            if s == roster::NO_DATE_SENTINEL || roster::parse_iso_date(s).is_none() {
                return err(
                    &req.id,
                    "bad_params",
                    "'date' must be a YYYY-MM-DD date",
                    None,
                );
            }
            s.clone()
        }
        Some(_) => {
            return err(
                &req.id,
                "bad_params",
                "'date' must be a YYYY-MM-DD date",
                None,
            )
        }
    };

    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE students SET
            last_interrogation = ?,
            grades_count = grades_count + 1,
            updated_at = ?
         WHERE id = ?",
        (&date, &now, &id),
    );
    match changed {
        Ok(0) => return err(&req.id, "not_found", "student not found", None),
        Ok(_) => {}
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    }

    match fetch_student(conn, &id, today) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.registerInterrogation" => Some(handle_register_interrogation(state, req)),
        _ => None,
    }
}
