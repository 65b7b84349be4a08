use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use serde_json::json;

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    // Student counts ride along so the subjects modal can disable deletion
    // of in-use subjects without a second query.
    let mut stmt = match conn.prepare(
        "SELECT
           sub.name,
           sub.color,
           (SELECT COUNT(*) FROM students s WHERE s.subject = sub.name) AS student_count
         FROM subjects sub
         ORDER BY sub.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let name: String = row.get(0)?;
            let color: String = row.get(1)?;
            let student_count: i64 = row.get(2)?;
            Ok(json!({
                "name": name,
                "color": color,
                "studentCount": student_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_subjects_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = req
        .params
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    let color = req
        .params
        .get("color")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let errors = roster::validate_subject(&name, &color);
    if !errors.is_empty() {
        return err(&req.id, "bad_params", errors.join(", "), None);
    }

    if let Err(e) = conn.execute(
        "INSERT INTO subjects(name, color) VALUES(?, ?)
         ON CONFLICT(name) DO UPDATE SET color = excluded.color",
        (&name, &color),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "subjects" })),
        );
    }

    ok(&req.id, json!({ "subject": { "name": name, "color": color } }))
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };

    // Explicit guard rather than surfacing the FK violation.
    let in_use: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM students WHERE subject = ?",
        [&name],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if in_use > 0 {
        return err(
            &req.id,
            "subject_in_use",
            format!("subject has {} associated students", in_use),
            Some(json!({ "studentCount": in_use })),
        );
    }

    match conn.execute("DELETE FROM subjects WHERE name = ?", [&name]) {
        Ok(n) => ok(&req.id, json!({ "deleted": n > 0 })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.upsert" => Some(handle_subjects_upsert(state, req)),
        "subjects.delete" => Some(handle_subjects_delete(state, req)),
        _ => None,
    }
}
