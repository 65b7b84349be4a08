use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use chrono::Local;
use rusqlite::Connection;
use serde_json::json;
use std::collections::BTreeMap;

struct RosterEntry {
    id: String,
    name: String,
    subject: String,
    last_interrogation: String,
    grades_count: i64,
}

fn load_roster(conn: &Connection) -> rusqlite::Result<Vec<RosterEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, subject, last_interrogation, grades_count FROM students",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(RosterEntry {
            id: row.get(0)?,
            name: row.get(1)?,
            subject: row.get(2)?,
            last_interrogation: row.get(3)?,
            grades_count: row.get(4)?,
        })
    })?;
    rows.collect()
}

fn subject_colors(conn: &Connection) -> rusqlite::Result<BTreeMap<String, String>> {
    let mut stmt = conn.prepare("SELECT name, color FROM subjects")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    rows.collect()
}

fn handle_next_up(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let search = req
        .params
        .get("search")
        .and_then(|v| v.as_str())
        .map(|s| s.to_lowercase());

    let roster = match load_roster(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let colors = match subject_colors(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let today = Local::now().date_naive();

    // Group by subject; BTreeMap keeps the groups in name order.
    let mut by_subject: BTreeMap<String, Vec<&RosterEntry>> = BTreeMap::new();
    for entry in &roster {
        if let Some(ref term) = search {
            if !entry.name.to_lowercase().contains(term) {
                continue;
            }
        }
        by_subject
            .entry(entry.subject.clone())
            .or_default()
            .push(entry);
    }

    let groups: Vec<serde_json::Value> = by_subject
        .into_iter()
        .map(|(subject, mut entries)| {
            entries.sort_by(|a, b| {
                roster::next_up_cmp(
                    a.grades_count,
                    roster::days_since(&a.last_interrogation, today),
                    b.grades_count,
                    roster::days_since(&b.last_interrogation, today),
                )
            });
            let students: Vec<serde_json::Value> = entries
                .iter()
                .map(|e| {
                    json!({
                        "id": e.id,
                        "name": e.name,
                        "lastInterrogation": e.last_interrogation,
                        "gradesCount": e.grades_count,
                        "daysSince": roster::days_since(&e.last_interrogation, today),
                        "overdue": roster::is_overdue(&e.last_interrogation, today),
                    })
                })
                .collect();
            json!({
                "subject": subject,
                "color": colors.get(&subject),
                "students": students,
            })
        })
        .collect();

    ok(&req.id, json!({ "groups": groups }))
}

fn handle_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let roster = match load_roster(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let today = Local::now().date_naive();
    let stats = roster::roster_stats(
        roster
            .iter()
            .map(|e| (e.subject.as_str(), e.last_interrogation.as_str())),
        today,
    );

    ok(
        &req.id,
        json!({
            "totalStudents": stats.total_students,
            "overdueCount": stats.overdue_count,
            "recentCount": stats.recent_count,
            "subjectCount": stats.subject_count,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.nextUp" => Some(handle_next_up(state, req)),
        "schedule.stats" => Some(handle_stats(state, req)),
        _ => None,
    }
}
