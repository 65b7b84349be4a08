use crate::content;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_archive_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    // Metadata only; content stays out of list responses.
    let mut stmt = match conn.prepare(
        "SELECT id, name, mime_type, size, sha256, upload_date
         FROM archive_files
         ORDER BY upload_date DESC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let mime_type: Option<String> = row.get(2)?;
            let size: i64 = row.get(3)?;
            let sha256: String = row.get(4)?;
            let upload_date: String = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "mimeType": mime_type,
                "size": size,
                "sha256": sha256,
                "uploadDate": upload_date
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(files) => ok(&req.id, json!({ "files": files })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_archive_upload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    let mime_type = req
        .params
        .get("mimeType")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let encoded = match req.params.get("content").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing content", None),
    };

    let bytes = match content::decode_content(encoded) {
        Ok(b) => b,
        Err(e) => return err(&req.id, "bad_params", format!("{e:#}"), None),
    };
    if content::check_size(&bytes).is_err() {
        return err(
            &req.id,
            "file_too_large",
            format!("file exceeds {} bytes", content::MAX_FILE_BYTES),
            Some(json!({ "size": bytes.len(), "maxSize": content::MAX_FILE_BYTES })),
        );
    }

    let file_id = Uuid::new_v4().to_string();
    let sha256 = content::sha256_hex(&bytes);
    let upload_date = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO archive_files(id, name, mime_type, size, sha256, content, upload_date)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &file_id,
            &name,
            &mime_type,
            bytes.len() as i64,
            &sha256,
            &bytes,
            &upload_date,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "archive_files" })),
        );
    }

    ok(
        &req.id,
        json!({
            "file": {
                "id": file_id,
                "name": name,
                "mimeType": mime_type,
                "size": bytes.len(),
                "sha256": sha256,
                "uploadDate": upload_date
            }
        }),
    )
}

fn handle_archive_download(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let file_id = match req.params.get("id").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing id", None),
    };

    let row = conn
        .query_row(
            "SELECT name, mime_type, sha256, content FROM archive_files WHERE id = ?",
            [&file_id],
            |row| {
                let name: String = row.get(0)?;
                let mime_type: Option<String> = row.get(1)?;
                let sha256: String = row.get(2)?;
                let content: Vec<u8> = row.get(3)?;
                Ok((name, mime_type, sha256, content))
            },
        )
        .optional();

    match row {
        Ok(Some((name, mime_type, sha256, bytes))) => ok(
            &req.id,
            json!({
                "name": name,
                "mimeType": mime_type.unwrap_or_else(|| "application/octet-stream".to_string()),
                "size": bytes.len(),
                "sha256": sha256,
                "contentBase64": content::encode_base64(&bytes),
            }),
        ),
        Ok(None) => err(&req.id, "not_found", "file not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_archive_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let file_id = match req.params.get("id").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing id", None),
    };

    match conn.execute("DELETE FROM archive_files WHERE id = ?", [&file_id]) {
        Ok(n) => ok(&req.id, json!({ "deleted": n > 0 })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "archive.list" => Some(handle_archive_list(state, req)),
        "archive.upload" => Some(handle_archive_upload(state, req)),
        "archive.download" => Some(handle_archive_download(state, req)),
        "archive.delete" => Some(handle_archive_delete(state, req)),
        _ => None,
    }
}
