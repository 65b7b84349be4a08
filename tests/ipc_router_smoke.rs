use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_portaled");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn portaled");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("portale-router-smoke");
    let bundle_out = workspace.join("smoke-backup.pcbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.upsert",
        json!({ "name": "Storia", "color": "#ff7b00" }),
    );
    let _ = request(&mut stdin, &mut reader, "4", "subjects.list", json!({}));
    let created = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({
            "name": "Smoke Student",
            "subject": "Storia",
            "lastInterrogation": "2024-03-01",
            "gradesCount": 1
        }),
    );
    let student_id = created
        .get("result")
        .and_then(|v| v.get("student"))
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_str())
        .expect("student id")
        .to_string();

    let _ = request(&mut stdin, &mut reader, "6", "students.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "students.update",
        json!({ "id": student_id, "patch": { "name": "Updated Student" } }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "students.registerInterrogation",
        json!({ "id": student_id, "date": "2024-03-10" }),
    );
    let _ = request(&mut stdin, &mut reader, "9", "schedule.nextUp", json!({}));
    let _ = request(&mut stdin, &mut reader, "10", "schedule.stats", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "archive.upload",
        json!({ "name": "smoke.txt", "mimeType": "text/plain", "content": "c21va2U=" }),
    );
    let _ = request(&mut stdin, &mut reader, "12", "archive.list", json!({}));
    let _ = request(&mut stdin, &mut reader, "13", "db.optimize", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "backup.exportWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "outPath": bundle_out.to_string_lossy()
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "backup.importWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "inPath": bundle_out.to_string_lossy()
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "students.delete",
        json!({ "id": student_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "subjects.delete",
        json!({ "name": "Storia" }),
    );

    let health_after = request(&mut stdin, &mut reader, "18", "health", json!({}));
    assert_eq!(health_after.get("ok").and_then(|v| v.as_bool()), Some(true));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unknown_method_reports_not_implemented() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let payload = json!({ "id": "x1", "method": "no.such.method", "params": {} });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    drop(stdin);
    let _ = child.wait();
}
