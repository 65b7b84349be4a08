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

fn request_ok(
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value
}

// Workspaces created before the digest column existed get their archive
// rows hashed on open.
#[test]
fn opening_a_pre_digest_workspace_backfills_sha256() {
    let workspace = temp_dir("portale-migrate-sha256");

    {
        let conn = rusqlite::Connection::open(workspace.join("portale.sqlite3"))
            .expect("create legacy db");
        conn.execute(
            "CREATE TABLE archive_files(
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                mime_type TEXT,
                size INTEGER NOT NULL,
                content BLOB NOT NULL,
                upload_date TEXT NOT NULL
            )",
            [],
        )
        .expect("create legacy table");
        conn.execute(
            "INSERT INTO archive_files(id, name, mime_type, size, content, upload_date)
             VALUES('legacy-1', 'vecchio.txt', 'text/plain', 5, ?, '2023-09-01T00:00:00Z')",
            [b"hello".as_slice()],
        )
        .expect("insert legacy row");
    }

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request_ok(&mut stdin, &mut reader, "list", "archive.list", json!({}));
    let files = resp
        .get("result")
        .and_then(|r| r.get("files"))
        .and_then(|v| v.as_array())
        .expect("files");
    assert_eq!(files.len(), 1);
    assert_eq!(
        files[0].get("sha256").and_then(|v| v.as_str()),
        Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
