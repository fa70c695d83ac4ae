use rusqlite::Connection;
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

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_registrard");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn registrard");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn registrar_actor() -> serde_json::Value {
    json!({ "user_id": 1, "role": "registrar" })
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    actor: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    if let Some(actor) = actor {
        payload["actor"] = actor;
    }
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn success(v: &serde_json::Value) -> bool {
    v.get("success").and_then(|v| v.as_bool()).unwrap_or(false)
}

fn message(v: &serde_json::Value) -> &str {
    v.get("message").and_then(|v| v.as_str()).unwrap_or("")
}

fn enroll_one(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
) -> String {
    let resp = request(
        stdin,
        reader,
        "enroll",
        "enroll",
        json!({
            "first_name": "Maria",
            "last_name": "Santos",
            "email": "maria@example.com",
            "contact_number": "09170000001",
            "username": "msantos",
            "password": "s3cret-pass",
            "confirm_password": "s3cret-pass",
            "grade_level": "7",
            "section": "A",
            "lrn": "100000000001",
        }),
        Some(registrar_actor()),
    );
    assert!(success(&resp), "enroll: {}", resp);
    resp.get("student_id")
        .and_then(|v| v.as_str())
        .expect("student_id")
        .to_string()
}

#[test]
fn update_propagates_email_to_the_identity_store() {
    let workspace = temp_dir("registrard-update-email");
    let (mut child, mut stdin, mut reader) = spawn_daemon();

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );
    let student_id = enroll_one(&mut stdin, &mut reader);

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "students.update",
        json!({
            "student_id": student_id,
            "email": "maria.santos@new-school.edu",
            "status": "Transferred",
        }),
        Some(registrar_actor()),
    );
    assert!(success(&resp), "update: {}", resp);

    let registrar = Connection::open(workspace.join("registrar.sqlite3")).expect("open registrar");
    let (email, status): (String, String) = registrar
        .query_row(
            "SELECT email, status FROM students WHERE student_id = ?",
            [&student_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .expect("registrar row");
    assert_eq!(email, "maria.santos@new-school.edu");
    assert_eq!(status, "Transferred");

    // The identity store followed the soft reference.
    let identity = Connection::open(workspace.join("login.sqlite3")).expect("open identity");
    let login_email: String = identity
        .query_row(
            "SELECT email FROM users WHERE username = 'msantos'",
            [],
            |r| r.get(0),
        )
        .expect("identity row");
    assert_eq!(login_email, "maria.santos@new-school.edu");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn update_rejects_unknown_status_and_unknown_student() {
    let workspace = temp_dir("registrard-update-checks");
    let (mut child, mut stdin, mut reader) = spawn_daemon();

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );
    let student_id = enroll_one(&mut stdin, &mut reader);

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "students.update",
        json!({ "student_id": student_id, "status": "Expelled" }),
        Some(registrar_actor()),
    );
    assert!(!success(&resp));
    assert!(message(&resp).contains("status"), "{}", message(&resp));

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "students.update",
        json!({ "student_id": "S-2026-99999", "first_name": "Ghost" }),
        Some(registrar_actor()),
    );
    assert!(!success(&resp));
    assert!(message(&resp).contains("not found"), "{}", message(&resp));

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "students.update",
        json!({ "student_id": student_id }),
        Some(registrar_actor()),
    );
    assert!(!success(&resp));
    assert!(
        message(&resp).contains("nothing to update"),
        "{}",
        message(&resp)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
