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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
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

fn section_body(grade: &str, section: &str) -> serde_json::Value {
    json!({
        "grade_level": grade,
        "section": section,
        "room_number": "204",
        "status": "active",
        "school_year": "2026-2027",
    })
}

#[test]
fn duplicate_section_identity_is_rejected() {
    let workspace = temp_dir("registrard-sections-dup");
    let (mut child, mut stdin, mut reader) = spawn_daemon();

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "save_section",
        section_body("7", "A"),
        Some(registrar_actor()),
    );
    assert!(success(&resp), "first save: {}", resp);

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "save_section",
        section_body("7", "A"),
        Some(registrar_actor()),
    );
    assert!(!success(&resp), "second save must be refused");
    assert!(message(&resp).contains("already exists"), "{}", message(&resp));

    // Same name under another grade is a different section.
    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "save_section",
        section_body("8", "A"),
        Some(registrar_actor()),
    );
    assert!(success(&resp), "{}", message(&resp));

    // Updating a section does not collide with itself.
    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "sections.list",
        json!({}),
        Some(registrar_actor()),
    );
    let sections = resp.get("sections").and_then(|v| v.as_array()).unwrap();
    let id = sections
        .iter()
        .find(|s| s.get("grade_level").and_then(|v| v.as_str()) == Some("7"))
        .and_then(|s| s.get("id"))
        .and_then(|v| v.as_i64())
        .expect("section id");
    let mut body = section_body("7", "A");
    body["section_id"] = json!(id);
    body["room_number"] = json!("301");
    let resp = request(
        &mut stdin,
        &mut reader,
        "6",
        "save_section",
        body,
        Some(registrar_actor()),
    );
    assert!(success(&resp), "self-update: {}", message(&resp));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn section_delete_is_guarded_by_student_references() {
    let workspace = temp_dir("registrard-sections-delete");
    let (mut child, mut stdin, mut reader) = spawn_daemon();

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );

    // A grade 7 / section A student record comes in through enrollment.
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
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

    for (id, body) in [("3", section_body("7", "A")), ("4", section_body("12", "Z"))] {
        let resp = request(
            &mut stdin,
            &mut reader,
            id,
            "save_section",
            body,
            Some(registrar_actor()),
        );
        assert!(success(&resp), "save_section: {}", resp);
    }

    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "sections.list",
        json!({}),
        Some(registrar_actor()),
    );
    let sections = resp.get("sections").and_then(|v| v.as_array()).unwrap().clone();
    let id_of = |grade: &str| {
        sections
            .iter()
            .find(|s| s.get("grade_level").and_then(|v| v.as_str()) == Some(grade))
            .and_then(|s| s.get("id"))
            .and_then(|v| v.as_i64())
            .expect("section id")
    };

    // Referenced: refused with an explicit error, and the row survives.
    let resp = request(
        &mut stdin,
        &mut reader,
        "6",
        "delete_section",
        json!({ "section_id": id_of("7") }),
        Some(registrar_actor()),
    );
    assert!(!success(&resp));
    assert!(message(&resp).contains("reference"), "{}", message(&resp));

    // Unreferenced: deleted.
    let resp = request(
        &mut stdin,
        &mut reader,
        "7",
        "delete_section",
        json!({ "section_id": id_of("12") }),
        Some(registrar_actor()),
    );
    assert!(success(&resp), "{}", message(&resp));

    let resp = request(
        &mut stdin,
        &mut reader,
        "8",
        "sections.list",
        json!({}),
        Some(registrar_actor()),
    );
    let remaining = resp.get("sections").and_then(|v| v.as_array()).unwrap();
    assert_eq!(remaining.len(), 1);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn schedule_overlap_is_rejected_and_back_to_back_is_not() {
    let workspace = temp_dir("registrard-schedule");
    let (mut child, mut stdin, mut reader) = spawn_daemon();

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );

    let slot = |start: &str, end: &str| {
        json!({
            "action": "add",
            "grade_level": "7",
            "section": "A",
            "subject_id": 11,
            "teacher_id": 5,
            "day_of_week": "Monday",
            "start_time": start,
            "end_time": end,
            "school_year": "2026-2027",
        })
    };

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "save_schedule",
        slot("08:00", "09:00"),
        Some(registrar_actor()),
    );
    assert!(success(&resp), "first slot: {}", resp);

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "save_schedule",
        slot("08:30", "09:30"),
        Some(registrar_actor()),
    );
    assert!(!success(&resp), "overlapping slot must be refused");
    assert!(message(&resp).contains("overlaps"), "{}", message(&resp));

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "save_schedule",
        slot("09:00", "10:00"),
        Some(registrar_actor()),
    );
    assert!(success(&resp), "back-to-back slot: {}", message(&resp));

    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "schedule.list",
        json!({ "grade_level": "7", "section": "A" }),
        Some(registrar_actor()),
    );
    let schedules = resp.get("schedules").and_then(|v| v.as_array()).unwrap();
    assert_eq!(schedules.len(), 2);

    // Editing a slot may keep its own time range.
    let first_id = schedules[0].get("id").and_then(|v| v.as_i64()).unwrap();
    let mut body = slot("08:00", "09:00");
    body["action"] = json!("edit");
    body["id"] = json!(first_id);
    body["teacher_id"] = json!(6);
    let resp = request(
        &mut stdin,
        &mut reader,
        "6",
        "save_schedule",
        body,
        Some(registrar_actor()),
    );
    assert!(success(&resp), "self-edit: {}", message(&resp));

    // Deleting frees the slot for reuse.
    let resp = request(
        &mut stdin,
        &mut reader,
        "7",
        "save_schedule",
        json!({ "action": "delete", "id": first_id }),
        Some(registrar_actor()),
    );
    assert!(success(&resp), "{}", message(&resp));
    let resp = request(
        &mut stdin,
        &mut reader,
        "8",
        "save_schedule",
        slot("08:15", "08:45"),
        Some(registrar_actor()),
    );
    assert!(success(&resp), "freed slot: {}", message(&resp));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn invalid_schedule_times_are_rejected() {
    let workspace = temp_dir("registrard-schedule-times");
    let (mut child, mut stdin, mut reader) = spawn_daemon();

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "save_schedule",
        json!({
            "action": "add",
            "grade_level": "7",
            "section": "A",
            "day_of_week": "Monday",
            "start_time": "25:00",
            "end_time": "26:00",
            "school_year": "2026-2027",
        }),
        Some(registrar_actor()),
    );
    assert!(!success(&resp));
    assert!(message(&resp).contains("HH:MM"), "{}", message(&resp));

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "save_schedule",
        json!({
            "action": "add",
            "grade_level": "7",
            "section": "A",
            "day_of_week": "Monday",
            "start_time": "10:00",
            "end_time": "09:00",
            "school_year": "2026-2027",
        }),
        Some(registrar_actor()),
    );
    assert!(!success(&resp));
    assert!(message(&resp).contains("before"), "{}", message(&resp));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
