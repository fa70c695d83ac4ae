use rusqlite::OptionalExtension;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::db::now_stamp;
use crate::ipc::auth::require_registrar;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SectionInput {
    section_id: Option<i64>,
    grade_level: String,
    section: String,
    room_number: String,
    adviser_id: Option<i64>,
    status: String,
    school_year: String,
}

/// `save_section`: create when `section_id` is omitted, update otherwise.
/// The (grade_level, section, school_year) identity has no store constraint;
/// this handler is what enforces it.
fn handle_save_section(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(msg) = require_registrar(req) {
        return err(&req.id, msg);
    }
    let Some(stores) = state.stores.as_ref() else {
        return err(&req.id, "no workspace selected");
    };

    let input: SectionInput = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, format!("bad params: {}", e)),
    };

    let mut issues = Vec::new();
    for (name, value) in [
        ("grade_level", &input.grade_level),
        ("section", &input.section),
        ("school_year", &input.school_year),
    ] {
        if value.trim().is_empty() {
            issues.push(format!("{} is required", name));
        }
    }
    let status = if input.status.is_empty() {
        "active"
    } else {
        input.status.as_str()
    };
    if status != "active" && status != "inactive" {
        issues.push("status must be active or inactive".to_string());
    }
    if !issues.is_empty() {
        return err(&req.id, issues.join("; "));
    }

    let grade_level = input.grade_level.trim();
    let section = input.section.trim();
    let school_year = input.school_year.trim();

    let duplicate: Result<Option<i64>, _> = stores
        .registrar
        .query_row(
            "SELECT id FROM class_sections
             WHERE grade_level = ? AND section = ? AND school_year = ? AND id != ?",
            (
                grade_level,
                section,
                school_year,
                input.section_id.unwrap_or(-1),
            ),
            |r| r.get(0),
        )
        .optional();
    match duplicate {
        Ok(Some(_)) => {
            return err(
                &req.id,
                format!(
                    "a section named {} already exists for grade {} in {}",
                    section, grade_level, school_year
                ),
            )
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "save_section: duplicate check failed");
            return err(&req.id, "failed to save section");
        }
    }

    let stamp = now_stamp();
    let result = match input.section_id {
        Some(id) => {
            let updated = stores.registrar.execute(
                "UPDATE class_sections
                 SET grade_level = ?, section = ?, room_number = ?, adviser_id = ?,
                     status = ?, school_year = ?, updated_at = ?
                 WHERE id = ?",
                (
                    grade_level,
                    section,
                    input.room_number.trim(),
                    input.adviser_id,
                    status,
                    school_year,
                    &stamp,
                    id,
                ),
            );
            match updated {
                Ok(0) => return err(&req.id, "section not found"),
                Ok(_) => Ok("section updated"),
                Err(e) => Err(e),
            }
        }
        None => stores
            .registrar
            .execute(
                "INSERT INTO class_sections(grade_level, section, room_number,
                    adviser_id, status, school_year, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    grade_level,
                    section,
                    input.room_number.trim(),
                    input.adviser_id,
                    status,
                    school_year,
                    &stamp,
                ),
            )
            .map(|_| "section created"),
    };

    match result {
        Ok(message) => ok(&req.id, message, None),
        Err(e) => {
            error!(error = %e, grade_level, section, "save_section failed");
            err(&req.id, "failed to save section")
        }
    }
}

/// `delete_section`: refused while any registrar student record still
/// references the (grade_level, section) pair. Never cascades.
fn handle_delete_section(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(msg) = require_registrar(req) {
        return err(&req.id, msg);
    }
    let Some(stores) = state.stores.as_ref() else {
        return err(&req.id, "no workspace selected");
    };

    let Some(section_id) = req.params.get("section_id").and_then(|v| v.as_i64()) else {
        return err(&req.id, "missing section_id");
    };

    let target: Option<(String, String)> = match stores
        .registrar
        .query_row(
            "SELECT grade_level, section FROM class_sections WHERE id = ?",
            [section_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, section_id, "delete_section: lookup failed");
            return err(&req.id, "failed to delete section");
        }
    };
    let Some((grade_level, section)) = target else {
        return err(&req.id, "section not found");
    };

    let referencing: i64 = match stores.registrar.query_row(
        "SELECT COUNT(*) FROM students WHERE grade_level = ? AND section = ?",
        (&grade_level, &section),
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, section_id, "delete_section: reference count failed");
            return err(&req.id, "failed to delete section");
        }
    };
    if referencing > 0 {
        return err(
            &req.id,
            format!(
                "cannot delete section {}-{}: {} student record(s) still reference it",
                grade_level, section, referencing
            ),
        );
    }

    match stores
        .registrar
        .execute("DELETE FROM class_sections WHERE id = ?", [section_id])
    {
        Ok(_) => ok(&req.id, "section deleted", None),
        Err(e) => {
            error!(error = %e, section_id, "delete_section failed");
            err(&req.id, "failed to delete section")
        }
    }
}

fn handle_sections_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(stores) = state.stores.as_ref() else {
        return err(&req.id, "no workspace selected");
    };

    let mut stmt = match stores.registrar.prepare(
        "SELECT
           cs.id, cs.grade_level, cs.section, cs.room_number, cs.adviser_id,
           cs.status, cs.school_year,
           (SELECT COUNT(*) FROM students s
            WHERE s.grade_level = cs.grade_level AND s.section = cs.section)
             AS student_count
         FROM class_sections cs
         ORDER BY cs.grade_level, cs.section",
    ) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "sections.list: prepare failed");
            return err(&req.id, "failed to list sections");
        }
    };

    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, i64>(0)?,
                "grade_level": row.get::<_, String>(1)?,
                "section": row.get::<_, String>(2)?,
                "room_number": row.get::<_, Option<String>>(3)?,
                "adviser_id": row.get::<_, Option<i64>>(4)?,
                "status": row.get::<_, String>(5)?,
                "school_year": row.get::<_, String>(6)?,
                "student_count": row.get::<_, i64>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(sections) => ok(&req.id, "ok", Some(json!({ "sections": sections }))),
        Err(e) => {
            error!(error = %e, "sections.list failed");
            err(&req.id, "failed to list sections")
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "save_section" => Some(handle_save_section(state, req)),
        "delete_section" => Some(handle_delete_section(state, req)),
        "sections.list" => Some(handle_sections_list(state, req)),
        _ => None,
    }
}
