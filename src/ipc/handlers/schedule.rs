use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::db::{now_stamp, Stores};
use crate::ipc::auth::require_registrar;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{find_schedule_conflict, is_valid_time};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScheduleInput {
    action: String,
    id: Option<i64>,
    grade_level: String,
    section: String,
    subject_id: Option<i64>,
    teacher_id: Option<i64>,
    day_of_week: String,
    start_time: String,
    end_time: String,
    school_year: String,
}

/// `save_schedule`: add/edit reject any slot overlapping an existing one for
/// the same (grade_level, section, day_of_week, school_year); back-to-back
/// slots are fine. Delete is keyed by id.
fn handle_save_schedule(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(msg) = require_registrar(req) {
        return err(&req.id, msg);
    }
    let Some(stores) = state.stores.as_ref() else {
        return err(&req.id, "no workspace selected");
    };

    let input: ScheduleInput = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, format!("bad params: {}", e)),
    };

    match input.action.as_str() {
        "delete" => {
            let Some(id) = input.id else {
                return err(&req.id, "missing id");
            };
            match stores
                .registrar
                .execute("DELETE FROM class_schedules WHERE id = ?", [id])
            {
                Ok(0) => err(&req.id, "schedule not found"),
                Ok(_) => ok(&req.id, "schedule deleted", None),
                Err(e) => {
                    error!(error = %e, id, "save_schedule: delete failed");
                    err(&req.id, "failed to delete schedule")
                }
            }
        }
        "add" | "edit" => save_slot(stores, req, &input),
        other => err(&req.id, format!("unknown action: {}", other)),
    }
}

fn save_slot(stores: &Stores, req: &Request, input: &ScheduleInput) -> serde_json::Value {
    let mut issues = Vec::new();
    for (name, value) in [
        ("grade_level", &input.grade_level),
        ("section", &input.section),
        ("day_of_week", &input.day_of_week),
        ("start_time", &input.start_time),
        ("end_time", &input.end_time),
        ("school_year", &input.school_year),
    ] {
        if value.trim().is_empty() {
            issues.push(format!("{} is required", name));
        }
    }
    if !input.start_time.is_empty() && !is_valid_time(&input.start_time) {
        issues.push("start_time must be HH:MM".to_string());
    }
    if !input.end_time.is_empty() && !is_valid_time(&input.end_time) {
        issues.push("end_time must be HH:MM".to_string());
    }
    if issues.is_empty() && input.start_time >= input.end_time {
        issues.push("start_time must be before end_time".to_string());
    }
    if !issues.is_empty() {
        return err(&req.id, issues.join("; "));
    }

    let edit_id = if input.action == "edit" {
        match input.id {
            Some(id) => Some(id),
            None => return err(&req.id, "missing id"),
        }
    } else {
        None
    };

    let conflict = find_schedule_conflict(
        &stores.registrar,
        input.grade_level.trim(),
        input.section.trim(),
        input.day_of_week.trim(),
        input.school_year.trim(),
        &input.start_time,
        &input.end_time,
        edit_id,
    );
    match conflict {
        Ok(Some(_)) => {
            return err(
                &req.id,
                format!(
                    "the {} {}-{} slot overlaps an existing schedule for grade {} section {}",
                    input.day_of_week,
                    input.start_time,
                    input.end_time,
                    input.grade_level,
                    input.section
                ),
            )
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "save_schedule: conflict check failed");
            return err(&req.id, "failed to save schedule");
        }
    }

    let result = match edit_id {
        Some(id) => {
            match stores.registrar.execute(
                "UPDATE class_schedules
                 SET grade_level = ?, section = ?, subject_id = ?, teacher_id = ?,
                     day_of_week = ?, start_time = ?, end_time = ?, school_year = ?
                 WHERE id = ?",
                (
                    input.grade_level.trim(),
                    input.section.trim(),
                    input.subject_id,
                    input.teacher_id,
                    input.day_of_week.trim(),
                    &input.start_time,
                    &input.end_time,
                    input.school_year.trim(),
                    id,
                ),
            ) {
                Ok(0) => return err(&req.id, "schedule not found"),
                Ok(_) => Ok("schedule updated"),
                Err(e) => Err(e),
            }
        }
        None => stores
            .registrar
            .execute(
                "INSERT INTO class_schedules(grade_level, section, subject_id,
                    teacher_id, day_of_week, start_time, end_time, school_year,
                    created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    input.grade_level.trim(),
                    input.section.trim(),
                    input.subject_id,
                    input.teacher_id,
                    input.day_of_week.trim(),
                    &input.start_time,
                    &input.end_time,
                    input.school_year.trim(),
                    now_stamp(),
                ),
            )
            .map(|_| "schedule added"),
    };

    match result {
        Ok(message) => ok(&req.id, message, None),
        Err(e) => {
            error!(error = %e, "save_schedule failed");
            err(&req.id, "failed to save schedule")
        }
    }
}

fn handle_schedule_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(stores) = state.stores.as_ref() else {
        return err(&req.id, "no workspace selected");
    };

    let grade_level = req
        .params
        .get("grade_level")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let section = req
        .params
        .get("section")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let mut stmt = match stores.registrar.prepare(
        "SELECT id, grade_level, section, subject_id, teacher_id, day_of_week,
                start_time, end_time, school_year
         FROM class_schedules
         WHERE (?1 IS NULL OR grade_level = ?1)
           AND (?2 IS NULL OR section = ?2)
         ORDER BY day_of_week, start_time",
    ) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "schedule.list: prepare failed");
            return err(&req.id, "failed to list schedules");
        }
    };

    let rows = stmt
        .query_map((grade_level, section), |row| {
            Ok(json!({
                "id": row.get::<_, i64>(0)?,
                "grade_level": row.get::<_, String>(1)?,
                "section": row.get::<_, String>(2)?,
                "subject_id": row.get::<_, Option<i64>>(3)?,
                "teacher_id": row.get::<_, Option<i64>>(4)?,
                "day_of_week": row.get::<_, String>(5)?,
                "start_time": row.get::<_, String>(6)?,
                "end_time": row.get::<_, String>(7)?,
                "school_year": row.get::<_, String>(8)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(schedules) => ok(&req.id, "ok", Some(json!({ "schedules": schedules }))),
        Err(e) => {
            error!(error = %e, "schedule.list failed");
            err(&req.id, "failed to list schedules")
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "save_schedule" => Some(handle_save_schedule(state, req)),
        "schedule.list" => Some(handle_schedule_list(state, req)),
        _ => None,
    }
}
