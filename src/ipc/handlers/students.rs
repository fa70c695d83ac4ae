use rusqlite::types::Value;
use rusqlite::OptionalExtension;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::db::{now_stamp, Stores};
use crate::ipc::auth::require_registrar;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::sync::resolve_user_id;
use crate::validate::{is_valid_email, is_valid_status};

/// Point edit against the Registrar store, keyed by business key. The field
/// set is fixed and reviewed; column names never come from the caller.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StudentUpdateInput {
    student_id: String,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    contact_number: Option<String>,
    birthdate: Option<String>,
    gender: Option<String>,
    address: Option<String>,
    grade_level: Option<String>,
    section: Option<String>,
    school_year: Option<String>,
    status: Option<String>,
    lrn: Option<String>,
    guardian_name: Option<String>,
    guardian_contact: Option<String>,
}

impl StudentUpdateInput {
    fn columns(&self) -> [(&'static str, &Option<String>); 14] {
        [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("email", &self.email),
            ("contact_number", &self.contact_number),
            ("birthdate", &self.birthdate),
            ("gender", &self.gender),
            ("address", &self.address),
            ("grade_level", &self.grade_level),
            ("section", &self.section),
            ("school_year", &self.school_year),
            ("status", &self.status),
            ("lrn", &self.lrn),
            ("guardian_name", &self.guardian_name),
            ("guardian_contact", &self.guardian_contact),
        ]
    }
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(msg) = require_registrar(req) {
        return err(&req.id, msg);
    }
    let Some(stores) = state.stores.as_ref() else {
        return err(&req.id, "no workspace selected");
    };

    let input: StudentUpdateInput = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, format!("bad params: {}", e)),
    };
    if input.student_id.trim().is_empty() {
        return err(&req.id, "student_id is required");
    }
    if let Some(status) = input.status.as_deref() {
        if !is_valid_status(status) {
            return err(
                &req.id,
                "status must be one of Active, Inactive, Pending, Transferred, Graduated",
            );
        }
    }
    if let Some(email) = input.email.as_deref() {
        if !is_valid_email(email.trim()) {
            return err(&req.id, "email is not a valid address");
        }
    }
    if input.columns().iter().all(|(_, v)| v.is_none()) {
        return err(&req.id, "nothing to update");
    }

    let existing: Option<(i64, Option<i64>)> = match stores
        .registrar
        .query_row(
            "SELECT id, user_id FROM students WHERE student_id = ?",
            [input.student_id.trim()],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, student_id = %input.student_id, "students.update: lookup failed");
            return err(&req.id, "failed to update student");
        }
    };
    let Some((row_id, user_id)) = existing else {
        return err(&req.id, "student not found");
    };

    match apply_update(stores, &input, row_id, user_id) {
        Ok(()) => {
            info!(student_id = %input.student_id, "student record updated");
            ok(&req.id, "student updated", None)
        }
        Err(e) => {
            error!(error = %e, student_id = %input.student_id, "students.update failed");
            err(&req.id, "failed to update student")
        }
    }
}

/// The registrar edit and the identity-store email edit each run in their
/// own store's transaction; both roll back together on the first error.
fn apply_update(
    stores: &Stores,
    input: &StudentUpdateInput,
    row_id: i64,
    user_id: Option<i64>,
) -> anyhow::Result<()> {
    let rtx = stores.registrar.unchecked_transaction()?;
    let itx = stores.identity.unchecked_transaction()?;

    let result = (|| -> anyhow::Result<()> {
        let stamp = now_stamp();
        let mut sets = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        for (col, maybe) in input.columns() {
            if let Some(v) = maybe {
                sets.push(format!("{} = ?", col));
                values.push(Value::Text(v.trim().to_string()));
            }
        }
        sets.push("updated_at = ?".to_string());
        values.push(Value::Text(stamp.clone()));
        values.push(Value::Integer(row_id));

        let sql = format!("UPDATE students SET {} WHERE id = ?", sets.join(", "));
        rtx.execute(&sql, rusqlite::params_from_iter(values))?;

        // A changed email follows the soft reference back to the principal,
        // but only when that principal actually exists right now.
        if let Some(email) = input.email.as_deref() {
            if let Some(uid) = resolve_user_id(&stores.identity, user_id)? {
                itx.execute(
                    "UPDATE users SET email = ?, updated_at = ? WHERE id = ?",
                    (email.trim(), &stamp, uid),
                )?;
            }
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            rtx.commit()?;
            itx.commit()?;
            Ok(())
        }
        Err(e) => {
            let _ = rtx.rollback();
            let _ = itx.rollback();
            Err(e)
        }
    }
}

struct StudentRow {
    id: i64,
    student_id: String,
    first_name: String,
    last_name: String,
    email: Option<String>,
    grade_level: String,
    section: Option<String>,
    school_year: Option<String>,
    status: String,
    lrn: Option<String>,
    user_id: Option<i64>,
    is_active: i64,
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(stores) = state.stores.as_ref() else {
        return err(&req.id, "no workspace selected");
    };

    let grade_level = req
        .params
        .get("grade_level")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let search = req
        .params
        .get("search")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| format!("%{}%", s.trim()));

    let rows: Result<Vec<StudentRow>, _> = stores
        .registrar
        .prepare(
            "SELECT id, student_id, first_name, last_name, email, grade_level,
                    section, school_year, status, lrn, user_id, is_active
             FROM students
             WHERE (?1 IS NULL OR grade_level = ?1)
               AND (?2 IS NULL OR first_name LIKE ?2 OR last_name LIKE ?2
                    OR student_id LIKE ?2)
             ORDER BY last_name, first_name",
        )
        .and_then(|mut stmt| {
            stmt.query_map((grade_level, search), |row| {
                Ok(StudentRow {
                    id: row.get(0)?,
                    student_id: row.get(1)?,
                    first_name: row.get(2)?,
                    last_name: row.get(3)?,
                    email: row.get(4)?,
                    grade_level: row.get(5)?,
                    section: row.get(6)?,
                    school_year: row.get(7)?,
                    status: row.get(8)?,
                    lrn: row.get(9)?,
                    user_id: row.get(10)?,
                    is_active: row.get(11)?,
                })
            })?
            .collect()
        });
    let rows = match rows {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "students.list failed");
            return err(&req.id, "failed to list students");
        }
    };

    // The display username lives in the identity store; resolve each soft
    // reference individually and tolerate missing principals.
    let mut students = Vec::with_capacity(rows.len());
    for row in rows {
        let username: Option<String> = match row.user_id {
            Some(uid) => stores
                .identity
                .query_row("SELECT username FROM users WHERE id = ?", [uid], |r| {
                    r.get(0)
                })
                .optional()
                .unwrap_or(None),
            None => None,
        };
        students.push(json!({
            "id": row.id,
            "student_id": row.student_id,
            "first_name": row.first_name,
            "last_name": row.last_name,
            "email": row.email,
            "grade_level": row.grade_level,
            "section": row.section,
            "school_year": row.school_year,
            "status": row.status,
            "lrn": row.lrn,
            "username": username,
            "is_active": row.is_active != 0,
        }));
    }

    ok(&req.id, "ok", Some(json!({ "students": students })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        _ => None,
    }
}
