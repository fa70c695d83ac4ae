use rusqlite::{Connection, OptionalExtension};
use tracing::warn;

use crate::db::{now_stamp, Stores};

/// Result of one sync pass. `inserted` is what the wire reports as `synced`.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

/// One Student-store row as read for reconciliation. Nullable columns stay
/// optional here; `sync_row` decides what a usable row requires.
#[derive(Debug)]
struct SourceRow {
    student_id: String,
    first_name: String,
    last_name: String,
    email: Option<String>,
    contact_number: Option<String>,
    grade_level: Option<String>,
    section: Option<String>,
    school_year: Option<String>,
    status: Option<String>,
    lrn: Option<String>,
    guardian_name: Option<String>,
    guardian_contact: Option<String>,
    user_id: Option<i64>,
}

/// Reconciles every Student-store record into the Registrar store, upserting
/// on the business key. The source store is read-only for this operation and
/// the registrar side runs under a single transaction committed once at the
/// end, even when individual rows errored.
///
/// A malformed source row must not block the rest of the batch: each row's
/// failure is recorded against its business key and the loop continues.
pub fn sync_students(stores: &Stores) -> anyhow::Result<SyncOutcome> {
    let rows = read_source_rows(&stores.student)?;

    let rtx = stores.registrar.unchecked_transaction()?;
    let stamp = now_stamp();
    let mut outcome = SyncOutcome::default();

    for row in &rows {
        match sync_row(&rtx, &stores.identity, row, &stamp) {
            Ok(Upserted::Inserted) => outcome.inserted += 1,
            Ok(Upserted::Updated) => outcome.updated += 1,
            Err(e) => {
                warn!(student_id = %row.student_id, error = %e, "sync: row skipped");
                outcome.errors.push(format!("{}: {}", row.student_id, e));
            }
        }
    }

    rtx.commit()?;
    Ok(outcome)
}

enum Upserted {
    Inserted,
    Updated,
}

fn read_source_rows(student: &Connection) -> anyhow::Result<Vec<SourceRow>> {
    let mut stmt = student.prepare(
        "SELECT student_id, first_name, last_name, email, contact_number,
                grade_level, section, school_year, status, lrn,
                guardian_name, guardian_contact, user_id
         FROM students
         ORDER BY student_id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(SourceRow {
                student_id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                email: row.get(3)?,
                contact_number: row.get(4)?,
                grade_level: row.get(5)?,
                section: row.get(6)?,
                school_year: row.get(7)?,
                status: row.get(8)?,
                lrn: row.get(9)?,
                guardian_name: row.get(10)?,
                guardian_contact: row.get(11)?,
                user_id: row.get(12)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn sync_row(
    registrar: &Connection,
    identity: &Connection,
    row: &SourceRow,
    stamp: &str,
) -> anyhow::Result<Upserted> {
    let grade_level = row
        .grade_level
        .as_deref()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing grade_level"))?;
    if row.first_name.trim().is_empty() || row.last_name.trim().is_empty() {
        anyhow::bail!("missing name fields");
    }

    let user_id = resolve_user_id(identity, row.user_id)?;

    let existing: Option<i64> = registrar
        .query_row(
            "SELECT id FROM students WHERE student_id = ?",
            [&row.student_id],
            |r| r.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            // Everything mutable is overwritten; the business key never is.
            registrar.execute(
                "UPDATE students SET
                    first_name = ?, last_name = ?, email = ?, contact_number = ?,
                    grade_level = ?, section = ?, school_year = ?, status = ?,
                    lrn = ?, guardian_name = ?, guardian_contact = ?, user_id = ?,
                    updated_at = ?
                 WHERE id = ?",
                (
                    row.first_name.trim(),
                    row.last_name.trim(),
                    &row.email,
                    &row.contact_number,
                    grade_level,
                    &row.section,
                    &row.school_year,
                    row.status.as_deref().unwrap_or("Active"),
                    &row.lrn,
                    &row.guardian_name,
                    &row.guardian_contact,
                    user_id,
                    stamp,
                    id,
                ),
            )?;
            Ok(Upserted::Updated)
        }
        None => {
            registrar.execute(
                "INSERT INTO students(student_id, first_name, last_name, email,
                    contact_number, grade_level, section, school_year, status,
                    lrn, guardian_name, guardian_contact, user_id, is_active,
                    created_at, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
                (
                    &row.student_id,
                    row.first_name.trim(),
                    row.last_name.trim(),
                    &row.email,
                    &row.contact_number,
                    grade_level,
                    &row.section,
                    &row.school_year,
                    row.status.as_deref().unwrap_or("Active"),
                    &row.lrn,
                    &row.guardian_name,
                    &row.guardian_contact,
                    user_id,
                    stamp,
                    stamp,
                ),
            )?;
            Ok(Upserted::Inserted)
        }
    }
}

/// Soft-reference resolution: a `user_id` is propagated only when the
/// principal row is confirmed to exist in the identity store right now.
/// Anything else becomes NULL, never a stale value.
pub fn resolve_user_id(identity: &Connection, user_id: Option<i64>) -> anyhow::Result<Option<i64>> {
    let Some(uid) = user_id else {
        return Ok(None);
    };
    let confirmed: Option<i64> = identity
        .query_row("SELECT id FROM users WHERE id = ?", [uid], |r| r.get(0))
        .optional()?;
    Ok(confirmed)
}
