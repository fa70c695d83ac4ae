use chrono::{Datelike, Local};
use rusqlite::{OptionalExtension, Transaction};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db::{now_stamp, Stores};
use crate::validate::EnrollInput;

/// Enrollment failures the caller is allowed to distinguish: uniqueness
/// conflicts carry their specific message; everything store-side collapses
/// into one generic failure (details go to the server log only).
#[derive(Debug)]
pub enum EnrollError {
    Conflict(String),
    Store(anyhow::Error),
}

impl std::fmt::Display for EnrollError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnrollError::Conflict(msg) => write!(f, "{}", msg),
            EnrollError::Store(e) => write!(f, "store failure: {}", e),
        }
    }
}

impl std::error::Error for EnrollError {}

impl From<rusqlite::Error> for EnrollError {
    fn from(e: rusqlite::Error) -> Self {
        EnrollError::Store(e.into())
    }
}

/// Creates one principal plus three domain records for a validated applicant.
///
/// Four stores means four independent transactions; they are committed in
/// sequence only after every insert succeeded, and all still-open ones are
/// rolled back on the first error. A crash between commits can still leave
/// the stores divergent; a later `sync` heals the registrar side.
pub fn enroll(stores: &Stores, input: &EnrollInput) -> Result<String, EnrollError> {
    if let Some(msg) = find_conflict(stores, input).map_err(EnrollError::Store)? {
        return Err(EnrollError::Conflict(msg));
    }

    let year = Local::now().year();
    let student_id = generate_student_id(stores, year).map_err(EnrollError::Store)?;
    let school_year = format!("{}-{}", year, year + 1);

    let itx = stores.identity.unchecked_transaction()?;
    let ttx = stores.teacher.unchecked_transaction()?;
    let stx = stores.student.unchecked_transaction()?;
    let rtx = stores.registrar.unchecked_transaction()?;

    match write_quadruple(&itx, &ttx, &stx, &rtx, input, &student_id, &school_year) {
        Ok(()) => {
            // A failed commit here is reported as a store error; transactions
            // not yet committed roll back on drop.
            itx.commit()?;
            ttx.commit()?;
            stx.commit()?;
            rtx.commit()?;
            Ok(student_id)
        }
        Err(e) => {
            let _ = itx.rollback();
            let _ = ttx.rollback();
            let _ = stx.rollback();
            let _ = rtx.rollback();
            Err(EnrollError::Store(e))
        }
    }
}

fn write_quadruple(
    itx: &Transaction<'_>,
    ttx: &Transaction<'_>,
    stx: &Transaction<'_>,
    rtx: &Transaction<'_>,
    input: &EnrollInput,
    student_id: &str,
    school_year: &str,
) -> anyhow::Result<()> {
    let stamp = now_stamp();
    let section = if input.section.trim().is_empty() {
        "A"
    } else {
        input.section.trim()
    };

    itx.execute(
        "INSERT INTO users(username, password, email, role, created_at)
         VALUES(?, ?, ?, 'student', ?)",
        (
            input.username.trim(),
            hash_password(&input.password),
            input.email.trim(),
            &stamp,
        ),
    )?;
    let user_id = itx.last_insert_rowid();

    ttx.execute(
        "INSERT INTO students(student_id, first_name, last_name, email,
            contact_number, grade_level, section, school_year, user_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            student_id,
            input.first_name.trim(),
            input.last_name.trim(),
            input.email.trim(),
            input.contact_number.trim(),
            input.grade_level.trim(),
            section,
            school_year,
            user_id,
            &stamp,
        ),
    )?;

    stx.execute(
        "INSERT INTO students(student_id, first_name, last_name, email,
            contact_number, grade_level, section, school_year, status, lrn,
            user_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, 'Active', ?, ?, ?)",
        (
            student_id,
            input.first_name.trim(),
            input.last_name.trim(),
            input.email.trim(),
            input.contact_number.trim(),
            input.grade_level.trim(),
            section,
            school_year,
            input.lrn.trim(),
            user_id,
            &stamp,
        ),
    )?;

    // Birthdate is not part of the application form; the registrar record
    // carries today's date as a placeholder until a registrar edits it.
    let birthdate = Local::now().format("%Y-%m-%d").to_string();
    rtx.execute(
        "INSERT INTO students(student_id, first_name, last_name, email,
            contact_number, birthdate, grade_level, section, school_year,
            status, lrn, user_id, is_active, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, 'Active', ?, ?, 1, ?)",
        (
            student_id,
            input.first_name.trim(),
            input.last_name.trim(),
            input.email.trim(),
            input.contact_number.trim(),
            &birthdate,
            input.grade_level.trim(),
            section,
            school_year,
            input.lrn.trim(),
            user_id,
            &stamp,
        ),
    )?;

    Ok(())
}

/// Pre-insert uniqueness checks. These close nothing against a concurrent
/// request (check-then-act); the store-level unique indexes are the backstop.
fn find_conflict(stores: &Stores, input: &EnrollInput) -> anyhow::Result<Option<String>> {
    let username_taken: Option<i64> = stores
        .identity
        .query_row(
            "SELECT 1 FROM users WHERE username = ?",
            [input.username.trim()],
            |r| r.get(0),
        )
        .optional()?;
    if username_taken.is_some() {
        return Ok(Some("username is already taken".to_string()));
    }

    let email = input.email.trim();
    for conn in [&stores.teacher, &stores.student, &stores.registrar] {
        let hit: Option<i64> = conn
            .query_row("SELECT 1 FROM students WHERE email = ?", [email], |r| {
                r.get(0)
            })
            .optional()?;
        if hit.is_some() {
            return Ok(Some("email is already registered".to_string()));
        }
    }

    let lrn = input.lrn.trim();
    if !lrn.is_empty() {
        for conn in [&stores.student, &stores.registrar] {
            let hit: Option<i64> = conn
                .query_row("SELECT 1 FROM students WHERE lrn = ?", [lrn], |r| r.get(0))
                .optional()?;
            if hit.is_some() {
                return Ok(Some("LRN is already registered".to_string()));
            }
        }
    }

    Ok(None)
}

/// Business key: `S-<year>-<5 digits>`. The digits are random, so the key is
/// re-rolled until it is unused in every domain store (bounded retry).
pub fn generate_student_id(stores: &Stores, year: i32) -> anyhow::Result<String> {
    for _ in 0..32 {
        let digits = (Uuid::new_v4().as_u128() % 100_000) as u32;
        let key = format!("S-{}-{:05}", year, digits);
        if !business_key_taken(stores, &key)? {
            return Ok(key);
        }
    }
    anyhow::bail!("could not allocate an unused student id after 32 attempts")
}

fn business_key_taken(stores: &Stores, key: &str) -> anyhow::Result<bool> {
    for conn in [&stores.teacher, &stores.student, &stores.registrar] {
        let hit: Option<i64> = conn
            .query_row("SELECT 1 FROM students WHERE student_id = ?", [key], |r| {
                r.get(0)
            })
            .optional()?;
        if hit.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Salted SHA-256, stored as `<salt>$<hex digest>`. Plaintext never lands in
/// the identity store.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}${}", salt, hex)
}
