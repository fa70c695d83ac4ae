use rusqlite::Connection;
use std::path::Path;

/// The four independently administered stores behind the registrar portal.
/// Each is its own SQLite file with its own connection; nothing here shares
/// a transaction across stores. Cross-store references (`user_id`,
/// `student_id`) are soft references resolved by value lookups.
pub struct Stores {
    pub identity: Connection,
    pub teacher: Connection,
    pub student: Connection,
    pub registrar: Connection,
}

pub fn open_stores(workspace: &Path) -> anyhow::Result<Stores> {
    std::fs::create_dir_all(workspace)?;

    let identity = Connection::open(workspace.join("login.sqlite3"))?;
    init_identity_schema(&identity)?;

    let teacher = Connection::open(workspace.join("teacher.sqlite3"))?;
    init_teacher_schema(&teacher)?;

    let student = Connection::open(workspace.join("student.sqlite3"))?;
    init_student_schema(&student)?;

    let registrar = Connection::open(workspace.join("registrar.sqlite3"))?;
    init_registrar_schema(&registrar)?;

    Ok(Stores {
        identity,
        teacher,
        student,
        registrar,
    })
}

pub fn init_identity_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_role ON users(role)",
        [],
    )?;
    Ok(())
}

pub fn init_teacher_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT,
            contact_number TEXT,
            grade_level TEXT,
            section TEXT,
            school_year TEXT,
            user_id INTEGER,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teacher_students_grade_section
         ON students(grade_level, section)",
        [],
    )?;
    Ok(())
}

pub fn init_student_schema(conn: &Connection) -> anyhow::Result<()> {
    // grade_level is deliberately nullable here: legacy imports exist with
    // the field blank, and the sync engine is the layer that refuses them.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT,
            contact_number TEXT,
            grade_level TEXT,
            section TEXT NOT NULL DEFAULT 'A',
            school_year TEXT,
            status TEXT NOT NULL DEFAULT 'Active',
            lrn TEXT,
            guardian_name TEXT,
            guardian_contact TEXT,
            user_id INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_student_students_lrn
         ON students(lrn) WHERE lrn IS NOT NULL AND lrn != ''",
        [],
    )?;
    Ok(())
}

pub fn init_registrar_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT,
            contact_number TEXT,
            birthdate TEXT,
            gender TEXT,
            address TEXT,
            grade_level TEXT NOT NULL,
            section TEXT,
            school_year TEXT,
            status TEXT NOT NULL DEFAULT 'Active',
            lrn TEXT,
            guardian_name TEXT,
            guardian_contact TEXT,
            user_id INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_registrar_students_grade_section
         ON students(grade_level, section)",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_registrar_students_lrn
         ON students(lrn) WHERE lrn IS NOT NULL AND lrn != ''",
        [],
    )?;

    // Existing workspaces may predate the is_active flag.
    ensure_students_is_active(conn)?;

    // No compound-unique constraint on (grade_level, section, school_year):
    // the section-identity invariant is enforced at the application layer.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_sections(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            grade_level TEXT NOT NULL,
            section TEXT NOT NULL,
            room_number TEXT,
            adviser_id INTEGER,
            school_year TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_sections_grade
         ON class_sections(grade_level, section)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_schedules(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            grade_level TEXT NOT NULL,
            section TEXT NOT NULL,
            subject_id INTEGER,
            teacher_id INTEGER,
            day_of_week TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            school_year TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_schedules_slot
         ON class_schedules(grade_level, section, day_of_week, school_year)",
        [],
    )?;
    Ok(())
}

fn ensure_students_is_active(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "is_active")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE students ADD COLUMN is_active INTEGER NOT NULL DEFAULT 1",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Timestamp format shared by all four stores.
pub fn now_stamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
pub fn open_memory_stores() -> Stores {
    let identity = Connection::open_in_memory().expect("identity store");
    init_identity_schema(&identity).expect("identity schema");
    let teacher = Connection::open_in_memory().expect("teacher store");
    init_teacher_schema(&teacher).expect("teacher schema");
    let student = Connection::open_in_memory().expect("student store");
    init_student_schema(&student).expect("student schema");
    let registrar = Connection::open_in_memory().expect("registrar store");
    init_registrar_schema(&registrar).expect("registrar schema");
    Stores {
        identity,
        teacher,
        student,
        registrar,
    }
}
