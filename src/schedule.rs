use rusqlite::{Connection, OptionalExtension};

/// Half-open interval overlap: [a_start, a_end) conflicts with
/// [b_start, b_end) iff `a_start < b_end AND b_start < a_end`.
/// Zero-padded HH:MM strings compare correctly as text.
pub fn times_overlap(a_start: &str, a_end: &str, b_start: &str, b_end: &str) -> bool {
    a_start < b_end && b_start < a_end
}

/// Accepts 24-hour "HH:MM" only.
pub fn is_valid_time(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return false;
    }
    let digits = [bytes[0], bytes[1], bytes[3], bytes[4]];
    if !digits.iter().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let hours = (bytes[0] - b'0') * 10 + (bytes[1] - b'0');
    let minutes = (bytes[3] - b'0') * 10 + (bytes[4] - b'0');
    hours < 24 && minutes < 60
}

/// Returns the id of an existing slot that overlaps the candidate interval
/// for the same (grade_level, section, day_of_week, school_year), excluding
/// the row being edited.
pub fn find_schedule_conflict(
    registrar: &Connection,
    grade_level: &str,
    section: &str,
    day_of_week: &str,
    school_year: &str,
    start_time: &str,
    end_time: &str,
    exclude_id: Option<i64>,
) -> anyhow::Result<Option<i64>> {
    let hit: Option<i64> = registrar
        .query_row(
            "SELECT id FROM class_schedules
             WHERE grade_level = ? AND section = ? AND day_of_week = ?
               AND school_year = ?
               AND start_time < ? AND ? < end_time
               AND id != ?
             LIMIT 1",
            (
                grade_level,
                section,
                day_of_week,
                school_year,
                end_time,
                start_time,
                exclude_id.unwrap_or(-1),
            ),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit)
}
