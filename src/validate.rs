use serde::Deserialize;

/// Applicant input for enrollment. A fixed, typed field set: handlers never
/// build SQL from caller-supplied column names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnrollInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub contact_number: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    pub grade_level: String,
    pub section: String,
    pub lrn: String,
}

/// Collects every problem with the input so the caller sees one message
/// naming all of them, not just the first.
pub fn validate_enroll(input: &EnrollInput) -> Vec<String> {
    let mut issues = Vec::new();

    let required: [(&str, &str); 7] = [
        ("first_name", &input.first_name),
        ("last_name", &input.last_name),
        ("email", &input.email),
        ("username", &input.username),
        ("password", &input.password),
        ("grade_level", &input.grade_level),
        ("lrn", &input.lrn),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            issues.push(format!("{} is required", name));
        }
    }

    if !input.email.trim().is_empty() && !is_valid_email(input.email.trim()) {
        issues.push("email is not a valid address".to_string());
    }
    if !input.password.is_empty() {
        if input.password.len() < 8 {
            issues.push("password must be at least 8 characters".to_string());
        }
        if input.password != input.confirm_password {
            issues.push("password confirmation does not match".to_string());
        }
    }

    issues
}

pub fn is_valid_email(s: &str) -> bool {
    if s.contains(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

pub const STUDENT_STATUSES: [&str; 5] =
    ["Active", "Inactive", "Pending", "Transferred", "Graduated"];

pub fn is_valid_status(s: &str) -> bool {
    STUDENT_STATUSES.contains(&s)
}
