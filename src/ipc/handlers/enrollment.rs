use serde_json::json;
use tracing::{error, info};

use crate::enroll::{self, EnrollError};
use crate::ipc::auth::require_registrar;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::validate::{validate_enroll, EnrollInput};

/// `enroll`: one principal plus three domain records, or nothing.
fn handle_enroll(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(msg) = require_registrar(req) {
        return err(&req.id, msg);
    }
    let Some(stores) = state.stores.as_ref() else {
        return err(&req.id, "no workspace selected");
    };

    let input: EnrollInput = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, format!("bad params: {}", e)),
    };

    // Every validation problem is reported at once, before any store access.
    let issues = validate_enroll(&input);
    if !issues.is_empty() {
        return err(&req.id, issues.join("; "));
    }

    match enroll::enroll(stores, &input) {
        Ok(student_id) => {
            info!(%student_id, username = %input.username, "student enrolled");
            ok(
                &req.id,
                "student enrolled",
                Some(json!({ "student_id": student_id })),
            )
        }
        Err(EnrollError::Conflict(msg)) => err(&req.id, msg),
        Err(EnrollError::Store(e)) => {
            // Which store failed is operator information, not caller
            // information.
            error!(username = %input.username, error = %e, "enrollment failed");
            err(&req.id, "enrollment failed; no records were created")
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enroll" => Some(handle_enroll(state, req)),
        _ => None,
    }
}
