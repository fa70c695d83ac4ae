use serde_json::json;
use tracing::{error, info};

use crate::ipc::auth::require_registrar;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::sync::sync_students;

/// `sync`: reconcile the Student store into the Registrar store. Per-row
/// failures ride along in `errors`; only a store-level failure makes the
/// whole operation fail.
fn handle_sync(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(msg) = require_registrar(req) {
        return err(&req.id, msg);
    }
    let Some(stores) = state.stores.as_ref() else {
        return err(&req.id, "no workspace selected");
    };

    match sync_students(stores) {
        Ok(outcome) => {
            info!(
                inserted = outcome.inserted,
                updated = outcome.updated,
                errors = outcome.errors.len(),
                "student sync finished"
            );
            ok(
                &req.id,
                format!(
                    "sync complete: {} added, {} updated",
                    outcome.inserted, outcome.updated
                ),
                Some(json!({
                    "synced": outcome.inserted,
                    "updated": outcome.updated,
                    "errors": outcome.errors,
                })),
            )
        }
        Err(e) => {
            error!(error = %e, "student sync failed");
            err(&req.id, "sync failed")
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sync" => Some(handle_sync(state, req)),
        _ => None,
    }
}
