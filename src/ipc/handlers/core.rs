use std::path::PathBuf;

use serde_json::json;
use tracing::{error, info};

use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        "ok",
        Some(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspace": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        })),
    )
}

/// Opens (or creates) the four store files under the given directory. Any
/// connection failure aborts the whole operation; there is no partial open.
fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(path) = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
    else {
        return err(&req.id, "missing params.path");
    };

    match db::open_stores(&path) {
        Ok(stores) => {
            info!(workspace = %path.display(), "workspace opened");
            state.workspace = Some(path.clone());
            state.stores = Some(stores);
            ok(
                &req.id,
                "workspace opened",
                Some(json!({ "workspace": path.to_string_lossy() })),
            )
        }
        Err(e) => {
            error!(workspace = %path.display(), error = %e, "failed to open stores");
            err(&req.id, "failed to connect to the student record stores")
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
