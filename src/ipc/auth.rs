use super::types::{Request, Role};

/// Capability check for registrar-only operations. Session handling itself
/// lives outside this daemon; requests arrive with the resolved principal
/// attached, and this is the single place that judges it.
pub fn require_registrar(req: &Request) -> Result<(), String> {
    match &req.actor {
        Some(actor) if matches!(actor.role, Role::Registrar | Role::Admin) => Ok(()),
        Some(_) => Err("this operation requires the registrar role".to_string()),
        None => Err("not authenticated".to_string()),
    }
}
