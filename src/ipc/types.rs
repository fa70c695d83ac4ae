use std::path::PathBuf;

use serde::Deserialize;

use crate::db::Stores;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Authenticated principal, as resolved by the session layer in front of
    /// this daemon. Absent means unauthenticated.
    #[serde(default)]
    pub actor: Option<Actor>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Actor {
    pub user_id: i64,
    pub role: Role,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Registrar,
    Admin,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub stores: Option<Stores>,
}
