use serde_json::json;

/// Success shape: `{id, success: true, message, ...extra}`. `extra` must be
/// a JSON object; its fields are merged at the top level.
pub fn ok(
    id: &str,
    message: impl Into<String>,
    extra: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut resp = json!({
        "id": id,
        "success": true,
        "message": message.into(),
    });
    if let Some(serde_json::Value::Object(fields)) = extra {
        for (k, v) in fields {
            resp[k] = v;
        }
    }
    resp
}

/// Failure shape: `{id, success: false, message}`. Store-level detail never
/// travels here; it goes to the server log.
pub fn err(id: &str, message: impl Into<String>) -> serde_json::Value {
    json!({
        "id": id,
        "success": false,
        "message": message.into(),
    })
}
