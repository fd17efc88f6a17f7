//! Request and response bodies that never leave the client.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct LoginRequest<'a> {
    pub(super) api_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginResponse {
    pub(super) token: String,
}

/// Decodes an instance state body.
///
/// The service answers with a JSON string (`"on"`); a bare word is accepted
/// as well.
pub(super) fn decode_state(body: &str) -> String {
    serde_json::from_str::<String>(body).unwrap_or_else(|_| body.trim().to_owned())
}
