//! Auth-expiry signal detection
//!
//! Only a 401 whose body carries the `AUTH_EXPIRED` code counts as an expired
//! credential. Other 401s (missing or malformed credentials) are ordinary
//! responses and never trigger a refresh.

/// Machine-readable code identifying an expired access credential.
pub const AUTH_EXPIRED_CODE: &str = "AUTH_EXPIRED";

/// Extract the application error code from a JSON body.
///
/// Accepts both `{"code": "..."}` and `{"error": {"code": "..."}}`. Non-JSON
/// bodies have no code.
pub fn error_code(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("code")
        .or_else(|| value.get("error").and_then(|e| e.get("code")))
        .and_then(|c| c.as_str())
        .map(str::to_owned)
}

/// Whether a response is the auth-expiry signal.
pub fn is_auth_expired(status: u16, body: &[u8]) -> bool {
    status == 401 && error_code(body).as_deref() == Some(AUTH_EXPIRED_CODE)
}
