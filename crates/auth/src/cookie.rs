//! Session cookie parsing and issuing (header-level, framework agnostic).

use chrono::{DateTime, Utc};

use formwork_core::SessionId;

use crate::SessionPolicy;

/// Extract the session id from a raw `Cookie` header value.
///
/// Returns `None` when the named cookie is absent or empty.
pub fn session_id_from_cookie_header(header: &str, cookie_name: &str) -> Option<SessionId> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == cookie_name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
        .map(SessionId::from)
}

/// `Set-Cookie` value issuing `session_id`, expiring per the policy.
pub fn session_cookie(policy: &SessionPolicy, session_id: &SessionId, now: DateTime<Utc>) -> String {
    let expires = now
        .checked_add_signed(policy.cookie_lifetime)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    format!(
        "{}={}; Path=/; Expires={}; HttpOnly; SameSite=Lax",
        policy.cookie_name,
        session_id,
        http_date(expires)
    )
}

/// `Set-Cookie` value that makes the browser drop the session cookie.
pub fn expired_cookie(policy: &SessionPolicy) -> String {
    format!(
        "{}=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; HttpOnly; SameSite=Lax",
        policy.cookie_name
    )
}

fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
