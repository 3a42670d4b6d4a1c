//! Per-request user identity.
//!
//! Each request names its own user through, in order of precedence, the
//! `X-User-Id` header, a `user_id` query parameter, or the `user_id` cookie
//! handed out by `/get_userid/{user_id}`. Nothing about the user is kept in
//! server state. Blank values count as absent; a supplied value that is not a
//! usable id rejects the request.

use std::collections::HashMap;

use axum::async_trait;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ID_COOKIE: &str = "user_id";
pub const USER_ID_QUERY: &str = "user_id";
const MAX_USER_ID_LEN: usize = 128;

/// The caller's user id, if the request carried one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUser(pub Option<String>);

impl RequestUser {
    pub fn id(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid user id '{0}'")]
pub struct InvalidUserId(pub String);

impl IntoResponse for InvalidUserId {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestUser
where
    S: Send + Sync,
{
    type Rejection = InvalidUserId;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        resolve_user_id(parts).map(RequestUser)
    }
}

/// The first non-blank source wins, valid or not.
fn resolve_user_id(parts: &Parts) -> Result<Option<String>, InvalidUserId> {
    let supplied = from_header(&parts.headers)
        .or_else(|| from_query(parts))
        .or_else(|| from_cookie(&parts.headers));
    match supplied {
        Some(id) if is_valid_user_id(&id) => Ok(Some(id)),
        Some(id) => {
            tracing::warn!(user_id = %id, "Rejecting request with invalid user id");
            Err(InvalidUserId(id))
        }
        None => Ok(None),
    }
}

fn from_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| non_blank(&String::from_utf8_lossy(value.as_bytes())))
}

fn from_query(parts: &Parts) -> Option<String> {
    let Query(params) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri).ok()?;
    params.get(USER_ID_QUERY).and_then(|value| non_blank(value))
}

fn from_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == USER_ID_COOKIE)
        .and_then(|(_, value)| non_blank(value.trim_matches('"')))
}

fn non_blank(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Printable ASCII without path, cookie or quoting delimiters.
pub fn is_valid_user_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= MAX_USER_ID_LEN
        && candidate != "."
        && candidate != ".."
        && candidate
            .chars()
            .all(|c| c.is_ascii_graphic() && !matches!(c, '/' | '\\' | ';' | ',' | '"' | '='))
}

/// `Set-Cookie` value binding this client (and only this client) to `user_id`.
///
/// Cross-site cookies need `SameSite=None; Secure` so browsers send them on
/// credentialed cross-origin requests.
pub fn user_cookie(user_id: &str, cross_site: bool) -> Option<HeaderValue> {
    if !is_valid_user_id(user_id) {
        return None;
    }
    let same_site = if cross_site {
        "SameSite=None; Secure"
    } else {
        "SameSite=Lax"
    };
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; {}",
        USER_ID_COOKIE, user_id, same_site
    ))
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn resolved(p: &Parts) -> Option<String> {
        resolve_user_id(p).unwrap()
    }

    #[test]
    fn header_beats_query_beats_cookie() {
        let all = parts(
            "/get_personality_scores?user_id=from-query",
            &[("x-user-id", "from-header"), ("cookie", "user_id=from-cookie")],
        );
        assert_eq!(resolved(&all).as_deref(), Some("from-header"));

        let no_header = parts(
            "/get_personality_scores?user_id=from-query",
            &[("cookie", "user_id=from-cookie")],
        );
        assert_eq!(resolved(&no_header).as_deref(), Some("from-query"));

        let cookie_only = parts(
            "/get_personality_scores",
            &[("cookie", "theme=dark; user_id=from-cookie")],
        );
        assert_eq!(resolved(&cookie_only).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn blank_sources_fall_through() {
        let p = parts(
            "/x?user_id=%20%20",
            &[("x-user-id", "   "), ("cookie", "user_id=ok-123")],
        );
        assert_eq!(resolved(&p).as_deref(), Some("ok-123"));

        assert_eq!(resolved(&parts("/x", &[])), None);
    }

    #[test]
    fn invalid_explicit_id_is_rejected_not_skipped() {
        let p = parts(
            "/x",
            &[("x-user-id", "alice/../x"), ("cookie", "user_id=bob")],
        );
        assert_eq!(
            resolve_user_id(&p),
            Err(InvalidUserId("alice/../x".to_string()))
        );

        let q = parts("/x?user_id=a%3Bb", &[("cookie", "user_id=bob")]);
        assert_eq!(resolve_user_id(&q), Err(InvalidUserId("a;b".to_string())));
    }

    #[test]
    fn query_values_are_percent_decoded() {
        let p = parts("/x?user_id=abc%40example.com", &[]);
        assert_eq!(resolved(&p).as_deref(), Some("abc@example.com"));
    }

    #[test]
    fn validity_rules() {
        assert!(is_valid_user_id("Xk3fK29aPq0aZ1bC2dE3fG4hI5j"));
        assert!(!is_valid_user_id(""));
        assert!(!is_valid_user_id(".."));
        assert!(!is_valid_user_id("has space"));
        assert!(!is_valid_user_id("semi;colon"));
        assert!(!is_valid_user_id(&"x".repeat(129)));
    }

    #[test]
    fn cookie_value_round_trips_through_resolution() {
        let cookie = user_cookie("uid-42", false).unwrap();
        let set = cookie.to_str().unwrap();
        assert!(set.starts_with("user_id=uid-42;"));
        assert!(set.contains("HttpOnly"));
        assert!(set.ends_with("SameSite=Lax"));

        let pair = set.split(';').next().unwrap();
        let p = parts("/x", &[("cookie", pair)]);
        assert_eq!(resolved(&p).as_deref(), Some("uid-42"));

        assert!(user_cookie("bad id", false).is_none());
    }

    #[test]
    fn cross_site_cookie_is_secure_and_unrestricted() {
        let cookie = user_cookie("uid-42", true).unwrap();
        assert!(cookie
            .to_str()
            .unwrap()
            .ends_with("SameSite=None; Secure"));
    }
}
