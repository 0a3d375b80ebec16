//! Session cookie middleware.
//!
//! Every request is assigned a [`SessionId`]: the one in the session cookie
//! when it is well formed, a fresh one otherwise. The hub is touched, the id
//! is stored in the request extensions and the cookie is reissued on the
//! response.

use crate::app::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Uri, header},
    middleware::Next,
    response::Response,
};
use tether_std::hub::SessionId;
use tracing::debug;

const MAX_SESSION_ID_LEN: usize = 64;

/// Whether a request arrived over a secure connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Secure(pub bool);

pub(crate) fn request_is_secure(uri: &Uri, headers: &HeaderMap, trust_forwarded: bool) -> bool {
    if uri.scheme_str() == Some("https") {
        return true;
    }
    trust_forwarded
        && headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

fn valid_session_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_SESSION_ID_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Read a cookie value by name.
pub(crate) fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
}

/// The `Set-Cookie` value for a session.
pub(crate) fn session_cookie(name: &str, session: &SessionId, secure: bool) -> String {
    let mut cookie = format!("{name}={session}; Path=/; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub(crate) async fn session_layer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let config = state.config();
    let secure = request_is_secure(
        request.uri(),
        request.headers(),
        config.trust_forwarded_proto,
    );
    let session = match read_cookie(request.headers(), &config.cookie_name) {
        Some(value) if valid_session_id(value) => SessionId::new(value),
        _ => {
            let session = SessionId::generate();
            debug!(%session, "new session");
            session
        }
    };
    state.hub().touch(&session);

    let cookie = session_cookie(&config.cookie_name, &session, secure);
    request.extensions_mut().insert(session);
    request.extensions_mut().insert(Secure(secure));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; tether_sid=abc-123 ; lang=en"),
        );
        assert_eq!(read_cookie(&headers, "tether_sid"), Some("abc-123"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_session_id_charset() {
        assert!(valid_session_id("0b6f2c1e-7d4a-4b8e-9c1d-2f3e4a5b6c7d"));
        assert!(!valid_session_id(""));
        assert!(!valid_session_id("a\"b"));
        assert!(!valid_session_id(&"a".repeat(65)));
    }

    #[test]
    fn test_secure_detection() {
        let uri: Uri = "/x".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert!(!request_is_secure(&uri, &headers, true));

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https, http"));
        assert!(request_is_secure(&uri, &headers, true));
        assert!(!request_is_secure(&uri, &headers, false));

        let absolute: Uri = "https://example.com/x".parse().unwrap();
        assert!(request_is_secure(&absolute, &HeaderMap::new(), false));
    }

    #[test]
    fn test_cookie_attributes() {
        let session = SessionId::new("s1");
        assert_eq!(
            session_cookie("tether_sid", &session, false),
            "tether_sid=s1; Path=/; HttpOnly; SameSite=Lax"
        );
        assert!(session_cookie("tether_sid", &session, true).ends_with("; Secure"));
    }
}
