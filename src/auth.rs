//! Admin authentication: HTTP Basic against one configured credential pair.
//!
//! The verdict logic is a pure function over the raw header value so it can
//! be tested without a request in flight; the axum middleware around it
//! only shapes the responses.

use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};

const CHALLENGE: &str = "Basic realm=\"Admin Area\"";

/// Outcome of inspecting an Authorization header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthVerdict {
    /// Credentials match the configured pair.
    Authorized,
    /// Header missing or credentials wrong; respond 401 with a challenge.
    Unauthorized,
    /// Wrong scheme or undecodable payload; respond 400.
    Malformed,
}

/// Check a raw `Authorization` header value against the configured pair.
pub fn check_basic_auth(header: Option<&str>, user: &str, pass: &str) -> AuthVerdict {
    let Some(value) = header else {
        return AuthVerdict::Unauthorized;
    };
    let Some((scheme, encoded)) = value.split_once(' ') else {
        return AuthVerdict::Malformed;
    };
    if !scheme.eq_ignore_ascii_case("Basic") {
        return AuthVerdict::Malformed;
    }
    let Ok(decoded) = general_purpose::STANDARD.decode(encoded.trim()) else {
        return AuthVerdict::Malformed;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return AuthVerdict::Malformed;
    };
    let Some((candidate_user, candidate_pass)) = decoded.split_once(':') else {
        return AuthVerdict::Malformed;
    };
    if candidate_user == user && candidate_pass == pass {
        AuthVerdict::Authorized
    } else {
        AuthVerdict::Unauthorized
    }
}

/// Middleware guarding the admin routes.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match check_basic_auth(header, &state.config.admin_user, &state.config.admin_pass) {
        AuthVerdict::Authorized => next.run(request).await,
        AuthVerdict::Malformed => (StatusCode::BAD_REQUEST, "Bad request").into_response(),
        AuthVerdict::Unauthorized => {
            let mut response =
                (StatusCode::UNAUTHORIZED, "Authentication required.").into_response();
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(CHALLENGE),
            );
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(user: &str, pass: &str) -> String {
        format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!("{user}:{pass}"))
        )
    }

    #[test]
    fn accepts_exactly_the_configured_pair() {
        let header = basic("admin", "secret");
        assert_eq!(
            check_basic_auth(Some(&header), "admin", "secret"),
            AuthVerdict::Authorized
        );
    }

    #[test]
    fn rejects_wrong_credentials() {
        let header = basic("admin", "wrong");
        assert_eq!(
            check_basic_auth(Some(&header), "admin", "secret"),
            AuthVerdict::Unauthorized
        );
        let header = basic("other", "secret");
        assert_eq!(
            check_basic_auth(Some(&header), "admin", "secret"),
            AuthVerdict::Unauthorized
        );
    }

    #[test]
    fn missing_header_gets_a_challenge() {
        assert_eq!(
            check_basic_auth(None, "admin", "secret"),
            AuthVerdict::Unauthorized
        );
    }

    #[test]
    fn wrong_scheme_or_garbage_is_malformed() {
        assert_eq!(
            check_basic_auth(Some("Bearer abcdef"), "admin", "secret"),
            AuthVerdict::Malformed
        );
        assert_eq!(
            check_basic_auth(Some("Basic !!!not-base64!!!"), "admin", "secret"),
            AuthVerdict::Malformed
        );
        assert_eq!(
            check_basic_auth(Some("Basic"), "admin", "secret"),
            AuthVerdict::Malformed
        );
        // Decodes, but carries no colon separator.
        let no_colon = format!("Basic {}", general_purpose::STANDARD.encode("adminsecret"));
        assert_eq!(
            check_basic_auth(Some(&no_colon), "admin", "secret"),
            AuthVerdict::Malformed
        );
    }

    #[test]
    fn scheme_comparison_is_case_insensitive() {
        let encoded = general_purpose::STANDARD.encode("admin:secret");
        let header = format!("basic {encoded}");
        assert_eq!(
            check_basic_auth(Some(&header), "admin", "secret"),
            AuthVerdict::Authorized
        );
    }
}
