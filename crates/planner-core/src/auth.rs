//! Caller identity and debug-route access control.
//!
//! Identity on the plan route is resolved leniently: any caller without a
//! well-formed bearer header is treated as [`STUB_USER`]. Only the debug
//! context route enforces a credential, compared against a configured token.

/// Identity used when the caller did not present a usable credential.
pub const STUB_USER: &str = "stub-user";

/// Errors from the debug token check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization header required")]
    MissingHeader,

    #[error("Invalid authorization format, expected 'Bearer <token>'")]
    InvalidFormat,

    #[error("Invalid token")]
    InvalidToken,
}

/// Identity of the caller of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub user_id: String,
    pub token: Option<String>,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self {
            user_id: STUB_USER.to_string(),
            token: None,
        }
    }

    /// Resolve the caller from an `Authorization` header value.
    ///
    /// Never fails. Tokens are carried but not verified.
    pub fn from_authorization(header: Option<&str>) -> Self {
        match parse_bearer(header) {
            Ok(token) => {
                tracing::debug!(token_length = token.len(), "auth_token_received");
                Self {
                    user_id: STUB_USER.to_string(),
                    token: Some(token.to_string()),
                }
            }
            Err(AuthError::MissingHeader) => {
                tracing::warn!(user_id = STUB_USER, "auth_header_missing");
                Self::anonymous()
            }
            Err(_) => {
                tracing::warn!(user_id = STUB_USER, "auth_header_invalid_format");
                Self::anonymous()
            }
        }
    }
}

/// Extract the token from a `Bearer <token>` header value.
///
/// The scheme is matched case-insensitively.
pub fn parse_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingHeader)?;
    match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(AuthError::InvalidFormat),
    }
}

/// Require that `header` carries exactly `expected` as a bearer token.
pub fn require_debug_token(header: Option<&str>, expected: &str) -> Result<(), AuthError> {
    let token = parse_bearer(header)?;
    if token != expected {
        return Err(AuthError::InvalidToken);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_header_is_stub_user_without_token() {
        let caller = CallerContext::from_authorization(None);
        assert_eq!(caller.user_id, STUB_USER);
        assert!(caller.token.is_none());
    }

    #[test]
    fn invalid_format_is_stub_user_without_token() {
        for header in ["InvalidFormat", "Basic abc", "Token xyz"] {
            let caller = CallerContext::from_authorization(Some(header));
            assert_eq!(caller, CallerContext::anonymous(), "header: {header}");
        }
    }

    #[test]
    fn bearer_token_is_carried() {
        let caller = CallerContext::from_authorization(Some("Bearer my-token"));
        assert_eq!(caller.user_id, STUB_USER);
        assert_eq!(caller.token.as_deref(), Some("my-token"));
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(parse_bearer(Some("bearer abc")), Ok("abc"));
        assert_eq!(parse_bearer(Some("BEARER abc")), Ok("abc"));
    }

    #[test]
    fn debug_token_checks() {
        let expected = "debug-token-stub";
        assert_eq!(
            require_debug_token(None, expected),
            Err(AuthError::MissingHeader)
        );
        assert_eq!(
            require_debug_token(Some("debug-token-stub"), expected),
            Err(AuthError::InvalidFormat)
        );
        assert_eq!(
            require_debug_token(Some("Bearer wrong"), expected),
            Err(AuthError::InvalidToken)
        );
        assert_eq!(
            require_debug_token(Some("Bearer debug-token-stub"), expected),
            Ok(())
        );
    }

    #[test]
    fn error_messages_match_route_contract() {
        assert!(AuthError::MissingHeader.to_string().contains("Authorization header required"));
        assert!(AuthError::InvalidFormat.to_string().contains("Invalid authorization format"));
        assert!(AuthError::InvalidToken.to_string().contains("Invalid token"));
    }
}
