//! CSRF protection using the double-submit cookie pattern.
//!
//! The server sets a random token in a script-readable cookie; the client
//! echoes it back in the request body. A cross-origin attacker cannot read
//! the cookie (same-origin policy), so it cannot forge the matching value
//! even though the cookie itself is auto-attached.

use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::{Cookie, SameSite};
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::auth::cookies::CookieJar;

pub const CSRF_COOKIE: &str = "tictaak_csrf";
const TOKEN_LEN: usize = 32;

/// Issues and validates double-submit CSRF tokens bound to a cookie.
#[derive(Debug, Clone, Copy)]
pub struct CsrfGuard {
    secure_cookies: bool,
    ttl_hours: i64,
}

impl CsrfGuard {
    pub fn new(secure_cookies: bool, ttl_hours: i64) -> Self {
        Self {
            secure_cookies,
            ttl_hours,
        }
    }

    /// Return the existing token if the cookie holds a well-formed one,
    /// otherwise mint a fresh token and set the cookie.
    pub fn get_or_create(&self, jar: &dyn CookieJar) -> String {
        if let Some(existing) = jar.get(CSRF_COOKIE) {
            if is_well_formed(&existing) {
                return existing;
            }
        }

        let mut bytes = [0u8; TOKEN_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let cookie = Cookie::build(CSRF_COOKIE, token.clone())
            .http_only(false) // must be readable by the frontend
            .secure(self.secure_cookies)
            .same_site(SameSite::Strict)
            .path("/")
            .max_age(CookieDuration::hours(self.ttl_hours))
            .finish();
        jar.add(cookie);

        token
    }

    /// Constant-time comparison of the provided token against the cookie.
    /// Hex is decoded first, so case differences in the encoding do not
    /// matter. Missing, length-mismatched, or non-hex tokens fail.
    pub fn validate(&self, jar: &dyn CookieJar, provided: &str) -> bool {
        let cookie_token = match jar.get(CSRF_COOKIE) {
            Some(token) => token,
            None => return false,
        };

        if cookie_token.len() != TOKEN_LEN * 2 || provided.len() != TOKEN_LEN * 2 {
            return false;
        }

        match (hex::decode(&cookie_token), hex::decode(provided)) {
            (Ok(expected), Ok(given)) => bool::from(expected.ct_eq(&given)),
            _ => false,
        }
    }
}

fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LEN * 2 && token.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::cookies::MemoryJar;

    fn guard() -> CsrfGuard {
        CsrfGuard::new(false, 24)
    }

    #[test]
    fn token_is_stable_within_a_jar() {
        let jar = MemoryJar::new();
        let first = guard().get_or_create(&jar);
        let second = guard().get_or_create(&jar);

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn malformed_cookie_is_replaced() {
        let jar = MemoryJar::new();
        jar.add(Cookie::new(CSRF_COOKIE, "not-a-token"));

        let token = guard().get_or_create(&jar);
        assert_ne!(token, "not-a-token");
        assert_eq!(token.len(), 64);
        // The replacement is now the stored cookie.
        assert_eq!(jar.get(CSRF_COOKIE).as_deref(), Some(token.as_str()));
    }

    #[test]
    fn validate_accepts_only_the_matching_token() {
        let jar = MemoryJar::new();
        let token = guard().get_or_create(&jar);

        assert!(guard().validate(&jar, &token));
        let other = format!("{}{}", &token[1..], "0");
        assert!(!guard().validate(&jar, &other));
    }

    #[test]
    fn validate_is_hex_case_insensitive() {
        let jar = MemoryJar::new();
        let token = guard().get_or_create(&jar);

        assert!(guard().validate(&jar, &token.to_uppercase()));
    }

    #[test]
    fn validate_rejects_malformed_input() {
        let jar = MemoryJar::new();
        let token = guard().get_or_create(&jar);

        // Length mismatch
        assert!(!guard().validate(&jar, &token[..32]));
        // Right length, not hex
        assert!(!guard().validate(&jar, &"z".repeat(64)));
        // Empty
        assert!(!guard().validate(&jar, ""));
    }

    #[test]
    fn validate_fails_without_a_cookie() {
        let jar = MemoryJar::new();
        assert!(!guard().validate(&jar, &"a".repeat(64)));
    }
}
