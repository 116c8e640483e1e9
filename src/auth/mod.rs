//! Authentication and abuse-prevention core: password hashing, login rate
//! limiting, CSRF protection, and cookie-backed sessions.

pub mod cookies;
pub mod csrf;
pub mod handlers;
pub mod password;
pub mod rate_limit;
pub mod service;
pub mod session;

pub use cookies::{CookieJar, MemoryJar, RequestCookies};
pub use csrf::CsrfGuard;
pub use password::{PasswordHash, PasswordHasher};
pub use rate_limit::{LoginRateLimiter, RateLimitConfig, RateLimitDecision};
pub use service::{AuthService, Credentials};
pub use session::{IssuedSession, SessionStore};
