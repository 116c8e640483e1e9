//! Persistence layer: row models, the injectable [`AuthStore`] seam, and the
//! Postgres and in-memory implementations behind it.

pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use memory::MemoryStore;
pub use models::{AuthUser, NewSession, NewUser, Session, SessionUser, User};
pub use postgres::PgStore;
pub use store::AuthStore;

#[cfg(test)]
pub use store::MockAuthStore;
