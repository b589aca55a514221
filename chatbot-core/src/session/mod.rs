//! Session credential storage
//!
//! The bearer token issued at login is kept in a small JSON key-value file
//! so a restarted client resumes the authenticated session.

pub mod storage;
pub mod store;

pub use storage::LocalStorage;
pub use store::{SessionStore, STORAGE_FILE, TOKEN_KEY};
