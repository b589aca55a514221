//! Bearer credential persisted across restarts

use std::path::Path;
use tracing::info;

use super::storage::LocalStorage;

/// File holding durable client state inside the config directory
pub const STORAGE_FILE: &str = "storage.json";
/// Storage key of the bearer credential
pub const TOKEN_KEY: &str = "token";

/// Holds the session credential; absence means unauthenticated
#[derive(Debug)]
pub struct SessionStore {
    storage: LocalStorage,
}

impl SessionStore {
    /// Open the session stored under `config_dir`, restoring any saved token
    pub fn open<P: AsRef<Path>>(config_dir: P) -> crate::Result<Self> {
        let storage = LocalStorage::open(config_dir.as_ref().join(STORAGE_FILE))?;
        Ok(Self { storage })
    }

    /// Current bearer token, if logged in
    pub fn token(&self) -> Option<&str> {
        self.storage.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Store a freshly issued token
    pub fn set_token(&mut self, token: &str) -> crate::Result<()> {
        if token.trim().is_empty() {
            return Err(crate::Error::Session("refusing to store an empty token".to_string()));
        }
        self.storage.set(TOKEN_KEY, token)?;
        info!("Session credential stored");
        Ok(())
    }

    /// Forget the token (logout)
    pub fn clear(&mut self) -> crate::Result<()> {
        if self.storage.remove(TOKEN_KEY)? {
            info!("Session credential cleared");
        }
        Ok(())
    }

    /// Token or an `Unauthorized` error
    pub fn require_token(&self) -> crate::Result<&str> {
        self.token()
            .ok_or_else(|| crate::Error::Unauthorized("not logged in".to_string()))
    }

    pub fn storage_path(&self) -> &Path {
        self.storage.path()
    }
}
