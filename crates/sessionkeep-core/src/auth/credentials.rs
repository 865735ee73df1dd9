//! Durable storage for the signed-in user and their tokens.
//!
//! Both records live in a single `StoredSession` document so a save is
//! all-or-nothing on every backend.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use keyring::Entry;
use tracing::debug;

use super::StorageError;
use crate::models::{StoredSession, TokenPair, User};

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

/// Temporary file the session is written to before being renamed into place
const SESSION_TMP_FILE: &str = "session.json.tmp";

/// Keychain account under which the session document is stored
const KEYRING_ACCOUNT: &str = "session";

/// Persistence for the current user profile and token pair.
///
/// Only the session and the refresh coordinator write through this trait.
pub trait CredentialStore: Send + Sync {
    /// Persist user and tokens together, replacing anything stored before.
    fn save(&self, user: &User, tokens: &TokenPair) -> Result<(), StorageError>;

    /// Last saved session, or `None` if nothing is stored.
    fn load(&self) -> Result<Option<StoredSession>, StorageError>;

    /// Remove the stored session. Clearing an empty store is a no-op.
    fn clear(&self) -> Result<(), StorageError>;
}

/// Stores the session as JSON in a file, replaced atomically on save.
pub struct FileCredentialStore {
    data_dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE)
    }

    fn write_private(path: &Path, contents: &str) -> Result<(), StorageError> {
        std::fs::write(path, contents)?;

        // Owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn save(&self, user: &User, tokens: &TokenPair) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.data_dir)?;

        let stored = StoredSession::new(user.clone(), tokens.clone());
        let contents = serde_json::to_string_pretty(&stored)?;

        let tmp = self.data_dir.join(SESSION_TMP_FILE);
        Self::write_private(&tmp, &contents)?;
        std::fs::rename(&tmp, self.path())?;

        debug!(path = ?self.path(), user_id = %user.id, "Session saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<StoredSession>, StorageError> {
        let contents = match std::fs::read_to_string(self.path()) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path()) {
            Ok(()) => {
                debug!(path = ?self.path(), "Session file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Stores the session document as a single secret in the OS keychain.
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<Entry, StorageError> {
        Ok(Entry::new(&self.service, KEYRING_ACCOUNT)?)
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save(&self, user: &User, tokens: &TokenPair) -> Result<(), StorageError> {
        let stored = StoredSession::new(user.clone(), tokens.clone());
        let contents = serde_json::to_string(&stored)?;
        self.entry()?.set_password(&contents)?;
        debug!(service = %self.service, user_id = %user.id, "Session saved to keychain");
        Ok(())
    }

    fn load(&self) -> Result<Option<StoredSession>, StorageError> {
        match self.entry()?.get_password() {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<(), StorageError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps the session in memory only. Nothing survives the process.
#[derive(Default)]
pub struct MemoryCredentialStore {
    stored: Mutex<Option<StoredSession>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, user: &User, tokens: &TokenPair) -> Result<(), StorageError> {
        let mut stored = self.stored.lock().unwrap_or_else(PoisonError::into_inner);
        *stored = Some(StoredSession::new(user.clone(), tokens.clone()));
        Ok(())
    }

    fn load(&self) -> Result<Option<StoredSession>, StorageError> {
        Ok(self
            .stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "1".to_string(),
            name: "A".to_string(),
            email: "a@x.com".to_string(),
            avatar: None,
        }
    }

    #[test]
    fn test_file_store_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested"));

        store.save(&user(), &TokenPair::new("t1", "r1")).unwrap();

        let loaded = store.load().unwrap().expect("session should be stored");
        assert_eq!(loaded.user, user());
        assert_eq!(loaded.tokens, TokenPair::new("t1", "r1"));
        assert!(!dir.path().join("nested").join(SESSION_TMP_FILE).exists());
    }

    #[test]
    fn test_file_store_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        store.save(&user(), &TokenPair::new("t1", "r1")).unwrap();
        store.save(&user().with_name("B"), &TokenPair::new("t2", "r2")).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.user.name, "B");
        assert_eq!(loaded.tokens.access_token, "t2");
    }

    #[test]
    fn test_file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        store.clear().unwrap();
        store.save(&user(), &TokenPair::new("t1", "r1")).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(store.load(), Err(StorageError::Json(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        store.save(&user(), &TokenPair::new("t1", "r1")).unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_memory_store_round_trip_and_clear() {
        let store = MemoryCredentialStore::new();
        assert!(store.load().unwrap().is_none());

        store.save(&user(), &TokenPair::new("t1", "r1")).unwrap();
        assert_eq!(store.load().unwrap().unwrap().tokens.refresh_token, "r1");

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
