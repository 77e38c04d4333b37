//! Session persistence collaborators.
//!
//! The engine only needs load/save/clear for the session and cookie blobs.
//! Richer backends (keychains, cloud secret managers) implement the same
//! trait; two reference implementations ship here.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{AuthError, Result};
use crate::session::{CookieJar, Session};

/// Storage boundary for session state.
pub trait SecretsStore: Send + Sync {
    /// Load the persisted session, if any.
    fn load_session(&self) -> Result<Option<Session>>;
    /// Persist the session.
    fn save_session(&self, session: &Session) -> Result<()>;
    /// Load the persisted cookie jar, if any.
    fn load_cookies(&self) -> Result<Option<CookieJar>>;
    /// Persist the cookie jar.
    fn save_cookies(&self, cookies: &CookieJar) -> Result<()>;
    /// Remove all persisted state.
    fn clear(&self) -> Result<()>;
}

impl<T: SecretsStore + ?Sized> SecretsStore for Arc<T> {
    fn load_session(&self) -> Result<Option<Session>> {
        (**self).load_session()
    }
    fn save_session(&self, session: &Session) -> Result<()> {
        (**self).save_session(session)
    }
    fn load_cookies(&self) -> Result<Option<CookieJar>> {
        (**self).load_cookies()
    }
    fn save_cookies(&self, cookies: &CookieJar) -> Result<()> {
        (**self).save_cookies(cookies)
    }
    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

const SESSION_FILE: &str = "session.json";
const COOKIES_FILE: &str = "cookies.json";

/// JSON-file store, one file each for the session and the cookies.
pub struct FileSecretsStore {
    dir: PathBuf,
}

impl FileSecretsStore {
    /// Store state under `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store state under the platform data directory.
    pub fn in_user_data_dir() -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| AuthError::Storage("no user data directory".into()))?;
        Ok(Self::new(base.join("asc-auth")))
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>> {
        let path = self.dir.join(file);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(storage_error(&path, err)),
        };
        let value = serde_json::from_slice(&raw)
            .map_err(|err| AuthError::Storage(format!("{}: {err}", path.display())))?;
        Ok(Some(value))
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        let path = self.dir.join(file);
        let raw = serde_json::to_vec_pretty(value)
            .map_err(|err| AuthError::Storage(err.to_string()))?;
        write_with_create(&path, &raw).map_err(|err| storage_error(&path, err))
    }

    fn remove(&self, file: &str) -> Result<()> {
        let path = self.dir.join(file);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_error(&path, err)),
        }
    }
}

impl SecretsStore for FileSecretsStore {
    fn load_session(&self) -> Result<Option<Session>> {
        self.read_json(SESSION_FILE)
    }

    fn save_session(&self, session: &Session) -> Result<()> {
        self.write_json(SESSION_FILE, session)
    }

    fn load_cookies(&self) -> Result<Option<CookieJar>> {
        self.read_json(COOKIES_FILE)
    }

    fn save_cookies(&self, cookies: &CookieJar) -> Result<()> {
        self.write_json(COOKIES_FILE, cookies)
    }

    fn clear(&self) -> Result<()> {
        self.remove(SESSION_FILE)?;
        self.remove(COOKIES_FILE)
    }
}

/// Attempt a write; when the parent directory is missing, create it and retry
/// once. Any other failure, or a second miss, surfaces to the caller.
fn write_with_create(path: &Path, bytes: &[u8]) -> io::Result<()> {
    match fs::write(path, bytes) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, bytes)
        }
        other => other,
    }
}

fn storage_error(path: &Path, err: io::Error) -> AuthError {
    AuthError::Storage(format!("{}: {err}", path.display()))
}

/// In-memory store for tests and short-lived hosts.
#[derive(Default)]
pub struct MemorySecretsStore {
    session: Mutex<Option<Session>>,
    cookies: Mutex<Option<CookieJar>>,
}

impl MemorySecretsStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
        slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SecretsStore for MemorySecretsStore {
    fn load_session(&self) -> Result<Option<Session>> {
        Ok(Self::lock(&self.session).clone())
    }

    fn save_session(&self, session: &Session) -> Result<()> {
        *Self::lock(&self.session) = Some(session.clone());
        Ok(())
    }

    fn load_cookies(&self) -> Result<Option<CookieJar>> {
        Ok(Self::lock(&self.cookies).clone())
    }

    fn save_cookies(&self, cookies: &CookieJar) -> Result<()> {
        *Self::lock(&self.cookies) = Some(cookies.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *Self::lock(&self.session) = None;
        *Self::lock(&self.cookies) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Cookie;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretsStore::new(dir.path());

        assert!(store.load_session().unwrap().is_none());

        let session = Session {
            session_id: Some("x-apple-id".into()),
            ..Session::default()
        };
        store.save_session(&session).unwrap();
        assert_eq!(store.load_session().unwrap(), Some(session));

        let mut cookies = CookieJar::new();
        cookies.insert(Cookie {
            name: "myacinfo".into(),
            value: "secret".into(),
        });
        store.save_cookies(&cookies).unwrap();
        assert_eq!(store.load_cookies().unwrap(), Some(cookies));
    }

    #[test]
    fn test_file_store_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretsStore::new(dir.path().join("nested").join("deeper"));
        store.save_session(&Session::default()).unwrap();
        assert_eq!(store.load_session().unwrap(), Some(Session::default()));
    }

    #[test]
    fn test_file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretsStore::new(dir.path());
        store.save_session(&Session::default()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load_session().unwrap().is_none());
        assert!(store.load_cookies().unwrap().is_none());
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySecretsStore::new();
        let session = Session {
            scnt: Some("scnt".into()),
            ..Session::default()
        };
        store.save_session(&session).unwrap();
        assert_eq!(store.load_session().unwrap(), Some(session));
        store.clear().unwrap();
        assert!(store.load_session().unwrap().is_none());
    }
}
