//! Session store – the single owner of the persisted auth state.
//!
//! Persists `accessToken`, `refreshToken` and `user` through a
//! [`KeyValueStorage`] and publishes every change on a watch channel so
//! long-lived consumers (expiry monitor, daemon) see logins and logouts.

use crate::model::User;
use crate::token;
use crate::traits::{KeyValueStorage, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "user";

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

impl Session {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        token::expires_at(&self.access_token).ok()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user.username)
            .field("role", &self.user.role)
            .finish_non_exhaustive()
    }
}

struct Inner {
    storage: Box<dyn KeyValueStorage>,
    tx: watch::Sender<Option<Session>>,
}

/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    /// Restore whatever session the storage holds. Incomplete or corrupt
    /// entries yield an empty store.
    pub fn new(storage: Box<dyn KeyValueStorage>) -> Self {
        let initial = match load(storage.as_ref()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable stored session");
                None
            }
        };
        let (tx, _rx) = watch::channel(initial);
        Self {
            inner: Arc::new(Inner { storage, tx }),
        }
    }

    pub fn get(&self) -> Option<Session> {
        self.inner.tx.borrow().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.tx.borrow().as_ref().map(|s| s.user.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.tx.borrow().as_ref().map(|s| s.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.tx.borrow().as_ref().map(|s| s.refresh_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.tx.borrow().is_some()
    }

    pub fn set(&self, session: Session) -> StorageResult<()> {
        let user_json = serde_json::to_string(&session.user)?;
        let storage = self.inner.storage.as_ref();
        let written = storage
            .set(ACCESS_TOKEN_KEY, &session.access_token)
            .and_then(|()| storage.set(REFRESH_TOKEN_KEY, &session.refresh_token))
            .and_then(|()| storage.set(USER_KEY, &user_json));
        if let Err(e) = written {
            // A mix of old and new keys must never be restored on the next start.
            tracing::warn!(error = %e, "session write failed, clearing stored keys");
            for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY] {
                let _ = storage.remove(key);
            }
            return Err(e);
        }
        tracing::debug!(user = %session.user.username, "session stored");
        self.inner.tx.send_replace(Some(session));
        Ok(())
    }

    /// Drop the session. Subscribers are notified even when a storage key
    /// fails to be removed.
    pub fn clear(&self) -> StorageResult<()> {
        let was_set = self.inner.tx.send_replace(None).is_some();
        let storage = self.inner.storage.as_ref();
        let results = [
            storage.remove(ACCESS_TOKEN_KEY),
            storage.remove(REFRESH_TOKEN_KEY),
            storage.remove(USER_KEY),
        ];
        if was_set {
            tracing::info!("session cleared");
        }
        results.into_iter().collect::<StorageResult<Vec<()>>>().map(|_| ())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.inner.tx.subscribe()
    }

    pub fn storage(&self) -> &dyn KeyValueStorage {
        self.inner.storage.as_ref()
    }
}

fn load(storage: &dyn KeyValueStorage) -> StorageResult<Option<Session>> {
    let access = storage.get(ACCESS_TOKEN_KEY)?;
    let refresh = storage.get(REFRESH_TOKEN_KEY)?;
    let user = storage.get(USER_KEY)?;
    let (Some(access_token), Some(refresh_token), Some(user)) = (access, refresh, user) else {
        return Ok(None);
    };
    let user: User = serde_json::from_str(&user)
        .map_err(|e| StorageError::Corrupt(format!("stored user: {}", e)))?;
    Ok(Some(Session {
        access_token,
        refresh_token,
        user,
    }))
}

#[cfg(test)]
pub(crate) fn sample_session(role: crate::model::Role, exp: i64) -> Session {
    Session {
        access_token: token::make_token(exp),
        refresh_token: "refresh-1".into(),
        user: serde_json::from_value(serde_json::json!({
            "id": 3, "username": "schmidt", "email": "schmidt@werk.de", "role": role
        }))
        .unwrap(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::platform::MemoryStorage;

    fn sample() -> Session {
        sample_session(Role::Technician, 2_000_000_000)
    }

    #[test]
    fn test_set_get_clear() {
        let store = SessionStore::new(Box::new(MemoryStorage::new()));
        assert!(!store.is_authenticated());

        store.set(sample()).unwrap();
        assert_eq!(store.current_user().unwrap().role, Role::Technician);
        assert_eq!(store.refresh_token().as_deref(), Some("refresh-1"));
        assert_eq!(store.get().unwrap().expires_at().unwrap().timestamp(), 2_000_000_000);

        store.clear().unwrap();
        assert!(store.get().is_none());
    }

    #[test]
    fn test_restores_from_storage() {
        let storage = MemoryStorage::new();
        let session = sample();
        storage.set(ACCESS_TOKEN_KEY, &session.access_token).unwrap();
        storage.set(REFRESH_TOKEN_KEY, "refresh-1").unwrap();
        storage
            .set(USER_KEY, &serde_json::to_string(&session.user).unwrap())
            .unwrap();

        let store = SessionStore::new(Box::new(storage));
        assert_eq!(store.get(), Some(session));
    }

    /// Memory storage that refuses writes to one key.
    struct RejectingStorage {
        inner: MemoryStorage,
        rejected: &'static str,
    }

    impl KeyValueStorage for RejectingStorage {
        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            if key == self.rejected {
                return Err(StorageError::PermissionDenied(key.to_string()));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> StorageResult<()> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_failed_write_leaves_no_mixed_session() {
        let old = sample();
        let inner = MemoryStorage::new();
        inner.set(ACCESS_TOKEN_KEY, &old.access_token).unwrap();
        inner.set(REFRESH_TOKEN_KEY, &old.refresh_token).unwrap();
        inner
            .set(USER_KEY, &serde_json::to_string(&old.user).unwrap())
            .unwrap();
        let store = SessionStore::new(Box::new(RejectingStorage {
            inner,
            rejected: USER_KEY,
        }));
        assert_eq!(store.get(), Some(old.clone()));

        let mut new = sample_session(Role::Admin, 2_100_000_000);
        new.refresh_token = "refresh-2".into();
        assert!(matches!(store.set(new), Err(StorageError::PermissionDenied(_))));

        assert_eq!(store.get(), Some(old));
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY] {
            assert_eq!(store.storage().get(key).unwrap(), None, "{}", key);
        }
    }

    #[test]
    fn test_corrupt_user_yields_no_session() {
        let storage = MemoryStorage::new();
        storage.set(ACCESS_TOKEN_KEY, "a.b.c").unwrap();
        storage.set(REFRESH_TOKEN_KEY, "r").unwrap();
        storage.set(USER_KEY, "{not json").unwrap();
        let store = SessionStore::new(Box::new(storage));
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_logout() {
        let store = SessionStore::new(Box::new(MemoryStorage::new()));
        store.set(sample()).unwrap();
        let mut rx = store.subscribe();
        let clone = store.clone();
        clone.clear().unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }
}
