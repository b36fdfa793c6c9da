//! Session lifecycle and the process-local session store.
//!
//! A session is one authenticated portal conversation. Its hidden tokens are
//! valid only for the next request, so every request on a session runs under
//! that session's lock; different sessions never contend.

use super::cookies::CookieJar;
use super::error::PortalError;
use super::types::Credentials;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use url::Url;

/// Opaque, locally generated session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Mints a new id from 32 random bytes.
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::thread_rng().gen();
        Self(hex::encode(&bytes))
    }

    /// Accepts a caller-supplied id, rejecting blank or oversized values.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > 128 || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only show first 8 chars for privacy
        write!(f, "{}...", &self.0[..8.min(self.0.len())])
    }
}

/// Returns a short, log-safe fingerprint of a portal username.
pub fn user_fingerprint(username: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.trim().to_lowercase().as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..6])
}

/// Lifecycle state of a stored session. Destroyed sessions are simply absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Active,
    /// The portal no longer recognises the session (server-side logout)
    Invalid,
    /// The inactivity budget ran out
    Expired,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub base_url: Url,
    pub jar: CookieJar,
    pub credentials: Credentials,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: SessionState,
}

impl Session {
    /// State as of `now`, with expiry applied lazily.
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        match self.state {
            SessionState::Active if now > self.expires_at => SessionState::Expired,
            state => state,
        }
    }

    fn touch(&mut self, ttl: chrono::Duration) {
        self.expires_at = Utc::now() + ttl;
    }
}

/// Key-value contract for session storage.
///
/// The in-process map is one implementation; a shared cache can stand in for
/// it when the service runs as several processes.
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &SessionId) -> Option<Session>;

    fn insert(&self, session: Session);

    /// Replaces a session only if it is still present. Returns false when it
    /// was removed in the meantime.
    fn update(&self, session: Session) -> bool;

    fn remove(&self, id: &SessionId) -> Option<Session>;

    /// Drops every session that is past its expiry or no longer active.
    fn purge_expired(&self, now: DateTime<Utc>) -> Vec<SessionId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Thread-safe in-memory store.
///
/// Uses DashMap for concurrent access without external locking.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: DashMap<SessionId, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, id: &SessionId) -> Option<Session> {
        self.entries.get(id).map(|entry| entry.clone())
    }

    fn insert(&self, session: Session) {
        self.entries.insert(session.id.clone(), session);
    }

    fn update(&self, session: Session) -> bool {
        match self.entries.get_mut(&session.id) {
            Some(mut entry) => {
                *entry = session;
                true
            }
            None => false,
        }
    }

    fn remove(&self, id: &SessionId) -> Option<Session> {
        self.entries.remove(id).map(|(_, session)| session)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Vec<SessionId> {
        let mut purged = Vec::new();
        self.entries.retain(|id, session| {
            let keep = session.state_at(now) == SessionState::Active;
            if !keep {
                purged.push(id.clone());
            }
            keep
        });
        purged
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Exclusive hold on one session for the duration of a facade call.
pub struct SessionLease {
    pub session: Session,
    _guard: OwnedMutexGuard<()>,
}

/// Owns session creation, lookup, expiry, and destruction.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    /// Per-session locks to serialise requests on one portal conversation
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
    ttl: chrono::Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, ttl: chrono::Duration) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            ttl,
        }
    }

    /// Stores a freshly authenticated session and returns it.
    pub fn create(&self, base_url: Url, credentials: Credentials, jar: CookieJar) -> Session {
        let now = Utc::now();
        let session = Session {
            id: SessionId::generate(),
            base_url,
            jar,
            credentials,
            created_at: now,
            expires_at: now + self.ttl,
            state: SessionState::Active,
        };
        self.store.insert(session.clone());
        session
    }

    /// Returns a copy of a stored session without locking it.
    pub fn peek(&self, id: &SessionId) -> Option<Session> {
        self.store.get(id)
    }

    /// Locks a session and loads it, applying expiry.
    ///
    /// Waits for any in-flight request on the same session to finish first.
    pub async fn checkout(&self, id: &SessionId) -> Result<SessionLease, PortalError> {
        // Unknown ids never get a lock entry
        if self.store.get(id).is_none() {
            return Err(PortalError::session_invalid("unknown or destroyed session"));
        }

        let lock = self.session_lock(id);
        let guard = lock.clone().lock_owned().await;

        let Some(mut session) = self.store.get(id) else {
            // Destroyed while waiting; drop the entry unless another caller holds it
            drop(guard);
            self.locks
                .remove_if(id, |_, entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(entry) <= 2);
            return Err(PortalError::session_invalid("unknown or destroyed session"));
        };

        match session.state_at(Utc::now()) {
            SessionState::Active => Ok(SessionLease {
                session,
                _guard: guard,
            }),
            SessionState::Invalid => Err(PortalError::session_invalid(
                "portal no longer recognises this session",
            )),
            SessionState::Expired => {
                if session.state != SessionState::Expired {
                    session.state = SessionState::Expired;
                    self.store.update(session);
                }
                Err(PortalError::SessionExpired)
            }
        }
    }

    /// Writes a leased session back and releases its lock.
    ///
    /// Success refreshes the inactivity budget; `SessionInvalid` marks the
    /// session invalid. Cookie changes are kept either way. A session destroyed
    /// while leased stays destroyed.
    pub fn checkin(&self, lease: SessionLease, outcome: Result<(), &PortalError>) {
        let SessionLease {
            mut session,
            _guard,
        } = lease;

        match outcome {
            Ok(()) => session.touch(self.ttl),
            Err(PortalError::SessionInvalid { .. }) => session.state = SessionState::Invalid,
            Err(_) => {}
        }

        let id = session.id.clone();
        if !self.store.update(session) {
            debug!(session = %id, "Session destroyed while in use, discarding result state");
        }
    }

    /// Removes a session and its lock.
    ///
    /// Returns the removed session together with its lock guard when no
    /// request was in flight, so the caller may still use its jar safely.
    pub fn destroy(&self, id: &SessionId) -> Option<(Session, Option<OwnedMutexGuard<()>>)> {
        let lock = self.locks.remove(id).map(|(_, lock)| lock);
        let session = self.store.remove(id)?;
        let guard = lock.and_then(|lock| lock.try_lock_owned().ok());
        Some((session, guard))
    }

    /// Drops expired and invalid sessions along with their locks.
    pub fn purge_expired(&self) -> usize {
        let purged = self.store.purge_expired(Utc::now());
        for id in &purged {
            self.locks.remove(id);
        }
        purged.len()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn session_lock(&self, id: &SessionId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Helper module for hex encoding (avoiding extra dependency).
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
