//! Pending PKCE authorizations, keyed by OAuth `state`
//!
//! An entry is created when a PKCE login starts and redeemed exactly once
//! when the matching callback arrives. Redemption is a single
//! check-and-remove under one lock acquisition, so two concurrent callbacks
//! carrying the same state cannot both obtain the verifier.
//!
//! Entries expire after a TTL. Expired entries are dropped lazily on every
//! insert and periodically by `spawn_sweeper`, so abandoned flows do not
//! accumulate for the life of the process.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};

/// Server-side half of an in-flight PKCE authorization.
#[derive(Debug)]
pub struct PendingAuthorization {
    pub verifier: Secret<String>,
    pub created_at: Instant,
}

impl PendingAuthorization {
    pub fn new(verifier: String) -> Self {
        Self {
            verifier: Secret::new(verifier),
            created_at: Instant::now(),
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Keyed store for pending authorizations.
///
/// Injected into the HTTP layer as `Arc<dyn VerifierStore>` so tests get an
/// isolated instance and a shared external store can replace the in-memory
/// one. Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility.
pub trait VerifierStore: Send + Sync {
    /// Insert a pending authorization. Never overwrites: an occupied key
    /// returns `Error::StateCollision`.
    fn put<'a>(
        &'a self,
        state: &'a str,
        pending: PendingAuthorization,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Remove and return the entry for `state`, expired or not.
    ///
    /// Callers check `PendingAuthorization::is_expired` against `ttl()`;
    /// an expired entry is still consumed so it can never be redeemed later.
    fn take<'a>(
        &'a self,
        state: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<PendingAuthorization>> + Send + 'a>>;

    /// Number of entries currently held, including not-yet-swept expired ones.
    fn len(&self) -> Pin<Box<dyn Future<Output = usize> + Send + '_>>;

    /// Drop all expired entries, returning how many were removed.
    fn purge_expired(&self) -> Pin<Box<dyn Future<Output = usize> + Send + '_>>;

    fn ttl(&self) -> Duration;
}

/// Process-local store backed by a mutex-guarded map.
pub struct MemoryVerifierStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, PendingAuthorization>>,
}

impl MemoryVerifierStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl VerifierStore for MemoryVerifierStore {
    fn put<'a>(
        &'a self,
        state: &'a str,
        pending: PendingAuthorization,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            // Lazy cleanup while holding the lock
            entries.retain(|_, p| !p.is_expired(self.ttl));
            if entries.contains_key(state) {
                return Err(Error::StateCollision);
            }
            entries.insert(state.to_owned(), pending);
            debug!(pending = entries.len(), "stored pending authorization");
            Ok(())
        })
    }

    fn take<'a>(
        &'a self,
        state: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<PendingAuthorization>> + Send + 'a>> {
        Box::pin(async move { self.entries.lock().await.remove(state) })
    }

    fn len(&self) -> Pin<Box<dyn Future<Output = usize> + Send + '_>> {
        Box::pin(async move { self.entries.lock().await.len() })
    }

    fn purge_expired(&self) -> Pin<Box<dyn Future<Output = usize> + Send + '_>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let before = entries.len();
            entries.retain(|_, p| !p.is_expired(self.ttl));
            before - entries.len()
        })
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Periodically purge expired entries until the returned handle is aborted.
pub fn spawn_sweeper(store: Arc<dyn VerifierStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately; skip it
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = store.purge_expired().await;
            if purged > 0 {
                debug!(purged, "swept expired pending authorizations");
            }
        }
    })
}
