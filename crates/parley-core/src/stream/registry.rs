//! Registry of in-flight streaming generations.
//!
//! Maps an assistant message id to the cancellation token of the scope that
//! is generating it, so a stop request arriving on another task can end the
//! generation. One instance is created at startup and shared by every driver.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A stream is already registered for this message.
    #[error("stream {0} is already registered")]
    AlreadyExists(Uuid),

    /// No stream is registered for this message.
    #[error("stream {0} not found")]
    NotFound(Uuid),
}

/// Table of active streams keyed by assistant message id.
///
/// Every operation takes the same lock; none of them await while holding it.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn streams(&self) -> MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.streams.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Track `token` under `id`. An existing entry is left in place.
    pub fn register(&self, id: Uuid, token: CancellationToken) -> Result<(), RegistryError> {
        let mut streams = self.streams();
        if streams.contains_key(&id) {
            return Err(RegistryError::AlreadyExists(id));
        }
        streams.insert(id, token);
        debug!(message_id = %id, active = streams.len(), "registered stream");
        Ok(())
    }

    /// Cancel the stream registered under `id` and forget it.
    pub fn cancel(&self, id: Uuid) -> Result<(), RegistryError> {
        let token = self
            .streams()
            .remove(&id)
            .ok_or(RegistryError::NotFound(id))?;
        token.cancel();
        debug!(message_id = %id, "cancelled stream");
        Ok(())
    }

    /// Forget `id` without cancelling it. Unknown ids are ignored.
    pub fn unregister(&self, id: Uuid) {
        if self.streams().remove(&id).is_some() {
            debug!(message_id = %id, "unregistered stream");
        }
    }

    pub fn is_active(&self, id: Uuid) -> bool {
        self.streams().contains_key(&id)
    }

    /// Number of streams currently registered.
    pub fn len(&self) -> usize {
        self.streams().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_register_then_cancel() {
        let registry = StreamRegistry::new();
        let id = Uuid::now_v7();
        let token = CancellationToken::new();

        registry.register(id, token.clone()).unwrap();
        assert!(registry.is_active(id));

        registry.cancel(id).unwrap();
        assert!(token.is_cancelled());
        assert!(!registry.is_active(id));
    }

    #[test]
    fn test_duplicate_register_keeps_first() {
        let registry = StreamRegistry::new();
        let id = Uuid::now_v7();
        let first = CancellationToken::new();
        let second = CancellationToken::new();

        registry.register(id, first.clone()).unwrap();
        assert_eq!(
            registry.register(id, second.clone()),
            Err(RegistryError::AlreadyExists(id))
        );

        registry.cancel(id).unwrap();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[test]
    fn test_cancel_twice_is_not_found() {
        let registry = StreamRegistry::new();
        let id = Uuid::now_v7();
        registry.register(id, CancellationToken::new()).unwrap();

        assert!(registry.cancel(id).is_ok());
        assert_eq!(registry.cancel(id), Err(RegistryError::NotFound(id)));
    }

    #[test]
    fn test_cancel_unknown_is_not_found() {
        let registry = StreamRegistry::new();
        let id = Uuid::now_v7();
        assert_eq!(registry.cancel(id), Err(RegistryError::NotFound(id)));
    }

    #[test]
    fn test_unregister_does_not_cancel_and_is_idempotent() {
        let registry = StreamRegistry::new();
        let id = Uuid::now_v7();
        let token = CancellationToken::new();
        registry.register(id, token.clone()).unwrap();

        registry.unregister(id);
        registry.unregister(id);
        assert!(!token.is_cancelled());
        assert!(registry.is_empty());
        assert_eq!(registry.cancel(id), Err(RegistryError::NotFound(id)));
    }

    #[tokio::test]
    async fn test_concurrent_register_and_cancel() {
        let registry = Arc::new(StreamRegistry::new());
        let ids: Vec<Uuid> = (0..64).map(|_| Uuid::now_v7()).collect();

        let mut handles = Vec::new();
        for id in ids.clone() {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.register(id, CancellationToken::new()).unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(registry.len(), 64);

        let mut handles = Vec::new();
        for id in ids {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move { registry.cancel(id) }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_ok());
        }
        assert!(registry.is_empty());
    }
}
