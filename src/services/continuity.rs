//! Session Continuity Guard: the only component allowed to touch durable
//! snapshot storage. It keeps an in-progress checkout alive across an
//! authentication redirect, and guarantees a completed or explicitly
//! abandoned booking is never resurrected by a later load.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{instrument, warn};

use crate::cache::CacheBackend;
use crate::errors::ServiceError;
use crate::models::{Cart, CheckoutSnapshot, Selection};

const NORMAL_KEY_PREFIX: &str = "checkout:snapshot";
const HANDOFF_KEY_PREFIX: &str = "checkout:handoff";
const CLEARED_KEY_PREFIX: &str = "checkout:cleared";

/// Outcome of `load_on_init`.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoredState {
    /// A snapshot was found; `from_handoff` is true when it was the
    /// single-use pending snapshot written before an authentication redirect.
    Restored {
        snapshot: CheckoutSnapshot,
        from_handoff: bool,
    },
    /// Nothing to restore: no snapshot, a consumed clear-marker, or a
    /// malformed snapshot that was discarded.
    Empty,
}

#[derive(Clone)]
pub struct SessionContinuityGuard {
    store: Arc<dyn CacheBackend>,
    snapshot_ttl: Option<Duration>,
}

impl SessionContinuityGuard {
    pub fn new(store: Arc<dyn CacheBackend>, snapshot_ttl: Option<Duration>) -> Self {
        Self {
            store,
            snapshot_ttl,
        }
    }

    fn normal_key(scope: &str) -> String {
        format!("{}:{}", NORMAL_KEY_PREFIX, scope)
    }

    fn handoff_key(scope: &str) -> String {
        format!("{}:{}", HANDOFF_KEY_PREFIX, scope)
    }

    fn cleared_key(scope: &str) -> String {
        format!("{}:{}", CLEARED_KEY_PREFIX, scope)
    }

    fn encode(cart: &Cart, selection: &Selection) -> Result<String, ServiceError> {
        let snapshot = CheckoutSnapshot {
            cart: cart.clone(),
            selection: selection.clone(),
            saved_at: Utc::now(),
        };
        serde_json::to_string(&snapshot).map_err(|e| ServiceError::SerializationError(e.to_string()))
    }

    /// Writes the normal snapshot. A fresh save always means the user intends
    /// the cart to persist, so the clear-marker is removed here.
    #[instrument(skip(self, cart, selection))]
    pub async fn save(
        &self,
        scope: &str,
        cart: &Cart,
        selection: &Selection,
    ) -> Result<(), ServiceError> {
        let payload = Self::encode(cart, selection)?;
        self.store
            .set(&Self::normal_key(scope), &payload, self.snapshot_ttl)
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))?;
        self.store
            .delete(&Self::cleared_key(scope))
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))?;
        Ok(())
    }

    /// Writes the single-use pending snapshot, immediately before handing
    /// control to the authentication flow.
    #[instrument(skip(self, cart, selection))]
    pub async fn save_handoff(
        &self,
        scope: &str,
        cart: &Cart,
        selection: &Selection,
    ) -> Result<(), ServiceError> {
        let payload = Self::encode(cart, selection)?;
        self.store
            .set(&Self::handoff_key(scope), &payload, self.snapshot_ttl)
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))?;
        Ok(())
    }

    /// Wipes both snapshots and writes the clear-marker. The marker defeats
    /// the race where a snapshot write queued before the clear lands after it
    /// and would otherwise resurrect discarded state.
    #[instrument(skip(self))]
    pub async fn clear_all(&self, scope: &str) -> Result<(), ServiceError> {
        self.store
            .delete(&Self::normal_key(scope))
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))?;
        self.store
            .delete(&Self::handoff_key(scope))
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))?;
        self.store
            .set(
                &Self::cleared_key(scope),
                &Utc::now().to_rfc3339(),
                self.snapshot_ttl,
            )
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))?;
        Ok(())
    }

    /// Applies the restore precedence `PENDING_HANDOFF > CLEARED > NORMAL`.
    /// Call exactly once per session start.
    #[instrument(skip(self))]
    pub async fn load_on_init(&self, scope: &str) -> Result<RestoredState, ServiceError> {
        // Pending handoff snapshot wins and is single use.
        let handoff_key = Self::handoff_key(scope);
        if let Some(raw) = self
            .store
            .get(&handoff_key)
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))?
        {
            self.store
                .delete(&handoff_key)
                .await
                .map_err(|e| ServiceError::CacheError(e.to_string()))?;
            match serde_json::from_str::<CheckoutSnapshot>(&raw) {
                Ok(snapshot) => {
                    return Ok(RestoredState::Restored {
                        snapshot,
                        from_handoff: true,
                    });
                }
                Err(e) => {
                    // Malformed snapshots degrade to an empty cart.
                    warn!("Discarding malformed handoff snapshot: {}", e);
                    return Ok(RestoredState::Empty);
                }
            }
        }

        // A clear-marker consumes both snapshots and itself.
        let cleared_key = Self::cleared_key(scope);
        if self
            .store
            .exists(&cleared_key)
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))?
        {
            self.store
                .delete(&Self::normal_key(scope))
                .await
                .map_err(|e| ServiceError::CacheError(e.to_string()))?;
            self.store
                .delete(&handoff_key)
                .await
                .map_err(|e| ServiceError::CacheError(e.to_string()))?;
            self.store
                .delete(&cleared_key)
                .await
                .map_err(|e| ServiceError::CacheError(e.to_string()))?;
            return Ok(RestoredState::Empty);
        }

        // Normal snapshot.
        if let Some(raw) = self
            .store
            .get(&Self::normal_key(scope))
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))?
        {
            match serde_json::from_str::<CheckoutSnapshot>(&raw) {
                Ok(snapshot) => {
                    return Ok(RestoredState::Restored {
                        snapshot,
                        from_handoff: false,
                    });
                }
                Err(e) => {
                    warn!("Discarding malformed snapshot: {}", e);
                    self.store
                        .delete(&Self::normal_key(scope))
                        .await
                        .map_err(|e| ServiceError::CacheError(e.to_string()))?;
                    return Ok(RestoredState::Empty);
                }
            }
        }

        Ok(RestoredState::Empty)
    }
}
