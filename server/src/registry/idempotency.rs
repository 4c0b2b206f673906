use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::error::RegistryResult;
use super::{keys, require_non_empty};
use crate::storage::KvBackend;

/// Single-use request tokens, stored as bare marker keys.
///
/// A reserved token means the request carrying it has already been applied.
/// Tokens never expire.
#[derive(Clone)]
pub struct IdempotencyLedger {
    backend: Arc<dyn KvBackend>,
}

impl IdempotencyLedger {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// Marks `token` as consumed. Call only after the guarded write succeeded.
    #[instrument(skip(self))]
    pub async fn reserve(&self, token: &str) -> RegistryResult<()> {
        require_non_empty("idempotency key", token)?;
        self.backend
            .put(&keys::request_key(token), Bytes::new())
            .await?;
        debug!("reserved idempotency key");
        Ok(())
    }

    /// Whether `token` was reserved. A failed lookup counts as not seen.
    #[instrument(skip(self))]
    pub async fn seen(&self, token: &str) -> bool {
        if token.trim().is_empty() {
            return false;
        }

        match self.backend.get(&keys::request_key(token)).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(error = %e, "idempotency lookup failed, treating key as unseen");
                false
            }
        }
    }
}
