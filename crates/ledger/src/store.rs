use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, TryLockError};
use std::thread;
use std::time::Duration;

use chrono::Utc;

use stocktake_catalog::ProductId;
use stocktake_core::{AggregateId, DomainError, DomainResult, LocationId, UserId};

use crate::movement::{MovementId, MovementKind, StockMovement};

/// Bounded retry on per-key lock contention.
///
/// Ledger writes must never hang: a writer that cannot take the key's lock
/// within `max_attempts` tries (sleeping `backoff × attempt` between tries)
/// fails with a retryable `Conflict` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            backoff: Duration::from_millis(2),
        }
    }
}

impl RetryPolicy {
    /// Read overrides from `STOCKTAKE_LEDGER_RETRIES` / `STOCKTAKE_LEDGER_BACKOFF_MS`,
    /// falling back to defaults on absence or parse failure.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_attempts = std::env::var("STOCKTAKE_LEDGER_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults.max_attempts);
        let backoff = std::env::var("STOCKTAKE_LEDGER_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.backoff);
        Self {
            max_attempts,
            backoff,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StockKey {
    product_id: ProductId,
    location_id: LocationId,
}

/// How a commit computes the new quantity from the current one.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum QuantityOp {
    Delta(i64),
    Set(i64),
}

/// Authoritative per-(product, location) stock quantity plus append-only
/// movement history.
///
/// Every mutation goes through a single commit path: take the key's
/// exclusive lock, compute the new quantity, record exactly one
/// `StockMovement`, release. Locks are held for one read-modify-write only,
/// never across a batch, so two callers touching overlapping product sets in
/// different orders cannot deadlock.
#[derive(Debug, Default)]
pub struct StockLedger {
    entries: RwLock<HashMap<StockKey, Arc<Mutex<i64>>>>,
    history: RwLock<Vec<StockMovement>>,
    retry: RetryPolicy,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(retry: RetryPolicy) -> Self {
        Self {
            retry,
            ..Self::default()
        }
    }

    /// Install a starting quantity for a key without fabricating a movement.
    ///
    /// Idempotent: the first seed wins, later seeds of the same key are
    /// no-ops. Used when a catalog product first comes under ledger control.
    pub fn seed(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        quantity: i64,
    ) -> DomainResult<()> {
        if quantity < 0 {
            return Err(DomainError::validation("seed quantity cannot be negative"));
        }
        let key = StockKey {
            product_id,
            location_id,
        };
        let mut entries = self
            .entries
            .write()
            .map_err(|_| DomainError::conflict("ledger map lock poisoned"))?;
        entries
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(quantity)));
        Ok(())
    }

    /// Current quantity for a key; untracked keys read as zero.
    pub fn quantity(&self, product_id: ProductId, location_id: LocationId) -> i64 {
        let key = StockKey {
            product_id,
            location_id,
        };
        let entry = {
            let entries = match self.entries.read() {
                Ok(g) => g,
                Err(_) => return 0,
            };
            match entries.get(&key) {
                Some(e) => Arc::clone(e),
                None => return 0,
            }
        };
        match entry.lock() {
            Ok(q) => *q,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Atomic read-modify-write: `new = max(0, current + delta)`.
    ///
    /// The recorded `quantity_delta` is the effective delta after the zero
    /// floor, so committed deltas always sum to the true quantity change.
    /// Returns `None` when the floor absorbs the whole delta (a decrease on
    /// an already-empty entry) — nothing changed, nothing is recorded. Zero
    /// deltas are rejected up front; a caller with nothing to change should
    /// not be writing history.
    pub fn apply_delta(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        delta: i64,
        kind: MovementKind,
        reason: impl Into<String>,
        actor: UserId,
    ) -> DomainResult<Option<StockMovement>> {
        if delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        self.commit(product_id, location_id, QuantityOp::Delta(delta), kind, reason, actor)
    }

    /// Atomic set-to-target. Returns `None` when the entry already holds the
    /// target (nothing changed, nothing recorded) — the decision is made
    /// under the key's lock, so a concurrent writer cannot slip between the
    /// read and the write.
    pub fn apply_set(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        target: i64,
        kind: MovementKind,
        reason: impl Into<String>,
        actor: UserId,
    ) -> DomainResult<Option<StockMovement>> {
        if target < 0 {
            return Err(DomainError::validation("target quantity cannot be negative"));
        }
        self.commit(product_id, location_id, QuantityOp::Set(target), kind, reason, actor)
    }

    /// Movement history for a product, most-recent-first, capped at `limit`.
    pub fn history(&self, product_id: ProductId, limit: usize) -> Vec<StockMovement> {
        let history = match self.history.read() {
            Ok(g) => g,
            Err(poisoned) => return poisoned
                .into_inner()
                .iter()
                .rev()
                .filter(|m| m.product_id == product_id)
                .take(limit)
                .cloned()
                .collect(),
        };
        history
            .iter()
            .rev()
            .filter(|m| m.product_id == product_id)
            .take(limit)
            .cloned()
            .collect()
    }

    fn entry(&self, key: StockKey) -> DomainResult<Arc<Mutex<i64>>> {
        {
            let entries = self
                .entries
                .read()
                .map_err(|_| DomainError::conflict("ledger map lock poisoned"))?;
            if let Some(entry) = entries.get(&key) {
                return Ok(Arc::clone(entry));
            }
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|_| DomainError::conflict("ledger map lock poisoned"))?;
        Ok(Arc::clone(
            entries.entry(key).or_insert_with(|| Arc::new(Mutex::new(0))),
        ))
    }

    fn commit(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        op: QuantityOp,
        kind: MovementKind,
        reason: impl Into<String>,
        actor: UserId,
    ) -> DomainResult<Option<StockMovement>> {
        let key = StockKey {
            product_id,
            location_id,
        };
        let entry = self.entry(key)?;

        let mut attempt: u32 = 0;
        let mut quantity = loop {
            match entry.try_lock() {
                Ok(guard) => break guard,
                Err(TryLockError::WouldBlock) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        tracing::warn!(
                            product_id = %product_id,
                            attempts = attempt,
                            "ledger entry contended, giving up"
                        );
                        return Err(DomainError::conflict(format!(
                            "stock entry for product {product_id} is contended"
                        )));
                    }
                    thread::sleep(self.retry.backoff * attempt);
                }
                Err(TryLockError::Poisoned(_)) => {
                    return Err(DomainError::conflict("stock entry lock poisoned"));
                }
            }
        };

        let previous = *quantity;
        let new = match op {
            QuantityOp::Delta(delta) => (previous.saturating_add(delta)).max(0),
            QuantityOp::Set(target) => target,
        };
        if new == previous {
            return Ok(None);
        }

        let movement = StockMovement {
            id: MovementId::new(AggregateId::new()),
            product_id,
            location_id,
            kind,
            quantity_delta: new - previous,
            previous_quantity: previous,
            new_quantity: new,
            reason: reason.into(),
            actor,
            created_at: Utc::now(),
        };

        // Append while still holding the entry lock: commit order per key is
        // history order per key.
        {
            let mut history = self
                .history
                .write()
                .map_err(|_| DomainError::conflict("ledger history lock poisoned"))?;
            history.push(movement.clone());
        }
        *quantity = new;

        tracing::debug!(
            product_id = %product_id,
            kind = kind.as_str(),
            previous,
            new,
            "stock movement committed"
        );

        Ok(Some(movement))
    }
}
