use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use stocktake_core::{DomainError, DomainResult, UserId};

/// Capabilities checked at the operation boundary.
///
/// One check per mutating call, before any ledger access — denial fails
/// fast, it never degrades to a silent no-op.
pub mod capability {
    /// Start and submit cycle counts.
    pub const INVENTORY_COUNT: &str = "inventory.count";
    /// Commit adjustments, apply reconciliations, register serials.
    pub const INVENTORY_ADJUST: &str = "inventory.adjust";
    /// Read movement history and run dry-run reconciliations.
    pub const INVENTORY_READ: &str = "inventory.read";
}

/// Authorization port (an excluded collaborator).
pub trait Authorizer: Send + Sync {
    fn can(&self, actor: UserId, capability: &str) -> bool;

    fn authorize(&self, actor: UserId, capability: &str) -> DomainResult<()> {
        if self.can(actor, capability) {
            Ok(())
        } else {
            tracing::warn!(actor = %actor, capability, "capability denied");
            Err(DomainError::Unauthorized)
        }
    }
}

/// Static grant table. The wildcard `"*"` grants every capability.
///
/// Intended for tests/dev; production adapts the real policy source behind
/// the same trait.
#[derive(Debug, Default)]
pub struct StaticAuthorizer {
    grants: RwLock<HashMap<UserId, HashSet<String>>>,
}

impl StaticAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, actor: UserId, capability: impl Into<String>) {
        let mut grants = self.grants.write().unwrap_or_else(|e| e.into_inner());
        grants.entry(actor).or_default().insert(capability.into());
    }

    pub fn grant_all(&self, actor: UserId) {
        self.grant(actor, "*");
    }
}

impl Authorizer for StaticAuthorizer {
    fn can(&self, actor: UserId, capability: &str) -> bool {
        let grants = match self.grants.read() {
            Ok(g) => g,
            Err(_) => return false,
        };
        grants
            .get(&actor)
            .is_some_and(|caps| caps.contains("*") || caps.contains(capability))
    }
}
