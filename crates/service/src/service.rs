use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use stocktake_adjustments::{
    AdjustmentBatch, AdjustmentItem, AdjustmentKind, BatchPolicy, BatchProcessor, BatchReport,
};
use stocktake_catalog::{Catalog, CatalogProduct, ProductId};
use stocktake_core::{DomainError, DomainResult, LocationId, UserId};
use stocktake_counting::{CountSession, CountSessionId};
use stocktake_ledger::{MovementKind, StockLedger, StockMovement};
use stocktake_serials::{ReconciliationDiff, SerialNumber, SerialReconciler, SerialRegistry};
use stocktake_variance::VarianceThreshold;

use crate::auth::{capability, Authorizer};

/// Service-level configuration.
///
/// One location per service instance: this is a single-site back office, and
/// every boundary operation works against the configured location's ledger
/// keys.
#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    pub location_id: LocationId,
    pub threshold: VarianceThreshold,
    pub batch_policy: BatchPolicy,
}

impl ServiceConfig {
    pub fn new(location_id: LocationId) -> Self {
        Self {
            location_id,
            threshold: VarianceThreshold::default(),
            batch_policy: BatchPolicy::default(),
        }
    }

    /// Defaults with environment overrides applied (batch policy).
    pub fn from_env(location_id: LocationId) -> Self {
        Self {
            batch_policy: BatchPolicy::from_env(),
            ..Self::new(location_id)
        }
    }
}

/// One counted line as submitted from the counting screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountLine {
    pub product_id: ProductId,
    pub counted_quantity: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartCycleCountResponse {
    pub session_id: CountSessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitCycleCountResponse {
    pub session: CountSession,
    pub applied: bool,
    /// Present when this submission committed the count.
    pub report: Option<BatchReport>,
}

/// Transport-agnostic boundary over the reconciliation engine.
///
/// Wires the catalog and authorization ports to the ledger, the count
/// sessions, the batch processor, and the serial reconciler. HTTP/UI layers
/// sit on top of these operations; nothing in here knows about transport.
pub struct InventoryService {
    catalog: Arc<dyn Catalog>,
    authorizer: Arc<dyn Authorizer>,
    ledger: Arc<StockLedger>,
    registry: Arc<SerialRegistry>,
    reconciler: SerialReconciler,
    /// Count applies are always all-or-nothing, whatever the bulk policy.
    count_processor: BatchProcessor,
    adjust_processor: BatchProcessor,
    sessions: RwLock<HashMap<CountSessionId, CountSession>>,
    config: ServiceConfig,
}

impl InventoryService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        authorizer: Arc<dyn Authorizer>,
        config: ServiceConfig,
    ) -> Self {
        let ledger = Arc::new(StockLedger::new());
        let registry = Arc::new(SerialRegistry::new());
        let reconciler = SerialReconciler::new(Arc::clone(&registry), Arc::clone(&ledger));
        let count_processor = BatchProcessor::with_policy(
            Arc::clone(&ledger),
            Arc::clone(&catalog),
            BatchPolicy::AllOrNothing,
        );
        let adjust_processor = BatchProcessor::with_policy(
            Arc::clone(&ledger),
            Arc::clone(&catalog),
            config.batch_policy,
        );
        Self {
            catalog,
            authorizer,
            ledger,
            registry,
            reconciler,
            count_processor,
            adjust_processor,
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    pub fn config(&self) -> ServiceConfig {
        self.config
    }

    /// Open a new cycle-count session.
    pub fn start_cycle_count(
        &self,
        actor: UserId,
        notes: Option<String>,
    ) -> DomainResult<StartCycleCountResponse> {
        self.authorizer.authorize(actor, capability::INVENTORY_COUNT)?;

        let session = CountSession::start_with_threshold(notes, self.config.threshold);
        let session_id = session.id_typed();
        self.sessions_mut()?.insert(session_id, session);

        tracing::info!(session_id = %session_id, "cycle count started");
        Ok(StartCycleCountResponse { session_id })
    }

    /// Submit counted lines for a session.
    ///
    /// `apply = false` parks the session in Review with its lines persisted
    /// and writes nothing to the ledger. `apply = true` commits every line
    /// as a set-to-counted correction (all-or-nothing) and moves the session
    /// to Applied. Re-submitting an Applied session returns the prior state
    /// with `applied = true` and commits nothing — idempotent, not an error.
    pub fn submit_cycle_count(
        &self,
        actor: UserId,
        session_id: CountSessionId,
        lines: Vec<CountLine>,
        apply: bool,
    ) -> DomainResult<SubmitCycleCountResponse> {
        self.authorizer.authorize(actor, capability::INVENTORY_COUNT)?;
        if apply {
            self.authorizer.authorize(actor, capability::INVENTORY_ADJUST)?;
        }

        let mut sessions = self.sessions_mut()?;
        let session = sessions.get_mut(&session_id).ok_or(DomainError::NotFound)?;

        if session.is_applied() {
            return Ok(SubmitCycleCountResponse {
                session: session.clone(),
                applied: true,
                report: None,
            });
        }

        // Build the full pending state on a copy; the stored session only
        // advances if the whole submission goes through.
        let mut updated = session.clone();
        for line in lines {
            let product = self.tracked_product(line.product_id)?;
            let snapshot = self.ledger.quantity(product.id, self.config.location_id);
            updated.add_item(product.id, snapshot, line.counted_quantity, line.notes)?;
        }

        if !apply {
            updated.mark_review()?;
            *session = updated;
            tracing::info!(session_id = %session_id, "cycle count parked for review");
            return Ok(SubmitCycleCountResponse {
                session: session.clone(),
                applied: false,
                report: None,
            });
        }

        let report = if updated.items().is_empty() {
            None
        } else {
            let corrections: Vec<AdjustmentItem> = updated
                .items()
                .iter()
                .map(|item| AdjustmentItem {
                    product_id: item.product_id,
                    kind: AdjustmentKind::Set,
                    quantity: item.counted_quantity,
                    reason: format!("cycle count {session_id}"),
                })
                .collect();
            let batch = AdjustmentBatch::new(updated.notes().map(String::from), corrections)?;
            let report = self.count_processor.process_with_kind(
                self.config.location_id,
                &batch,
                actor,
                MovementKind::CountApply,
            )?;

            if !report.is_complete_success() {
                // Deterministic rejection: keep the lines, park for
                // correction, and block the submission with the per-item
                // messages.
                updated.mark_review()?;
                *session = updated;
                return Err(DomainError::validation(format_failures(&report)));
            }
            Some(report)
        };

        updated.mark_applied()?;
        *session = updated;
        tracing::info!(
            session_id = %session_id,
            items = session.items().len(),
            "cycle count applied"
        );
        Ok(SubmitCycleCountResponse {
            session: session.clone(),
            applied: true,
            report,
        })
    }

    /// Commit a batch of manual corrections under the configured policy.
    ///
    /// The report enumerates every line; under best-effort the failures list
    /// is the partial-failure detail, under all-or-nothing a non-empty
    /// failures list means nothing was committed.
    pub fn bulk_adjust(
        &self,
        actor: UserId,
        adjustments: Vec<AdjustmentItem>,
        batch_notes: Option<String>,
    ) -> DomainResult<BatchReport> {
        self.authorizer.authorize(actor, capability::INVENTORY_ADJUST)?;

        // Bring known products under ledger control before committing.
        for item in &adjustments {
            if let Some(product) = self.catalog.product(item.product_id) {
                self.ledger
                    .seed(product.id, self.config.location_id, product.current_stock)?;
            }
        }

        let batch = AdjustmentBatch::new(batch_notes, adjustments)?;
        self.adjust_processor
            .process(self.config.location_id, &batch, actor)
    }

    /// Diff observed serials against the in-stock set; optionally commit the
    /// transitions and the net stock correction.
    pub fn reconcile_serials(
        &self,
        actor: UserId,
        product_id: ProductId,
        observed: Vec<SerialNumber>,
        apply: bool,
        reason: String,
    ) -> DomainResult<ReconciliationDiff> {
        let required = if apply {
            capability::INVENTORY_ADJUST
        } else {
            capability::INVENTORY_READ
        };
        self.authorizer.authorize(actor, required)?;

        self.tracked_product(product_id)?;
        self.reconciler.reconcile(
            product_id,
            self.config.location_id,
            &observed,
            apply,
            &reason,
            actor,
        )
    }

    /// Mark serials in stock as goods are received.
    pub fn register_serials(
        &self,
        actor: UserId,
        product_id: ProductId,
        serials: Vec<SerialNumber>,
    ) -> DomainResult<()> {
        self.authorizer.authorize(actor, capability::INVENTORY_ADJUST)?;
        self.tracked_product(product_id)?;
        self.registry.register(product_id, &serials)
    }

    /// Movement history for a product, most-recent-first.
    pub fn movement_history(
        &self,
        actor: UserId,
        product_id: ProductId,
        limit: usize,
    ) -> DomainResult<Vec<StockMovement>> {
        self.authorizer.authorize(actor, capability::INVENTORY_READ)?;
        Ok(self.ledger.history(product_id, limit))
    }

    /// Resolve a product through the catalog port and make sure the ledger
    /// tracks it (seeded with the catalog's last known quantity).
    fn tracked_product(&self, product_id: ProductId) -> DomainResult<CatalogProduct> {
        let product = self
            .catalog
            .product(product_id)
            .ok_or(DomainError::NotFound)?;
        self.ledger
            .seed(product.id, self.config.location_id, product.current_stock)?;
        Ok(product)
    }

    fn sessions_mut(
        &self,
    ) -> DomainResult<std::sync::RwLockWriteGuard<'_, HashMap<CountSessionId, CountSession>>> {
        self.sessions
            .write()
            .map_err(|_| DomainError::conflict("session store lock poisoned"))
    }
}

fn format_failures(report: &BatchReport) -> String {
    let details: Vec<String> = report
        .failures
        .iter()
        .map(|f| match f.index {
            Some(index) => format!("item {index}: {}", f.reason),
            None => f.reason.clone(),
        })
        .collect();
    format!("count apply rejected: {}", details.join("; "))
}
