//! Integration tests for the full reconciliation pipeline.
//!
//! Tests: boundary operation → session/batch/reconciler → StockLedger,
//! including authorization, idempotent re-apply, and concurrent mutation of
//! a shared product.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use stocktake_adjustments::{AdjustmentItem, AdjustmentKind, BatchPolicy};
    use stocktake_catalog::{CatalogProduct, InMemoryCatalog, ProductId};
    use stocktake_core::{AggregateId, DomainError, LocationId, Money, UserId};
    use stocktake_counting::CountStatus;
    use stocktake_ledger::MovementKind;
    use stocktake_serials::SerialNumber;
    use stocktake_variance::Classification;

    use crate::auth::{capability, StaticAuthorizer};
    use crate::service::{CountLine, InventoryService, ServiceConfig};

    struct Harness {
        service: InventoryService,
        catalog: Arc<InMemoryCatalog>,
        location: LocationId,
        admin: UserId,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_policy(BatchPolicy::AllOrNothing)
        }

        fn with_policy(batch_policy: BatchPolicy) -> Self {
            let catalog = Arc::new(InMemoryCatalog::new());
            let authorizer = Arc::new(StaticAuthorizer::new());
            let admin = UserId::new();
            authorizer.grant_all(admin);
            let location = LocationId::new();
            let config = ServiceConfig {
                batch_policy,
                ..ServiceConfig::new(location)
            };
            let service = InventoryService::new(
                Arc::clone(&catalog) as Arc<dyn stocktake_catalog::Catalog>,
                authorizer,
                config,
            );
            Self {
                service,
                catalog,
                location,
                admin,
            }
        }

        fn add_product(&self, stock: i64, cost_cents: i64) -> ProductId {
            let id = ProductId::new(AggregateId::new());
            self.catalog.insert(
                CatalogProduct::new(id, format!("SKU-{id}"), stock, Money::from_cents(cost_cents))
                    .unwrap(),
            );
            id
        }

        fn count_line(product_id: ProductId, counted_quantity: i64) -> CountLine {
            CountLine {
                product_id,
                counted_quantity,
                notes: None,
            }
        }
    }

    #[test]
    fn cycle_count_applies_and_moves_stock() {
        let h = Harness::new();
        let p1 = h.add_product(100, 5_000);
        let p2 = h.add_product(50, 2_000);

        let started = h.service.start_cycle_count(h.admin, Some("weekly".into())).unwrap();
        let response = h
            .service
            .submit_cycle_count(
                h.admin,
                started.session_id,
                vec![Harness::count_line(p1, 95), Harness::count_line(p2, 50)],
                true,
            )
            .unwrap();

        assert!(response.applied);
        assert_eq!(response.session.status(), CountStatus::Applied);
        assert_eq!(h.service.ledger().quantity(p1, h.location), 95);
        assert_eq!(h.service.ledger().quantity(p2, h.location), 50);

        // The matching line commits nothing; the off-by-five line commits one
        // CountApply movement.
        let history = h.service.movement_history(h.admin, p1, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, MovementKind::CountApply);
        assert_eq!(history[0].quantity_delta, -5);
        assert!(h.service.movement_history(h.admin, p2, 10).unwrap().is_empty());

        let report = response.report.unwrap();
        assert_eq!(report.total_cost_impact, Money::from_cents(-25_000));
    }

    #[test]
    fn review_submission_writes_nothing() {
        let h = Harness::new();
        let product = h.add_product(100, 5_000);

        let started = h.service.start_cycle_count(h.admin, None).unwrap();
        let response = h
            .service
            .submit_cycle_count(
                h.admin,
                started.session_id,
                vec![Harness::count_line(product, 80)],
                false,
            )
            .unwrap();

        assert!(!response.applied);
        assert_eq!(response.session.status(), CountStatus::Review);
        assert_eq!(
            response.session.items()[0].variance.classification,
            Classification::NeedsReview
        );
        assert_eq!(h.service.ledger().quantity(product, h.location), 100);
        assert!(h.service.movement_history(h.admin, product, 10).unwrap().is_empty());
    }

    #[test]
    fn review_then_apply_commits_persisted_lines() {
        let h = Harness::new();
        let product = h.add_product(100, 5_000);

        let started = h.service.start_cycle_count(h.admin, None).unwrap();
        h.service
            .submit_cycle_count(
                h.admin,
                started.session_id,
                vec![Harness::count_line(product, 90)],
                false,
            )
            .unwrap();

        // Second submission carries no new lines; it applies what was parked.
        let response = h
            .service
            .submit_cycle_count(h.admin, started.session_id, vec![], true)
            .unwrap();

        assert!(response.applied);
        assert_eq!(h.service.ledger().quantity(product, h.location), 90);
    }

    #[test]
    fn reapplying_a_session_commits_nothing_more() {
        let h = Harness::new();
        let product = h.add_product(100, 5_000);

        let started = h.service.start_cycle_count(h.admin, None).unwrap();
        h.service
            .submit_cycle_count(
                h.admin,
                started.session_id,
                vec![Harness::count_line(product, 95)],
                true,
            )
            .unwrap();
        let rows_after_first = h.service.movement_history(h.admin, product, 100).unwrap().len();

        let again = h
            .service
            .submit_cycle_count(h.admin, started.session_id, vec![], true)
            .unwrap();

        assert!(again.applied);
        assert!(again.report.is_none());
        assert_eq!(
            h.service.movement_history(h.admin, product, 100).unwrap().len(),
            rows_after_first
        );
        assert_eq!(h.service.ledger().quantity(product, h.location), 95);
    }

    #[test]
    fn duplicate_product_in_submission_is_rejected_whole() {
        let h = Harness::new();
        let product = h.add_product(10, 100);

        let started = h.service.start_cycle_count(h.admin, None).unwrap();
        let err = h
            .service
            .submit_cycle_count(
                h.admin,
                started.session_id,
                vec![Harness::count_line(product, 9), Harness::count_line(product, 8)],
                false,
            )
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        // Nothing stuck: the session still has no items.
        let response = h
            .service
            .submit_cycle_count(h.admin, started.session_id, vec![], false)
            .unwrap();
        assert!(response.session.items().is_empty());
    }

    #[test]
    fn unknown_session_and_product_are_not_found() {
        let h = Harness::new();
        let err = h
            .service
            .submit_cycle_count(
                h.admin,
                stocktake_counting::CountSessionId::new(AggregateId::new()),
                vec![],
                false,
            )
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);

        let started = h.service.start_cycle_count(h.admin, None).unwrap();
        let err = h
            .service
            .submit_cycle_count(
                h.admin,
                started.session_id,
                vec![Harness::count_line(ProductId::new(AggregateId::new()), 1)],
                false,
            )
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn bulk_adjust_reports_signed_impacts() {
        let h = Harness::new();
        let p1 = h.add_product(0, 5_000);
        let p2 = h.add_product(10, 2_000);

        let report = h
            .service
            .bulk_adjust(
                h.admin,
                vec![
                    AdjustmentItem {
                        product_id: p1,
                        kind: AdjustmentKind::Increase,
                        quantity: 10,
                        reason: "found in back room".into(),
                    },
                    AdjustmentItem {
                        product_id: p2,
                        kind: AdjustmentKind::Decrease,
                        quantity: 3,
                        reason: "damaged".into(),
                    },
                ],
                Some("monthly correction".into()),
            )
            .unwrap();

        assert!(report.is_complete_success());
        assert_eq!(report.successful_adjustments, 2);
        assert_eq!(report.total_processed, 2);
        assert_eq!(report.total_cost_impact, Money::from_cents(44_000));
        assert_eq!(h.service.ledger().quantity(p1, h.location), 10);
        assert_eq!(h.service.ledger().quantity(p2, h.location), 7);
    }

    #[test]
    fn best_effort_policy_surfaces_partial_failures() {
        let h = Harness::with_policy(BatchPolicy::BestEffort);
        let good = h.add_product(5, 100);
        let unknown = ProductId::new(AggregateId::new());

        let report = h
            .service
            .bulk_adjust(
                h.admin,
                vec![
                    AdjustmentItem {
                        product_id: good,
                        kind: AdjustmentKind::Increase,
                        quantity: 1,
                        reason: "recount".into(),
                    },
                    AdjustmentItem {
                        product_id: unknown,
                        kind: AdjustmentKind::Increase,
                        quantity: 1,
                        reason: "recount".into(),
                    },
                ],
                None,
            )
            .unwrap();

        assert_eq!(report.successful_adjustments, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, Some(1));
        assert_eq!(h.service.ledger().quantity(good, h.location), 6);
    }

    #[test]
    fn serial_reconciliation_round_trip() {
        let h = Harness::new();
        let product = h.add_product(3, 10_000);
        let serials: Vec<SerialNumber> = ["A1", "B2", "C3"]
            .iter()
            .map(|s| SerialNumber::new(*s).unwrap())
            .collect();
        h.service
            .register_serials(h.admin, product, serials)
            .unwrap();

        // Dry-run first: diff only, no mutation.
        let observed = vec![
            SerialNumber::new("B2").unwrap(),
            SerialNumber::new("D4").unwrap(),
        ];
        let dry = h
            .service
            .reconcile_serials(h.admin, product, observed.clone(), false, "audit".into())
            .unwrap();
        assert_eq!(dry.additions.len(), 1);
        assert_eq!(dry.removals.len(), 2);
        assert_eq!(h.service.ledger().quantity(product, h.location), 3);
        assert!(h.service.movement_history(h.admin, product, 10).unwrap().is_empty());

        // Apply: one aggregate movement of additions − removals.
        let applied = h
            .service
            .reconcile_serials(h.admin, product, observed, true, "audit".into())
            .unwrap();
        assert!(applied.applied);
        assert_eq!(h.service.ledger().quantity(product, h.location), 2);
        let history = h.service.movement_history(h.admin, product, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, MovementKind::SerialReconciliation);
        assert_eq!(history[0].quantity_delta, -1);
    }

    #[test]
    fn capability_checks_gate_every_operation() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let authorizer = Arc::new(StaticAuthorizer::new());
        let counter = UserId::new();
        authorizer.grant(counter, capability::INVENTORY_COUNT);
        let location = LocationId::new();
        let service = InventoryService::new(
            Arc::clone(&catalog) as Arc<dyn stocktake_catalog::Catalog>,
            authorizer,
            ServiceConfig::new(location),
        );

        let id = ProductId::new(AggregateId::new());
        catalog.insert(CatalogProduct::new(id, "SKU-X", 5, Money::from_cents(100)).unwrap());

        // Counting is allowed...
        let started = service.start_cycle_count(counter, None).unwrap();

        // ...but applying, adjusting, and reading history are not.
        let err = service
            .submit_cycle_count(counter, started.session_id, vec![], true)
            .unwrap_err();
        assert_eq!(err, DomainError::Unauthorized);
        let err = service.bulk_adjust(counter, vec![], None).unwrap_err();
        assert_eq!(err, DomainError::Unauthorized);
        let err = service.movement_history(counter, id, 10).unwrap_err();
        assert_eq!(err, DomainError::Unauthorized);

        // Denial happened before any mutation.
        assert!(service.ledger().history(id, usize::MAX).is_empty());
    }

    #[test]
    fn concurrent_count_apply_and_adjustment_conserve_quantity() {
        let h = Harness::new();
        let product = h.add_product(20, 100);
        let service = Arc::new(h.service);

        let started = service.start_cycle_count(h.admin, None).unwrap();

        let count_service = Arc::clone(&service);
        let admin = h.admin;
        let counter = thread::spawn(move || {
            count_service
                .submit_cycle_count(
                    admin,
                    started.session_id,
                    vec![Harness::count_line(product, 25)],
                    true,
                )
                .unwrap();
        });
        let adjust_service = Arc::clone(&service);
        let adjuster = thread::spawn(move || {
            adjust_service
                .bulk_adjust(
                    admin,
                    vec![AdjustmentItem {
                        product_id: product,
                        kind: AdjustmentKind::Decrease,
                        quantity: 3,
                        reason: "damaged".into(),
                    }],
                    None,
                )
                .unwrap();
        });
        counter.join().unwrap();
        adjuster.join().unwrap();

        // Whatever the interleaving, committed deltas must account exactly
        // for the quantity change, and the movement chain must compose.
        let final_quantity = service.ledger().quantity(product, h.location);
        let mut chain = service.ledger().history(product, usize::MAX);
        chain.reverse();
        let total: i64 = chain.iter().map(|m| m.quantity_delta).sum();
        assert_eq!(20 + total, final_quantity);
        let mut running = 20;
        for movement in &chain {
            assert_eq!(movement.previous_quantity, running);
            running = movement.new_quantity;
        }
        assert_eq!(running, final_quantity);
    }
}
