use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktake_catalog::ProductId;
use stocktake_core::{AggregateId, DomainError, DomainResult, Entity, Money};
use stocktake_variance::{total_value_difference, Variance, VarianceThreshold};

/// Count session identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountSessionId(pub AggregateId);

impl CountSessionId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CountSessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Count item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountItemId(pub AggregateId);

impl CountItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CountItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Cycle-count lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountStatus {
    /// Collecting lines.
    Started,
    /// Submitted for review; no ledger writes yet.
    Review,
    /// Committed to the ledger. Terminal.
    Applied,
}

/// One counted line: product, the book quantity frozen at add time, and the
/// physical count with its variance annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountItem {
    pub id: CountItemId,
    pub product_id: ProductId,
    /// Book quantity snapshot taken when the line was added; immutable.
    pub current_quantity: i64,
    pub counted_quantity: i64,
    pub variance: Variance,
    pub notes: Option<String>,
}

impl Entity for CountItem {
    type Id = CountItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A cycle-count session.
///
/// Transitions forward only: Started → Review → Applied. Once Applied the
/// session is immutable; asking it to apply again reports "already applied"
/// instead of erroring, which is what makes boundary-level re-submission
/// idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountSession {
    id: CountSessionId,
    status: CountStatus,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    items: Vec<CountItem>,
    threshold: VarianceThreshold,
}

impl Entity for CountSession {
    type Id = CountSessionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl CountSession {
    pub fn start(notes: Option<String>) -> Self {
        Self::start_with_threshold(notes, VarianceThreshold::default())
    }

    pub fn start_with_threshold(notes: Option<String>, threshold: VarianceThreshold) -> Self {
        Self {
            id: CountSessionId::new(AggregateId::new()),
            status: CountStatus::Started,
            notes,
            created_at: Utc::now(),
            items: Vec::new(),
            threshold,
        }
    }

    pub fn id_typed(&self) -> CountSessionId {
        self.id
    }

    pub fn status(&self) -> CountStatus {
        self.status
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn items(&self) -> &[CountItem] {
        &self.items
    }

    pub fn threshold(&self) -> VarianceThreshold {
        self.threshold
    }

    pub fn is_collecting(&self) -> bool {
        self.status == CountStatus::Started
    }

    pub fn is_applied(&self) -> bool {
        self.status == CountStatus::Applied
    }

    fn ensure_collecting(&self) -> DomainResult<()> {
        if !self.is_collecting() {
            return Err(DomainError::invariant(
                "count items can only change while the session is collecting",
            ));
        }
        Ok(())
    }

    /// Add a counted line. The book quantity is snapshotted here and never
    /// revised, even if the ledger moves before the session is applied —
    /// the apply path corrects to the counted value, not the difference.
    pub fn add_item(
        &mut self,
        product_id: ProductId,
        current_quantity: i64,
        counted_quantity: i64,
        notes: Option<String>,
    ) -> DomainResult<CountItem> {
        self.ensure_collecting()?;
        if counted_quantity < 0 {
            return Err(DomainError::validation("counted quantity cannot be negative"));
        }
        if current_quantity < 0 {
            return Err(DomainError::validation("book quantity cannot be negative"));
        }
        if self.items.iter().any(|i| i.product_id == product_id) {
            return Err(DomainError::validation(format!(
                "product {product_id} already counted in this session"
            )));
        }

        let item = CountItem {
            id: CountItemId::new(AggregateId::new()),
            product_id,
            current_quantity,
            counted_quantity,
            variance: Variance::compute(current_quantity, counted_quantity, self.threshold),
            notes,
        };
        self.items.push(item.clone());
        Ok(item)
    }

    /// Revise a line's count. Recomputes the variance against the frozen
    /// book quantity.
    pub fn update_item(
        &mut self,
        item_id: CountItemId,
        counted_quantity: i64,
    ) -> DomainResult<CountItem> {
        self.ensure_collecting()?;
        if counted_quantity < 0 {
            return Err(DomainError::validation("counted quantity cannot be negative"));
        }
        let threshold = self.threshold;
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or(DomainError::NotFound)?;
        item.counted_quantity = counted_quantity;
        item.variance = Variance::compute(item.current_quantity, counted_quantity, threshold);
        Ok(item.clone())
    }

    pub fn update_item_notes(
        &mut self,
        item_id: CountItemId,
        notes: Option<String>,
    ) -> DomainResult<()> {
        self.ensure_collecting()?;
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or(DomainError::NotFound)?;
        item.notes = notes;
        Ok(())
    }

    pub fn remove_item(&mut self, item_id: CountItemId) -> DomainResult<CountItem> {
        self.ensure_collecting()?;
        let idx = self
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or(DomainError::NotFound)?;
        Ok(self.items.remove(idx))
    }

    /// Started → Review. Submitting an already-reviewed session again is a
    /// no-op; a terminal session cannot go back to review.
    pub fn mark_review(&mut self) -> DomainResult<()> {
        match self.status {
            CountStatus::Started => {
                self.status = CountStatus::Review;
                Ok(())
            }
            CountStatus::Review => Ok(()),
            CountStatus::Applied => Err(DomainError::invariant(
                "an applied session cannot return to review",
            )),
        }
    }

    /// Move to the terminal state. Returns `false` when the session was
    /// already Applied — callers use that to skip re-committing.
    pub fn mark_applied(&mut self) -> DomainResult<bool> {
        match self.status {
            CountStatus::Started | CountStatus::Review => {
                self.status = CountStatus::Applied;
                Ok(true)
            }
            CountStatus::Applied => Ok(false),
        }
    }

    /// Lines whose variance exceeds the threshold. Advisory: these are
    /// surfaced for operator attention, never a gate on applying.
    pub fn significant_items(&self) -> Vec<&CountItem> {
        self.items.iter().filter(|i| i.variance.is_significant()).collect()
    }

    /// Signed value delta of the whole session: Σ difference × unit cost.
    pub fn total_value_difference<F>(&self, cost_price: F) -> DomainResult<Money>
    where
        F: Fn(ProductId) -> Option<Money>,
    {
        let mut lines = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let cost = cost_price(item.product_id).ok_or(DomainError::NotFound)?;
            lines.push((item.variance.difference, cost));
        }
        total_value_difference(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stocktake_variance::Classification;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    #[test]
    fn add_item_snapshots_and_annotates() {
        let mut session = CountSession::start(Some("weekly count".to_string()));
        let product = test_product_id();

        let item = session.add_item(product, 100, 95, None).unwrap();
        assert_eq!(item.current_quantity, 100);
        assert_eq!(item.counted_quantity, 95);
        assert_eq!(item.variance.difference, -5);
        assert_eq!(item.variance.percent, 5.0);
        assert_eq!(item.variance.classification, Classification::Acceptable);
        assert_eq!(session.status(), CountStatus::Started);
    }

    #[test]
    fn rejects_negative_count() {
        let mut session = CountSession::start(None);
        let err = session.add_item(test_product_id(), 10, -1, None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn rejects_duplicate_product() {
        let mut session = CountSession::start(None);
        let product = test_product_id();
        session.add_item(product, 10, 10, None).unwrap();

        let err = session.add_item(product, 10, 9, None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(session.items().len(), 1);
    }

    #[test]
    fn update_recomputes_variance_against_frozen_snapshot() {
        let mut session = CountSession::start(None);
        let product = test_product_id();
        let item_id = session.add_item(product, 100, 95, None).unwrap().id;

        let item = session.update_item(item_id, 80).unwrap();
        assert_eq!(item.current_quantity, 100);
        assert_eq!(item.variance.difference, -20);
        assert_eq!(item.variance.classification, Classification::NeedsReview);
    }

    #[test]
    fn remove_item_only_while_collecting() {
        let mut session = CountSession::start(None);
        let item_id = session.add_item(test_product_id(), 5, 5, None).unwrap().id;
        session.mark_review().unwrap();

        let err = session.remove_item(item_id).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn unknown_item_is_not_found() {
        let mut session = CountSession::start(None);
        let err = session
            .update_item(CountItemId::new(AggregateId::new()), 1)
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn lifecycle_is_forward_only() {
        let mut session = CountSession::start(None);
        session.add_item(test_product_id(), 10, 12, None).unwrap();

        session.mark_review().unwrap();
        assert_eq!(session.status(), CountStatus::Review);
        // Review is re-enterable, Applied is not.
        session.mark_review().unwrap();

        assert!(session.mark_applied().unwrap());
        assert_eq!(session.status(), CountStatus::Applied);
        assert!(session.mark_review().is_err());
    }

    #[test]
    fn reapplying_is_a_noop_not_an_error() {
        let mut session = CountSession::start(None);
        session.add_item(test_product_id(), 10, 8, None).unwrap();

        assert!(session.mark_applied().unwrap());
        assert!(!session.mark_applied().unwrap());
        assert_eq!(session.status(), CountStatus::Applied);
    }

    #[test]
    fn applied_session_is_immutable() {
        let mut session = CountSession::start(None);
        let item_id = session.add_item(test_product_id(), 10, 8, None).unwrap().id;
        session.mark_applied().unwrap();

        assert!(session.add_item(test_product_id(), 1, 1, None).is_err());
        assert!(session.update_item(item_id, 9).is_err());
        assert!(session.remove_item(item_id).is_err());
    }

    #[test]
    fn significant_items_surface_only_above_threshold() {
        let mut session = CountSession::start(None);
        let p1 = test_product_id();
        let p2 = test_product_id();
        let p3 = test_product_id();
        session.add_item(p1, 100, 100, None).unwrap();
        session.add_item(p2, 100, 96, None).unwrap();
        session.add_item(p3, 100, 80, None).unwrap();

        let significant = session.significant_items();
        assert_eq!(significant.len(), 1);
        assert_eq!(significant[0].product_id, p3);
    }

    #[test]
    fn total_value_difference_is_signed() {
        let mut session = CountSession::start(None);
        let p1 = test_product_id();
        let p2 = test_product_id();
        session.add_item(p1, 0, 10, None).unwrap();
        session.add_item(p2, 5, 2, None).unwrap();

        let total = session
            .total_value_difference(|id| {
                if id == p1 {
                    Some(Money::from_cents(5_000))
                } else {
                    Some(Money::from_cents(2_000))
                }
            })
            .unwrap();
        // +10 × 5000 − 3 × 2000
        assert_eq!(total, Money::from_cents(44_000));
    }

    #[test]
    fn unknown_cost_fails_value_rollup() {
        let mut session = CountSession::start(None);
        session.add_item(test_product_id(), 1, 2, None).unwrap();
        let err = session.total_value_difference(|_| None).unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }
}
