use serde::{Deserialize, Serialize};

use stocktake_core::{DomainError, DomainResult, Money, ValueObject};

/// Variance classification threshold, in percent of recorded quantity.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarianceThreshold(f64);

impl VarianceThreshold {
    pub fn new(percent: f64) -> DomainResult<Self> {
        if !percent.is_finite() || percent < 0.0 {
            return Err(DomainError::validation(
                "variance threshold must be a non-negative percentage",
            ));
        }
        Ok(Self(percent))
    }

    pub fn percent(&self) -> f64 {
        self.0
    }
}

impl Default for VarianceThreshold {
    fn default() -> Self {
        Self(5.0)
    }
}

/// How a count line compares to the recorded quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Counted exactly what the books say.
    Accurate,
    /// Off by no more than the threshold.
    Acceptable,
    /// Above the threshold; surfaced for operator attention (advisory — it
    /// never blocks applying the count).
    NeedsReview,
}

/// Computed variance for one count line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Variance {
    pub difference: i64,
    pub percent: f64,
    pub classification: Classification,
}

impl ValueObject for Variance {}

impl Variance {
    /// Annotate a (recorded, counted) pair.
    ///
    /// Percentage rules: a count against zero recorded stock is either a 0%
    /// match (counted zero) or a 100% surprise (counted anything); otherwise
    /// `|difference| / recorded × 100`.
    pub fn compute(current: i64, counted: i64, threshold: VarianceThreshold) -> Self {
        let difference = counted - current;
        let percent = variance_pct(current, counted);
        let classification = if difference == 0 {
            Classification::Accurate
        } else if percent <= threshold.percent() {
            Classification::Acceptable
        } else {
            Classification::NeedsReview
        };
        Self {
            difference,
            percent,
            classification,
        }
    }

    pub fn is_significant(&self) -> bool {
        self.classification == Classification::NeedsReview
    }
}

/// `counted − current`, signed.
pub fn difference(current: i64, counted: i64) -> i64 {
    counted - current
}

/// Absolute gap as a percentage of the recorded quantity.
pub fn variance_pct(current: i64, counted: i64) -> f64 {
    if current > 0 {
        (counted - current).unsigned_abs() as f64 / current as f64 * 100.0
    } else if counted > 0 {
        100.0
    } else {
        0.0
    }
}

/// Session-level signed value delta: Σ difference × unit cost.
///
/// Accumulates in 128-bit to keep a pathological session from wrapping.
pub fn total_value_difference<I>(lines: I) -> DomainResult<Money>
where
    I: IntoIterator<Item = (i64, Money)>,
{
    let mut total: i128 = 0;
    for (difference, cost_price) in lines {
        total += difference as i128 * cost_price.cents() as i128;
    }
    let cents = i64::try_from(total)
        .map_err(|_| DomainError::invariant("total value difference overflow"))?;
    Ok(Money::from_cents(cents))
}
