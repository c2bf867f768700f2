//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values; two
/// with the same values are the same value. `Money` is the canonical
/// instance here — a cost of 5000 cents is a cost of 5000 cents, regardless
/// of which product row it came from. Variances and reconciliation diffs
/// follow the same rule.
///
/// The bounds keep value objects cheap to copy, comparable, and debuggable.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
