//! Filter value types
//!
//! Any totally ordered, cloneable type can key a filter index. `Option<T>`
//! values carry null semantics; for textual nullable values the reserved
//! [`NULL_SENTINEL`] can stand in for `None` so that "no value" is itself
//! queryable.

use std::cmp::Ordering;
use std::fmt::Debug;

/// Reserved text substituted for a null textual projection
pub const NULL_SENTINEL: &str = "**NA**";

/// A value a filter index can be keyed by
pub trait FilterValue: Ord + Clone + Debug + Send + Sync + 'static {
    /// Whether this value is null
    fn is_null(&self) -> bool {
        false
    }

    /// Replacement for a null value under null substitution; `None` when the
    /// type is not textual and nullable
    fn null_sentinel() -> Option<Self> {
        None
    }

    /// The sentinel as a non-null value of this type, for textual types
    fn textual_sentinel() -> Option<Self> {
        None
    }

    /// Human-readable type name used in mismatch errors
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

macro_rules! plain_filter_value {
    ($($t:ty),* $(,)?) => {
        $(impl FilterValue for $t {})*
    };
}

plain_filter_value!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, bool, char, ());

impl FilterValue for String {
    fn textual_sentinel() -> Option<Self> {
        Some(NULL_SENTINEL.to_string())
    }
}

impl<T: FilterValue> FilterValue for Option<T> {
    fn is_null(&self) -> bool {
        self.is_none()
    }

    fn null_sentinel() -> Option<Self> {
        T::textual_sentinel().map(Some)
    }
}

impl<A: FilterValue, B: FilterValue> FilterValue for (A, B) {}

/// `f64` with a total order, so prices and measurements can be range-filtered
///
/// Ordering follows `f64::total_cmp`: `-0.0 < 0.0` and NaN sorts last.
#[derive(Debug, Clone, Copy)]
pub struct OrderedF64(pub f64);

impl OrderedF64 {
    /// The wrapped value
    pub fn get(self) -> f64 {
        self.0
    }
}

impl From<f64> for OrderedF64 {
    fn from(value: f64) -> Self {
        OrderedF64(value)
    }
}

impl PartialEq for OrderedF64 {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedF64 {}

impl PartialOrd for OrderedF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl FilterValue for OrderedF64 {}

/// Registration-time table of a value type's filterable properties
///
/// Lets a filter index be built from a property name, validated once when
/// the index is constructed.
///
/// ```rust,ignore
/// impl PropertyTable<String> for Product {
///     fn property(name: &str) -> Option<fn(&Self) -> String> {
///         match name {
///             "category" => Some(|p| p.category.clone()),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait PropertyTable<F>: Sized {
    /// Accessor for `name`, if the type exposes it with value type `F`
    fn property(name: &str) -> Option<fn(&Self) -> F>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_semantics() {
        assert!(None::<String>.is_null());
        assert!(!Some("x".to_string()).is_null());
        assert!(!"x".to_string().is_null());
        assert!(!0u32.is_null());
    }

    #[test]
    fn test_sentinel_only_for_nullable_text() {
        assert_eq!(
            <Option<String>>::null_sentinel(),
            Some(Some(NULL_SENTINEL.to_string()))
        );
        assert_eq!(String::null_sentinel(), None);
        assert_eq!(<Option<u64>>::null_sentinel(), None);
    }

    #[test]
    fn test_ordered_f64_total_order() {
        let mut values = vec![OrderedF64(29.99), OrderedF64(-1.0), OrderedF64(f64::NAN), OrderedF64(24.99)];
        values.sort();
        assert_eq!(values[0].get(), -1.0);
        assert_eq!(values[1].get(), 24.99);
        assert_eq!(values[2].get(), 29.99);
        assert!(values[3].get().is_nan());
        assert_eq!(OrderedF64(1.0), OrderedF64::from(1.0));
    }
}
