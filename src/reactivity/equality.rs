// ============================================================================
// spark-properties - Equality Strategies
// Comparison functions that decide whether a write is a change
// ============================================================================

use std::rc::Rc;

use crate::core::types::EqualsFn;

// =============================================================================
// VALUE EQUALITY (Default)
// =============================================================================

/// Value equality using PartialEq.
/// This is the default for `Property::new`.
///
/// # Example
/// ```
/// use spark_properties::reactivity::equality::equals;
///
/// assert!(equals(&42, &42));
/// assert!(!equals(&42, &43));
/// ```
pub fn equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

// =============================================================================
// REFERENCE EQUALITY
// =============================================================================

/// Identity equality for shared values: equal only when both handles point
/// at the same allocation.
///
/// Two structurally identical values in separate allocations are a change.
///
/// # Example
/// ```
/// use spark_properties::reactivity::equality::ptr_equals;
/// use std::rc::Rc;
///
/// let a = Rc::new(vec![1, 2]);
/// let b = Rc::new(vec![1, 2]);
/// assert!(ptr_equals(&a, &a.clone()));
/// assert!(!ptr_equals(&a, &b));
/// ```
pub fn ptr_equals<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    Rc::ptr_eq(a, b)
}

/// Structural equality for shared values: compares the pointees.
pub fn deep_equals<T: PartialEq + ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    Rc::ptr_eq(a, b) || **a == **b
}

// =============================================================================
// FLOATING POINT
// =============================================================================

/// f64 equality where NaN equals NaN.
///
/// Without this, a property holding NaN would notify on every write of NaN.
///
/// # Example
/// ```
/// use spark_properties::reactivity::equality::safe_equals_f64;
///
/// assert!(safe_equals_f64(&1.0, &1.0));
/// assert!(safe_equals_f64(&f64::NAN, &f64::NAN));
/// assert!(!safe_equals_f64(&f64::NAN, &1.0));
/// ```
pub fn safe_equals_f64(a: &f64, b: &f64) -> bool {
    if a.is_nan() {
        return b.is_nan();
    }
    a == b
}

// =============================================================================
// DEGENERATE STRATEGIES
// =============================================================================

/// Never equal: every write notifies, even with the same value.
pub fn never_equals<T>(_a: &T, _b: &T) -> bool {
    false
}

// =============================================================================
// SYMMETRY
// =============================================================================

/// Whether `equals` gives the same answer in both argument orders.
///
/// Properties assert this (in debug builds) on every comparison; an
/// asymmetric strategy makes change detection depend on write order.
pub fn is_symmetric<T>(equals: EqualsFn<T>, a: &T, b: &T) -> bool {
    equals(a, b) == equals(b, a)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equals() {
        assert!(equals(&"hello", &"hello"));
        assert!(!equals(&"hello", &"world"));
    }

    #[test]
    fn test_ptr_equals_is_identity() {
        let a = Rc::new(String::from("x"));
        let same = a.clone();
        let twin = Rc::new(String::from("x"));
        assert!(ptr_equals(&a, &same));
        assert!(!ptr_equals(&a, &twin));
        assert!(deep_equals(&a, &twin));
    }

    #[test]
    fn test_safe_equals_f64() {
        assert!(safe_equals_f64(&0.0, &-0.0));
        assert!(safe_equals_f64(&f64::INFINITY, &f64::INFINITY));
        assert!(!safe_equals_f64(&1.0, &f64::NAN));
        assert!(!safe_equals_f64(&f64::NAN, &1.0));
    }

    #[test]
    fn test_never_equals() {
        assert!(!never_equals(&1, &1));
    }

    #[test]
    fn test_symmetry_check() {
        fn lopsided(a: &i32, b: &i32) -> bool {
            a <= b
        }
        assert!(is_symmetric(equals::<i32>, &1, &2));
        assert!(is_symmetric(safe_equals_f64, &f64::NAN, &1.0));
        assert!(!is_symmetric(lopsided, &1, &2));
    }
}
