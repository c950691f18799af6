// ============================================================================
// spark-properties - Constants
// State flags for properties and default limits for the notification engine
// ============================================================================

// =============================================================================
// PROPERTY KIND FLAGS
// =============================================================================

/// Property accepts external writes through `Property::set`
pub const SETTABLE: u32 = 1 << 0;

/// Property value is computed from dependencies
pub const DERIVED: u32 = 1 << 1;

/// Mask for the kind bits
pub const KIND_MASK: u32 = SETTABLE | DERIVED;

// =============================================================================
// PROPERTY STATE FLAGS
// =============================================================================

/// Property is inside a deferred transaction (writes go to the pending slot)
pub const DEFERRED: u32 = 1 << 8;

/// A pending value was written while deferred
pub const HAS_DEFERRED_VALUE: u32 = 1 << 9;

/// Property has been disposed (terminal)
pub const DISPOSED: u32 = 1 << 10;

/// Property is currently notifying its listeners
pub const NOTIFYING: u32 = 1 << 11;

// =============================================================================
// LIMITS
// =============================================================================

/// Default number of passes a bulk transaction may take before it is
/// declared unsatisfiable.
pub const DEFAULT_PASS_LIMIT: usize = 5000;

/// Number of arguments carried by a property change notification:
/// (new value, old value, property).
pub const PROPERTY_CHANGE_ARITY: usize = 3;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_flags_are_distinct() {
        assert_eq!(SETTABLE & DERIVED, 0);
        assert_eq!(KIND_MASK, 0b11);
    }

    #[test]
    fn state_flags_do_not_overlap_kind_flags() {
        for flag in [DEFERRED, HAS_DEFERRED_VALUE, DISPOSED, NOTIFYING] {
            assert_eq!(flag & KIND_MASK, 0);
        }
        assert_eq!(DEFERRED & DISPOSED, 0);
        assert_eq!(HAS_DEFERRED_VALUE & NOTIFYING, 0);
    }
}
