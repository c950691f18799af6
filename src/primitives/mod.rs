// ============================================================================
// spark-properties - Primitives Module
// Observable values: settable, read-only, derived, numeric, multilinks
// ============================================================================

pub mod derived;
pub mod multilink;
pub mod number;
pub mod property;

pub use derived::DerivedProperty;
pub use multilink::Multilink;
pub use number::{NumberOptions, NumberProperty, NumberType, Range, RangeSource};
pub use property::{
    ObservableValue, Property, PropertyChange, PropertyInner, PropertyListener, ReadOnlyProperty,
};
