// ============================================================================
// spark-properties - Number Properties
// f64 properties constrained by a number type and an inclusive range
// ============================================================================
//
// The range is either fixed or held by another property, so the valid range
// can move at runtime. Every committed value satisfies the number type and
// lies inside the range current at commit time.
//
// Range and value can be deferred independently. During a bulk transaction
// the value may only be announced once the range has been finalized; the
// coordinator constraint for that is `register_range_order`.
// ============================================================================

use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use crate::coordination::{BulkTransactionCoordinator, Phase};
use crate::core::error::{PropertyError, Result};
use crate::core::options::{PropertyOptions, Validator};
use crate::core::types::{Deferrable, Notifier, PropertyId};
use crate::primitives::property::{ObservableValue, Property, PropertyListener, ReadOnlyProperty};
use crate::reactivity::equality::safe_equals_f64;

// =============================================================================
// NUMBER TYPE
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NumberType {
    Integer,
    #[default]
    FloatingPoint,
}

impl NumberType {
    /// Whether `value` is representable under this type
    pub fn accepts(self, value: f64) -> bool {
        match self {
            NumberType::Integer => value.is_finite() && value.fract() == 0.0,
            NumberType::FloatingPoint => true,
        }
    }

    fn check(self, target: &str, value: f64) -> Result<()> {
        if self.accepts(value) {
            return Ok(());
        }
        Err(PropertyError::WrongNumberType {
            target: target.to_string(),
            value,
            expected: self.to_string(),
        })
    }
}

impl fmt::Display for NumberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberType::Integer => f.write_str("integer"),
            NumberType::FloatingPoint => f.write_str("floating point"),
        }
    }
}

// =============================================================================
// RANGE
// =============================================================================

/// Inclusive numeric range
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Range {
    min: f64,
    max: f64,
}

impl Range {
    /// Fails with `InvalidArgument` when a bound is NaN or `min > max`
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(PropertyError::invalid_argument(
                "range",
                format!("invalid bounds [{min}, {max}]"),
            ));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    fn check(&self, target: &str, value: f64) -> Result<()> {
        if self.contains(value) {
            return Ok(());
        }
        Err(PropertyError::OutOfRange {
            target: target.to_string(),
            value,
            range: self.to_string(),
        })
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Where a number property reads its valid range from.
#[derive(Clone, Debug, Default)]
pub enum RangeSource {
    #[default]
    Unbounded,
    Fixed(Range),
    /// Range owned by someone else; observed only
    Dynamic(ReadOnlyProperty<Range>),
    /// Range property this number property may also write
    Settable(Property<Range>),
}

impl RangeSource {
    /// Range in effect right now
    pub fn current(&self) -> Option<Range> {
        match self {
            RangeSource::Unbounded => None,
            RangeSource::Fixed(range) => Some(*range),
            RangeSource::Dynamic(property) => Some(property.get()),
            RangeSource::Settable(property) => Some(property.get()),
        }
    }

    fn property(&self) -> Option<ReadOnlyProperty<Range>> {
        match self {
            RangeSource::Dynamic(property) => Some(property.clone()),
            RangeSource::Settable(property) => Some(property.read_only()),
            _ => None,
        }
    }
}

// =============================================================================
// OPTIONS
// =============================================================================

/// Configuration for a `NumberProperty`.
///
/// Defaults: floating point, unbounded, NaN-aware equality.
#[derive(Debug, Default)]
pub struct NumberOptions {
    pub number_type: NumberType,
    pub range: RangeSource,
    pub property: PropertyOptions<f64>,
}

impl NumberOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn integer(mut self) -> Self {
        self.number_type = NumberType::Integer;
        self
    }

    pub fn number_type(mut self, number_type: NumberType) -> Self {
        self.number_type = number_type;
        self
    }

    pub fn range(mut self, range: Range) -> Self {
        self.range = RangeSource::Fixed(range);
        self
    }

    pub fn range_property(mut self, range: ReadOnlyProperty<Range>) -> Self {
        self.range = RangeSource::Dynamic(range);
        self
    }

    pub fn settable_range(mut self, range: Property<Range>) -> Self {
        self.range = RangeSource::Settable(range);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.property = self.property.name(name);
        self
    }

    pub fn property_options(mut self, options: PropertyOptions<f64>) -> Self {
        self.property = options;
        self
    }
}

// =============================================================================
// NUMBER PROPERTY
// =============================================================================

/// A settable `f64` property with a number type and range contract.
///
/// # Example
///
/// ```
/// use spark_properties::{NumberOptions, NumberProperty, PropertyError, Range};
///
/// let volume = NumberProperty::new(
///     5.0,
///     NumberOptions::new().integer().range(Range::new(0.0, 10.0).unwrap()),
/// )
/// .unwrap();
///
/// volume.set(7.0).unwrap();
/// assert!(matches!(volume.set(11.0), Err(PropertyError::OutOfRange { .. })));
/// assert!(matches!(volume.set(7.5), Err(PropertyError::WrongNumberType { .. })));
/// assert_eq!(volume.get(), 7.0);
/// ```
#[derive(Clone)]
pub struct NumberProperty {
    property: Property<f64>,
    number_type: NumberType,
    range: RangeSource,
    range_listener: Option<PropertyListener<Range>>,
}

impl NumberProperty {
    pub fn new(value: f64, options: NumberOptions) -> Result<Self> {
        let NumberOptions {
            number_type,
            range,
            property: mut property_options,
        } = options;
        if let RangeSource::Fixed(fixed) = &range {
            Range::new(fixed.min, fixed.max)?;
        }
        if property_options.equals.is_none() {
            property_options.equals = Some(safe_equals_f64);
        }

        let contract = {
            let range = range.clone();
            Validator::new(move |target, value: &f64| {
                number_type.check(target, *value)?;
                match range.current() {
                    Some(current) => current.check(target, *value),
                    None => Ok(()),
                }
            })
        };
        property_options.validators.insert(0, contract);
        let property = Property::with_custom_options(value, property_options)?;

        let range_listener = match range.property() {
            Some(range_view) => Some(Self::watch_range(&property, &range_view)?),
            None => None,
        };

        Ok(Self {
            property,
            number_type,
            range,
            range_listener,
        })
    }

    /// Unbounded floating point property
    pub fn unbounded(value: f64) -> Self {
        Self {
            property: Property::with_equals(value, safe_equals_f64),
            number_type: NumberType::FloatingPoint,
            range: RangeSource::Unbounded,
            range_listener: None,
        }
    }

    /// Announcing the value requires a finalized range; a range change
    /// that strands the value is reported.
    fn watch_range(
        property: &Property<f64>,
        range_view: &ReadOnlyProperty<Range>,
    ) -> Result<PropertyListener<Range>> {
        let gate = range_view.clone();
        property.inner.add_precondition(Validator::new(move |target, _: &f64| {
            if gate.is_deferred() {
                return Err(PropertyError::invalid_state(
                    target,
                    format!("range {} is still deferred", gate.name()),
                ));
            }
            Ok(())
        }));

        let weak = Rc::downgrade(&property.inner);
        range_view.lazy_link(move |range, _, _| {
            let Some(value) = weak.upgrade() else {
                return;
            };
            let current = value.get();
            if !range.contains(current) {
                tracing::warn!(
                    property = %value.name(),
                    value = current,
                    range = %range,
                    "range changed; current value is outside it"
                );
            }
        })
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    /// Write a value; fails with `WrongNumberType` or `OutOfRange` and
    /// leaves the value untouched when the contract is violated
    pub fn set(&self, value: f64) -> Result<()> {
        self.property.set(value)
    }

    pub fn reset(&self) -> Result<()> {
        self.property.reset()
    }

    pub fn set_deferred(&self, deferred: bool) -> Result<Option<Notifier>> {
        self.property.set_deferred(deferred)
    }

    /// Replace range and value together.
    ///
    /// Both are deferred, written, finalized range first, then announced
    /// range first, so no listener sees the old value against the new range
    /// or the new value against the old one. Only available with a
    /// `RangeSource::Settable` range.
    pub fn set_value_and_range(&self, value: f64, range: Range) -> Result<()> {
        let RangeSource::Settable(range_property) = &self.range else {
            return Err(PropertyError::invalid_operation(
                self.property.name(),
                "range is not settable through this property",
            ));
        };
        Range::new(range.min, range.max)?;
        self.number_type.check(self.property.name(), value)?;
        range.check(self.property.name(), value)?;

        range_property.set_deferred(true)?;
        if let Err(err) = self.property.set_deferred(true) {
            if let Some(notifier) = range_property.set_deferred(false)? {
                notifier.notify()?;
            }
            return Err(err);
        }

        let written = range_property
            .set(range)
            .and_then(|()| self.property.set(value));

        let range_notifier = range_property.set_deferred(false);
        let value_notifier = self.property.set_deferred(false);
        // Both are announced even when one fails; the first error wins
        let announced_range = announce(range_notifier);
        let announced_value = announce(value_notifier);
        written.and(announced_range).and(announced_value)
    }

    /// Declare that the range finalizes before this value notifies.
    /// No-op for fixed or unbounded ranges.
    pub fn register_range_order(&self, coordinator: &mut BulkTransactionCoordinator) -> Result<()> {
        match self.range.property() {
            Some(range_view) => coordinator.register_order_dependency(
                range_view.id(),
                Phase::Finalize,
                self.property.id(),
                Phase::Notify,
            ),
            None => Ok(()),
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn number_type(&self) -> NumberType {
        self.number_type
    }

    pub fn range(&self) -> Option<Range> {
        self.range.current()
    }

    pub fn range_source(&self) -> &RangeSource {
        &self.range
    }

    pub fn read_only(&self) -> ReadOnlyProperty<f64> {
        self.property.read_only()
    }

    pub fn name(&self) -> &str {
        self.property.name()
    }

    pub fn as_deferrable(&self) -> Rc<dyn Deferrable> {
        Rc::new(self.clone())
    }

    /// Stop watching the range and dispose the value. Idempotent.
    pub fn dispose(&self) {
        if let (Some(listener), Some(range_view)) = (&self.range_listener, self.range.property()) {
            if let Err(err) = range_view.unlink(listener) {
                tracing::debug!(property = %self.property.name(), error = %err, "range listener already gone");
            }
        }
        self.property.dispose();
    }
}

fn announce(finalized: Result<Option<Notifier>>) -> Result<()> {
    match finalized? {
        Some(notifier) => notifier.notify(),
        None => Ok(()),
    }
}

impl Deref for NumberProperty {
    type Target = ReadOnlyProperty<f64>;

    fn deref(&self) -> &ReadOnlyProperty<f64> {
        &self.property
    }
}

impl ObservableValue<f64> for NumberProperty {
    fn read_only(&self) -> ReadOnlyProperty<f64> {
        self.property.read_only()
    }

    fn is_settable(&self) -> bool {
        true
    }

    fn try_set(&self, value: f64) -> Result<()> {
        self.set(value)
    }

    fn try_reset(&self) -> Result<()> {
        self.reset()
    }
}

impl Deferrable for NumberProperty {
    fn property_id(&self) -> PropertyId {
        self.property.id()
    }

    fn name(&self) -> String {
        self.property.name().to_string()
    }

    fn is_deferred(&self) -> bool {
        self.property.is_deferred()
    }

    fn set_deferred(&self, deferred: bool) -> Result<Option<Notifier>> {
        self.property.set_deferred(deferred)
    }
}

impl fmt::Debug for NumberProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NumberProperty")
            .field("name", &self.property.name())
            .field("value", &self.property.get())
            .field("number_type", &self.number_type)
            .field("range", &self.range())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
