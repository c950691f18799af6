// ============================================================================
// spark-properties - Property
// Observable value container with change notification and deferral
// ============================================================================
//
// One PropertyInner<T> holds the state; handles decide what callers may do:
// - Property<T>          settable (set / reset / set_deferred / dispose)
// - ReadOnlyProperty<T>  observation only
// - DerivedProperty<T>   observation only, value computed (see derived.rs)
//
// Listeners receive (new value, old value, property). The old value is None
// for the immediate call made by `link`.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::error::{PropertyError, Result};
use crate::core::options::{EmitterOptions, Parameter, PropertyOptions, Validator};
use crate::core::types::{
    default_equals, AnyProperty, Deferrable, EmitterArgs, EqualsFn, ListenerId, Notifier,
    PropertyId, PropertyValue,
};
use crate::reactivity::emitter::Emitter;
use crate::reactivity::equality::is_symmetric;
use crate::reactivity::listeners::Listener;

// =============================================================================
// PROPERTY CHANGE
// =============================================================================

/// Arguments of a property change notification.
pub struct PropertyChange<T: PropertyValue> {
    pub new_value: T,
    pub old_value: Option<T>,
    pub property: ReadOnlyProperty<T>,
}

impl<T: PropertyValue> EmitterArgs for PropertyChange<T> {
    const ARITY: usize = PROPERTY_CHANGE_ARITY;

    fn argument(&self, index: usize) -> Option<&dyn Any> {
        match index {
            0 => Some(&self.new_value),
            1 => Some(&self.old_value),
            2 => Some(&self.property),
            _ => None,
        }
    }

    fn snapshot(&self) -> Vec<String> {
        vec![
            format!("{:?}", self.new_value),
            format!("{:?}", self.old_value),
            self.property.name().to_string(),
        ]
    }
}

/// Listener registered on a property's change emitter
pub type PropertyListener<T> = Listener<PropertyChange<T>>;

// =============================================================================
// PROPERTY INNER
// =============================================================================

/// Shared state behind every property handle.
pub struct PropertyInner<T: PropertyValue> {
    id: PropertyId,
    name: String,

    /// Kind + state flags (see constants)
    flags: Cell<u32>,

    /// Committed value
    value: RefCell<T>,

    /// Value `reset` returns to
    initial: RefCell<T>,

    /// Latest write made while deferred
    pending: RefCell<Option<T>>,

    equals: Cell<EqualsFn<T>>,
    valid_values: Option<Vec<T>>,
    validators: Vec<Validator<T>>,

    /// Checks that must hold before a deferred value may be announced
    preconditions: RefCell<Vec<Validator<T>>>,

    emitter: Emitter<PropertyChange<T>>,
    self_ref: Weak<PropertyInner<T>>,
}

impl<T: PropertyValue> PropertyInner<T> {
    /// Validate `options` and the initial value, then build
    pub(crate) fn create(
        value: T,
        options: PropertyOptions<T>,
        equals: EqualsFn<T>,
        kind: u32,
    ) -> Result<Rc<Self>> {
        let id = with_context(|ctx| ctx.allocate_property_id());
        let name = options.name.clone().unwrap_or_else(|| id.to_string());
        options.validate(&name)?;
        let inner = Self::build(id, name, value, options, equals, kind);
        let initial = inner.get();
        inner.validate(&initial)?;
        Ok(inner)
    }

    /// Build from options known to be valid
    pub(crate) fn create_unchecked(value: T, equals: EqualsFn<T>, kind: u32) -> Rc<Self> {
        let id = with_context(|ctx| ctx.allocate_property_id());
        Self::build(id, id.to_string(), value, PropertyOptions::default(), equals, kind)
    }

    fn build(
        id: PropertyId,
        name: String,
        value: T,
        options: PropertyOptions<T>,
        equals: EqualsFn<T>,
        kind: u32,
    ) -> Rc<Self> {
        let emitter = Emitter::build(
            format!("{name}.changed"),
            EmitterOptions {
                name: None,
                reentrant_order: options.reentrant_order,
                listener_order: options.listener_order,
                parameters: vec![
                    Parameter::new("newValue"),
                    Parameter::new("oldValue"),
                    Parameter::new("property"),
                ],
                sink: options.sink,
            },
        );
        Rc::new_cyclic(|self_ref| Self {
            id,
            name,
            flags: Cell::new(kind & KIND_MASK),
            initial: RefCell::new(value.clone()),
            value: RefCell::new(value),
            pending: RefCell::new(None),
            equals: Cell::new(options.equals.unwrap_or(equals)),
            valid_values: options.valid_values,
            validators: options.validators,
            preconditions: RefCell::new(Vec::new()),
            emitter,
            self_ref: self_ref.clone(),
        })
    }

    // =========================================================================
    // FLAGS
    // =========================================================================

    fn has_flag(&self, flag: u32) -> bool {
        self.flags.get() & flag != 0
    }

    fn set_flag(&self, flag: u32) {
        self.flags.set(self.flags.get() | flag);
    }

    fn clear_flag(&self, flag: u32) {
        self.flags.set(self.flags.get() & !flag);
    }

    pub fn flags(&self) -> u32 {
        self.flags.get()
    }

    pub fn is_deferred(&self) -> bool {
        self.has_flag(DEFERRED)
    }

    pub fn is_disposed(&self) -> bool {
        self.has_flag(DISPOSED)
    }

    pub fn is_notifying(&self) -> bool {
        self.has_flag(NOTIFYING)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(PropertyError::disposed(&self.name));
        }
        Ok(())
    }

    // =========================================================================
    // VALUE ACCESS
    // =========================================================================

    pub fn id(&self) -> PropertyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    pub fn initial_value(&self) -> T {
        self.initial.borrow().clone()
    }

    pub(crate) fn set_initial_value(&self, value: T) -> Result<()> {
        self.ensure_alive()?;
        self.validate(&value)?;
        *self.initial.borrow_mut() = value;
        Ok(())
    }

    fn read_only(&self) -> Option<ReadOnlyProperty<T>> {
        self.self_ref
            .upgrade()
            .map(|inner| ReadOnlyProperty { inner })
    }

    // =========================================================================
    // EQUALITY & VALIDATION
    // =========================================================================

    /// Compare with the configured strategy (asserted symmetric in debug builds)
    pub fn are_values_equal(&self, a: &T, b: &T) -> bool {
        let equals = self.equals.get();
        debug_assert!(
            is_symmetric(equals, a, b),
            "equality strategy of {} is not symmetric for {:?} and {:?}",
            self.name,
            a,
            b
        );
        equals(a, b)
    }

    pub(crate) fn set_equals(&self, equals: EqualsFn<T>) {
        self.equals.set(equals);
    }

    pub(crate) fn add_precondition(&self, precondition: Validator<T>) {
        self.preconditions.borrow_mut().push(precondition);
    }

    pub(crate) fn validate(&self, value: &T) -> Result<()> {
        if let Some(values) = &self.valid_values {
            if !values.iter().any(|valid| self.are_values_equal(valid, value)) {
                return Err(PropertyError::invalid_argument(
                    &self.name,
                    format!("{value:?} is not one of the valid values"),
                ));
            }
        }
        for validator in &self.validators {
            validator.check(&self.name, value)?;
        }
        Ok(())
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    /// Write path shared by settable and derived properties.
    ///
    /// Deferred: store in the pending slot, no validation, no notification.
    /// Otherwise: validate, skip if equal, commit, then notify.
    pub(crate) fn set_value(&self, value: T) -> Result<()> {
        self.ensure_alive()?;
        if self.is_deferred() {
            *self.pending.borrow_mut() = Some(value);
            self.set_flag(HAS_DEFERRED_VALUE);
            return Ok(());
        }

        self.validate(&value)?;
        let unchanged = {
            let current = self.value.borrow();
            self.are_values_equal(&current, &value)
        };
        if unchanged {
            return Ok(());
        }

        let old = self.value.replace(value);
        tracing::debug!(property = %self.name, old = ?old, "value committed");
        self.notify_listeners(Some(old))
    }

    fn notify_listeners(&self, old: Option<T>) -> Result<()> {
        let Some(property) = self.read_only() else {
            return Ok(());
        };
        let change = PropertyChange {
            new_value: self.get(),
            old_value: old,
            property,
        };

        let was_notifying = self.is_notifying();
        self.set_flag(NOTIFYING);
        let result = self.emitter.emit(change);
        if !was_notifying {
            self.clear_flag(NOTIFYING);
        }
        result
    }

    // =========================================================================
    // DEFERRAL
    // =========================================================================

    /// Enter or leave deferred mode.
    ///
    /// Leaving commits the pending value (FINALIZE) and returns a `Notifier`
    /// for the NOTIFY phase when the committed value differs from the value
    /// held before the transaction.
    pub(crate) fn set_deferred(&self, deferred: bool) -> Result<Option<Notifier>> {
        self.ensure_alive()?;
        if deferred {
            if self.is_deferred() {
                return Err(PropertyError::invalid_state(&self.name, "already deferred"));
            }
            self.set_flag(DEFERRED);
            tracing::debug!(property = %self.name, "deferred");
            return Ok(None);
        }

        if !self.is_deferred() {
            return Err(PropertyError::invalid_state(&self.name, "not deferred"));
        }
        self.clear_flag(DEFERRED | HAS_DEFERRED_VALUE);

        let Some(next) = self.pending.borrow_mut().take() else {
            tracing::debug!(property = %self.name, "undeferred without pending value");
            return Ok(None);
        };
        let unchanged = {
            let current = self.value.borrow();
            self.are_values_equal(&current, &next)
        };
        if unchanged {
            return Ok(None);
        }

        let old = self.value.replace(next);
        tracing::debug!(property = %self.name, old = ?old, "pending value finalized");
        let weak = self.self_ref.clone();
        Ok(Some(Notifier::new(self.id, self.name.clone(), move || {
            match weak.upgrade() {
                Some(inner) => inner.notify_deferred(old),
                None => Ok(()),
            }
        })))
    }

    /// NOTIFY phase: validate the finalized value, then fire listeners.
    /// A rejected value is rolled back before anyone observes it.
    fn notify_deferred(&self, old: T) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }
        let current = self.get();
        let preconditions = self.preconditions.borrow().clone();
        let checked = preconditions
            .iter()
            .try_for_each(|check| check.check(&self.name, &current))
            .and_then(|()| self.validate(&current));
        if let Err(err) = checked {
            *self.value.borrow_mut() = old;
            tracing::debug!(property = %self.name, error = %err, "finalized value rejected");
            return Err(err);
        }
        self.notify_listeners(Some(old))
    }

    pub(crate) fn pending_value(&self) -> Option<T> {
        self.pending.borrow().clone()
    }

    // =========================================================================
    // LISTENERS
    // =========================================================================

    pub(crate) fn lazy_link(
        &self,
        callback: impl Fn(&T, Option<&T>, &ReadOnlyProperty<T>) + 'static,
    ) -> Result<PropertyListener<T>> {
        let listener = Listener::new(move |change: &PropertyChange<T>| {
            callback(&change.new_value, change.old_value.as_ref(), &change.property)
        });
        self.emitter.add_listener(&listener)?;
        Ok(listener)
    }

    pub(crate) fn link(
        &self,
        callback: impl Fn(&T, Option<&T>, &ReadOnlyProperty<T>) + 'static,
    ) -> Result<PropertyListener<T>> {
        let listener = self.lazy_link(callback)?;
        self.invoke_initial(&listener);
        Ok(listener)
    }

    pub(crate) fn add_listener(&self, listener: &PropertyListener<T>, eager: bool) -> Result<()> {
        self.emitter.add_listener(listener)?;
        if eager {
            self.invoke_initial(listener);
        }
        Ok(())
    }

    fn invoke_initial(&self, listener: &PropertyListener<T>) {
        if let Some(property) = self.read_only() {
            listener.invoke(&PropertyChange {
                new_value: self.get(),
                old_value: None,
                property,
            });
        }
    }

    pub(crate) fn emitter(&self) -> &Emitter<PropertyChange<T>> {
        &self.emitter
    }

    // =========================================================================
    // DISPOSAL
    // =========================================================================

    pub(crate) fn dispose(&self) {
        if self.is_disposed() {
            return;
        }
        self.set_flag(DISPOSED);
        self.clear_flag(DEFERRED | HAS_DEFERRED_VALUE);
        self.pending.borrow_mut().take();
        self.emitter.dispose();
        tracing::debug!(property = %self.name, "disposed");
    }
}

impl<T: PropertyValue> AnyProperty for PropertyInner<T> {
    fn property_id(&self) -> PropertyId {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_disposed(&self) -> bool {
        PropertyInner::is_disposed(self)
    }

    fn is_deferred(&self) -> bool {
        PropertyInner::is_deferred(self)
    }

    fn subscribe(&self, callback: Rc<dyn Fn()>) -> Result<ListenerId> {
        let listener = Listener::new(move |_: &PropertyChange<T>| callback());
        self.emitter.add_listener(&listener)?;
        Ok(listener.id())
    }

    fn unsubscribe(&self, listener: ListenerId) -> Result<()> {
        self.emitter.remove_listener_id(listener)
    }
}

// =============================================================================
// OBSERVABLE VALUE TRAIT
// =============================================================================

/// Shared surface of every property handle.
///
/// Only `Property<T>` has an inherent `set`; generic code that holds some
/// `ObservableValue` can still attempt a write through `try_set`, which
/// fails with `InvalidOperation` on read-only and derived values.
pub trait ObservableValue<T: PropertyValue> {
    /// Read-only view of the same property
    fn read_only(&self) -> ReadOnlyProperty<T>;

    fn is_settable(&self) -> bool {
        false
    }

    fn try_set(&self, _value: T) -> Result<()> {
        Err(PropertyError::invalid_operation(
            self.read_only().name(),
            "value is read-only",
        ))
    }

    fn try_reset(&self) -> Result<()> {
        Err(PropertyError::invalid_operation(
            self.read_only().name(),
            "value is read-only",
        ))
    }
}

// =============================================================================
// READ-ONLY PROPERTY
// =============================================================================

/// Observation-only handle to a property.
pub struct ReadOnlyProperty<T: PropertyValue> {
    pub(crate) inner: Rc<PropertyInner<T>>,
}

impl<T: PropertyValue> Clone for ReadOnlyProperty<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: PropertyValue> ReadOnlyProperty<T> {
    /// Current committed value (the pre-transaction value while deferred)
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Access the value without cloning.
    ///
    /// The value is borrowed for the duration of `f`; writing the same
    /// property from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with(f)
    }

    pub fn id(&self) -> PropertyId {
        self.inner.id()
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn initial_value(&self) -> T {
        self.inner.initial_value()
    }

    /// Register `callback` and call it right away with (value, None, self)
    pub fn link(
        &self,
        callback: impl Fn(&T, Option<&T>, &ReadOnlyProperty<T>) + 'static,
    ) -> Result<PropertyListener<T>> {
        self.inner.link(callback)
    }

    /// Register `callback` for future changes only
    pub fn lazy_link(
        &self,
        callback: impl Fn(&T, Option<&T>, &ReadOnlyProperty<T>) + 'static,
    ) -> Result<PropertyListener<T>> {
        self.inner.lazy_link(callback)
    }

    /// Register an existing listener handle, optionally calling it right away
    pub fn add_listener(&self, listener: &PropertyListener<T>, eager: bool) -> Result<()> {
        self.inner.add_listener(listener, eager)
    }

    pub fn unlink(&self, listener: &PropertyListener<T>) -> Result<()> {
        self.inner.emitter().remove_listener(listener)
    }

    pub fn unlink_all(&self) {
        self.inner.emitter().remove_all_listeners();
    }

    pub fn has_listener(&self, listener: &PropertyListener<T>) -> bool {
        self.inner.emitter().has_listener(listener)
    }

    pub fn has_listeners(&self) -> bool {
        self.inner.emitter().has_listeners()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.emitter().listener_count()
    }

    pub fn are_values_equal(&self, a: &T, b: &T) -> bool {
        self.inner.are_values_equal(a, b)
    }

    pub fn is_deferred(&self) -> bool {
        self.inner.is_deferred()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    pub fn is_settable(&self) -> bool {
        self.inner.flags() & SETTABLE != 0
    }

    pub fn is_derived(&self) -> bool {
        self.inner.flags() & DERIVED != 0
    }

    /// Type-erased handle for dependency lists
    pub fn as_any_property(&self) -> Rc<dyn AnyProperty> {
        self.inner.clone()
    }

    /// Whether both handles refer to the same property
    pub fn ptr_eq(&self, other: &ReadOnlyProperty<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: PropertyValue> ObservableValue<T> for ReadOnlyProperty<T> {
    fn read_only(&self) -> ReadOnlyProperty<T> {
        self.clone()
    }
}

impl<T: PropertyValue> fmt::Debug for ReadOnlyProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnlyProperty")
            .field("name", &self.name())
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// =============================================================================
// PROPERTY (settable)
// =============================================================================

/// A settable observable value.
///
/// Read access comes from the `ReadOnlyProperty` it dereferences to.
///
/// # Example
///
/// ```
/// use spark_properties::Property;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let count = Property::new(0);
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// count
///     .link({
///         let seen = seen.clone();
///         move |new, old, _| seen.borrow_mut().push((*new, old.copied()))
///     })
///     .unwrap();
///
/// count.set(5).unwrap();
/// count.set(5).unwrap(); // equal: no notification
/// assert_eq!(*seen.borrow(), vec![(0, None), (5, Some(0))]);
/// ```
pub struct Property<T: PropertyValue> {
    read: ReadOnlyProperty<T>,
}

impl<T: PropertyValue> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            read: self.read.clone(),
        }
    }
}

impl<T: PropertyValue> Property<T> {
    /// Property compared with `PartialEq`
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equals(value, default_equals)
    }

    /// Property compared with a custom equality strategy
    pub fn with_equals(value: T, equals: EqualsFn<T>) -> Self {
        Self {
            read: ReadOnlyProperty {
                inner: PropertyInner::create_unchecked(value, equals, SETTABLE),
            },
        }
    }

    /// Property from options; `PartialEq` unless `options.equals` is set
    pub fn with_options(value: T, options: PropertyOptions<T>) -> Result<Self>
    where
        T: PartialEq,
    {
        Self::from_parts(value, options, default_equals)
    }

    /// Property from options for types without `PartialEq`.
    /// `options.equals` is required.
    pub fn with_custom_options(value: T, options: PropertyOptions<T>) -> Result<Self> {
        let Some(equals) = options.equals else {
            return Err(PropertyError::invalid_argument(
                options.name.clone().unwrap_or_default(),
                "an equality strategy is required",
            ));
        };
        Self::from_parts(value, options, equals)
    }

    fn from_parts(value: T, options: PropertyOptions<T>, equals: EqualsFn<T>) -> Result<Self> {
        Ok(Self {
            read: ReadOnlyProperty {
                inner: PropertyInner::create(value, options, equals, SETTABLE)?,
            },
        })
    }

    /// Write a new value.
    ///
    /// While deferred the value only lands in the pending slot. Otherwise it
    /// is validated, compared with the current value and, if different,
    /// committed and announced to listeners.
    pub fn set(&self, value: T) -> Result<()> {
        self.read.inner.set_value(value)
    }

    /// Restore the initial value
    pub fn reset(&self) -> Result<()> {
        let initial = self.read.inner.initial_value();
        self.read.inner.set_value(initial)
    }

    /// Replace the value `reset` restores
    pub fn set_initial_value(&self, value: T) -> Result<()> {
        self.read.inner.set_initial_value(value)
    }

    /// Enter or leave deferred mode (see `Deferrable`)
    pub fn set_deferred(&self, deferred: bool) -> Result<Option<Notifier>> {
        self.read.inner.set_deferred(deferred)
    }

    /// Value written while deferred, not yet finalized
    pub fn pending_value(&self) -> Option<T> {
        self.read.inner.pending_value()
    }

    /// Swap the equality strategy
    pub fn set_equals(&self, equals: EqualsFn<T>) {
        self.read.inner.set_equals(equals);
    }

    pub fn read_only(&self) -> ReadOnlyProperty<T> {
        self.read.clone()
    }

    pub fn name(&self) -> &str {
        self.read.name()
    }

    pub fn as_deferrable(&self) -> Rc<dyn Deferrable> {
        Rc::new(self.clone())
    }

    /// Remove all listeners and refuse further writes. Idempotent.
    pub fn dispose(&self) {
        self.read.inner.dispose();
    }
}

impl<T: PropertyValue> Deref for Property<T> {
    type Target = ReadOnlyProperty<T>;

    fn deref(&self) -> &ReadOnlyProperty<T> {
        &self.read
    }
}

impl<T: PropertyValue> ObservableValue<T> for Property<T> {
    fn read_only(&self) -> ReadOnlyProperty<T> {
        self.read.clone()
    }

    fn is_settable(&self) -> bool {
        true
    }

    fn try_set(&self, value: T) -> Result<()> {
        self.set(value)
    }

    fn try_reset(&self) -> Result<()> {
        self.reset()
    }
}

impl<T: PropertyValue> Deferrable for Property<T> {
    fn property_id(&self) -> PropertyId {
        self.read.id()
    }

    fn name(&self) -> String {
        self.read.name().to_string()
    }

    fn is_deferred(&self) -> bool {
        self.read.is_deferred()
    }

    fn set_deferred(&self, deferred: bool) -> Result<Option<Notifier>> {
        self.read.inner.set_deferred(deferred)
    }
}

impl<T: PropertyValue> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.read.name())
            .field("value", &*self.read.inner.value.borrow())
            .field("deferred", &self.read.is_deferred())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
