// ============================================================================
// spark-properties - Derived Properties
// Read-only values recomputed eagerly whenever a dependency changes
// ============================================================================
//
// A DerivedProperty owns an ordinary PropertyInner (kind DERIVED) and one
// lazy subscription per dependency. Each subscription recomputes the value
// and commits it through the internal write path, so listeners on the
// derived value run inside the same notification turn as the dependency
// change that caused them.
//
// Subscriptions hold a Weak back-reference: dropping the last
// DerivedProperty handle detaches from every dependency. Read-only views
// obtained from it stay readable but stop updating.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use crate::core::constants::DERIVED;
use crate::core::error::{PropertyError, Result};
use crate::core::options::PropertyOptions;
use crate::core::types::{
    default_equals, AnyProperty, Deferrable, EqualsFn, ListenerId, Notifier, PropertyId,
    PropertyValue,
};
use crate::primitives::property::{ObservableValue, PropertyInner, ReadOnlyProperty};

type Compute<T> = Rc<dyn Fn() -> T>;

// =============================================================================
// DERIVED INNER
// =============================================================================

struct DerivedInner<T: PropertyValue> {
    property: Rc<PropertyInner<T>>,

    /// Properties the computation reads
    dependencies: RefCell<Vec<Rc<dyn AnyProperty>>>,

    /// Live subscriptions, removed before the property is disposed
    subscriptions: RefCell<Vec<(Rc<dyn AnyProperty>, ListenerId)>>,

    compute: RefCell<Option<Compute<T>>>,

    /// A dependency changed while deferred
    stale: Cell<bool>,
}

impl<T: PropertyValue> DerivedInner<T> {
    fn attach(self: &Rc<Self>) -> Result<()> {
        let dependencies = self.dependencies.borrow().clone();
        for dependency in dependencies {
            let weak = Rc::downgrade(self);
            let subscribed = dependency.subscribe(Rc::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if let Err(err) = inner.recompute() {
                    tracing::error!(
                        derived = %inner.property.name(),
                        error = %err,
                        "recomputation rejected"
                    );
                }
            }));
            match subscribed {
                Ok(id) => self.subscriptions.borrow_mut().push((dependency, id)),
                Err(err) => {
                    self.detach();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn detach(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.borrow_mut());
        for (dependency, id) in subscriptions {
            if let Err(err) = dependency.unsubscribe(id) {
                tracing::debug!(
                    derived = %self.property.name(),
                    dependency = %dependency.name(),
                    error = %err,
                    "dependency already unlinked"
                );
            }
        }
    }

    fn evaluate(&self) -> Option<T> {
        let compute = self.compute.borrow().clone();
        compute.map(|compute| compute())
    }

    fn recompute(&self) -> Result<()> {
        if self.property.is_disposed() {
            return Ok(());
        }
        if self.property.is_deferred() {
            self.stale.set(true);
            return Ok(());
        }
        match self.evaluate() {
            Some(value) => self.property.set_value(value),
            None => Ok(()),
        }
    }

    fn set_deferred(&self, deferred: bool) -> Result<Option<Notifier>> {
        if deferred {
            let entered = self.property.set_deferred(true)?;
            self.stale.set(false);
            return Ok(entered);
        }
        if self.property.is_deferred() && self.stale.replace(false) {
            if let Some(value) = self.evaluate() {
                self.property.set_value(value)?;
            }
        }
        self.property.set_deferred(false)
    }

    fn dispose(&self) {
        if self.property.is_disposed() {
            return;
        }
        self.detach();
        self.dependencies.borrow_mut().clear();
        self.compute.borrow_mut().take();
        self.property.dispose();
    }
}

impl<T: PropertyValue> Drop for DerivedInner<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

// =============================================================================
// DERIVED PROPERTY
// =============================================================================

/// A read-only property whose value is a function of other properties.
///
/// There is no inherent setter. Through `ObservableValue`, `try_set` and
/// `try_reset` fail with `InvalidOperation`.
///
/// # Example
///
/// ```
/// use spark_properties::{DerivedProperty, Property};
///
/// let a = Property::new(1);
/// let b = Property::new(2);
/// let sum = DerivedProperty::derived2(&a, &b, |a, b| a + b).unwrap();
///
/// assert_eq!(sum.get(), 3);
/// a.set(7).unwrap();
/// assert_eq!(sum.get(), 9);
/// ```
pub struct DerivedProperty<T: PropertyValue> {
    read: ReadOnlyProperty<T>,
    inner: Rc<DerivedInner<T>>,
}

impl<T: PropertyValue> Clone for DerivedProperty<T> {
    fn clone(&self) -> Self {
        Self {
            read: self.read.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T: PropertyValue> DerivedProperty<T> {
    /// Derived value over type-erased dependencies, compared with `PartialEq`.
    ///
    /// `compute` runs once now and again after every dependency change.
    pub fn new(
        dependencies: Vec<Rc<dyn AnyProperty>>,
        compute: impl Fn() -> T + 'static,
    ) -> Result<Self>
    where
        T: PartialEq,
    {
        Self::with_equals(dependencies, compute, default_equals)
    }

    /// Derived value with a custom equality strategy
    pub fn with_equals(
        dependencies: Vec<Rc<dyn AnyProperty>>,
        compute: impl Fn() -> T + 'static,
        equals: EqualsFn<T>,
    ) -> Result<Self> {
        let property = PropertyInner::create_unchecked(compute(), equals, DERIVED);
        Self::assemble(property, dependencies, Rc::new(compute))
    }

    /// Derived value configured with `options` (name, equality, ordering,
    /// sink).
    ///
    /// `valid_values` and `validators` are rejected with `InvalidArgument`;
    /// the derivation alone decides which values are acceptable.
    pub fn with_options(
        dependencies: Vec<Rc<dyn AnyProperty>>,
        compute: impl Fn() -> T + 'static,
        options: PropertyOptions<T>,
    ) -> Result<Self>
    where
        T: PartialEq,
    {
        if options.valid_values.is_some() || !options.validators.is_empty() {
            let target = options.name.clone().unwrap_or_else(|| "derived property".to_string());
            return Err(PropertyError::invalid_argument(
                target,
                "derived values cannot carry valid_values or validators",
            ));
        }
        let property = PropertyInner::create(compute(), options, default_equals, DERIVED)?;
        Self::assemble(property, dependencies, Rc::new(compute))
    }

    fn assemble(
        property: Rc<PropertyInner<T>>,
        dependencies: Vec<Rc<dyn AnyProperty>>,
        compute: Compute<T>,
    ) -> Result<Self> {
        if let Some(disposed) = dependencies.iter().find(|d| d.is_disposed()) {
            return Err(PropertyError::disposed(disposed.name()));
        }
        let inner = Rc::new(DerivedInner {
            property: property.clone(),
            dependencies: RefCell::new(dependencies),
            subscriptions: RefCell::new(Vec::new()),
            compute: RefCell::new(Some(compute)),
            stale: Cell::new(false),
        });
        inner.attach()?;
        tracing::debug!(
            derived = %property.name(),
            dependencies = inner.dependencies.borrow().len(),
            "derived property created"
        );
        Ok(Self {
            read: ReadOnlyProperty { inner: property },
            inner,
        })
    }

    // =========================================================================
    // TYPED CONSTRUCTORS
    // =========================================================================

    pub fn derived1<A: PropertyValue>(
        a: &ReadOnlyProperty<A>,
        f: impl Fn(&A) -> T + 'static,
    ) -> Result<Self>
    where
        T: PartialEq,
    {
        let source = a.clone();
        Self::new(vec![a.as_any_property()], move || source.with(&f))
    }

    pub fn derived2<A: PropertyValue, B: PropertyValue>(
        a: &ReadOnlyProperty<A>,
        b: &ReadOnlyProperty<B>,
        f: impl Fn(&A, &B) -> T + 'static,
    ) -> Result<Self>
    where
        T: PartialEq,
    {
        let (first, second) = (a.clone(), b.clone());
        Self::new(
            vec![a.as_any_property(), b.as_any_property()],
            move || first.with(|x| second.with(|y| f(x, y))),
        )
    }

    pub fn derived3<A: PropertyValue, B: PropertyValue, C: PropertyValue>(
        a: &ReadOnlyProperty<A>,
        b: &ReadOnlyProperty<B>,
        c: &ReadOnlyProperty<C>,
        f: impl Fn(&A, &B, &C) -> T + 'static,
    ) -> Result<Self>
    where
        T: PartialEq,
    {
        let (first, second, third) = (a.clone(), b.clone(), c.clone());
        Self::new(
            vec![a.as_any_property(), b.as_any_property(), c.as_any_property()],
            move || first.with(|x| second.with(|y| third.with(|z| f(x, y, z)))),
        )
    }

    /// Derived over a homogeneous list; `f` sees the values in list order
    pub fn from_list<A: PropertyValue>(
        sources: &[ReadOnlyProperty<A>],
        f: impl Fn(&[A]) -> T + 'static,
    ) -> Result<Self>
    where
        T: PartialEq,
    {
        let dependencies = sources.iter().map(ReadOnlyProperty::as_any_property).collect();
        let sources = sources.to_vec();
        Self::new(dependencies, move || {
            let values: Vec<A> = sources.iter().map(ReadOnlyProperty::get).collect();
            f(&values)
        })
    }

    // =========================================================================
    // HANDLE API
    // =========================================================================

    pub fn read_only(&self) -> ReadOnlyProperty<T> {
        self.read.clone()
    }

    pub fn name(&self) -> &str {
        self.read.name()
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.borrow().len()
    }

    /// A dependency changed while deferred; the value is recomputed when
    /// the deferral ends
    pub fn is_stale(&self) -> bool {
        self.inner.stale.get()
    }

    pub fn set_deferred(&self, deferred: bool) -> Result<Option<Notifier>> {
        self.inner.set_deferred(deferred)
    }

    pub fn as_deferrable(&self) -> Rc<dyn Deferrable> {
        Rc::new(self.clone())
    }

    /// Detach from every dependency, then dispose the value. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

// =============================================================================
// COMBINATORS
// =============================================================================

impl DerivedProperty<bool> {
    /// True iff both values are equal under `a`'s equality strategy.
    ///
    /// This is not an identity comparison: with the default `PartialEq`
    /// strategy, two distinct but equal values compare equal. Give `a` the
    /// `ptr_equals` strategy for identity semantics on `Rc` values.
    pub fn value_equals<A: PropertyValue>(
        a: &ReadOnlyProperty<A>,
        b: &ReadOnlyProperty<A>,
    ) -> Result<Self> {
        let (first, second) = (a.clone(), b.clone());
        Self::new(
            vec![a.as_any_property(), b.as_any_property()],
            move || first.with(|x| second.with(|y| first.are_values_equal(x, y))),
        )
    }

    pub fn value_not_equals<A: PropertyValue>(
        a: &ReadOnlyProperty<A>,
        b: &ReadOnlyProperty<A>,
    ) -> Result<Self> {
        let (first, second) = (a.clone(), b.clone());
        Self::new(
            vec![a.as_any_property(), b.as_any_property()],
            move || first.with(|x| second.with(|y| !first.are_values_equal(x, y))),
        )
    }

    /// True iff every value is true (true for an empty list)
    pub fn and(sources: &[ReadOnlyProperty<bool>]) -> Result<Self> {
        Self::from_list(sources, |values| values.iter().all(|v| *v))
    }

    /// True iff any value is true (false for an empty list)
    pub fn or(sources: &[ReadOnlyProperty<bool>]) -> Result<Self> {
        Self::from_list(sources, |values| values.iter().any(|v| *v))
    }

    pub fn not(source: &ReadOnlyProperty<bool>) -> Result<Self> {
        Self::derived1(source, |v| !v)
    }
}

// =============================================================================
// TRAIT IMPLS
// =============================================================================

impl<T: PropertyValue> Deref for DerivedProperty<T> {
    type Target = ReadOnlyProperty<T>;

    fn deref(&self) -> &ReadOnlyProperty<T> {
        &self.read
    }
}

impl<T: PropertyValue> ObservableValue<T> for DerivedProperty<T> {
    fn read_only(&self) -> ReadOnlyProperty<T> {
        self.read.clone()
    }

    fn try_set(&self, _value: T) -> Result<()> {
        Err(PropertyError::invalid_operation(
            self.read.name(),
            "value is derived, not directly settable",
        ))
    }

    fn try_reset(&self) -> Result<()> {
        Err(PropertyError::invalid_operation(
            self.read.name(),
            "value is derived, not directly settable",
        ))
    }
}

impl<T: PropertyValue> Deferrable for DerivedProperty<T> {
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
        self.inner.set_deferred(deferred)
    }
}

impl<T: PropertyValue> fmt::Debug for DerivedProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedProperty")
            .field("name", &self.read.name())
            .field("value", &self.read.get())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
