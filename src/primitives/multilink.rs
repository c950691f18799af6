// ============================================================================
// spark-properties - Multilink
// One callback observing several properties
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::core::error::{PropertyError, Result};
use crate::core::types::{AnyProperty, ListenerId};

struct MultilinkInner {
    callback: Rc<dyn Fn()>,
    subscriptions: RefCell<Vec<(Rc<dyn AnyProperty>, ListenerId)>>,
    disposed: Cell<bool>,
}

impl MultilinkInner {
    fn detach(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.borrow_mut());
        for (dependency, id) in subscriptions {
            if let Err(err) = dependency.unsubscribe(id) {
                tracing::debug!(dependency = %dependency.name(), error = %err, "multilink already unlinked");
            }
        }
    }
}

impl Drop for MultilinkInner {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Runs a callback whenever any of its dependencies changes.
///
/// The link lives as long as the handle: dropping the last clone detaches
/// from every dependency, as does `dispose`. Dependencies only hold a weak
/// reference, so the callback may capture them.
///
/// # Example
///
/// ```
/// use spark_properties::{Multilink, Property};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let width = Property::new(2);
/// let height = Property::new(3);
/// let area = Rc::new(Cell::new(0));
///
/// let _link = Multilink::new(
///     vec![width.as_any_property(), height.as_any_property()],
///     {
///         let (width, height, area) = (width.clone(), height.clone(), area.clone());
///         move || area.set(width.get() * height.get())
///     },
/// )
/// .unwrap();
///
/// assert_eq!(area.get(), 6);
/// height.set(5).unwrap();
/// assert_eq!(area.get(), 10);
/// ```
#[derive(Clone)]
pub struct Multilink {
    inner: Rc<MultilinkInner>,
}

impl Multilink {
    /// Call `callback` now and after every dependency change
    pub fn new(dependencies: Vec<Rc<dyn AnyProperty>>, callback: impl Fn() + 'static) -> Result<Self> {
        let callback: Rc<dyn Fn()> = Rc::new(callback);
        let link = Self::attach(dependencies, callback.clone())?;
        callback();
        Ok(link)
    }

    /// Call `callback` after every dependency change, but not now
    pub fn lazy(dependencies: Vec<Rc<dyn AnyProperty>>, callback: impl Fn() + 'static) -> Result<Self> {
        Self::attach(dependencies, Rc::new(callback))
    }

    fn attach(dependencies: Vec<Rc<dyn AnyProperty>>, callback: Rc<dyn Fn()>) -> Result<Self> {
        if let Some(disposed) = dependencies.iter().find(|d| d.is_disposed()) {
            return Err(PropertyError::disposed(disposed.name()));
        }
        let inner = Rc::new(MultilinkInner {
            callback,
            subscriptions: RefCell::new(Vec::with_capacity(dependencies.len())),
            disposed: Cell::new(false),
        });
        for dependency in dependencies {
            let weak = Rc::downgrade(&inner);
            let id = dependency.subscribe(Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    (inner.callback)();
                }
            }))?;
            inner.subscriptions.borrow_mut().push((dependency, id));
        }
        Ok(Self { inner })
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.subscriptions.borrow().len()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Detach from every dependency. Idempotent.
    pub fn dispose(&self) {
        self.inner.disposed.set(true);
        self.inner.detach();
    }
}

impl fmt::Debug for Multilink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multilink")
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
