// ============================================================================
// spark-properties - Type Definitions
// Identities, type-erased traits and the notifier handle
// ============================================================================

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use super::error::Result;

// =============================================================================
// IDENTITIES
// =============================================================================

/// Identity of a registered listener.
///
/// Two `Listener` handles are the same listener iff their ids match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl ListenerId {
    /// Raw numeric value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Identity of a property, stable for its whole lifetime.
///
/// Used by the bulk transaction coordinator to key order dependencies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(pub(crate) u64);

impl PropertyId {
    /// Raw numeric value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "property#{}", self.0)
    }
}

// =============================================================================
// VALUES
// =============================================================================

/// Bounds every property value satisfies.
///
/// Values are cloned out on read and rendered with `Debug` for
/// instrumentation snapshots and error messages.
pub trait PropertyValue: Clone + fmt::Debug + 'static {}

impl<T: Clone + fmt::Debug + 'static> PropertyValue for T {}

/// Equality function type for comparing property values
pub type EqualsFn<T> = fn(&T, &T) -> bool;

/// Default equality using PartialEq
pub fn default_equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

// =============================================================================
// EMITTER ARGUMENTS
// =============================================================================

/// The argument pack an `Emitter` fires with.
///
/// `ARITY` is the number of positional arguments; `argument` gives indexed
/// access for per-parameter validation and `snapshot` renders every argument
/// for an instrumentation sink.
pub trait EmitterArgs: 'static {
    /// Number of positional arguments
    const ARITY: usize;

    /// Argument at `index`, or None past the end
    fn argument(&self, index: usize) -> Option<&dyn Any>;

    /// Render every argument for instrumentation
    fn snapshot(&self) -> Vec<String>;
}

impl EmitterArgs for () {
    const ARITY: usize = 0;

    fn argument(&self, _index: usize) -> Option<&dyn Any> {
        None
    }

    fn snapshot(&self) -> Vec<String> {
        Vec::new()
    }
}

macro_rules! impl_emitter_args {
    ($arity:expr; $($name:ident : $index:tt),+) => {
        impl<$($name: fmt::Debug + 'static),+> EmitterArgs for ($($name,)+) {
            const ARITY: usize = $arity;

            fn argument(&self, index: usize) -> Option<&dyn Any> {
                match index {
                    $($index => Some(&self.$index as &dyn Any),)+
                    _ => None,
                }
            }

            fn snapshot(&self) -> Vec<String> {
                vec![$(format!("{:?}", self.$index)),+]
            }
        }
    };
}

impl_emitter_args!(1; A: 0);
impl_emitter_args!(2; A: 0, B: 1);
impl_emitter_args!(3; A: 0, B: 1, C: 2);
impl_emitter_args!(4; A: 0, B: 1, C: 2, D: 3);

// =============================================================================
// TYPE-ERASED TRAITS
// =============================================================================
//
// Derived properties and multilinks observe dependencies of arbitrary value
// types; the coordinator sequences properties of arbitrary value types.
// Neither needs T, so both work through these object-safe traits:
// - Rc<dyn AnyProperty> for dependency subscriptions
// - Rc<dyn Deferrable> for bulk transactions
// =============================================================================

/// Type-erased observable interface used for dependency links.
pub trait AnyProperty {
    /// Identity of the property
    fn property_id(&self) -> PropertyId;

    /// Human-readable name (for diagnostics)
    fn name(&self) -> String;

    /// Whether the property has been disposed
    fn is_disposed(&self) -> bool;

    /// Whether the property is inside a deferred transaction
    fn is_deferred(&self) -> bool;

    /// Lazily attach an untyped change callback; returns its listener identity
    fn subscribe(&self, callback: Rc<dyn Fn()>) -> Result<ListenerId>;

    /// Detach a callback previously attached with `subscribe`
    fn unsubscribe(&self, listener: ListenerId) -> Result<()>;
}

/// A value that can take part in the two-phase deferred protocol.
///
/// `set_deferred(false)` is the FINALIZE phase: it commits the pending
/// value and hands back the `Notifier` for the NOTIFY phase.
pub trait Deferrable {
    /// Identity of the value
    fn property_id(&self) -> PropertyId;

    /// Human-readable name (for diagnostics)
    fn name(&self) -> String;

    /// Whether the value is inside a deferred transaction
    fn is_deferred(&self) -> bool;

    /// Enter (`true`) or leave (`false`) deferred mode
    fn set_deferred(&self, deferred: bool) -> Result<Option<Notifier>>;
}

// =============================================================================
// NOTIFIER
// =============================================================================

/// Pending notification produced by leaving deferred mode.
///
/// The value is already committed when a `Notifier` exists; listeners have
/// not been told yet. Calling `notify` fires them exactly once. Dropping a
/// notifier without calling it silently skips the notification.
#[must_use = "listeners are only notified when `notify` is called"]
pub struct Notifier {
    property: PropertyId,
    name: String,
    run: Box<dyn FnOnce() -> Result<()>>,
}

impl Notifier {
    /// Wrap the notification closure for `property`
    pub fn new(property: PropertyId, name: impl Into<String>, run: impl FnOnce() -> Result<()> + 'static) -> Self {
        Self {
            property,
            name: name.into(),
            run: Box::new(run),
        }
    }

    /// Identity of the property this notifier belongs to
    pub fn property_id(&self) -> PropertyId {
        self.property
    }

    /// Name of the property this notifier belongs to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fire the pending change notification
    pub fn notify(self) -> Result<()> {
        (self.run)()
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("property", &self.property)
            .field("name", &self.name)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn tuple_arity_matches_positions() {
        assert_eq!(<() as EmitterArgs>::ARITY, 0);
        assert_eq!(<(i32,) as EmitterArgs>::ARITY, 1);
        assert_eq!(<(i32, String) as EmitterArgs>::ARITY, 2);
        assert_eq!(<(i32, bool, f64) as EmitterArgs>::ARITY, 3);
        assert_eq!(<(u8, u8, u8, u8) as EmitterArgs>::ARITY, 4);
    }

    #[test]
    fn argument_access_downcasts() {
        let args = (7i32, String::from("x"));
        assert_eq!(args.argument(0).and_then(|a| a.downcast_ref::<i32>()), Some(&7));
        assert_eq!(
            args.argument(1).and_then(|a| a.downcast_ref::<String>()).map(String::as_str),
            Some("x")
        );
        assert!(args.argument(2).is_none());
    }

    #[test]
    fn snapshot_renders_debug() {
        let args = (1u8, "two", Some(3));
        assert_eq!(args.snapshot(), vec!["1", "\"two\"", "Some(3)"]);
    }

    #[test]
    fn notifier_runs_once() {
        let count = Rc::new(Cell::new(0));
        let notifier = Notifier::new(PropertyId(9), "p", {
            let count = count.clone();
            move || {
                count.set(count.get() + 1);
                Ok(())
            }
        });
        assert_eq!(notifier.property_id(), PropertyId(9));
        assert_eq!(notifier.name(), "p");
        notifier.notify().unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn identity_display() {
        assert_eq!(ListenerId(4).to_string(), "listener#4");
        assert_eq!(PropertyId(2).to_string(), "property#2");
    }
}
