// ============================================================================
// spark-properties - Ergonomic Macros
// ============================================================================

/// Clone handles into a move closure.
///
/// Saves the `let a = a.clone();` boilerplate before every listener or
/// derivation closure.
///
/// # Usage
///
/// ```rust
/// use spark_properties::{cloned, Property};
///
/// let a = Property::new(1);
/// let b = Property::new(2);
///
/// let sum = cloned!(a, b => move || a.get() + b.get());
/// assert_eq!(sum(), 3);
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}

/// Create a `DerivedProperty` from the listed dependencies.
///
/// Every listed handle becomes a dependency and is cloned into the
/// computation. Evaluates to `Result<DerivedProperty<_>>`.
///
/// # Usage
///
/// ```rust
/// use spark_properties::{derived, Property};
///
/// let a = Property::new(1);
/// let b = Property::new(2);
///
/// let sum = derived!(a, b => a.get() + b.get()).unwrap();
/// assert_eq!(sum.get(), 3);
/// a.set(10).unwrap();
/// assert_eq!(sum.get(), 12);
/// ```
#[macro_export]
macro_rules! derived {
    ($($deps:ident),+ => $body:expr) => {
        $crate::DerivedProperty::new(
            vec![$($deps.as_any_property()),+],
            $crate::cloned!($($deps),+ => move || $body),
        )
    };
}

/// Create a `Multilink` over the listed dependencies.
///
/// The body runs once now and again after any dependency changes.
/// Evaluates to `Result<Multilink>`.
///
/// # Usage
///
/// ```rust
/// use spark_properties::{multilink, Property};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let name = Property::new("Ada".to_string());
/// let total = Rc::new(Cell::new(0));
///
/// let counter = total.clone();
/// let _link = multilink!(name => counter.set(counter.get() + name.get().len())).unwrap();
/// assert_eq!(total.get(), 3);
/// name.set("Grace".to_string()).unwrap();
/// assert_eq!(total.get(), 8);
/// ```
#[macro_export]
macro_rules! multilink {
    ($($deps:ident),+ => $body:expr) => {
        $crate::Multilink::new(
            vec![$($deps.as_any_property()),+],
            $crate::cloned!($($deps),+ => move || { $body; }),
        )
    };
}
