// ============================================================================
// spark-properties - Observable Properties and Emitters for Rust
// ============================================================================
//
// Observable values with change notification, derived values, typed event
// emitters that tolerate mutation and reentrancy during emission, and a
// coordinator that orders commit/notify phases across bulk transactions.
// Single-threaded: every handle is Rc-based.
// ============================================================================

pub mod coordination;
pub mod core;
mod macros;
pub mod primitives;
pub mod reactivity;

// Re-export core items at crate root for ergonomic access
pub use core::constants;
pub use core::context::{emission_depth, is_emitting, with_context, NotificationContext};
pub use core::error::{PropertyError, Result};
pub use core::options::{
    EmitterOptions, ListenerOrder, Parameter, PropertyOptions, ReentrantOrder, Validator,
};
pub use core::types::{
    default_equals, AnyProperty, Deferrable, EmitterArgs, EqualsFn, ListenerId, Notifier,
    PropertyId, PropertyValue,
};

// Re-export primitives
pub use primitives::derived::DerivedProperty;
pub use primitives::multilink::Multilink;
pub use primitives::number::{NumberOptions, NumberProperty, NumberType, Range, RangeSource};
pub use primitives::property::{
    ObservableValue, Property, PropertyChange, PropertyListener, ReadOnlyProperty,
};

// Re-export reactivity
pub use reactivity::emitter::Emitter;
pub use reactivity::equality::{
    deep_equals, equals, is_symmetric, never_equals, ptr_equals, safe_equals_f64,
};
pub use reactivity::instrumentation::{
    InstrumentationSink, RecordingSink, SinkEvent, SinkToken, TracingSink,
};
pub use reactivity::listeners::{Listener, ListenerSet};

// Re-export coordination
pub use coordination::{
    BulkLoadSession, BulkTransactionCoordinator, CoordinatorOptions, OrderDependencyMapPair,
    Phase, TransactionReport,
};

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn flags_are_distinct() {
        assert_eq!(constants::SETTABLE & constants::DERIVED, 0);
        assert_eq!(constants::KIND_MASK & constants::DEFERRED, 0);
        assert_eq!(constants::DEFERRED & constants::DISPOSED, 0);
        assert_eq!(constants::DEFAULT_PASS_LIMIT, 5000);
    }

    #[test]
    fn heterogeneous_dependencies() {
        let count = Property::new(3);
        let label = Property::new(String::from("items"));
        let ratio = NumberProperty::unbounded(0.5);
        let flag = Property::new(true);

        let dependencies: Vec<Rc<dyn AnyProperty>> = vec![
            count.as_any_property(),
            label.as_any_property(),
            ratio.as_any_property(),
            flag.as_any_property(),
        ];
        let ids: std::collections::HashSet<PropertyId> =
            dependencies.iter().map(|d| d.property_id()).collect();
        assert_eq!(ids.len(), 4);

        let summary = DerivedProperty::new(dependencies, {
            let (count, label, ratio, flag) =
                (count.clone(), label.clone(), ratio.clone(), flag.clone());
            move || format!("{} {} {} {}", count.get(), label.get(), ratio.get(), flag.get())
        })
        .unwrap();
        assert_eq!(summary.get(), "3 items 0.5 true");

        label.set("boxes".into()).unwrap();
        assert_eq!(summary.get(), "3 boxes 0.5 true");
    }

    // =========================================================================
    // End-to-end: temperature with a bounded integer range
    // =========================================================================

    #[test]
    fn temperature_scenario() {
        let temp = NumberProperty::new(
            20.0,
            NumberOptions::new()
                .integer()
                .name("temperature")
                .range(Range::new(0.0, 100.0).unwrap()),
        )
        .unwrap();
        let fahrenheit = DerivedProperty::derived1(&temp, |c| c * 9.0 / 5.0 + 32.0).unwrap();
        assert_eq!(fahrenheit.get(), 68.0);

        let readings = Rc::new(RefCell::new(Vec::new()));
        fahrenheit
            .lazy_link({
                let readings = readings.clone();
                move |f, _, _| readings.borrow_mut().push(*f)
            })
            .unwrap();

        temp.set(100.0).unwrap();
        assert_eq!(fahrenheit.get(), 212.0);

        let err = temp.set(150.0).unwrap_err();
        assert!(matches!(err, PropertyError::OutOfRange { .. }));
        assert_eq!(temp.get(), 100.0);
        assert_eq!(fahrenheit.get(), 212.0);
        assert_eq!(*readings.borrow(), vec![212.0]);
    }

    #[test]
    fn emission_depth_is_tracked() {
        let emitter: Emitter<()> = Emitter::new();
        let depths = Rc::new(RefCell::new(Vec::new()));
        emitter
            .listen({
                let depths = depths.clone();
                move |_| depths.borrow_mut().push(emission_depth())
            })
            .unwrap();

        assert!(!is_emitting());
        emitter.emit(()).unwrap();
        assert_eq!(*depths.borrow(), vec![1]);
        assert_eq!(emission_depth(), 0);
    }

    #[test]
    fn macros_build_derived_and_multilink() {
        let a = Property::new(2);
        let b = Property::new(5);
        let product = crate::derived!(a, b => a.get() * b.get()).unwrap();
        assert_eq!(product.get(), 10);

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let _link = crate::multilink!(product => sink.borrow_mut().push(product.get())).unwrap();
        b.set(6).unwrap();
        assert_eq!(*log.borrow(), vec![10, 12]);
    }
}
