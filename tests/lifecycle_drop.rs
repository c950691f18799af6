use spark_properties::{
    BulkLoadSession, BulkTransactionCoordinator, DerivedProperty, Emitter, Listener, Multilink,
    NumberOptions, NumberProperty, Property, PropertyError, Range,
};
use std::cell::Cell;
use std::rc::Rc;

#[test]
fn test_derived_drop_stops_recomputation() {
    let run_count = Rc::new(Cell::new(0));
    let source = Property::new(0);

    {
        let _derived = DerivedProperty::derived1(&source, {
            let run_count = run_count.clone();
            move |value| {
                run_count.set(run_count.get() + 1);
                *value
            }
        })
        .unwrap();
        assert_eq!(run_count.get(), 1);

        source.set(1).unwrap();
        assert_eq!(run_count.get(), 2);

        // _derived drops here
    }

    // Should NOT run after drop
    source.set(2).unwrap();
    assert_eq!(run_count.get(), 2, "derived computation should stop after drop");
    assert!(!source.has_listeners());
}

#[test]
fn test_derived_clone_keeps_link_alive() {
    let source = Property::new(1);
    let kept = {
        let derived = DerivedProperty::derived1(&source, |v| v + 1).unwrap();
        derived.clone()
    };
    source.set(5).unwrap();
    assert_eq!(kept.get(), 6);
}

#[test]
fn test_multilink_drop_detaches() {
    let run_count = Rc::new(Cell::new(0));
    let a = Property::new(0);
    let b = Property::new(0);

    {
        let _link = Multilink::new(vec![a.as_any_property(), b.as_any_property()], {
            let run_count = run_count.clone();
            move || run_count.set(run_count.get() + 1)
        })
        .unwrap();
        a.set(1).unwrap();
        assert_eq!(run_count.get(), 2);
    }

    a.set(2).unwrap();
    b.set(2).unwrap();
    assert_eq!(run_count.get(), 2, "multilink should stop after drop");
}

#[test]
fn test_multilink_capturing_its_dependency_is_released() {
    let a = Property::new(0);
    let observed = Rc::new(Cell::new(0));
    {
        let _link = Multilink::new(vec![a.as_any_property()], {
            let (a, observed) = (a.clone(), observed.clone());
            move || observed.set(a.get())
        })
        .unwrap();
    }
    assert_eq!(a.listener_count(), 0);
}

#[test]
fn test_emitter_dispose_is_terminal() {
    let emitter: Emitter<(u8,)> = Emitter::new();
    let listener = Listener::new(|_: &(u8,)| {});
    emitter.add_listener(&listener).unwrap();

    emitter.dispose();
    assert!(emitter.is_disposed());
    assert!(!emitter.has_listeners());
    assert!(matches!(emitter.emit((1,)), Err(PropertyError::Disposed { .. })));
    assert!(matches!(
        emitter.add_listener(&listener),
        Err(PropertyError::Disposed { .. })
    ));
    // Removal after disposal is tolerated
    assert!(emitter.remove_listener(&listener).is_ok());
}

#[test]
fn test_dispose_from_inside_a_listener() {
    let property = Property::new(0);
    let later = Rc::new(Cell::new(false));

    property
        .lazy_link({
            let property = property.clone();
            move |_, _, _| property.dispose()
        })
        .unwrap();
    property
        .lazy_link({
            let later = later.clone();
            move |_, _, _| later.set(true)
        })
        .unwrap();

    property.set(1).unwrap();
    assert!(property.is_disposed());
    assert!(!later.get(), "listeners removed by dispose are skipped");
    assert!(matches!(property.set(2), Err(PropertyError::Disposed { .. })));
}

#[test]
fn test_number_property_dispose_releases_range() {
    let range = Property::new(Range::new(0.0, 1.0).unwrap());
    let value =
        NumberProperty::new(0.5, NumberOptions::new().range_property(range.read_only())).unwrap();
    assert!(range.has_listeners());
    value.dispose();
    assert!(!range.has_listeners());
    range.set(Range::new(0.0, 0.1).unwrap()).unwrap();
}

#[test]
fn test_session_drop_leaves_nothing_deferred() {
    let coordinator = BulkTransactionCoordinator::new();
    let values: Vec<Property<i32>> = (0..4).map(Property::new).collect();

    {
        let _session = BulkLoadSession::begin(
            &coordinator,
            values.iter().map(Property::as_deferrable).collect(),
        )
        .unwrap();
        for value in &values {
            value.set(99).unwrap();
        }
    }

    for value in &values {
        assert!(!value.is_deferred());
        assert_eq!(value.get(), 99);
    }
}
