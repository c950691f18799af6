use proptest::prelude::*;
use spark_properties::{Emitter, EmitterOptions, Listener, ListenerOrder};
use std::cell::RefCell;
use std::rc::Rc;

/// What a listener does to the set when it runs
#[derive(Clone, Copy, Debug)]
enum Action {
    Nothing,
    Remove(usize),
    Add,
}

fn action(listeners: usize) -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::Nothing),
        (0..listeners).prop_map(Action::Remove),
        Just(Action::Add),
    ]
}

fn plan() -> impl Strategy<Value = Vec<Action>> {
    (1usize..12).prop_flat_map(|n| prop::collection::vec(action(n), n))
}

/// Reference behavior: iterate the registrations present when emission
/// starts, skipping any that were removed before being reached.
fn model(plan: &[Action]) -> (Vec<usize>, Vec<usize>) {
    let mut live: Vec<usize> = (0..plan.len()).collect();
    let mut next = plan.len();
    let mut visited = Vec::new();
    for index in 0..plan.len() {
        if !live.contains(&index) {
            continue;
        }
        visited.push(index);
        match plan[index] {
            Action::Nothing => {}
            Action::Remove(target) => live.retain(|l| *l != target),
            Action::Add => {
                live.push(next);
                next += 1;
            }
        }
    }
    (visited, live)
}

struct Harness {
    emitter: Emitter<()>,
    handles: Rc<RefCell<Vec<Listener<()>>>>,
    visited: Rc<RefCell<Vec<usize>>>,
}

impl Harness {
    fn new(plan: &[Action]) -> Self {
        let harness = Self {
            emitter: Emitter::new(),
            handles: Rc::new(RefCell::new(Vec::new())),
            visited: Rc::new(RefCell::new(Vec::new())),
        };
        for (index, action) in plan.iter().copied().enumerate() {
            let listener = Listener::new({
                let (emitter, handles, visited) = (
                    harness.emitter.clone(),
                    harness.handles.clone(),
                    harness.visited.clone(),
                );
                move |_: &()| {
                    visited.borrow_mut().push(index);
                    match action {
                        Action::Nothing => {}
                        Action::Remove(target) => {
                            let handle = handles.borrow()[target].clone();
                            // Already removed is fine
                            let _ = emitter.remove_listener(&handle);
                        }
                        Action::Add => {
                            let id = handles.borrow().len();
                            let visited = visited.clone();
                            let added = Listener::new(move |_: &()| visited.borrow_mut().push(id));
                            handles.borrow_mut().push(added.clone());
                            emitter.add_listener(&added).unwrap();
                        }
                    }
                }
            });
            harness.handles.borrow_mut().push(listener.clone());
            harness.emitter.add_listener(&listener).unwrap();
        }
        harness
    }

    fn live(&self) -> Vec<usize> {
        self.handles
            .borrow()
            .iter()
            .enumerate()
            .filter(|(_, handle)| self.emitter.has_listener(handle))
            .map(|(index, _)| index)
            .collect()
    }
}

proptest! {
    #[test]
    fn mutation_during_emission_matches_model(plan in plan()) {
        let harness = Harness::new(&plan);
        harness.emitter.emit(()).unwrap();

        let (visited, live) = model(&plan);
        prop_assert_eq!(harness.visited.borrow().clone(), visited);
        prop_assert_eq!(harness.live(), live);
    }

    #[test]
    fn every_listener_runs_once_per_emission(count in 1usize..20, seed in any::<u64>()) {
        let emitter: Emitter<()> = Emitter::with_options(
            EmitterOptions::new().listener_order(ListenerOrder::Shuffled { seed }),
        )
        .unwrap();
        let visited = Rc::new(RefCell::new(Vec::new()));
        for index in 0..count {
            let visited = visited.clone();
            emitter.listen(move |_| visited.borrow_mut().push(index)).unwrap();
        }

        emitter.emit(()).unwrap();
        let mut seen = visited.borrow().clone();
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..count).collect::<Vec<_>>());
    }

    #[test]
    fn iteration_contexts_unwind(depth in 0u32..8) {
        let emitter: Emitter<(u32,)> = Emitter::new();
        emitter
            .listen({
                let emitter = emitter.clone();
                move |(level,): &(u32,)| {
                    if *level > 0 {
                        emitter.emit((level - 1,)).unwrap();
                    }
                }
            })
            .unwrap();
        emitter.emit((depth,)).unwrap();
        prop_assert_eq!(spark_properties::emission_depth(), 0);
    }
}
