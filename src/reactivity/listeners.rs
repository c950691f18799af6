// ============================================================================
// spark-properties - Listener Set
// Ordered listeners that can be added and removed while being iterated
// ============================================================================
//
// Every active iteration pushes a context {cursor, snapshot}. While the
// snapshot is None the iteration reads the live list. The first add/remove
// during an iteration freezes a copy of the live list into every context
// that is still reading it ("guarding"), so the in-flight iteration keeps a
// stable view while the live list changes underneath.
//
// Contexts are guarded from the top of the stack down. Once a guarded
// context is found, everything below it was guarded at the same time or
// earlier, so the walk stops there.
//
// A guarded iteration still skips a listener that is no longer registered
// when the cursor reaches it: removed-before-visited listeners never run,
// and added listeners are absent from the frozen copy.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::core::context::with_context;
use crate::core::error::{PropertyError, Result};
use crate::core::options::ListenerOrder;
use crate::core::types::ListenerId;

// =============================================================================
// LISTENER
// =============================================================================

/// A callback with a stable identity.
///
/// Cloning a `Listener` clones the handle, not the identity: both clones are
/// the same listener for add/remove/has purposes.
pub struct Listener<A> {
    id: ListenerId,
    callback: Rc<dyn Fn(&A)>,
}

impl<A> Listener<A> {
    /// Wrap a callback, allocating a fresh identity
    pub fn new(callback: impl Fn(&A) + 'static) -> Self {
        Self {
            id: with_context(|ctx| ctx.allocate_listener_id()),
            callback: Rc::new(callback),
        }
    }

    /// Identity of this listener
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub(crate) fn invoke(&self, args: &A) {
        (self.callback)(args)
    }
}

impl<A> Clone for Listener<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: self.callback.clone(),
        }
    }
}

impl<A> PartialEq for Listener<A> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<A> Eq for Listener<A> {}

impl<A> fmt::Debug for Listener<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener").field(&self.id).finish()
    }
}

// =============================================================================
// ITERATION CONTEXT
// =============================================================================

/// Frozen listener list shared by every context guarded at the same moment
pub(crate) type Snapshot<A> = Rc<Vec<Listener<A>>>;

struct IterationContext<A> {
    cursor: usize,
    snapshot: Option<Snapshot<A>>,
}

/// Pops the context pushed by `notify`, also on unwind
struct ContextPop<'a, A> {
    contexts: &'a RefCell<Vec<IterationContext<A>>>,
}

impl<A> Drop for ContextPop<'_, A> {
    fn drop(&mut self) {
        self.contexts.borrow_mut().pop();
    }
}

// =============================================================================
// LISTENER SET
// =============================================================================

/// Ordered set of listeners, safe to mutate from inside its own iteration.
pub struct ListenerSet<A> {
    target: String,
    listeners: RefCell<Vec<Listener<A>>>,
    contexts: RefCell<Vec<IterationContext<A>>>,
    order: ListenerOrder,
    rng: RefCell<Option<StdRng>>,
    disposed: Cell<bool>,
}

impl<A> ListenerSet<A> {
    /// Create an empty set; `target` names the owner in error messages
    pub fn new(target: impl Into<String>, order: ListenerOrder) -> Self {
        let rng = match order {
            ListenerOrder::Shuffled { seed } => Some(StdRng::seed_from_u64(seed)),
            _ => None,
        };
        Self {
            target: target.into(),
            listeners: RefCell::new(Vec::new()),
            contexts: RefCell::new(Vec::new()),
            order,
            rng: RefCell::new(rng),
            disposed: Cell::new(false),
        }
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    /// Append a listener. Fails if the same identity is already present.
    pub fn add(&self, listener: Listener<A>) -> Result<()> {
        if self.contains(listener.id()) {
            return Err(PropertyError::DuplicateListener {
                target: self.target.clone(),
                listener: listener.id(),
            });
        }
        self.guard();
        self.listeners.borrow_mut().push(listener);
        Ok(())
    }

    /// Remove a listener by identity.
    ///
    /// Removing an absent listener is an error, except once the set has been
    /// disposed (owners tear down in arbitrary order).
    pub fn remove(&self, id: ListenerId) -> Result<()> {
        let index = self.listeners.borrow().iter().position(|l| l.id() == id);
        let Some(index) = index else {
            if self.disposed.get() {
                tracing::warn!(target_name = %self.target, listener = %id, "removal after dispose ignored");
                return Ok(());
            }
            return Err(PropertyError::UnknownListener {
                target: self.target.clone(),
                listener: id,
            });
        };
        self.guard();
        self.listeners.borrow_mut().remove(index);
        Ok(())
    }

    /// Remove every listener, one at a time from the front
    pub fn remove_all(&self) {
        loop {
            let first = self.listeners.borrow().first().map(Listener::id);
            let Some(id) = first else {
                break;
            };
            if self.remove(id).is_err() {
                break;
            }
        }
    }

    /// Remove everything and mark the set disposed
    pub fn dispose(&self) {
        self.remove_all();
        self.disposed.set(true);
    }

    /// Freeze the live list into every iteration still reading it
    fn guard(&self) {
        let mut contexts = self.contexts.borrow_mut();
        if contexts.last().is_none_or(|context| context.snapshot.is_some()) {
            return;
        }
        let frozen: Snapshot<A> = Rc::new(self.listeners.borrow().clone());
        for context in contexts.iter_mut().rev() {
            if context.snapshot.is_some() {
                break;
            }
            context.snapshot = Some(frozen.clone());
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.borrow().iter().any(|l| l.id() == id)
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Identities in registration order
    pub fn ids(&self) -> Vec<ListenerId> {
        self.listeners.borrow().iter().map(Listener::id).collect()
    }

    /// Number of iterations currently in progress over this set
    pub fn active_iterations(&self) -> usize {
        self.contexts.borrow().len()
    }

    // =========================================================================
    // ITERATION
    // =========================================================================

    /// Copy of the live list arranged by the configured listener order
    pub(crate) fn snapshot(&self) -> Snapshot<A> {
        let mut listeners = self.listeners.borrow().clone();
        match self.order {
            ListenerOrder::Insertion => {}
            ListenerOrder::Reverse => listeners.reverse(),
            ListenerOrder::Shuffled { .. } => {
                if let Some(rng) = self.rng.borrow_mut().as_mut() {
                    listeners.shuffle(rng);
                }
            }
        }
        Rc::new(listeners)
    }

    /// Invoke every listener once, tolerating mutation from inside listeners.
    pub(crate) fn notify(&self, args: &A) {
        let initial = match self.order {
            ListenerOrder::Insertion => None,
            _ => Some(self.snapshot()),
        };
        let depth = {
            let mut contexts = self.contexts.borrow_mut();
            contexts.push(IterationContext {
                cursor: 0,
                snapshot: initial,
            });
            contexts.len() - 1
        };
        let _pop = ContextPop {
            contexts: &self.contexts,
        };

        while let Some((listener, guarded)) = self.advance(depth) {
            if guarded && !self.contains(listener.id()) {
                continue;
            }
            listener.invoke(args);
        }
    }

    /// Invoke a previously taken snapshot, skipping listeners removed since
    pub(crate) fn notify_snapshot(&self, snapshot: &Snapshot<A>, args: &A) {
        for listener in snapshot.iter() {
            if self.contains(listener.id()) {
                listener.invoke(args);
            }
        }
    }

    /// Next listener for the context at `depth`, and whether it is guarded.
    /// No borrow survives the return, so the listener may mutate the set.
    fn advance(&self, depth: usize) -> Option<(Listener<A>, bool)> {
        let mut contexts = self.contexts.borrow_mut();
        let context = &mut contexts[depth];
        let listener = match &context.snapshot {
            Some(snapshot) => snapshot.get(context.cursor).cloned(),
            None => self.listeners.borrow().get(context.cursor).cloned(),
        }?;
        context.cursor += 1;
        Some((listener, context.snapshot.is_some()))
    }
}

impl<A> fmt::Debug for ListenerSet<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("target", &self.target)
            .field("listeners", &self.ids())
            .field("active_iterations", &self.active_iterations())
            .field("order", &self.order)
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    fn logging(log: &Log, tag: &'static str) -> Listener<u32> {
        let log = log.clone();
        Listener::new(move |_: &u32| log.borrow_mut().push(tag))
    }

    #[test]
    fn invokes_in_registration_order() {
        let log: Log = Rc::default();
        let set = ListenerSet::new("set", ListenerOrder::Insertion);
        for tag in ["a", "b", "c"] {
            set.add(logging(&log, tag)).unwrap();
        }
        set.notify(&0);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        assert_eq!(set.active_iterations(), 0);
    }

    #[test]
    fn duplicate_add_fails() {
        let log: Log = Rc::default();
        let set = ListenerSet::new("set", ListenerOrder::Insertion);
        let a = logging(&log, "a");
        set.add(a.clone()).unwrap();
        assert!(matches!(
            set.add(a.clone()),
            Err(PropertyError::DuplicateListener { listener, .. }) if listener == a.id()
        ));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn unknown_remove_fails_until_disposed() {
        let log: Log = Rc::default();
        let set = ListenerSet::<u32>::new("set", ListenerOrder::Insertion);
        let a = logging(&log, "a");
        assert!(matches!(
            set.remove(a.id()),
            Err(PropertyError::UnknownListener { .. })
        ));
        set.dispose();
        assert!(set.is_disposed());
        assert!(set.remove(a.id()).is_ok());
    }

    #[test]
    fn listener_added_during_iteration_waits_for_next_pass() {
        let log: Log = Rc::default();
        let set = Rc::new(ListenerSet::new("set", ListenerOrder::Insertion));
        let late = logging(&log, "late");

        set.add(logging(&log, "a")).unwrap();
        set.add({
            let set = set.clone();
            let late = late.clone();
            let log = log.clone();
            Listener::new(move |_: &u32| {
                log.borrow_mut().push("adder");
                if !set.contains(late.id()) {
                    set.add(late.clone()).unwrap();
                }
            })
        })
        .unwrap();
        set.add(logging(&log, "c")).unwrap();

        set.notify(&0);
        assert_eq!(*log.borrow(), vec!["a", "adder", "c"]);

        log.borrow_mut().clear();
        set.notify(&0);
        assert_eq!(*log.borrow(), vec!["a", "adder", "c", "late"]);
    }

    #[test]
    fn listener_removed_before_visit_is_skipped() {
        let log: Log = Rc::default();
        let set = Rc::new(ListenerSet::new("set", ListenerOrder::Insertion));
        let victim = logging(&log, "victim");

        set.add(logging(&log, "a")).unwrap();
        set.add({
            let set = set.clone();
            let victim = victim.id();
            let log = log.clone();
            Listener::new(move |_: &u32| {
                log.borrow_mut().push("remover");
                set.remove(victim).unwrap();
            })
        })
        .unwrap();
        set.add(victim.clone()).unwrap();
        set.add(logging(&log, "d")).unwrap();

        set.notify(&0);
        assert_eq!(*log.borrow(), vec!["a", "remover", "d"]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn removing_self_mid_iteration_keeps_the_rest() {
        let log: Log = Rc::default();
        let set = Rc::new(ListenerSet::new("set", ListenerOrder::Insertion));
        let holder: Rc<RefCell<Option<ListenerId>>> = Rc::default();

        let once = {
            let set = set.clone();
            let holder = holder.clone();
            let log = log.clone();
            Listener::new(move |_: &u32| {
                log.borrow_mut().push("once");
                if let Some(id) = holder.borrow_mut().take() {
                    set.remove(id).unwrap();
                }
            })
        };
        *holder.borrow_mut() = Some(once.id());

        set.add(once).unwrap();
        set.add(logging(&log, "b")).unwrap();
        set.add(logging(&log, "c")).unwrap();

        set.notify(&0);
        set.notify(&0);
        assert_eq!(*log.borrow(), vec!["once", "b", "c", "b", "c"]);
    }

    #[test]
    fn nested_iteration_freezes_both_contexts() {
        let log: Rc<RefCell<Vec<String>>> = Rc::default();
        let set = Rc::new(ListenerSet::new("set", ListenerOrder::Insertion));
        let late = {
            let log = log.clone();
            Listener::new(move |depth: &u32| log.borrow_mut().push(format!("late@{depth}")))
        };

        set.add({
            let set = set.clone();
            let log = log.clone();
            let late = late.clone();
            Listener::new(move |depth: &u32| {
                log.borrow_mut().push(format!("a@{depth}"));
                if *depth == 0 {
                    set.notify(&1);
                } else if !set.contains(late.id()) {
                    // Both the outer and the inner iteration are active here
                    assert_eq!(set.active_iterations(), 2);
                    set.add(late.clone()).unwrap();
                }
            })
        })
        .unwrap();
        set.add({
            let log = log.clone();
            Listener::new(move |depth: &u32| log.borrow_mut().push(format!("b@{depth}")))
        })
        .unwrap();

        set.notify(&0);
        assert_eq!(*log.borrow(), vec!["a@0", "a@1", "b@1", "b@0"]);
        assert_eq!(set.active_iterations(), 0);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn reverse_order() {
        let log: Log = Rc::default();
        let set = ListenerSet::new("set", ListenerOrder::Reverse);
        for tag in ["a", "b", "c"] {
            set.add(logging(&log, tag)).unwrap();
        }
        set.notify(&0);
        assert_eq!(*log.borrow(), vec!["c", "b", "a"]);
    }

    #[test]
    fn shuffled_order_is_seeded_and_complete() {
        let run = |seed: u64| {
            let log: Log = Rc::default();
            let set = ListenerSet::new("set", ListenerOrder::Shuffled { seed });
            for tag in ["a", "b", "c", "d", "e", "f"] {
                set.add(logging(&log, tag)).unwrap();
            }
            set.notify(&0);
            let seen = log.borrow().clone();
            seen
        };

        let first = run(7);
        assert_eq!(first, run(7));

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn remove_all_empties_the_set() {
        let log: Log = Rc::default();
        let set = ListenerSet::new("set", ListenerOrder::Insertion);
        set.add(logging(&log, "a")).unwrap();
        set.add(logging(&log, "b")).unwrap();
        set.remove_all();
        assert!(set.is_empty());
        set.notify(&0);
        assert!(log.borrow().is_empty());
    }
}
