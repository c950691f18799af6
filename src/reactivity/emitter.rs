// ============================================================================
// spark-properties - Emitter
// Typed event emitter with two reentrant-notification disciplines
// ============================================================================
//
// Stack (default): emit() runs the listener loop right away. A listener that
// emits again on the same emitter runs a complete nested pass before the
// outer pass resumes.
//
// Queue: emit() appends the arguments plus a snapshot of the listeners to a
// FIFO. Only the outermost call drains it, so nested emissions run after the
// current pass, in the chronological order of their emit() calls. Listeners
// added after an emit() call never see that queued emission.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::core::context::{with_context, EmissionScope};
use crate::core::error::{PropertyError, Result};
use crate::core::options::{EmitterOptions, Parameter, ReentrantOrder};
use crate::core::types::{EmitterArgs, ListenerId};
use crate::reactivity::instrumentation::InstrumentationSink;
use crate::reactivity::listeners::{Listener, ListenerSet, Snapshot};

// =============================================================================
// EMITTER INNER
// =============================================================================

struct QueuedEmission<A> {
    args: A,
    listeners: Snapshot<A>,
}

/// Shared state behind an `Emitter` handle
struct EmitterInner<A: EmitterArgs> {
    name: String,
    listeners: ListenerSet<A>,
    parameters: Vec<Parameter>,
    reentrant_order: ReentrantOrder,
    sink: Option<Rc<dyn InstrumentationSink>>,
    queue: RefCell<VecDeque<QueuedEmission<A>>>,
    draining: Cell<bool>,
    disposed: Cell<bool>,
}

/// Resets the draining flag, also on unwind
struct DrainGuard<'a> {
    draining: &'a Cell<bool>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.draining.set(false);
    }
}

impl<A: EmitterArgs> EmitterInner<A> {
    fn emit(&self, args: A) -> Result<()> {
        if self.disposed.get() {
            return Err(PropertyError::disposed(&self.name));
        }
        self.validate(&args)?;

        match self.reentrant_order {
            ReentrantOrder::Stack => {
                self.fire(&args, None);
            }
            ReentrantOrder::Queue => {
                self.queue.borrow_mut().push_back(QueuedEmission {
                    listeners: self.listeners.snapshot(),
                    args,
                });
                if self.draining.get() {
                    tracing::trace!(emitter = %self.name, "reentrant emission queued");
                    return Ok(());
                }
                self.draining.set(true);
                let _guard = DrainGuard {
                    draining: &self.draining,
                };
                loop {
                    let next = self.queue.borrow_mut().pop_front();
                    let Some(emission) = next else {
                        break;
                    };
                    self.fire(&emission.args, Some(&emission.listeners));
                }
            }
        }
        Ok(())
    }

    fn validate(&self, args: &A) -> Result<()> {
        for (index, parameter) in self.parameters.iter().enumerate() {
            if !parameter.accepts(args.argument(index)) {
                return Err(PropertyError::invalid_argument(
                    &self.name,
                    format!("argument {index} ('{}') failed validation", parameter.name()),
                ));
            }
        }
        Ok(())
    }

    fn fire(&self, args: &A, snapshot: Option<&Snapshot<A>>) {
        let token = self
            .sink
            .as_ref()
            .map(|sink| sink.on_before_fire(&self.name, &args.snapshot()));

        let scope = EmissionScope::enter();
        tracing::trace!(
            emitter = %self.name,
            listeners = self.listeners.len(),
            depth = scope.depth(),
            order = ?self.reentrant_order,
            "emit"
        );
        match snapshot {
            Some(listeners) => self.listeners.notify_snapshot(listeners, args),
            None => self.listeners.notify(args),
        }
        drop(scope);

        if let (Some(sink), Some(token)) = (&self.sink, token) {
            sink.on_after_fire(token);
        }
    }
}

// =============================================================================
// EMITTER
// =============================================================================

/// An event source firing a fixed argument pack to its listeners.
///
/// Cloning the handle shares the emitter, which is how a listener reaches
/// the emitter it is registered on.
///
/// # Example
///
/// ```
/// use spark_properties::{Emitter, Listener};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let emitter: Emitter<(i32,)> = Emitter::new();
/// let total = Rc::new(Cell::new(0));
///
/// let listener = Listener::new({
///     let total = total.clone();
///     move |(n,): &(i32,)| total.set(total.get() + n)
/// });
/// emitter.add_listener(&listener).unwrap();
///
/// emitter.emit((5,)).unwrap();
/// emitter.emit((2,)).unwrap();
/// assert_eq!(total.get(), 7);
/// ```
pub struct Emitter<A: EmitterArgs> {
    inner: Rc<EmitterInner<A>>,
}

impl<A: EmitterArgs> Clone for Emitter<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: EmitterArgs> Emitter<A> {
    /// Emitter with default options
    pub fn new() -> Self {
        let serial = with_context(|ctx| ctx.allocate_emitter_serial());
        Self::build(format!("emitter#{serial}"), EmitterOptions::default())
    }

    /// Emitter with explicit options, validated against the arity of `A`
    pub fn with_options(options: EmitterOptions) -> Result<Self> {
        let name = match &options.name {
            Some(name) => name.clone(),
            None => {
                let serial = with_context(|ctx| ctx.allocate_emitter_serial());
                format!("emitter#{serial}")
            }
        };
        options.validate_for::<A>(&name)?;
        Ok(Self::build(name, options))
    }

    /// Build without validating `options`; callers guarantee they are valid
    pub(crate) fn build(name: String, options: EmitterOptions) -> Self {
        Self {
            inner: Rc::new(EmitterInner {
                listeners: ListenerSet::new(name.clone(), options.listener_order),
                name,
                parameters: options.parameters,
                reentrant_order: options.reentrant_order,
                sink: options.sink,
                queue: RefCell::new(VecDeque::new()),
                draining: Cell::new(false),
                disposed: Cell::new(false),
            }),
        }
    }

    /// Fire `args` to every listener.
    ///
    /// Fails with `Disposed` after `dispose`, and with `InvalidArgument`
    /// (before any listener runs) when a parameter constraint rejects an
    /// argument.
    pub fn emit(&self, args: A) -> Result<()> {
        self.inner.emit(args)
    }

    /// Register a listener
    pub fn add_listener(&self, listener: &Listener<A>) -> Result<()> {
        if self.inner.disposed.get() {
            return Err(PropertyError::disposed(&self.inner.name));
        }
        self.inner.listeners.add(listener.clone())
    }

    /// Wrap a closure in a new listener and register it
    pub fn listen(&self, callback: impl Fn(&A) + 'static) -> Result<Listener<A>> {
        let listener = Listener::new(callback);
        self.add_listener(&listener)?;
        Ok(listener)
    }

    /// Unregister a listener
    pub fn remove_listener(&self, listener: &Listener<A>) -> Result<()> {
        self.inner.listeners.remove(listener.id())
    }

    /// Unregister a listener by identity
    pub fn remove_listener_id(&self, id: ListenerId) -> Result<()> {
        self.inner.listeners.remove(id)
    }

    /// Unregister every listener
    pub fn remove_all_listeners(&self) {
        self.inner.listeners.remove_all();
    }

    pub fn has_listener(&self, listener: &Listener<A>) -> bool {
        self.inner.listeners.contains(listener.id())
    }

    pub fn has_listeners(&self) -> bool {
        !self.inner.listeners.is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn reentrant_order(&self) -> ReentrantOrder {
        self.inner.reentrant_order
    }

    /// Remove all listeners and refuse further use. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.inner.queue.borrow_mut().clear();
        self.inner.listeners.dispose();
        tracing::trace!(emitter = %self.inner.name, "disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl<A: EmitterArgs> Default for Emitter<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: EmitterArgs> fmt::Debug for Emitter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("name", &self.inner.name)
            .field("arity", &A::ARITY)
            .field("listeners", &self.listener_count())
            .field("reentrant_order", &self.inner.reentrant_order)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
