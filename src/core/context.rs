// ============================================================================
// spark-properties - Notification Context
// Thread-local state shared by every emitter and property on a thread
// ============================================================================

use std::cell::Cell;

use super::types::{ListenerId, PropertyId};

// =============================================================================
// NOTIFICATION CONTEXT
// =============================================================================

/// Thread-local context holding identity counters and emission bookkeeping.
///
/// Everything in this crate is single-threaded; identities are unique per
/// thread, which is the only scope a listener or property can live in.
pub struct NotificationContext {
    /// Next listener identity to hand out
    pub next_listener_id: Cell<u64>,

    /// Next property identity to hand out
    pub next_property_id: Cell<u64>,

    /// Next emitter serial (used for default emitter names)
    pub next_emitter_id: Cell<u64>,

    /// How many emissions are currently on the call stack (all emitters)
    pub emission_depth: Cell<u32>,

    /// Deepest nesting observed since the context was created
    pub max_emission_depth: Cell<u32>,
}

impl NotificationContext {
    /// Create a new context with all counters at their starting values
    pub fn new() -> Self {
        Self {
            next_listener_id: Cell::new(1),
            next_property_id: Cell::new(1),
            next_emitter_id: Cell::new(1),
            emission_depth: Cell::new(0),
            max_emission_depth: Cell::new(0),
        }
    }

    // =========================================================================
    // IDENTITIES
    // =========================================================================

    /// Allocate a fresh listener identity
    pub fn allocate_listener_id(&self) -> ListenerId {
        let id = self.next_listener_id.get();
        self.next_listener_id.set(id + 1);
        ListenerId(id)
    }

    /// Allocate a fresh property identity
    pub fn allocate_property_id(&self) -> PropertyId {
        let id = self.next_property_id.get();
        self.next_property_id.set(id + 1);
        PropertyId(id)
    }

    /// Allocate an emitter serial number
    pub fn allocate_emitter_serial(&self) -> u64 {
        let id = self.next_emitter_id.get();
        self.next_emitter_id.set(id + 1);
        id
    }

    // =========================================================================
    // EMISSION DEPTH
    // =========================================================================

    /// Increment the emission depth, returns the new depth
    pub fn enter_emission(&self) -> u32 {
        let depth = self.emission_depth.get() + 1;
        self.emission_depth.set(depth);
        if depth > self.max_emission_depth.get() {
            self.max_emission_depth.set(depth);
        }
        depth
    }

    /// Decrement the emission depth, returns the new depth
    pub fn exit_emission(&self) -> u32 {
        let depth = self.emission_depth.get().saturating_sub(1);
        self.emission_depth.set(depth);
        depth
    }

    /// Current emission depth
    pub fn get_emission_depth(&self) -> u32 {
        self.emission_depth.get()
    }
}

impl Default for NotificationContext {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    static CONTEXT: NotificationContext = NotificationContext::new();
}

/// Access the thread-local notification context.
pub fn with_context<R>(f: impl FnOnce(&NotificationContext) -> R) -> R {
    CONTEXT.with(f)
}

/// Check if any emission is in progress on this thread
pub fn is_emitting() -> bool {
    with_context(|ctx| ctx.get_emission_depth() > 0)
}

/// Current emission nesting depth on this thread
pub fn emission_depth() -> u32 {
    with_context(|ctx| ctx.get_emission_depth())
}

/// RAII marker for one emission on the call stack.
///
/// Exits on drop so a panicking listener does not leave the depth skewed.
pub(crate) struct EmissionScope {
    depth: u32,
}

impl EmissionScope {
    pub(crate) fn enter() -> Self {
        Self {
            depth: with_context(|ctx| ctx.enter_emission()),
        }
    }

    pub(crate) fn depth(&self) -> u32 {
        self.depth
    }
}

impl Drop for EmissionScope {
    fn drop(&mut self) {
        with_context(|ctx| ctx.exit_emission());
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_unique_and_increasing() {
        let a = with_context(|ctx| ctx.allocate_listener_id());
        let b = with_context(|ctx| ctx.allocate_listener_id());
        assert!(b.0 > a.0);

        let p = with_context(|ctx| ctx.allocate_property_id());
        let q = with_context(|ctx| ctx.allocate_property_id());
        assert_ne!(p, q);
    }

    #[test]
    fn emission_scope_tracks_depth() {
        assert!(!is_emitting());
        {
            let outer = EmissionScope::enter();
            assert_eq!(outer.depth(), 1);
            {
                let inner = EmissionScope::enter();
                assert_eq!(inner.depth(), 2);
                assert_eq!(emission_depth(), 2);
            }
            assert_eq!(emission_depth(), 1);
        }
        assert!(!is_emitting());
        assert!(with_context(|ctx| ctx.max_emission_depth.get()) >= 2);
    }

    #[test]
    fn exit_never_underflows() {
        with_context(|ctx| {
            assert_eq!(ctx.exit_emission(), 0);
            assert_eq!(ctx.get_emission_depth(), 0);
        });
    }
}
