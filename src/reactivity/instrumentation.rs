// ============================================================================
// spark-properties - Instrumentation
// Optional sink that brackets every emission with before/after callbacks
// ============================================================================
//
// The core never interprets what a sink does with the data. It calls
// `on_before_fire` right before the listener loop and `on_after_fire` with
// the returned token right after it, once per emission.
// ============================================================================

use std::cell::{Cell, RefCell};

// =============================================================================
// SINK CONTRACT
// =============================================================================

/// Opaque token handed back by `on_before_fire`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SinkToken(pub u64);

/// Receiver of emission events for persistence or debugging tools.
pub trait InstrumentationSink {
    /// Called before listeners run; `args` is a rendered snapshot
    fn on_before_fire(&self, name: &str, args: &[String]) -> SinkToken;

    /// Called after every listener of the emission has run
    fn on_after_fire(&self, token: SinkToken);
}

// =============================================================================
// TRACING SINK
// =============================================================================

/// Sink that reports emissions as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingSink {
    next: Cell<u64>,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InstrumentationSink for TracingSink {
    fn on_before_fire(&self, name: &str, args: &[String]) -> SinkToken {
        let token = SinkToken(self.next.get());
        self.next.set(token.0 + 1);
        tracing::debug!(emitter = name, token = token.0, args = ?args, "emission started");
        token
    }

    fn on_after_fire(&self, token: SinkToken) {
        tracing::debug!(token = token.0, "emission finished");
    }
}

// =============================================================================
// RECORDING SINK
// =============================================================================

/// One event captured by `RecordingSink`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkEvent {
    Start {
        token: SinkToken,
        name: String,
        args: Vec<String>,
    },
    End {
        token: SinkToken,
    },
}

/// Sink that keeps every event in memory, in call order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    next: Cell<u64>,
    events: RefCell<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event recorded so far
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.borrow().clone()
    }

    /// Drain the recorded events
    pub fn take_events(&self) -> Vec<SinkEvent> {
        self.events.take()
    }
}

impl InstrumentationSink for RecordingSink {
    fn on_before_fire(&self, name: &str, args: &[String]) -> SinkToken {
        let token = SinkToken(self.next.get());
        self.next.set(token.0 + 1);
        self.events.borrow_mut().push(SinkEvent::Start {
            token,
            name: name.to_string(),
            args: args.to_vec(),
        });
        token
    }

    fn on_after_fire(&self, token: SinkToken) {
        self.events.borrow_mut().push(SinkEvent::End { token });
    }
}

// =============================================================================
// TESTS
// =============================================================================
