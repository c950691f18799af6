// ============================================================================
// spark-properties - Reactivity Module
// Listener sets, emitters, equality strategies and instrumentation
// ============================================================================

pub mod emitter;
pub mod equality;
pub mod instrumentation;
pub mod listeners;

pub use emitter::Emitter;
pub use instrumentation::{InstrumentationSink, RecordingSink, SinkEvent, SinkToken, TracingSink};
pub use listeners::{Listener, ListenerSet};
