// ============================================================================
// spark-properties - Core Module
// Identities, errors, configuration and the thread-local context
// ============================================================================

pub mod constants;
pub mod context;
pub mod error;
pub mod options;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use context::{emission_depth, is_emitting, with_context, NotificationContext};
pub use error::{PropertyError, Result};
pub use options::{
    EmitterOptions, ListenerOrder, Parameter, PropertyOptions, ReentrantOrder, Validator,
};
pub use types::{
    default_equals, AnyProperty, Deferrable, EmitterArgs, EqualsFn, ListenerId, Notifier,
    PropertyId, PropertyValue,
};
