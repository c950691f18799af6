// ============================================================================
// spark-properties - Options
// Typed configuration for emitters and properties, validated up front
// ============================================================================

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use super::error::{PropertyError, Result};
use super::types::{EmitterArgs, EqualsFn};
use crate::reactivity::instrumentation::InstrumentationSink;

// =============================================================================
// ORDERING POLICIES
// =============================================================================

/// How reentrant emissions from the same emitter are sequenced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReentrantOrder {
    /// A nested emission completes before the outer one resumes (depth-first)
    #[default]
    Stack,
    /// A nested emission waits until earlier emissions finish (breadth-first)
    Queue,
}

/// Order in which listeners of a single emission are invoked.
///
/// Anything other than `Insertion` exists to shake out hidden order
/// assumptions in tests; production code should not opt in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListenerOrder {
    /// Registration order
    #[default]
    Insertion,
    /// Reverse registration order
    Reverse,
    /// Deterministic pseudo-random order per emission, seeded once
    Shuffled { seed: u64 },
}

// =============================================================================
// PARAMETERS
// =============================================================================

/// Metadata for one positional emitter argument.
#[derive(Clone)]
pub struct Parameter {
    name: String,
    check: Option<Rc<dyn Fn(&dyn Any) -> bool>>,
}

impl Parameter {
    /// Parameter with a name and no value constraint
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            check: None,
        }
    }

    /// Constrain the argument to values of type `V` satisfying `predicate`.
    ///
    /// An argument of a different type fails the check.
    pub fn with_check<V: 'static>(mut self, predicate: impl Fn(&V) -> bool + 'static) -> Self {
        self.check = Some(Rc::new(move |value: &dyn Any| {
            value.downcast_ref::<V>().is_some_and(&predicate)
        }));
        self
    }

    /// Parameter name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check one argument against the constraint (true when unconstrained)
    pub fn accepts(&self, value: Option<&dyn Any>) -> bool {
        match (&self.check, value) {
            (None, Some(_)) => true,
            (Some(check), Some(value)) => check(value),
            (_, None) => false,
        }
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("constrained", &self.check.is_some())
            .finish()
    }
}

// =============================================================================
// EMITTER OPTIONS
// =============================================================================

/// Configuration for an `Emitter`.
///
/// Defaults: generated name, `ReentrantOrder::Stack`,
/// `ListenerOrder::Insertion`, no parameter metadata, no sink.
#[derive(Clone, Default)]
pub struct EmitterOptions {
    pub name: Option<String>,
    pub reentrant_order: ReentrantOrder,
    pub listener_order: ListenerOrder,
    pub parameters: Vec<Parameter>,
    pub sink: Option<Rc<dyn InstrumentationSink>>,
}

impl EmitterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn reentrant_order(mut self, order: ReentrantOrder) -> Self {
        self.reentrant_order = order;
        self
    }

    pub fn listener_order(mut self, order: ListenerOrder) -> Self {
        self.listener_order = order;
        self
    }

    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn sink(mut self, sink: Rc<dyn InstrumentationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate against the argument pack the emitter will fire.
    ///
    /// Parameter metadata is optional, but when present it must describe
    /// every position exactly once.
    pub fn validate_for<A: EmitterArgs>(&self, target: &str) -> Result<()> {
        if !self.parameters.is_empty() && self.parameters.len() != A::ARITY {
            return Err(PropertyError::invalid_argument(
                target,
                format!(
                    "{} parameters declared for an emitter of arity {}",
                    self.parameters.len(),
                    A::ARITY
                ),
            ));
        }
        for (index, parameter) in self.parameters.iter().enumerate() {
            if parameter.name.is_empty() {
                return Err(PropertyError::invalid_argument(
                    target,
                    format!("parameter {index} has an empty name"),
                ));
            }
            if self.parameters[..index].iter().any(|p| p.name == parameter.name) {
                return Err(PropertyError::invalid_argument(
                    target,
                    format!("duplicate parameter name '{}'", parameter.name),
                ));
            }
        }
        if let Some(name) = &self.name {
            if name.is_empty() {
                return Err(PropertyError::invalid_argument(target, "emitter name is empty"));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for EmitterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitterOptions")
            .field("name", &self.name)
            .field("reentrant_order", &self.reentrant_order)
            .field("listener_order", &self.listener_order)
            .field("parameters", &self.parameters)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

// =============================================================================
// PROPERTY OPTIONS
// =============================================================================

/// A value check run before every commit.
pub struct Validator<T> {
    check: Rc<dyn Fn(&str, &T) -> Result<()>>,
}

impl<T> Clone for Validator<T> {
    fn clone(&self) -> Self {
        Self {
            check: self.check.clone(),
        }
    }
}

impl<T: 'static> Validator<T> {
    /// Validator that reports its own error
    pub fn new(check: impl Fn(&str, &T) -> Result<()> + 'static) -> Self {
        Self {
            check: Rc::new(check),
        }
    }

    /// Validator from a predicate; failure is `InvalidArgument(message)`
    pub fn predicate(message: impl Into<String>, predicate: impl Fn(&T) -> bool + 'static) -> Self {
        let message = message.into();
        Self::new(move |target, value| {
            if predicate(value) {
                Ok(())
            } else {
                Err(PropertyError::invalid_argument(target, message.clone()))
            }
        })
    }

    /// Run the check for property `target`
    pub fn check(&self, target: &str, value: &T) -> Result<()> {
        (self.check)(target, value)
    }
}

/// Configuration for a `Property`.
///
/// Defaults: generated name, `PartialEq` equality (when constructed through
/// `Property::new`), stack reentrancy, insertion order, no validation.
pub struct PropertyOptions<T> {
    pub name: Option<String>,
    pub equals: Option<EqualsFn<T>>,
    pub reentrant_order: ReentrantOrder,
    pub listener_order: ListenerOrder,
    pub valid_values: Option<Vec<T>>,
    pub validators: Vec<Validator<T>>,
    pub sink: Option<Rc<dyn InstrumentationSink>>,
}

impl<T> Default for PropertyOptions<T> {
    fn default() -> Self {
        Self {
            name: None,
            equals: None,
            reentrant_order: ReentrantOrder::default(),
            listener_order: ListenerOrder::default(),
            valid_values: None,
            validators: Vec::new(),
            sink: None,
        }
    }
}

impl<T: Clone> Clone for PropertyOptions<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            equals: self.equals,
            reentrant_order: self.reentrant_order,
            listener_order: self.listener_order,
            valid_values: self.valid_values.clone(),
            validators: self.validators.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<T: 'static> PropertyOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn equals(mut self, equals: EqualsFn<T>) -> Self {
        self.equals = Some(equals);
        self
    }

    pub fn reentrant_order(mut self, order: ReentrantOrder) -> Self {
        self.reentrant_order = order;
        self
    }

    pub fn listener_order(mut self, order: ListenerOrder) -> Self {
        self.listener_order = order;
        self
    }

    pub fn valid_values(mut self, values: Vec<T>) -> Self {
        self.valid_values = Some(values);
        self
    }

    pub fn validator(mut self, validator: Validator<T>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn sink(mut self, sink: Rc<dyn InstrumentationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Structural checks that do not depend on the initial value
    pub fn validate(&self, target: &str) -> Result<()> {
        if let Some(values) = &self.valid_values {
            if values.is_empty() {
                return Err(PropertyError::invalid_argument(target, "valid_values is empty"));
            }
        }
        if let Some(name) = &self.name {
            if name.is_empty() {
                return Err(PropertyError::invalid_argument(target, "property name is empty"));
            }
        }
        Ok(())
    }
}

impl<T> fmt::Debug for PropertyOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyOptions")
            .field("name", &self.name)
            .field("custom_equals", &self.equals.is_some())
            .field("reentrant_order", &self.reentrant_order)
            .field("listener_order", &self.listener_order)
            .field("valid_values", &self.valid_values.as_ref().map(Vec::len))
            .field("validators", &self.validators.len())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_count_must_match_arity() {
        let options = EmitterOptions::new()
            .parameter(Parameter::new("a"))
            .parameter(Parameter::new("b"));
        assert!(options.validate_for::<(i32, i32)>("e").is_ok());
        assert!(matches!(
            options.validate_for::<(i32,)>("e"),
            Err(PropertyError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn no_parameters_is_always_valid() {
        assert!(EmitterOptions::new().validate_for::<(u8, u8, u8)>("e").is_ok());
    }

    #[test]
    fn duplicate_parameter_names_rejected() {
        let options = EmitterOptions::new()
            .parameter(Parameter::new("x"))
            .parameter(Parameter::new("x"));
        assert!(options.validate_for::<(i32, i32)>("e").is_err());
    }

    #[test]
    fn typed_check_downcasts() {
        let positive = Parameter::new("n").with_check(|n: &i32| *n > 0);
        assert!(positive.accepts(Some(&5i32)));
        assert!(!positive.accepts(Some(&-5i32)));
        // Wrong type fails rather than passing silently
        assert!(!positive.accepts(Some(&5u8)));
        assert!(!positive.accepts(None));
    }

    #[test]
    fn predicate_validator_reports_message() {
        let even = Validator::predicate("must be even", |n: &i32| n % 2 == 0);
        assert!(even.check("p", &4).is_ok());
        assert_eq!(
            even.check("p", &3),
            Err(PropertyError::InvalidArgument {
                target: "p".into(),
                reason: "must be even".into()
            })
        );
    }

    #[test]
    fn empty_valid_values_rejected() {
        let options = PropertyOptions::<i32>::new().valid_values(vec![]);
        assert!(options.validate("p").is_err());
    }
}
