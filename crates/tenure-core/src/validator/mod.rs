//! Ordered, short-circuiting session validation.
//!
//! Validators are pluggable predicates over a [`ValidationContext`].
//! They evaluate strictly in attachment order and the first rejection
//! stops the run, so later validators never observe the context. Each
//! validator carries a stable id that the lifecycle manager records in
//! the store's registration record the first time the session sees it.

use std::fmt;

use tracing::warn;

use crate::error::Result;
use crate::storage::SessionStore;

/// Pluggable predicate over session state.
pub trait SessionValidator: Send + Sync {
    /// Stable identifier, recorded in the store's registration record.
    fn id(&self) -> &str;

    /// Evaluate the predicate. `false` rejects the session.
    fn evaluate(&self, context: &ValidationContext<'_>) -> bool;
}

/// Read-only view handed to validators for the duration of one run.
///
/// Borrowed, so a validator cannot retain it beyond the call.
pub struct ValidationContext<'a> {
    store: &'a SessionStore,
    id: &'a str,
    name: &'a str,
}

impl<'a> ValidationContext<'a> {
    /// Build a context over a store and the session identity.
    pub fn new(store: &'a SessionStore, id: &'a str, name: &'a str) -> Self {
        Self { store, id, name }
    }

    /// The store under validation.
    pub fn store(&self) -> &SessionStore {
        self.store
    }

    /// The backend's current session id.
    pub fn session_id(&self) -> &str {
        self.id
    }

    /// The session name.
    pub fn session_name(&self) -> &str {
        self.name
    }
}

/// Ordered validator pipeline with short-circuit-on-failure semantics.
#[derive(Default)]
pub struct ValidatorChain {
    validators: Vec<Box<dyn SessionValidator>>,
}

impl ValidatorChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a validator, preserving insertion order.
    ///
    /// A validator whose id is already attached is dropped.
    pub fn attach(&mut self, validator: Box<dyn SessionValidator>) {
        if self.validators.iter().any(|v| v.id() == validator.id()) {
            return;
        }
        self.validators.push(validator);
    }

    /// Number of attached validators.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// True if no validators are attached.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Record every attached validator in the store's registration
    /// record, skipping ids the store already carries.
    ///
    /// A resumed session therefore sees each validator register at most
    /// once over its persisted lifetime.
    pub fn reconcile(&self, store: &mut SessionStore) -> Result<()> {
        for validator in &self.validators {
            if !store.has_validator(validator.id()) {
                store.record_validator(validator.id())?;
            }
        }
        Ok(())
    }

    /// Evaluate every validator in attachment order.
    ///
    /// Stops at the first rejection; an empty chain passes.
    pub fn run(&self, context: &ValidationContext<'_>) -> bool {
        for validator in &self.validators {
            if !validator.evaluate(context) {
                warn!("Session rejected by validator: {}", validator.id());
                return false;
            }
        }
        true
    }
}

impl fmt::Debug for ValidatorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorChain")
            .field(
                "validators",
                &self.validators.iter().map(|v| v.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Validator implementation wrapping a closure.
pub struct ClosureValidator<F> {
    id: String,
    predicate: F,
}

impl<F> ClosureValidator<F>
where
    F: Fn(&ValidationContext<'_>) -> bool + Send + Sync + 'static,
{
    /// Wrap a predicate closure under a stable id.
    pub fn new(id: impl Into<String>, predicate: F) -> Self {
        Self {
            id: id.into(),
            predicate,
        }
    }

    /// Box the validator for attachment to a chain.
    pub fn boxed(self) -> Box<dyn SessionValidator> {
        Box::new(self)
    }
}

impl<F> SessionValidator for ClosureValidator<F>
where
    F: Fn(&ValidationContext<'_>) -> bool + Send + Sync + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn evaluate(&self, context: &ValidationContext<'_>) -> bool {
        (self.predicate)(context)
    }
}
