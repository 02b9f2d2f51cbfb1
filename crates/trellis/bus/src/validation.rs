//! Per-type validation rules
//!
//! Rules run before middleware. A failing rule aborts the dispatch and no
//! handler runs.

use trellis_types::Signal;

/// A check a signal of one type must pass before dispatch
pub trait ValidationRule: Send + Sync {
    fn validate(&self, signal: &Signal) -> Result<(), String>;
}

/// Rule backed by a closure
pub struct FnRule<F> {
    f: F,
}

impl<F> ValidationRule for FnRule<F>
where
    F: Fn(&Signal) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, signal: &Signal) -> Result<(), String> {
        (self.f)(signal)
    }
}

/// Wrap a closure as a [`ValidationRule`].
pub fn rule_fn<F>(f: F) -> FnRule<F>
where
    F: Fn(&Signal) -> Result<(), String> + Send + Sync,
{
    FnRule { f }
}

/// Enforces the catalogue mapping from a type string to its payload variant.
#[derive(Debug, Clone, Copy)]
pub struct CatalogueRule {
    expected: &'static str,
}

impl CatalogueRule {
    pub fn new(expected: &'static str) -> Self {
        Self { expected }
    }
}

impl ValidationRule for CatalogueRule {
    fn validate(&self, signal: &Signal) -> Result<(), String> {
        match signal.payload.canonical_type() {
            Some(ty) if ty == self.expected => Ok(()),
            Some(other) => Err(format!(
                "expected a '{}' payload, found a '{}' payload",
                self.expected, other
            )),
            None => Err(format!(
                "expected a '{}' payload, found a non-catalogue payload",
                self.expected
            )),
        }
    }
}
