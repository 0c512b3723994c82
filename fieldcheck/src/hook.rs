//! Custom validation hooks
//!
//! A type can take over (part of) its own validation by implementing one of
//! three hook traits, in increasing order of capability:
//!
//! 1. [`Validate`]: no access to the validator. Its result is final; field
//!    annotations of the type are not evaluated.
//! 2. [`ValidateWith`]: receives the validator and decides through its
//!    [`Verdict`] whether annotated fields are still checked.
//! 3. [`ValidateInContext`]: like generation 2, plus the traversal [`Context`]
//!    so errors can be reported at precise paths.
//!
//! Types advertise their hooks through [`Inspect::hook`](crate::Inspect::hook);
//! with `#[derive(Inspect)]` that is the `#[inspect(hooks(...))]` attribute.
//! When several are available the most capable one is used.
//!
//! Hooks report failures as [`anyhow::Error`]. An [`ErrorList`](crate::ErrorList)
//! or [`FieldError`](crate::FieldError) anywhere in its chain, context
//! included, is reported as it is; any other error becomes a field error at
//! the current path.

use crate::path::Context;
use crate::validator::Validator;
use std::fmt;

/// Generation 1 hook: self-contained validation
pub trait Validate {
    fn validate(&self) -> anyhow::Result<()>;
}

/// Generation 2 hook: validation with access to the validator
pub trait ValidateWith {
    fn validate_with(&self, validator: &Validator) -> Verdict;
}

/// Generation 3 hook: validation with the validator and the current path
pub trait ValidateInContext {
    fn validate_in_context(&self, validator: &Validator, cx: &Context) -> Verdict;
}

/// Outcome of a generation 2 or 3 hook
#[derive(Default)]
pub struct Verdict {
    /// Error to report, if any
    pub error: Option<anyhow::Error>,
    /// Continue with annotation-driven field validation
    pub proceed: bool,
}

impl Verdict {
    /// No error; skip field validation
    pub fn done() -> Self {
        Self {
            error: None,
            proceed: false,
        }
    }

    /// No error; go on to validate annotated fields
    pub fn proceed() -> Self {
        Self {
            error: None,
            proceed: true,
        }
    }

    /// Attach an error to this verdict
    pub fn with_error(mut self, error: impl Into<anyhow::Error>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl fmt::Debug for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verdict")
            .field("error", &self.error.as_ref().map(|e| e.to_string()))
            .field("proceed", &self.proceed)
            .finish()
    }
}

/// The hook a value exposes, if any
#[derive(Clone, Copy, Default)]
pub enum Hook<'a> {
    #[default]
    None,
    V1(&'a dyn Validate),
    V2(&'a dyn ValidateWith),
    V3(&'a dyn ValidateInContext),
}

impl<'a> Hook<'a> {
    /// Pick the most capable of the available hooks
    pub fn most_capable(
        v1: Option<&'a dyn Validate>,
        v2: Option<&'a dyn ValidateWith>,
        v3: Option<&'a dyn ValidateInContext>,
    ) -> Self {
        match (v1, v2, v3) {
            (_, _, Some(hook)) => Hook::V3(hook),
            (_, Some(hook), None) => Hook::V2(hook),
            (Some(hook), None, None) => Hook::V1(hook),
            (None, None, None) => Hook::None,
        }
    }

    /// Hook generation, 0 when there is none
    pub fn generation(&self) -> u8 {
        match self {
            Hook::None => 0,
            Hook::V1(_) => 1,
            Hook::V2(_) => 2,
            Hook::V3(_) => 3,
        }
    }
}

impl fmt::Debug for Hook<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::None => f.write_str("Hook::None"),
            other => write!(f, "Hook::V{}", other.generation()),
        }
    }
}
