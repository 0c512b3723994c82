//! Compiled constraint expressions
//!
//! A constraint is a CEL program compiled once per distinct source text and
//! shared through the expression cache. Every evaluation runs against a fresh
//! context holding the field's bindings, so compiled programs never carry
//! state from one evaluation to the next.

use crate::error::{ConfigError, FieldError, Result};
use crate::path::Context as PathContext;
use crate::stdlib::{self, value_kind, ERROR_MESSAGE_KEY, ERROR_PATH_KEY};
use cel_interpreter::objects::Key;
use cel_interpreter::{Context, ExecutionError, Program, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Binding for the field value
pub const SELF: &str = "self";
/// Bindings for the enclosing record
pub const SUP: &str = "sup";
pub const SUPER: &str = "super";
/// Re-entrant validation of the field value
pub const CHECK: &str = "check";

/// A compiled constraint
pub struct Expression {
    source: String,
    program: Program,
    uses_check: bool,
}

impl std::fmt::Debug for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expression")
            .field("source", &self.source)
            .field("uses_check", &self.uses_check)
            .finish()
    }
}

/// What an expression sees when it runs
pub struct Bindings<'a> {
    /// Path of the field being evaluated
    pub path: &'a PathContext,
    /// The field value, bound as `self`
    pub value: Value,
    /// The enclosing record, bound as `sup` and `super`
    pub record: Value,
    /// Result of validating the field value, returned by `check(self)`.
    /// While unknown, reaching `check(self)` stops the run with
    /// [`Run::NeedsCheck`].
    pub checked: Option<bool>,
}

/// Result of a completed run
#[derive(Debug)]
pub struct Evaluation {
    pub result: Value,
    /// `check(self)` was reached during execution
    pub check_called: bool,
}

/// How a run ended
#[derive(Debug)]
pub enum Run {
    Finished(Evaluation),
    /// `check(self)` was reached before its result was known. Validate the
    /// field value and run again with [`Bindings::checked`] set.
    NeedsCheck,
}

// Returned by `check` to unwind a run that needs the validation result
const CHECK_PENDING: &str = "validation result pending";

impl Expression {
    /// Compile `source` into a program
    pub fn compile(source: &str) -> Result<Self> {
        let program = Program::compile(source).map_err(|e| ConfigError::Compile {
            source_text: source.to_string(),
            message: e.to_string(),
        })?;
        let uses_check = program.references().has_function(CHECK);
        debug!("Compiled expression `{}` (uses check: {})", source, uses_check);

        Ok(Self {
            source: source.to_string(),
            program,
            uses_check,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The program calls `check`
    pub fn uses_check(&self) -> bool {
        self.uses_check
    }

    /// Run the program against `bindings`
    pub fn execute(&self, bindings: Bindings<'_>) -> std::result::Result<Run, ExecutionError> {
        let mut context = Context::default();
        stdlib::register(&mut context);
        stdlib::register_errors(&mut context, bindings.path);
        context.add_variable_from_value(SELF, bindings.value.clone());
        context.add_variable_from_value(SUP, bindings.record.clone());
        context.add_variable_from_value(SUPER, bindings.record);

        let called = Arc::new(AtomicBool::new(false));
        if self.uses_check {
            let flag = Arc::clone(&called);
            let own = bindings.value;
            let checked = bindings.checked;
            context.add_function(CHECK, move |value: Value| -> std::result::Result<bool, ExecutionError> {
                // Only the field value itself is ever validated
                if value != own {
                    return Err(ExecutionError::function_error(
                        CHECK,
                        "check() only accepts the field's own value (self)",
                    ));
                }
                flag.store(true, Ordering::SeqCst);
                checked.ok_or_else(|| ExecutionError::function_error(CHECK, CHECK_PENDING))
            });
        }

        trace!("Evaluating `{}` at {}", self.source, bindings.path);
        match self.program.execute(&context) {
            Ok(result) => Ok(Run::Finished(Evaluation {
                result,
                check_called: called.load(Ordering::SeqCst),
            })),
            Err(err) if bindings.checked.is_none() && is_pending(&err) => Ok(Run::NeedsCheck),
            Err(err) => Err(err),
        }
    }
}

fn is_pending(err: &ExecutionError) -> bool {
    matches!(
        err,
        ExecutionError::FunctionError { function, message }
            if function == CHECK && message == CHECK_PENDING
    )
}

/// How an expression result affects its field
#[derive(Debug)]
pub enum Outcome {
    /// `true`, null, or an empty list
    Valid,
    /// `false`
    Unsatisfied,
    /// One or more error values
    Violations(Vec<FieldError>),
    /// Any other result
    Unexpected(Value),
}

impl Outcome {
    pub fn of(value: Value) -> Self {
        match value {
            Value::Null | Value::Bool(true) => Outcome::Valid,
            Value::Bool(false) => Outcome::Unsatisfied,
            Value::Map(_) => match as_field_error(&value) {
                Some(error) => Outcome::Violations(vec![error]),
                None => Outcome::Unexpected(value),
            },
            Value::List(ref items) if items.is_empty() => Outcome::Valid,
            Value::List(ref items) => match items.iter().map(as_field_error).collect() {
                Some(errors) => Outcome::Violations(errors),
                None => Outcome::Unexpected(value),
            },
            other => Outcome::Unexpected(other),
        }
    }
}

/// Message reported for a `false` result without a declared message
pub fn unsatisfied_message(source: &str) -> String {
    format!("constraint not satisfied: `{}`", source)
}

/// Message reported for a result of the wrong type
pub fn unexpected_message(value: &Value) -> String {
    format!(
        "invalid expression result: {} (expected bool, error, or list of errors) in {}",
        value_kind(value),
        value_to_json(value)
    )
}

fn as_field_error(value: &Value) -> Option<FieldError> {
    let Value::Map(map) = value else {
        return None;
    };
    let lookup = |key: &str| match map.map.get(&Key::String(Arc::new(key.to_string()))) {
        Some(Value::String(s)) => Some(s.to_string()),
        _ => None,
    };
    Some(FieldError::new(
        lookup(ERROR_PATH_KEY)?,
        lookup(ERROR_MESSAGE_KEY)?,
    ))
}

/// Render a value as JSON for diagnostics
///
/// Values without a JSON counterpart (bytes, durations, functions) are shown
/// by kind only.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::UInt(u) => Json::from(*u),
        Value::Float(f) => Json::from(*f),
        Value::String(s) => Json::String(s.to_string()),
        Value::Timestamp(ts) => Json::String(ts.to_rfc3339()),
        Value::List(items) => items.iter().map(value_to_json).collect(),
        Value::Map(map) => Json::Object(
            map.map
                .iter()
                .map(|(key, v)| (key_text(key), value_to_json(v)))
                .collect(),
        ),
        other => Json::String(format!("<{}>", value_kind(other))),
    }
}

fn key_text(key: &Key) -> String {
    match key {
        Key::String(s) => s.to_string(),
        Key::Int(i) => i.to_string(),
        Key::Uint(u) => u.to_string(),
        Key::Bool(b) => b.to_string(),
    }
}
