//! The validation engine
//!
//! [`Validator`] walks a value depth-first. At every node it first offers the
//! value's custom [`Hook`], then dispatches on its [`Shape`]: records have
//! their annotated fields evaluated, sequences are visited element by element,
//! wrappers are looked through. Every reachable field is visited even after
//! one fails, so a single call reports every violation.

use crate::cache::Caches;
use crate::config::{Config, ValidatorOption};
use crate::descriptor::{ValidatedField, ValidatedType};
use crate::error::{ConfigError, ErrorList, FieldError, Result, SharedError};
use crate::expression::{unexpected_message, unsatisfied_message, Bindings, Outcome, Run};
use crate::hook::{Hook, Verdict};
use crate::inspect::{FieldInfo, Inspect, Record, Shape};
use crate::path::Context;
use cel_interpreter::objects::Key;
use cel_interpreter::Value;
use std::sync::Arc;
use tracing::{trace, warn};

/// Path reported for errors raised on the root value
pub const ENTITY: &str = "<entity>";

/// Validates values against the constraints declared on their fields
///
/// Validators are cheap to clone and safe to use from many threads; clones
/// share caches. A validator built with [`Validator::new`] or
/// [`Validator::with_config`] gets caches of its own, with default sizes.
/// To share caches between differently configured validators, or to size
/// them from the environment, build a [`Caches`] and pass it to
/// [`Validator::with_caches`].
#[derive(Clone)]
pub struct Validator {
    config: Arc<Config>,
    caches: Arc<Caches>,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::with_config(Config::default())
    }
}

impl Validator {
    /// Create a validator from options applied over the defaults
    pub fn new<I>(options: I) -> Self
    where
        I: IntoIterator<Item = ValidatorOption>,
    {
        Self::with_config(Config::default().with_options(options))
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_caches(config, Arc::new(Caches::default()))
    }

    /// Create a validator using the given caches
    pub fn with_caches(config: Config, caches: Arc<Caches>) -> Self {
        Self {
            config: Arc::new(config),
            caches,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn caches(&self) -> &Arc<Caches> {
        &self.caches
    }

    /// Validate `value`, returning every violation found
    ///
    /// An empty list means the value is valid.
    ///
    /// # Panics
    ///
    /// If the constraints themselves are broken: an expression that does not
    /// compile or fails to evaluate, or a field that cannot be read. Use
    /// [`Validator::try_validate`] to get these as errors instead.
    pub fn validate(&self, value: &dyn Inspect) -> ErrorList {
        match self.try_validate(value) {
            Ok(errors) => errors,
            Err(err) => panic!("fieldcheck configuration error: {}", err),
        }
    }

    /// Validate `value`, surfacing configuration errors as values
    pub fn try_validate(&self, value: &dyn Inspect) -> Result<ErrorList> {
        self.validate_at(&Context::new(self.config.base_path.clone()), value)
    }

    /// Validate `value` as if it were found at `cx`
    ///
    /// Intended for hooks that validate nested values under their own paths.
    pub fn validate_at(&self, cx: &Context, value: &dyn Inspect) -> Result<ErrorList> {
        let mut errors = ErrorList::new();
        self.visit(cx, value, None, &mut errors)?;
        Ok(errors)
    }

    /// Visit a value, offering its hook first
    ///
    /// `known` is the value already converted for expressions, when the
    /// caller has it.
    fn visit(
        &self,
        cx: &Context,
        value: &dyn Inspect,
        known: Option<Value>,
        errors: &mut ErrorList,
    ) -> Result<bool> {
        match value.hook() {
            Hook::None => self.visit_shape(cx, value, known, errors),
            Hook::V1(hook) => match hook.validate() {
                Ok(()) => Ok(true),
                Err(error) => {
                    resolve_hook_error(cx, error, errors);
                    Ok(false)
                }
            },
            Hook::V2(hook) => {
                self.apply_verdict(cx, value, known, hook.validate_with(self), errors)
            }
            Hook::V3(hook) => {
                let verdict = hook.validate_in_context(self, cx);
                self.apply_verdict(cx, value, known, verdict, errors)
            }
        }
    }

    fn apply_verdict(
        &self,
        cx: &Context,
        value: &dyn Inspect,
        known: Option<Value>,
        verdict: Verdict,
        errors: &mut ErrorList,
    ) -> Result<bool> {
        let mut valid = true;
        if let Some(error) = verdict.error {
            resolve_hook_error(cx, error, errors);
            valid = false;
        }
        if verdict.proceed {
            valid &= self.visit_shape(cx, value, known, errors)?;
        }
        Ok(valid)
    }

    /// Visit a value by shape, without offering its hook
    fn visit_shape(
        &self,
        cx: &Context,
        value: &dyn Inspect,
        known: Option<Value>,
        errors: &mut ErrorList,
    ) -> Result<bool> {
        match value.shape() {
            Shape::Absent | Shape::Leaf => Ok(true),
            // Wrappers convert to the value they wrap
            Shape::Reference(inner) => self.visit(cx, inner, known, errors),
            Shape::Record(record) => self.visit_record(cx, record, known, errors),
            Shape::Sequence(items) => {
                let converted = match known {
                    Some(Value::List(list)) if list.len() == items.len() => Some(list),
                    _ => None,
                };
                let mut valid = true;
                for (index, item) in items.into_iter().enumerate() {
                    let known = converted.as_ref().map(|list| list[index].clone());
                    valid &= self.visit(&cx.with_index(index), item, known, errors)?;
                }
                Ok(valid)
            }
            Shape::Unsupported(type_name) => {
                if self.config.strict {
                    return Err(ConfigError::UnsupportedShape {
                        type_name,
                        path: cx.path().to_string(),
                    });
                }
                warn!(
                    "Not validating value of unsupported type {} at '{}'",
                    type_name, cx
                );
                Ok(true)
            }
        }
    }

    /// Visit an embedded field. Its members belong to the enclosing record,
    /// so neither it nor anything it wraps is offered a hook.
    fn visit_embedded(
        &self,
        cx: &Context,
        value: &dyn Inspect,
        known: Option<Value>,
        errors: &mut ErrorList,
    ) -> Result<bool> {
        match value.shape() {
            Shape::Reference(inner) => self.visit_embedded(cx, inner, known, errors),
            _ => self.visit_shape(cx, value, known, errors),
        }
    }

    fn descriptor(&self, record: &dyn Record) -> Arc<ValidatedType> {
        let key = (record.record_type().id, Arc::clone(&self.config));
        self.caches
            .types()
            .get_or_insert_with(&key, || ValidatedType::build(record, &self.config))
    }

    fn visit_record(
        &self,
        cx: &Context,
        record: &dyn Record,
        known: Option<Value>,
        errors: &mut ErrorList,
    ) -> Result<bool> {
        let descriptor = self.descriptor(record);
        let infos = record.fields();
        // Converted on the first field, then shared with everything below
        let mut converted = known;

        let mut valid = true;
        for field in &descriptor.fields {
            let info = infos.get(field.index);
            let value = record.field(field.index).ok_or_else(|| ConfigError::UnreadableField {
                type_name: descriptor.record_type.name,
                field: info.map_or("?", |info| info.ident),
                path: cx.path().to_string(),
            })?;
            let record_value = converted.get_or_insert_with(|| record.to_value()).clone();
            let own = member_value(&record_value, info, value);

            // Members of an embedded record belong to this one
            if field.embedded {
                valid &= self.visit_embedded(cx, value, Some(own), errors)?;
                continue;
            }

            let path = cx.with_field(&field.name);
            let field_valid = if field.recurses() {
                self.visit(&path, value, Some(own), errors)?
            } else {
                self.evaluate(&path, field, value, own, record_value, errors)?
            };
            valid &= field_valid;
        }
        Ok(valid)
    }

    fn evaluate(
        &self,
        cx: &Context,
        field: &ValidatedField,
        value: &dyn Inspect,
        own: Value,
        record: Value,
        errors: &mut ErrorList,
    ) -> Result<bool> {
        let expression = self.caches.expression(&field.source)?;

        // check(self) validates the field value only once the expression
        // reaches it; its errors come before the field's own.
        let mut nested = ErrorList::new();
        let mut checked = None;
        let evaluation = loop {
            let run = expression
                .execute(Bindings {
                    path: cx,
                    value: own.clone(),
                    record: record.clone(),
                    checked,
                })
                .map_err(|e| ConfigError::Evaluate {
                    path: cx.path().to_string(),
                    source_text: field.source.clone(),
                    message: e.to_string(),
                })?;
            match run {
                Run::Finished(evaluation) => break evaluation,
                // Runs with a known result never stop at check again
                Run::NeedsCheck => {
                    checked = Some(self.visit(cx, value, Some(own.clone()), &mut nested)?)
                }
            }
        };

        if evaluation.check_called {
            errors.extend(nested);
        }

        trace!("`{}` at '{}' returned {:?}", field.source, cx, evaluation.result);

        let outcome = Outcome::of(evaluation.result);
        let reported: Vec<FieldError> = match outcome {
            Outcome::Valid => return Ok(true),
            Outcome::Unsatisfied => {
                let message = if field.message.is_empty() {
                    unsatisfied_message(&field.source)
                } else {
                    field.message.clone()
                };
                vec![FieldError::new(cx.path(), message)]
            }
            Outcome::Violations(list) => list,
            Outcome::Unexpected(result) => {
                vec![FieldError::new(cx.path(), unexpected_message(&result))]
            }
        };
        if !field.no_err {
            errors.extend(reported);
        }
        Ok(false)
    }
}

/// A field's value, taken from its converted record when present there
fn member_value(record: &Value, info: Option<&FieldInfo>, value: &dyn Inspect) -> Value {
    let found = match (record, info) {
        (Value::Map(map), Some(info)) => map
            .map
            .get(&Key::String(Arc::new(info.ident.to_string())))
            .cloned(),
        _ => None,
    };
    found.unwrap_or_else(|| value.to_value())
}

/// Turn an error returned by a hook into field errors
///
/// The first error list or field error in the chain is reported as it is,
/// lists spliced. Anything else becomes a field error at the current path.
fn resolve_hook_error(cx: &Context, error: anyhow::Error, errors: &mut ErrorList) {
    for cause in error.chain() {
        if let Some(list) = cause.downcast_ref::<ErrorList>() {
            errors.extend(list.iter().cloned());
            return;
        }
        if let Some(field) = cause.downcast_ref::<FieldError>() {
            errors.push(field.clone());
            return;
        }
    }

    let path = if cx.is_root() { ENTITY } else { cx.path() };
    let cause: SharedError = Arc::from(error.reallocate_into_boxed_dyn_error_without_backtrace());
    errors.push(FieldError::from_shared(path, cause));
}
