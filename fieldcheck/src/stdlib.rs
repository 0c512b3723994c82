//! Functions available to constraint expressions
//!
//! - `len(x)`: length of a list, map, string (in characters) or bytes; `0` for null
//! - `now()`: the current instant
//! - `date(year, month, day)`: midnight UTC on that day
//! - `str.alpha(s)`, `str.numeric(s)`, `str.alphaNumeric(s)`: every character
//!   is a letter / a number / either (true for the empty string)
//! - `str.match(pattern, s)`: `s` contains a match of the regular expression
//! - `error(message)`, `errorAt(field, message)`: error values, so that an
//!   expression can return one error or a list of them

use crate::inspect::map_value;
use crate::path::Context as PathContext;
use cel_interpreter::extractors::This;
use cel_interpreter::{Context, ExecutionError, Value};
use chrono::{NaiveDate, Utc};
use regex::Regex;
use std::sync::Arc;

/// Name of the string predicate namespace
pub const STR_NAMESPACE: &str = "str";

/// Reserved map keys marking an error value
pub(crate) const ERROR_MESSAGE_KEY: &str = "@error";
pub(crate) const ERROR_PATH_KEY: &str = "@path";

fn namespace() -> Value {
    Value::String(Arc::new(format!("<namespace {}>", STR_NAMESPACE)))
}

/// Register the functions that do not depend on the field being evaluated
pub fn register(context: &mut Context) {
    context.add_variable_from_value(STR_NAMESPACE, namespace());

    context.add_function("len", len);
    context.add_function("now", || {
        Ok::<Value, ExecutionError>(Value::Timestamp(Utc::now().fixed_offset()))
    });
    context.add_function("date", date);

    context.add_function("alpha", |This(ns): This<Value>, s: Arc<String>| {
        in_namespace("alpha", &ns)?;
        Ok::<bool, ExecutionError>(check_string(&s, char::is_alphabetic))
    });
    context.add_function("numeric", |This(ns): This<Value>, s: Arc<String>| {
        in_namespace("numeric", &ns)?;
        Ok::<bool, ExecutionError>(check_string(&s, char::is_numeric))
    });
    context.add_function("alphaNumeric", |This(ns): This<Value>, s: Arc<String>| {
        in_namespace("alphaNumeric", &ns)?;
        Ok::<bool, ExecutionError>(check_string(&s, char::is_alphanumeric))
    });
    context.add_function(
        "match",
        |This(ns): This<Value>, pattern: Arc<String>, s: Arc<String>| {
            in_namespace("match", &ns)?;
            matches(&pattern, &s)
        },
    );
}

/// Register `error` and `errorAt`, reporting at `path`
pub fn register_errors(context: &mut Context, path: &PathContext) {
    let here = path.clone();
    context.add_function("error", move |message: Arc<String>| {
        Ok::<Value, ExecutionError>(error_value(here.path(), &message))
    });
    let base = path.clone();
    context.add_function("errorAt", move |field: Arc<String>, message: Arc<String>| {
        Ok::<Value, ExecutionError>(error_value(base.with_field(&field).path(), &message))
    });
}

fn in_namespace(function: &str, this: &Value) -> Result<(), ExecutionError> {
    if *this == namespace() {
        Ok(())
    } else {
        Err(ExecutionError::function_error(
            function,
            format!("{} is only available as {}.{}", function, STR_NAMESPACE, function),
        ))
    }
}

fn len(value: Value) -> Result<i64, ExecutionError> {
    let n = match &value {
        Value::List(items) => items.len(),
        Value::Map(map) => map.map.len(),
        Value::String(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::Null => 0,
        other => {
            return Err(ExecutionError::function_error(
                "len",
                format!("type does not have a length: {}", value_kind(other)),
            ))
        }
    };
    Ok(n as i64)
}

fn date(year: i64, month: i64, day: i64) -> Result<Value, ExecutionError> {
    let date = i32::try_from(year).ok().and_then(|year| {
        NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)
    });
    date.and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|midnight| Value::Timestamp(midnight.and_utc().fixed_offset()))
        .ok_or_else(|| {
            ExecutionError::function_error("date", format!("invalid date: {}-{}-{}", year, month, day))
        })
}

fn check_string(s: &str, f: impl Fn(char) -> bool) -> bool {
    s.chars().all(f)
}

fn matches(pattern: &str, s: &str) -> Result<bool, ExecutionError> {
    let re = Regex::new(pattern).map_err(|e| {
        ExecutionError::function_error("match", format!("invalid pattern {:?}: {}", pattern, e))
    })?;
    Ok(re.is_match(s))
}

fn error_value(path: &str, message: &str) -> Value {
    map_value([
        (ERROR_MESSAGE_KEY.to_string(), Value::String(Arc::new(message.to_string()))),
        (ERROR_PATH_KEY.to_string(), Value::String(Arc::new(path.to_string()))),
    ])
}

/// Name of a value's type, for diagnostics
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::List(_) => "list",
        Value::Map(_) => "map",
        Value::Function(_, _) => "function",
        Value::Int(_) => "int",
        Value::UInt(_) => "uint",
        Value::Float(_) => "float",
        Value::String(_) => "string",
        Value::Bytes(_) => "bytes",
        Value::Bool(_) => "bool",
        Value::Duration(_) => "duration",
        Value::Timestamp(_) => "timestamp",
        Value::Null => "null",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cel_interpreter::Program;

    fn eval(source: &str) -> Result<Value, ExecutionError> {
        let mut context = Context::default();
        register(&mut context);
        register_errors(&mut context, &PathContext::new("field"));
        Program::compile(source).unwrap().execute(&context)
    }

    #[test]
    fn test_len() {
        assert_eq!(eval("len('héllo')").unwrap(), Value::Int(5));
        assert_eq!(eval("len([1, 2, 3])").unwrap(), Value::Int(3));
        assert_eq!(eval("len({'a': 1})").unwrap(), Value::Int(1));
        assert_eq!(eval("len(null)").unwrap(), Value::Int(0));
        assert!(eval("len(42)").is_err());
    }

    #[test]
    fn test_string_predicates() {
        assert_eq!(eval("str.alpha('Abc')").unwrap(), Value::Bool(true));
        assert_eq!(eval("str.alpha('Ab1')").unwrap(), Value::Bool(false));
        assert_eq!(eval("str.alpha('')").unwrap(), Value::Bool(true));
        assert_eq!(eval("str.numeric('987')").unwrap(), Value::Bool(true));
        assert_eq!(eval("str.alphaNumeric('123Abc')").unwrap(), Value::Bool(true));
        assert_eq!(eval("str.alphaNumeric('12 3')").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_match() {
        assert_eq!(
            eval("str.match('#[0-9a-f]{6}', '#ff0033')").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval("str.match('#[0-9a-f]{6}', '_ff0033')").unwrap(),
            Value::Bool(false)
        );
        assert!(eval("str.match('[unclosed', 'x')").is_err());
    }

    #[test]
    fn test_predicates_require_namespace() {
        assert!(eval("'abc'.alpha('abc')").is_err());
    }

    #[test]
    fn test_dates() {
        assert_eq!(eval("date(2018, 1, 2) > date(2018, 1, 1)").unwrap(), Value::Bool(true));
        assert_eq!(eval("now() > date(2018, 1, 1)").unwrap(), Value::Bool(true));
        assert!(eval("date(2018, 13, 1)").is_err());
    }

    #[test]
    fn test_error_values() {
        let value = eval("error('bad')").unwrap();
        assert_eq!(value, error_value("field", "bad"));

        let value = eval("errorAt('sub', 'worse')").unwrap();
        assert_eq!(value, error_value("field.sub", "worse"));
    }

    #[test]
    fn test_value_kind() {
        assert_eq!(value_kind(&Value::Null), "null");
        assert_eq!(value_kind(&Value::Int(1)), "int");
    }
}
