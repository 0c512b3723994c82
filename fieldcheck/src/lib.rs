//! Annotation-driven validation of records
//!
//! Constraints are declared next to the fields they govern, as CEL
//! expressions inside Go-style annotation strings. A [`Validator`] walks a
//! value, evaluates every constraint it finds, and returns all violations as
//! an [`ErrorList`] of path-qualified [`FieldError`]s.
//!
//! # Example
//!
//! ```rust
//! use fieldcheck::{Inspect, Validator};
//!
//! #[derive(Inspect)]
//! struct Signup {
//!     #[inspect(tag = r#"json:"user_name" check:"len(self) > 0" invalid:"Must not be empty""#)]
//!     name: String,
//!     #[inspect(tag = r#"json:"age" check:"self >= 18""#)]
//!     age: u32,
//! }
//!
//! let errors = Validator::default().validate(&Signup {
//!     name: String::new(),
//!     age: 12,
//! });
//! assert_eq!(errors.fields(), vec!["user_name", "age"]);
//! assert_eq!(errors.messages()[0], "Must not be empty");
//! ```
//!
//! # Constraints
//!
//! The constraint key (`check` by default, see [`ValidatorOption`]) holds
//! either an expression or one of two sentinels:
//!
//! - `-` excludes the field, including an embedded one
//! - `check` validates the field's value recursively under the field's path
//!
//! An expression sees the field as `self` and the enclosing record as `sup`
//! (or `super`). It may return a boolean, `error(...)`, a list of errors, or
//! null; see [`stdlib`] for the functions available. A `false` result is
//! reported with the message under the error key (`invalid` by default), and
//! the message `-` keeps the field's errors out of the output while still
//! counting it as invalid.
//!
//! # Hooks
//!
//! Types can add their own logic through [`Validate`], [`ValidateWith`] or
//! [`ValidateInContext`], listed with `#[inspect(hooks(...))]`.
//!
//! # Errors
//!
//! Invalid values are data: they come back as an [`ErrorList`]. Broken
//! constraints (expressions that do not compile or fail to evaluate) are
//! [`ConfigError`]s; [`Validator::validate`] panics on them and
//! [`Validator::try_validate`] returns them.

// The derive refers to this crate by name, including from inside it
extern crate self as fieldcheck;

pub mod annotations;
pub mod cache;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod expression;
pub mod hook;
pub mod inspect;
pub mod path;
pub mod stdlib;
pub mod validator;

pub use annotations::Annotations;
pub use cache::{BoundedCache, Caches};
pub use config::{mode, CacheSettings, Config, ValidatorOption};
pub use descriptor::{ValidatedField, ValidatedType};
pub use error::{ConfigError, ErrorList, FieldError, Result, SharedError};
pub use expression::Expression;
pub use hook::{Hook, Validate, ValidateInContext, ValidateWith, Verdict};
pub use inspect::{map_value, FieldInfo, Inspect, Record, RecordType, Shape};
pub use path::Context;
pub use validator::Validator;

/// Values as seen by constraint expressions
pub use cel_interpreter::Value;

/// Derive [`Inspect`] and [`Record`] for a struct with named fields
pub use fieldcheck_macros::Inspect;
