//! Error types for fieldcheck
//!
//! Two disjoint classes of error live here:
//!
//! - **Validation failures** ([`FieldError`], collected in an [`ErrorList`]) are
//!   data: a value broke one of its constraints. They are always returned to the
//!   caller and never abort a validation walk.
//! - **Configuration errors** ([`ConfigError`]) mean the schema itself is broken:
//!   an expression that does not compile, a pattern that is not a regex, a field
//!   the validator cannot read. They stop the walk at the point of discovery.

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Shared error stored in an [`ErrorList`]
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Result type for operations that can hit a configuration error
pub type Result<T> = std::result::Result<T, ConfigError>;

/// A single violation tied to a path within the validated value
#[derive(Debug, Clone)]
pub struct FieldError {
    path: String,
    message: String,
    cause: Option<SharedError>,
}

impl FieldError {
    /// Create a field error with an explicit message
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Create a field error whose message is the text of `cause`
    ///
    /// The cause stays reachable through [`std::error::Error::source`].
    pub fn with_cause<E>(path: impl Into<String>, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            message: cause.to_string(),
            cause: Some(Arc::new(cause)),
        }
    }

    pub(crate) fn from_shared(path: impl Into<String>, cause: SharedError) -> Self {
        Self {
            path: path.into(),
            message: cause.to_string(),
            cause: Some(cause),
        }
    }

    /// Dotted/indexed path of the offending field
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Human readable message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Underlying error, if this field error wraps one
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl StdError for FieldError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause.as_ref() as &(dyn StdError + 'static))
    }
}

impl Serialize for FieldError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FieldError", 2)?;
        state.serialize_field("field", &self.path)?;
        state.serialize_field("message", &self.message)?;
        state.end()
    }
}

/// Ordered aggregate of validation errors
///
/// Insertion order is traversal order: fields in declaration order, sequence
/// elements by index. Pushing an `ErrorList` into another splices its elements
/// rather than nesting it.
#[derive(Debug, Clone, Default)]
pub struct ErrorList {
    errors: Vec<SharedError>,
}

impl ErrorList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error, splicing it if it is itself an `ErrorList`
    pub fn push<E>(&mut self, error: E)
    where
        E: StdError + Send + Sync + 'static,
    {
        self.push_shared(Arc::new(error));
    }

    /// Append an already shared error, splicing nested lists
    pub fn push_shared(&mut self, error: SharedError) {
        match error.downcast_ref::<ErrorList>() {
            Some(nested) => self.errors.extend(nested.errors.iter().cloned()),
            None => self.errors.push(error),
        }
    }

    /// Number of errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// True when no errors were collected
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterate over the errors in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, SharedError> {
        self.errors.iter()
    }

    /// The field errors in this list, skipping any other kind of error
    pub fn field_errors(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter().filter_map(|e| e.downcast_ref::<FieldError>())
    }

    /// Paths of every field error
    pub fn fields(&self) -> Vec<String> {
        self.field_errors().map(|e| e.path.clone()).collect()
    }

    /// Messages of every field error
    pub fn messages(&self) -> Vec<String> {
        self.field_errors().map(|e| e.message.clone()).collect()
    }

    /// Recursively expand any nested `ErrorList` elements in place of themselves
    pub fn flatten(&self) -> ErrorList {
        let mut flat = ErrorList::new();
        for error in &self.errors {
            match error.downcast_ref::<ErrorList>() {
                Some(nested) => flat.errors.extend(nested.flatten().errors),
                None => flat.errors.push(error.clone()),
            }
        }
        flat
    }

    /// `Ok(())` for an empty list, otherwise the list itself as the error
    pub fn into_result(self) -> std::result::Result<(), ErrorList> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} field errors", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  - {}", error)?;
        }
        Ok(())
    }
}

impl StdError for ErrorList {}

impl Extend<SharedError> for ErrorList {
    fn extend<I: IntoIterator<Item = SharedError>>(&mut self, iter: I) {
        for error in iter {
            self.push_shared(error);
        }
    }
}

impl Extend<FieldError> for ErrorList {
    fn extend<I: IntoIterator<Item = FieldError>>(&mut self, iter: I) {
        self.errors
            .extend(iter.into_iter().map(|e| Arc::new(e) as SharedError));
    }
}

impl FromIterator<SharedError> for ErrorList {
    fn from_iter<I: IntoIterator<Item = SharedError>>(iter: I) -> Self {
        let mut list = ErrorList::new();
        list.extend(iter);
        list
    }
}

impl FromIterator<FieldError> for ErrorList {
    fn from_iter<I: IntoIterator<Item = FieldError>>(iter: I) -> Self {
        let mut list = ErrorList::new();
        list.extend(iter);
        list
    }
}

impl IntoIterator for ErrorList {
    type Item = SharedError;
    type IntoIter = std::vec::IntoIter<SharedError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a SharedError;
    type IntoIter = std::slice::Iter<'a, SharedError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

/// Serialized form of an element that is not a [`FieldError`]
struct OpaqueError<'a>(&'a SharedError);

impl Serialize for OpaqueError<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0.downcast_ref::<FieldError>() {
            Some(field) => field.serialize(serializer),
            None => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("message", &self.0.to_string())?;
                map.end()
            }
        }
    }
}

impl Serialize for ErrorList {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let noun = if self.errors.len() == 1 {
            "error"
        } else {
            "errors"
        };
        let fields: Vec<OpaqueError<'_>> = self.errors.iter().map(OpaqueError).collect();
        let mut state = serializer.serialize_struct("ErrorList", 2)?;
        state.serialize_field("error", &format!("{} field {}", self.errors.len(), noun))?;
        state.serialize_field("fields", &fields)?;
        state.end()
    }
}

/// Schema or deployment mistakes discovered while validating
///
/// These are never folded into an [`ErrorList`]: they indicate that the
/// annotations or settings are wrong, not that a particular value is invalid.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A constraint expression does not compile
    #[error("could not compile expression `{source_text}`: {message}")]
    Compile {
        source_text: String,
        message: String,
    },

    /// A constraint expression compiled but failed while executing
    #[error("could not evaluate expression `{source_text}` at {path}: {message}")]
    Evaluate {
        path: String,
        source_text: String,
        message: String,
    },

    /// An annotated field could not be read from its record
    #[error("cannot read field `{field}` of {type_name} at {path}")]
    UnreadableField {
        type_name: &'static str,
        field: &'static str,
        path: String,
    },

    /// Strict mode met a value shape the engine does not traverse
    #[error("unsupported value of type {type_name} at {path}")]
    UnsupportedShape { type_name: &'static str, path: String },

    /// Cache settings could not be loaded
    #[error("invalid cache settings: {source}")]
    Settings {
        #[source]
        source: Box<figment::Error>,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::Settings {
            source: Box::new(error),
        }
    }
}
