//! Traversal cursor and path composition
//!
//! Paths are dotted for record fields (`user.address.city`), bracketed for
//! sequence elements (`items[2]`), and braced for synthetic errors that belong
//! to several fields at once (`range.{start,end}`).

use std::fmt;

/// Position of the value currently being validated
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Context {
    path: String,
}

impl Context {
    /// Cursor rooted at `path`; an empty string is the root
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Cursor for a named member
    pub fn with_field(&self, name: &str) -> Context {
        Context {
            path: key_path(&self.path, name),
        }
    }

    /// Cursor for a sequence element
    pub fn with_index(&self, index: usize) -> Context {
        Context {
            path: format!("{}[{}]", self.path, index),
        }
    }

    /// Cursor naming several members at once, for errors not tied to one field
    pub fn with_field_alternates<S: AsRef<str>>(&self, names: &[S]) -> Context {
        let names: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
        let group = format!("{{{}}}", names.join(","));
        Context {
            path: key_path(&self.path, &group),
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Join a base path and a member name with a dot, omitting it at the root
pub fn key_path(base: &str, field: &str) -> String {
    if base.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", base, field)
    }
}
