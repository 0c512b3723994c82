//! Type introspection for validated values
//!
//! Rust has no runtime reflection, so every value the engine visits describes
//! itself through [`Inspect`]: its [`Shape`], its conversion into the
//! expression language, and the custom [`Hook`] it offers. Records add a static
//! field table through [`Record`]. `#[derive(Inspect)]` writes both for
//! named-field structs; the impls below cover the standard library.

use crate::hook::Hook;
use cel_interpreter::objects::Key;
use cel_interpreter::Value;
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

/// What kind of value the engine is looking at
pub enum Shape<'a> {
    /// An unset optional; always valid
    Absent,
    /// A wrapper around another value, validated at the same path
    Reference(&'a dyn Inspect),
    /// A record with annotated fields
    Record(&'a dyn Record),
    /// An ordered sequence, validated element by element
    Sequence(Vec<&'a dyn Inspect>),
    /// A scalar; constrained only through its owning field's expression
    Leaf,
    /// Anything the engine does not traverse
    Unsupported(&'static str),
}

/// A value the validation engine can visit
pub trait Inspect {
    fn shape(&self) -> Shape<'_>;

    /// This value in the expression language
    fn to_value(&self) -> Value;

    /// Custom validation hook offered by this value
    fn hook(&self) -> Hook<'_> {
        Hook::None
    }
}

/// Identity of a record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordType {
    pub id: TypeId,
    pub name: &'static str,
}

impl RecordType {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

/// Static description of one declared field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Identifier as declared
    pub ident: &'static str,
    /// Raw annotation string, see [`Annotations`](crate::Annotations)
    pub annotations: &'static str,
    /// Members of this field are treated as members of the enclosing record
    pub embedded: bool,
}

/// A record: a value with a fixed table of named fields
pub trait Record: Inspect {
    fn record_type(&self) -> RecordType;

    /// Declared fields, in declaration order
    fn fields(&self) -> &'static [FieldInfo];

    /// Value of the field at `index` in [`Record::fields`]
    fn field(&self, index: usize) -> Option<&dyn Inspect>;
}

/// Build a map value from string keys
pub fn map_value<I>(entries: I) -> Value
where
    I: IntoIterator<Item = (String, Value)>,
{
    let map: HashMap<Key, Value> = entries
        .into_iter()
        .map(|(k, v)| (Key::String(Arc::new(k)), v))
        .collect();
    Value::Map(map.into())
}

macro_rules! leaf {
    ($($ty:ty => |$v:ident| $conv:expr),* $(,)?) => {
        $(
            impl Inspect for $ty {
                fn shape(&self) -> Shape<'_> {
                    Shape::Leaf
                }

                fn to_value(&self) -> Value {
                    let $v = self;
                    $conv
                }
            }
        )*
    };
}

leaf! {
    bool => |v| Value::Bool(*v),
    i8 => |v| Value::Int(i64::from(*v)),
    i16 => |v| Value::Int(i64::from(*v)),
    i32 => |v| Value::Int(i64::from(*v)),
    i64 => |v| Value::Int(*v),
    isize => |v| Value::Int(*v as i64),
    u8 => |v| Value::Int(i64::from(*v)),
    u16 => |v| Value::Int(i64::from(*v)),
    u32 => |v| Value::Int(i64::from(*v)),
    u64 => |v| i64::try_from(*v).map(Value::Int).unwrap_or(Value::UInt(*v)),
    usize => |v| i64::try_from(*v).map(Value::Int).unwrap_or(Value::UInt(*v as u64)),
    f32 => |v| Value::Float(f64::from(*v)),
    f64 => |v| Value::Float(*v),
    char => |v| Value::String(Arc::new(v.to_string())),
    String => |v| Value::String(Arc::new(v.clone())),
    chrono::DateTime<chrono::Utc> => |v| Value::Timestamp(v.fixed_offset()),
    chrono::DateTime<chrono::FixedOffset> => |v| Value::Timestamp(*v),
    chrono::NaiveDate => |v| Value::Timestamp(
        v.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc().fixed_offset()
    ),
}

impl Inspect for () {
    fn shape(&self) -> Shape<'_> {
        Shape::Absent
    }

    fn to_value(&self) -> Value {
        Value::Null
    }
}

impl<T: Inspect> Inspect for Option<T> {
    fn shape(&self) -> Shape<'_> {
        match self {
            Some(value) => Shape::Reference(value),
            None => Shape::Absent,
        }
    }

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, Inspect::to_value)
    }
}

macro_rules! reference {
    ($($wrapper:ident),*) => {
        $(
            impl<T: Inspect> Inspect for $wrapper<T> {
                fn shape(&self) -> Shape<'_> {
                    Shape::Reference(&**self)
                }

                fn to_value(&self) -> Value {
                    (**self).to_value()
                }
            }
        )*
    };
}

reference!(Box, Arc);

impl<T: Inspect> Inspect for &T {
    fn shape(&self) -> Shape<'_> {
        Shape::Reference(*self)
    }

    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

fn list_value<'a, T: Inspect + 'a>(items: impl Iterator<Item = &'a T>) -> Value {
    Value::List(items.map(Inspect::to_value).collect::<Vec<_>>().into())
}

impl<T: Inspect> Inspect for Vec<T> {
    fn shape(&self) -> Shape<'_> {
        Shape::Sequence(self.iter().map(|v| v as &dyn Inspect).collect())
    }

    fn to_value(&self) -> Value {
        list_value(self.iter())
    }
}

impl<T: Inspect, const N: usize> Inspect for [T; N] {
    fn shape(&self) -> Shape<'_> {
        Shape::Sequence(self.iter().map(|v| v as &dyn Inspect).collect())
    }

    fn to_value(&self) -> Value {
        list_value(self.iter())
    }
}

impl<T: Inspect> Inspect for VecDeque<T> {
    fn shape(&self) -> Shape<'_> {
        Shape::Sequence(self.iter().map(|v| v as &dyn Inspect).collect())
    }

    fn to_value(&self) -> Value {
        list_value(self.iter())
    }
}

// Maps are visible to expressions (`len(self)`, `self.key`) but are not
// traversed by the engine.
impl<V: Inspect> Inspect for HashMap<String, V> {
    fn shape(&self) -> Shape<'_> {
        Shape::Unsupported(std::any::type_name::<Self>())
    }

    fn to_value(&self) -> Value {
        map_value(self.iter().map(|(k, v)| (k.clone(), v.to_value())))
    }
}

impl<V: Inspect> Inspect for BTreeMap<String, V> {
    fn shape(&self) -> Shape<'_> {
        Shape::Unsupported(std::any::type_name::<Self>())
    }

    fn to_value(&self) -> Value {
        map_value(self.iter().map(|(k, v)| (k.clone(), v.to_value())))
    }
}
