//! Per-type validation descriptors
//!
//! A [`ValidatedType`] is the part of a record's field table that takes part
//! in validation under one [`Config`], with annotations already resolved. It
//! is built once per (type, configuration) and cached.

use crate::annotations::{field_name, Annotations};
use crate::config::Config;
use crate::inspect::{FieldInfo, Record, RecordType};
use tracing::debug;

/// Annotation value that excludes a field, or suppresses its message
pub const EXCLUDE: &str = "-";

/// Constraint source that validates the field value recursively
pub const RECURSE: &str = "check";

/// One field that participates in validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedField {
    /// Display name, used as the path segment; empty for embedded fields
    /// without a name annotation
    pub name: String,
    /// Custom error message, empty when none is declared
    pub message: String,
    /// Errors computed for this field are left out of the output
    pub no_err: bool,
    /// Constraint expression source, or [`RECURSE`]
    pub source: String,
    /// Index into the record's field table
    pub index: usize,
    pub embedded: bool,
    /// Raw annotation string the descriptor was built from
    pub annotations: &'static str,
}

impl ValidatedField {
    /// The field is validated by recursing into its value
    pub fn recurses(&self) -> bool {
        self.source == RECURSE
    }
}

/// The validated fields of one record type, in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedType {
    pub record_type: RecordType,
    pub fields: Vec<ValidatedField>,
}

impl ValidatedType {
    /// Resolve the annotations of `record`'s field table under `config`
    pub fn build(record: &dyn Record, config: &Config) -> Self {
        let record_type = record.record_type();
        let fields: Vec<ValidatedField> = record
            .fields()
            .iter()
            .enumerate()
            .filter_map(|(index, info)| resolve_field(index, info, config))
            .collect();

        debug!(
            "Built descriptor for {} with check tag '{}': {} of {} fields validated",
            record_type.name,
            config.check_tag,
            fields.len(),
            record.fields().len()
        );

        Self {
            record_type,
            fields,
        }
    }
}

fn resolve_field(index: usize, info: &FieldInfo, config: &Config) -> Option<ValidatedField> {
    let annotations = Annotations::new(info.annotations);

    let source = annotations.get(&config.check_tag).trim().to_string();
    if source == EXCLUDE || (source.is_empty() && !info.embedded) {
        return None;
    }

    // Embedded fields don't get an inferred name
    let declared = annotations.get(&config.name_tag);
    let name = match field_name(&declared) {
        Some(name) => name.to_string(),
        None if info.embedded => String::new(),
        None => info.ident.to_string(),
    };

    let message = annotations.get(&config.error_tag).trim().to_string();
    let no_err = message == EXCLUDE;

    Some(ValidatedField {
        name,
        message,
        no_err,
        source,
        index,
        embedded: info.embedded,
        annotations: info.annotations,
    })
}
