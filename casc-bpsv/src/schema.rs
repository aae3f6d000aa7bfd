//! BPSV schema (the typed header line)

use crate::error::{Error, Result};
use crate::field_type::BpsvFieldType;
use std::collections::HashMap;

/// A single column declaration from the header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpsvField {
    /// Field name, case-sensitive as it appears in the header
    pub name: String,
    /// Declared type and length hint
    pub field_type: BpsvFieldType,
    /// Zero-based column index
    pub index: usize,
}

/// The complete column layout of a document.
///
/// Field order is significant; lookups by name go through an index map.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BpsvSchema {
    fields: Vec<BpsvField>,
    by_name: HashMap<String, usize>,
}

impl BpsvSchema {
    /// Parse a header line like `Region!STRING:0|BuildConfig!HEX:16`.
    pub fn parse_header(line: &str) -> Result<Self> {
        let mut schema = Self::default();

        for spec in line.split('|') {
            let Some((name, type_spec)) = spec.split_once('!') else {
                return Err(Error::InvalidHeader {
                    reason: format!("field {spec:?} has no type specification"),
                });
            };

            schema.add_field(name, BpsvFieldType::parse(type_spec)?)?;
        }

        if schema.fields.is_empty() {
            return Err(Error::InvalidHeader {
                reason: "no fields found in header".to_string(),
            });
        }

        Ok(schema)
    }

    fn add_field(&mut self, name: &str, field_type: BpsvFieldType) -> Result<()> {
        if self.by_name.contains_key(name) {
            return Err(Error::DuplicateField {
                field: name.to_string(),
            });
        }

        let index = self.fields.len();
        self.fields.push(BpsvField {
            name: name.to_string(),
            field_type,
            index,
        });
        self.by_name.insert(name.to_string(), index);
        Ok(())
    }

    /// Number of columns.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// `true` if a column with this name exists.
    pub fn has_field(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Look up a column by name.
    pub fn get_field(&self, name: &str) -> Option<&BpsvField> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    /// All columns, in header order.
    pub fn fields(&self) -> &[BpsvField] {
        &self.fields
    }
}
