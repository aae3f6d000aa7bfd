//! BPSV document model and parser

use crate::error::{Error, Result};
use crate::schema::BpsvSchema;

/// A single data row.
///
/// Values are kept as raw strings; the typed header only constrains what
/// a valid value looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpsvRow {
    values: Vec<String>,
}

impl BpsvRow {
    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    /// Get a value by column name.
    pub fn get_by_name(&self, name: &str, schema: &BpsvSchema) -> Option<&str> {
        schema.get_field(name).and_then(|f| self.get(f.index))
    }

    /// All values, in column order.
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// A parsed BPSV document: schema, optional sequence number, data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpsvDocument {
    schema: BpsvSchema,
    sequence_number: Option<u32>,
    rows: Vec<BpsvRow>,
}

impl BpsvDocument {
    /// Parse a complete document.
    ///
    /// The first non-comment line must be the typed header. Comment lines
    /// start with `#` at column 0; the `## seqn = N` comment carries the
    /// document's sequence number. Empty lines are skipped. Field values
    /// are trimmed of trailing whitespace only.
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines();

        let header = loop {
            match lines.next() {
                None => return Err(Error::EmptyDocument),
                Some(line) if line.is_empty() => continue,
                Some(line) if line.starts_with('#') => continue,
                Some(line) => break line,
            }
        };

        if !header.contains('!') {
            return Err(Error::MissingHeader);
        }

        let schema = BpsvSchema::parse_header(header)?;
        let mut doc = Self {
            schema,
            sequence_number: None,
            rows: Vec::new(),
        };

        for line in lines {
            if line.is_empty() {
                continue;
            }

            if line.starts_with('#') {
                if line.starts_with("##") && line[2..].trim_start().starts_with("seqn") {
                    doc.sequence_number = Some(parse_sequence_line(line)?);
                }
                continue;
            }

            doc.push_row(line)?;
        }

        Ok(doc)
    }

    fn push_row(&mut self, line: &str) -> Result<()> {
        let values: Vec<String> = line.split('|').map(|v| v.trim_end().to_string()).collect();

        if values.len() != self.schema.field_count() {
            return Err(Error::RowWidth {
                row: self.rows.len(),
                expected: self.schema.field_count(),
                actual: values.len(),
            });
        }

        for (field, value) in self.schema.fields().iter().zip(&values) {
            if !field.field_type.is_valid_value(value) {
                return Err(Error::InvalidValue {
                    field: field.name.clone(),
                    field_type: field.field_type.to_string(),
                    value: value.clone(),
                });
            }
        }

        self.rows.push(BpsvRow { values });
        Ok(())
    }

    /// The column layout.
    pub fn schema(&self) -> &BpsvSchema {
        &self.schema
    }

    /// The `## seqn` value, if the document carried one.
    pub fn sequence_number(&self) -> Option<u32> {
        self.sequence_number
    }

    /// All data rows.
    pub fn rows(&self) -> &[BpsvRow] {
        &self.rows
    }
}

/// Parse a `## seqn = 12345` line, tolerating whitespace variations.
fn parse_sequence_line(line: &str) -> Result<u32> {
    let err = || Error::InvalidSequenceNumber {
        line: line.to_string(),
    };

    let rest = line.strip_prefix("##").ok_or_else(err)?;
    let rest = rest.trim_start().strip_prefix("seqn").ok_or_else(err)?;
    let rest = rest.trim_start().strip_prefix('=').ok_or_else(err)?;
    rest.trim().parse().map_err(|_| err())
}
