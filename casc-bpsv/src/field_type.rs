//! BPSV field type specifications

use crate::error::{Error, Result};
use std::fmt;

/// A field type with its length hint, as declared in the header line.
///
/// Type names are case-insensitive; the length is advisory for `STRING`
/// (0 meaning unbounded), a byte count for `HEX` (so twice as many hex
/// characters), and a storage width for `DEC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BpsvFieldType {
    /// String field with maximum length (0 = unlimited)
    String(u32),
    /// Hexadecimal field with byte count
    Hex(u32),
    /// Decimal number field with storage size in bytes
    Decimal(u32),
}

impl BpsvFieldType {
    /// Parse a specification like `STRING:0`, `HEX:16` or `DEC:4`.
    ///
    /// ```rust
    /// use casc_bpsv::BpsvFieldType;
    ///
    /// assert_eq!(BpsvFieldType::parse("HEX:16")?, BpsvFieldType::Hex(16));
    /// assert_eq!(BpsvFieldType::parse("dec:4")?, BpsvFieldType::Decimal(4));
    /// # Ok::<(), casc_bpsv::Error>(())
    /// ```
    pub fn parse(spec: &str) -> Result<Self> {
        let err = || Error::InvalidFieldType {
            spec: spec.to_string(),
        };

        let (name, length) = spec.split_once(':').ok_or_else(err)?;
        let length: u32 = length.parse().map_err(|_| err())?;

        match name.to_ascii_uppercase().as_str() {
            "STRING" => Ok(BpsvFieldType::String(length)),
            "HEX" => Ok(BpsvFieldType::Hex(length)),
            "DEC" | "DECIMAL" => Ok(BpsvFieldType::Decimal(length)),
            _ => Err(err()),
        }
    }

    /// Check whether a raw value is acceptable for this field type.
    ///
    /// Empty values are always accepted; the manifests routinely leave
    /// optional columns blank.
    pub fn is_valid_value(&self, value: &str) -> bool {
        if value.is_empty() {
            return true;
        }

        match self {
            BpsvFieldType::String(max) => *max == 0 || value.len() <= *max as usize,
            BpsvFieldType::Hex(bytes) => {
                if *bytes > 0 && value.len() != (*bytes as usize) * 2 {
                    return false;
                }
                value.chars().all(|c| c.is_ascii_hexdigit())
            }
            BpsvFieldType::Decimal(_) => value.parse::<i64>().is_ok(),
        }
    }
}

impl fmt::Display for BpsvFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BpsvFieldType::String(len) => write!(f, "STRING:{len}"),
            BpsvFieldType::Hex(len) => write!(f, "HEX:{len}"),
            BpsvFieldType::Decimal(len) => write!(f, "DEC:{len}"),
        }
    }
}
