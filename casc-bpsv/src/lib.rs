//! # casc-bpsv
//!
//! Parser for BPSV (Blizzard Pipe-Separated Values), the record format the
//! patch hosts serve for the `versions` and `cdns` tables.
//!
//! A document is a typed header line, an optional `## seqn` comment, and
//! pipe-separated data rows:
//!
//! ```text
//! Region!STRING:0|BuildConfig!HEX:16|BuildId!DEC:4
//! ## seqn = 12345
//! us|e0ba45eb1af1166c6bd9ab2d3a9143b3|61491
//! eu|e0ba45eb1af1166c6bd9ab2d3a9143b3|61491
//! ```
//!
//! ## Parsing
//!
//! ```rust
//! use casc_bpsv::BpsvDocument;
//!
//! let data = "Region!STRING:0|BuildId!DEC:4\n## seqn = 12345\nus|1234\neu|5678";
//!
//! let doc = BpsvDocument::parse(data)?;
//! assert_eq!(doc.sequence_number(), Some(12345));
//! assert_eq!(doc.rows().len(), 2);
//! # Ok::<(), casc_bpsv::Error>(())
//! ```

mod document;
mod error;
mod field_type;
mod schema;

pub use document::{BpsvDocument, BpsvRow};
pub use error::{Error, Result};
pub use field_type::BpsvFieldType;
pub use schema::{BpsvField, BpsvSchema};
