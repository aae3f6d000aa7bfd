//! # casc-formats
//!
//! The file formats a remote CASC client has to understand: build and CDN
//! configuration files, archive indexes, the encoding table and the root
//! table, plus the key newtypes that keep the three hash namespaces
//! (content, encoding, archive) from being mixed up.
//!
//! The BLTE frame format itself is decoded by an external collaborator;
//! only its contract lives here (see [`blte`]).

pub mod archive_index;
pub mod blte;
pub mod config;
pub mod encoding;
mod error;
mod ioutils;
pub mod keys;
pub mod root;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
