//! The three 16-byte key namespaces of the CASC pipeline.
//!
//! A *content key* hashes the uncompressed logical file, an *encoding key*
//! hashes the BLTE-framed on-wire representation, and an *archive key*
//! names an archive blob concatenating many encoded chunks. The CDN and
//! the on-disk formats render all three identically (lowercase 32-char
//! hex), which makes mixing them up the easiest bug to write in this
//! domain - hence one newtype per namespace.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Length in bytes of every CASC key.
pub const KEY_LENGTH: usize = 16;

macro_rules! casc_key {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; KEY_LENGTH]);

        impl $name {
            /// Wrap a raw 16-byte key.
            pub const fn new(bytes: [u8; KEY_LENGTH]) -> Self {
                Self(bytes)
            }

            /// Copy a key out of a byte slice.
            ///
            /// Returns `None` if the slice is not exactly 16 bytes long.
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                let bytes: [u8; KEY_LENGTH] = bytes.try_into().ok()?;
                Some(Self(bytes))
            }

            /// Parse a 32-character hex rendering.
            pub fn from_hex(s: &str) -> Result<Self> {
                let mut bytes = [0; KEY_LENGTH];
                hex::decode_to_slice(s, &mut bytes)
                    .map_err(|_| Error::MalformedKey(s.to_string()))?;
                Ok(Self(bytes))
            }

            /// The raw key bytes.
            pub const fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
                &self.0
            }

            /// `true` if every byte is zero (used as a padding marker in
            /// archive indexes).
            pub fn is_zero(&self) -> bool {
                self.0 == [0; KEY_LENGTH]
            }

            /// The CDN prefix-tree path fragment for this key:
            /// `49299eae…` becomes `49/29/49299eae…`.
            pub fn prefixed_path(&self) -> String {
                let hex = self.to_string();
                format!("{}/{}/{}", &hex[0..2], &hex[2..4], hex)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::from_hex(s)
            }
        }
    };
}

casc_key! {
    /// Hash of the uncompressed logical file.
    ContentKey
}

casc_key! {
    /// Hash of the BLTE-framed, compressed on-wire representation.
    EncodingKey
}

casc_key! {
    /// Hash naming an archive blob on the CDN.
    ArchiveKey
}
