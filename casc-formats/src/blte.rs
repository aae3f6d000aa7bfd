//! Contract with the external BLTE decoder.
//!
//! Every blob served from `data/` is BLTE-framed (block-indexed
//! compression with per-block hashes). Decoding is a separate concern;
//! the pipeline only carries the frame around, tagged with the encoding
//! key the decoder needs to verify block hashes.

use crate::keys::EncodingKey;
use crate::Result;

/// Magic bytes opening every BLTE frame.
pub const BLTE_MAGIC: [u8; 4] = *b"BLTE";

/// An undecoded BLTE-framed blob.
///
/// `data` is byte-identical to what the CDN served; hashing it yields
/// `ekey`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlteBlob {
    /// Encoding key of the framed bytes.
    pub ekey: EncodingKey,
    /// The raw frame, headers included.
    pub data: Vec<u8>,
}

impl BlteBlob {
    pub fn new(ekey: EncodingKey, data: Vec<u8>) -> Self {
        Self { ekey, data }
    }

    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` for an empty frame (never valid, but representable).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Cheap sanity check on the frame magic.
    pub fn looks_framed(&self) -> bool {
        self.data.get(..4) == Some(&BLTE_MAGIC)
    }
}

/// External BLTE decoder.
///
/// The pipeline uses this to decode the encoding and root tables before
/// parsing them; file payloads are handed to callers still framed.
pub trait BlteDecoder: Send + Sync {
    /// Decode a frame to its plain contents.
    fn decode(&self, blob: &BlteBlob) -> Result<Vec<u8>>;
}
