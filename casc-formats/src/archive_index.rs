//! Archive index (`.index`) parsing.
//!
//! An archive index maps encoding keys to byte ranges within one archive
//! blob. The file is a stream of 4096-byte blocks of 24-byte records
//! (EK[16] + size u32 BE + offset u32 BE); the record count is a u32 LE
//! located 12 bytes before end-of-file, followed by 8 unused bytes.
//!
//! 4096 is not a multiple of 24, so every full block ends with 16 bytes of
//! zero padding. A record slot whose key reads as all zeros is that
//! padding; the real key is the next 16 bytes (the first record of the
//! following block).

use crate::ioutils::ReadInt;
use crate::keys::{ArchiveKey, EncodingKey, KEY_LENGTH};
use crate::{Error, Result};
use std::io::{Read, Seek, SeekFrom};
use tracing::*;

/// Byte length of one index record.
const ENTRY_LENGTH: u64 = 24;

/// Distance of the entry-count field from end-of-file.
const FOOTER_LENGTH: i64 = 12;

/// Location of one encoded file within an archive blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// The archive holding the bytes.
    pub archive: ArchiveKey,
    /// Offset of the first byte within the archive.
    pub offset: u32,
    /// Length of the encoded (still BLTE-framed) bytes.
    pub size: u32,
}

/// Parse one archive index.
///
/// Returns the entries in file order; the caller owns merging them into
/// the global encoding-key map. Entries with a zero size or a range that
/// overflows `u32` are rejected.
pub fn parse_index<R: Read + Seek>(
    f: &mut R,
    archive: ArchiveKey,
) -> Result<Vec<(EncodingKey, ArchiveEntry)>> {
    let total_size = f.seek(SeekFrom::End(0))?;

    f.seek(SeekFrom::End(-FOOTER_LENGTH))?;
    let count = f.read_u32le()?;

    if u64::from(count) * ENTRY_LENGTH > total_size {
        error!("index for {archive} claims {count} entries in {total_size} bytes");
        return Err(Error::IndexCountOutOfRange {
            count,
            size: total_size,
        });
    }

    f.seek(SeekFrom::Start(0))?;
    let mut entries = Vec::with_capacity(count as usize);
    let mut key = [0; KEY_LENGTH];

    for _ in 0..count {
        f.read_exact(&mut key)?;
        if key == [0; KEY_LENGTH] {
            // Block padding; the real key follows.
            f.read_exact(&mut key)?;
        }

        let size = f.read_u32be()?;
        let offset = f.read_u32be()?;

        if size == 0 || offset.checked_add(size).is_none() {
            return Err(Error::IndexEntryBounds { offset, size });
        }

        entries.push((
            EncodingKey::new(key),
            ArchiveEntry {
                archive,
                offset,
                size,
            },
        ));
    }

    trace!("parsed {} entries for archive {archive}", entries.len());
    Ok(entries)
}
