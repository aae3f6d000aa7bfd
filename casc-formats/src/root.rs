//! Root table parser (`TSFM` / headerless pre-8.2 format).
//!
//! The root table is the first translation step of every lookup: it maps
//! file data IDs to content keys, qualified by locale and content flags.
//! Name-hash columns are part of the wire format and are consumed, but
//! name resolution belongs to the listfile layer and nothing is kept.

use crate::ioutils::ReadInt;
use crate::keys::{ContentKey, KEY_LENGTH};
use crate::{Error, Result};
use modular_bitfield::prelude::*;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::ops::BitAnd;
use tracing::{debug, trace};

const ROOT_MAGIC: [u8; 4] = *b"TSFM";

/// Value of the leading word that marks the extended (10.1.7+) header.
const EXTENDED_HEADER_SIZE: u32 = 0x18;

/// A record is a fid delta plus a content key; named blocks append an
/// 8-byte name hash per record on top.
const RECORD_FIXED_LEN: usize = 4 + KEY_LENGTH;
const NAME_HASH_LEN: usize = 8;

/// Wire layout of the per-file records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootFormat {
    /// Headerless pre-8.2 file; every record interleaves its content key
    /// with a name hash.
    Legacy,
    /// `TSFM` file; keys and name hashes are stored as separate runs.
    Modern {
        /// Header version. Version 2 packs block flags differently.
        version: u32,
    },
}

/// Root table header.
#[derive(Debug)]
pub struct RootHeader {
    pub format: RootFormat,
    pub total_file_count: u32,
    pub named_file_count: u32,
}

impl RootHeader {
    /// Parse a root table header.
    ///
    /// A file without the `TSFM` magic is a headerless pre-8.2 table; the
    /// reader is rewound so block parsing starts at the first block.
    pub fn parse<R: Read + Seek>(f: &mut R) -> Result<Self> {
        let mut magic = [0; 4];
        f.read_exact(&mut magic)?;
        if magic != ROOT_MAGIC {
            f.seek(SeekFrom::Current(-4))?;
            return Ok(Self {
                format: RootFormat::Legacy,
                total_file_count: 0,
                named_file_count: 0,
            });
        }

        // 10.1.7 introduced an explicit header size and version word;
        // older TSFM files begin directly with the two file counts.
        let first_word = f.read_u32le()?;
        if first_word == EXTENDED_HEADER_SIZE {
            let version = f.read_u32le()?;
            let total_file_count = f.read_u32le()?;
            let named_file_count = f.read_u32le()?;
            f.seek(SeekFrom::Current(4))?; // padding

            Ok(Self {
                format: RootFormat::Modern { version },
                total_file_count,
                named_file_count,
            })
        } else {
            Ok(Self {
                format: RootFormat::Modern { version: 0 },
                total_file_count: first_word,
                named_file_count: f.read_u32le()?,
            })
        }
    }

    /// Whether a block with these content flags carries the name-hash
    /// run. Builds where every file is named ignore the per-block flag.
    fn names_stored(&self, content: ContentFlags) -> bool {
        match self.format {
            RootFormat::Legacy => true,
            RootFormat::Modern { .. } => {
                self.total_file_count == self.named_file_count || !content.no_name_hash()
            }
        }
    }
}

/// Bitmask of locales a block applies to.
#[bitfield(bytes = 4)]
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
#[repr(u32)]
pub struct LocaleFlags {
    #[skip]
    __: B1,
    pub en_us: bool, // 0x2
    #[skip]
    __: B1,
    pub ko_kr: bool, // 0x8

    pub fr_fr: bool, // 0x10
    pub de_de: bool, // 0x20
    pub zh_cn: bool, // 0x40
    pub es_es: bool, // 0x80

    pub zh_tw: bool, // 0x100
    pub en_gb: bool, // 0x200
    pub en_cn: bool, // 0x400
    pub en_tw: bool, // 0x800

    pub es_mx: bool, // 0x1000
    pub ru_ru: bool, // 0x2000
    pub pt_br: bool, // 0x4000
    pub it_it: bool, // 0x8000

    pub pt_pt: bool, // 0x10000
    #[skip]
    __: B15,
}

impl LocaleFlags {
    /// All locale bits set; blocks flagged this way apply everywhere.
    pub fn any_locale() -> Self {
        LocaleFlags::from(0xffff_ffff)
    }

    /// `true` if the flags are the all-locales wildcard.
    pub fn all(&self) -> bool {
        self == &Self::any_locale()
    }

    /// `true` if at least one locale bit is set.
    pub fn any(&self) -> bool {
        u32::from(*self) != 0
    }
}

impl BitAnd for LocaleFlags {
    type Output = LocaleFlags;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self::from(u32::from(self) & u32::from(rhs))
    }
}

/// Content flags on a root block.
#[bitfield(bytes = 4)]
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
#[repr(u32)]
pub struct ContentFlags {
    #[skip]
    __: B2,
    /// File is in the install manifest.
    pub install: bool, // 0x4
    /// Non-Windows clients should ignore this file.
    pub windows: bool, // 0x8

    /// Non-macOS clients should ignore this file.
    pub macos: bool, // 0x10
    #[skip]
    __: B2,
    /// Low violence variant.
    pub low_violence: bool, // 0x80

    #[skip]
    __: B19,
    pub encrypted: bool, // 0x8000000

    pub no_name_hash: bool, // 0x10000000
    #[skip]
    __: B1,
    pub bundle: bool, // 0x40000000
    pub no_compression: bool, // 0x80000000
}

/// Record count and flag words opening one block.
struct BlockHead {
    records: usize,
    content: ContentFlags,
    locale: LocaleFlags,
}

fn read_block_head<R: Read>(f: &mut R, header: &RootHeader) -> Result<BlockHead> {
    let records = f.read_u32le()? as usize;

    // Version 2 widened the flag area: locale comes first, and the
    // content bits are split across two words and a trailing byte.
    let (content, locale) = match header.format {
        RootFormat::Modern { version: 2 } => {
            let locale = LocaleFlags::from(f.read_u32le()?);
            let low = f.read_u32le()?;
            let high = f.read_u32le()?;
            let tail = u32::from(f.read_u8()?);
            (ContentFlags::from(low | high | (tail << 17)), locale)
        }
        _ => {
            let content = ContentFlags::from(f.read_u32le()?);
            (content, LocaleFlags::from(f.read_u32le()?))
        }
    };

    Ok(BlockHead {
        records,
        content,
        locale,
    })
}

/// Locale/content filter: wildcard-locale blocks apply everywhere, and
/// low-violence variants are never wanted.
fn block_selected(head: &BlockHead, only_locale: LocaleFlags) -> bool {
    if head.content.low_violence() {
        return false;
    }
    head.locale.all() || (head.locale & only_locale).any()
}

/// Seek past the records of an unwanted block.
fn skip_records<R: Read + Seek>(f: &mut R, records: usize, named: bool) -> Result<()> {
    let per_record = RECORD_FIXED_LEN + if named { NAME_HASH_LEN } else { 0 };
    f.seek(SeekFrom::Current((records * per_record) as i64))?;
    Ok(())
}

/// Decode one file ID from its delta. The first record's delta is the
/// absolute ID; each later delta is relative to the successor of the
/// previous ID.
fn next_file_id(prev: Option<u32>, delta: i32) -> Result<u32> {
    let base = match prev {
        None => 0,
        Some(id) => i64::from(id) + 1,
    };
    u32::try_from(base + i64::from(delta)).map_err(|_| Error::FileIdDeltaOverflow)
}

struct RootRecord {
    ckey: ContentKey,
    /// `true` if the source block named the configured locale explicitly
    /// rather than via the all-locales wildcard.
    locale_exact: bool,
}

/// Parsed root table: a file-data-ID to content-key map.
pub struct RootFile {
    entries: HashMap<u32, RootRecord>,
}

impl RootFile {
    /// Parse a root table, keeping entries matching `only_locale`.
    ///
    /// Blocks for other locales and low-violence blocks are seeked past.
    /// When a file data ID appears in several matching blocks, a
    /// locale-exact block beats a wildcard one; between equals the later
    /// block wins.
    pub fn parse<R: Read + Seek>(f: &mut R, only_locale: LocaleFlags) -> Result<Self> {
        let header = RootHeader::parse(f)?;
        let mut table = Self {
            entries: HashMap::new(),
        };

        // Blocks run to end-of-file; there is no block count anywhere.
        // Truncation inside a block's records is corruption and errors.
        loop {
            let head = match read_block_head(f, &header) {
                Ok(head) => head,
                Err(Error::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            };

            if head.records == 0 {
                continue;
            }

            let named = header.names_stored(head.content);
            if block_selected(&head, only_locale) {
                trace!("block: {} records, locale {:?}", head.records, head.locale);
                table.read_records(f, &header, &head, named)?;
            } else {
                skip_records(f, head.records, named)?;
            }
        }

        debug!("parsed {} root entries", table.entries.len());
        Ok(table)
    }

    fn read_records<R: Read + Seek>(
        &mut self,
        f: &mut R,
        header: &RootHeader,
        head: &BlockHead,
        named: bool,
    ) -> Result<()> {
        let exact = !head.locale.all();

        // The delta run precedes the records in every format revision.
        let mut deltas = Vec::with_capacity(head.records);
        for _ in 0..head.records {
            deltas.push(f.read_i32le()?);
        }

        let mut key = [0; KEY_LENGTH];
        let mut prev = None;

        match header.format {
            RootFormat::Legacy => {
                for delta in deltas {
                    let fid = next_file_id(prev, delta)?;
                    prev = Some(fid);

                    f.read_exact(&mut key)?;
                    f.read_u64le()?; // interleaved name hash
                    self.insert(fid, ContentKey::new(key), exact);
                }
            }
            RootFormat::Modern { .. } => {
                for delta in deltas {
                    let fid = next_file_id(prev, delta)?;
                    prev = Some(fid);

                    f.read_exact(&mut key)?;
                    self.insert(fid, ContentKey::new(key), exact);
                }

                if named {
                    f.seek(SeekFrom::Current((head.records * NAME_HASH_LEN) as i64))?;
                }
            }
        }

        Ok(())
    }

    fn insert(&mut self, file_id: u32, ckey: ContentKey, locale_exact: bool) {
        match self.entries.entry(file_id) {
            Entry::Occupied(mut e) => {
                let existing = e.get_mut();
                // An exact-locale entry is never displaced by a wildcard one.
                if locale_exact || !existing.locale_exact {
                    existing.ckey = ckey;
                    existing.locale_exact = locale_exact;
                }
            }
            Entry::Vacant(e) => {
                e.insert(RootRecord { ckey, locale_exact });
            }
        }
    }

    /// Content key for a file data ID.
    pub fn get(&self, file_id: u32) -> Option<&ContentKey> {
        self.entries.get(&file_id).map(|r| &r.ckey)
    }

    /// Number of entries kept after filtering.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no entries were kept.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate all (file data ID, content key) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &ContentKey)> {
        self.entries.iter().map(|(&fid, r)| (fid, &r.ckey))
    }
}
