//! Encoding table parser.
//!
//! The encoding table maps content keys to the encoding keys of their
//! on-wire representations. It is the one place the two namespaces meet.
//!
//! The table is page-structured and uses BIG-ENDIAN integers, unlike most
//! other CASC formats. An entry may list several encoding keys for one
//! content key; only the first is kept, which is the one the CDN actually
//! serves. The reverse (EKey) half of the table is not read at all.

use crate::keys::{ContentKey, EncodingKey, KEY_LENGTH};
use crate::{Error, Result};
use byteorder::{BigEndian, ReadBytesExt};
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, trace, warn};

/// Magic bytes: `EN`
const ENCODING_MAGIC: [u8; 2] = *b"EN";

/// Encoding table header.
#[derive(Debug, Clone)]
pub struct EncodingHeader {
    /// Version (1 for every build seen in the wild).
    pub version: u8,
    /// Hash width for content keys.
    pub ckey_hash_size: u8,
    /// Hash width for encoding keys.
    pub ekey_hash_size: u8,
    /// CKey page size in KiB.
    pub ckey_page_size_kb: u16,
    /// EKey page size in KiB.
    pub ekey_page_size_kb: u16,
    /// Number of CKey pages.
    pub ckey_page_count: u32,
    /// Number of EKey pages.
    pub ekey_page_count: u32,
    /// Size of the ESpec string block preceding the page tables.
    pub espec_block_size: u32,
}

/// One resolved entry: the first encoding key and the decoded size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingEntry {
    /// First listed encoding key for the content.
    pub ekey: EncodingKey,
    /// Decoded file size (a 40-bit field on the wire).
    pub size: u64,
}

/// Parsed encoding table: a content-key to encoding-key map.
pub struct EncodingFile {
    /// Table header.
    pub header: EncodingHeader,
    entries: HashMap<ContentKey, EncodingEntry>,
}

impl EncodingFile {
    /// Parse an encoding table from its (already BLTE-decoded) bytes.
    ///
    /// Pages are read one at a time, so peak memory is one page plus the
    /// entry map. Page checksums are verified and logged on mismatch but
    /// do not fail the parse.
    pub fn parse<R: Read>(f: &mut R) -> Result<Self> {
        let header = Self::parse_header(f)?;
        debug!(
            "encoding header: version={}, ckey_pages={}, page_size={}KiB, espec={}B",
            header.version, header.ckey_page_count, header.ckey_page_size_kb,
            header.espec_block_size,
        );

        if header.ckey_hash_size as usize != KEY_LENGTH
            || header.ekey_hash_size as usize != KEY_LENGTH
        {
            return Err(Error::UnsupportedKeyWidth(
                header.ckey_hash_size.min(header.ekey_hash_size),
            ));
        }

        // The ESpec string block sits between the header and the page
        // tables; this client has no use for it.
        skip(f, u64::from(header.espec_block_size))?;

        let page_table = Self::parse_page_table(f, header.ckey_page_count as usize)?;
        trace!("{} CKey page table entries", page_table.len());

        let page_size = usize::from(header.ckey_page_size_kb) * 1024;
        let mut page = vec![0u8; page_size];
        let mut entries = HashMap::new();

        for (i, (first_key, checksum)) in page_table.iter().enumerate() {
            f.read_exact(&mut page)?;

            let digest = Md5::digest(&page);
            if digest.as_slice() != checksum {
                debug!(
                    "CKey page {i} checksum mismatch (expected {}, got {})",
                    hex::encode(checksum),
                    hex::encode(digest),
                );
            }

            Self::parse_ckey_page(&page, first_key, &mut entries)?;
        }

        debug!("parsed {} encoding entries", entries.len());

        // The EKey pages and their table follow, but nothing here needs
        // the reverse mapping, so the remainder of the stream is ignored.
        Ok(Self { header, entries })
    }

    fn parse_header<R: Read>(f: &mut R) -> Result<EncodingHeader> {
        let mut magic = [0u8; 2];
        f.read_exact(&mut magic)?;
        if magic != ENCODING_MAGIC {
            return Err(Error::BadMagic);
        }

        let version = f.read_u8()?;
        if version != 1 {
            warn!("Unexpected encoding table version: {version}");
        }

        let ckey_hash_size = f.read_u8()?;
        let ekey_hash_size = f.read_u8()?;
        let ckey_page_size_kb = f.read_u16::<BigEndian>()?;
        let ekey_page_size_kb = f.read_u16::<BigEndian>()?;
        let ckey_page_count = f.read_u32::<BigEndian>()?;
        let ekey_page_count = f.read_u32::<BigEndian>()?;
        let _unk = f.read_u8()?;
        let espec_block_size = f.read_u32::<BigEndian>()?;

        Ok(EncodingHeader {
            version,
            ckey_hash_size,
            ekey_hash_size,
            ckey_page_size_kb,
            ekey_page_size_kb,
            ckey_page_count,
            ekey_page_count,
            espec_block_size,
        })
    }

    fn parse_page_table<R: Read>(
        f: &mut R,
        page_count: usize,
    ) -> Result<Vec<([u8; KEY_LENGTH], [u8; KEY_LENGTH])>> {
        let mut pages = Vec::with_capacity(page_count);

        for _ in 0..page_count {
            let mut first_key = [0u8; KEY_LENGTH];
            f.read_exact(&mut first_key)?;

            let mut checksum = [0u8; KEY_LENGTH];
            f.read_exact(&mut checksum)?;

            pages.push((first_key, checksum));
        }

        Ok(pages)
    }

    fn parse_ckey_page(
        page: &[u8],
        first_key: &[u8; KEY_LENGTH],
        entries: &mut HashMap<ContentKey, EncodingEntry>,
    ) -> Result<()> {
        let mut pos = 0;
        let mut first_seen = false;

        while pos < page.len() {
            let key_count = page[pos] as usize;
            if key_count == 0 {
                // Zero padding closes the page.
                break;
            }
            pos += 1;

            let need = 5 + KEY_LENGTH + key_count * KEY_LENGTH;
            if pos + need > page.len() {
                break;
            }

            // 40-bit big-endian size field.
            let mut size_bytes = &page[pos..pos + 5];
            let size = size_bytes.read_uint::<BigEndian>(5)?;
            pos += 5;

            let ckey = ContentKey::from_slice(&page[pos..pos + KEY_LENGTH])
                .expect("slice length is KEY_LENGTH");
            pos += KEY_LENGTH;

            let ekey = EncodingKey::from_slice(&page[pos..pos + KEY_LENGTH])
                .expect("slice length is KEY_LENGTH");
            pos += key_count * KEY_LENGTH;

            if !first_seen {
                first_seen = true;
                if ckey.as_bytes() != first_key {
                    debug!("page first-key mismatch for {ckey}");
                }
            }

            entries.insert(ckey, EncodingEntry { ekey, size });
        }

        Ok(())
    }

    /// First encoding key listed for a content key.
    pub fn ekey_for(&self, ckey: &ContentKey) -> Option<&EncodingKey> {
        self.entries.get(ckey).map(|e| &e.ekey)
    }

    /// Decoded size recorded for a content key.
    pub fn size_for(&self, ckey: &ContentKey) -> Option<u64> {
        self.entries.get(ckey).map(|e| e.size)
    }

    /// Full entry for a content key.
    pub fn get(&self, ckey: &ContentKey) -> Option<&EncodingEntry> {
        self.entries.get(ckey)
    }

    /// Number of content keys in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn skip<R: Read>(f: &mut R, len: u64) -> Result<()> {
    let copied = std::io::copy(&mut f.take(len), &mut std::io::sink())?;
    if copied != len {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Build a single-page encoding table.
    ///
    /// `entries` is (ckey, ekeys, size); every listed ekey is written but
    /// the parser is expected to keep only the first.
    fn build_table(entries: &[([u8; 16], Vec<[u8; 16]>, u64)]) -> Vec<u8> {
        const PAGE_SIZE: usize = 1024;

        let mut page = Vec::new();
        for (ckey, ekeys, size) in entries {
            page.push(ekeys.len() as u8);
            page.extend_from_slice(&size.to_be_bytes()[3..]);
            page.extend_from_slice(ckey);
            for ekey in ekeys {
                page.extend_from_slice(ekey);
            }
        }
        page.resize(PAGE_SIZE, 0);

        let mut data = Vec::new();
        data.extend_from_slice(&ENCODING_MAGIC);
        data.push(1); // version
        data.push(16); // ckey hash size
        data.push(16); // ekey hash size
        data.extend_from_slice(&1u16.to_be_bytes()); // ckey page size KiB
        data.extend_from_slice(&1u16.to_be_bytes()); // ekey page size KiB
        data.extend_from_slice(&1u32.to_be_bytes()); // ckey page count
        data.extend_from_slice(&0u32.to_be_bytes()); // ekey page count
        data.push(0); // unk
        data.extend_from_slice(&4u32.to_be_bytes()); // espec block size
        data.extend_from_slice(b"z:{}"); // espec block

        // Page table: first key + md5 of the page.
        data.extend_from_slice(&entries[0].0);
        data.extend_from_slice(Md5::digest(&page).as_slice());

        data.extend_from_slice(&page);
        data
    }

    #[test]
    fn parses_entries_and_keeps_first_ekey() {
        let table = build_table(&[
            ([0x11; 16], vec![[0xaa; 16], [0xbb; 16]], 4096),
            ([0x22; 16], vec![[0xcc; 16]], 123),
        ]);

        let parsed = EncodingFile::parse(&mut Cursor::new(table)).unwrap();
        assert_eq!(parsed.len(), 2);

        let ck = ContentKey::new([0x11; 16]);
        assert_eq!(parsed.ekey_for(&ck), Some(&EncodingKey::new([0xaa; 16])));
        assert_eq!(parsed.size_for(&ck), Some(4096));

        let ck = ContentKey::new([0x22; 16]);
        assert_eq!(parsed.ekey_for(&ck), Some(&EncodingKey::new([0xcc; 16])));
    }

    #[test]
    fn forty_bit_sizes_survive() {
        let size = (1u64 << 39) | 5;
        let table = build_table(&[([0x11; 16], vec![[0xaa; 16]], size)]);

        let parsed = EncodingFile::parse(&mut Cursor::new(table)).unwrap();
        assert_eq!(parsed.size_for(&ContentKey::new([0x11; 16])), Some(size));
    }

    #[test]
    fn missing_key_is_none() {
        let table = build_table(&[([0x11; 16], vec![[0xaa; 16]], 1)]);
        let parsed = EncodingFile::parse(&mut Cursor::new(table)).unwrap();

        assert_eq!(parsed.ekey_for(&ContentKey::new([0x99; 16])), None);
    }

    #[test]
    fn bad_magic_rejected() {
        let result = EncodingFile::parse(&mut Cursor::new(b"XX\x01".to_vec()));
        assert!(matches!(result, Err(Error::BadMagic)));
    }

    #[test]
    fn unsupported_key_width_rejected() {
        let mut table = build_table(&[([0x11; 16], vec![[0xaa; 16]], 1)]);
        table[3] = 9; // ckey hash size
        let result = EncodingFile::parse(&mut Cursor::new(table));
        assert!(matches!(result, Err(Error::UnsupportedKeyWidth(9))));
    }

    #[test]
    fn truncated_page_rejected() {
        let mut table = build_table(&[([0x11; 16], vec![[0xaa; 16]], 1)]);
        table.truncate(table.len() - 100);
        assert!(EncodingFile::parse(&mut Cursor::new(table)).is_err());
    }
}
