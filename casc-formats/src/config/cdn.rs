use crate::config::parser::{parse_list, parse_one, ConfigParser};
use crate::keys::{ArchiveKey, EncodingKey};
use crate::Result;
use std::io::BufRead;
use tracing::*;

/// CDN configuration: the per-build table listing the archive set.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CdnConfig {
    /// Keys of all archives.
    pub archives: Option<Vec<ArchiveKey>>,

    /// Sizes of the corresponding `.index` files, parallel to `archives`.
    pub archives_index_size: Option<Vec<u32>>,

    /// Key of the combined index file.
    pub archive_group: Option<ArchiveKey>,

    /// Keys of patch archives.
    pub patch_archives: Option<Vec<ArchiveKey>>,
    pub patch_archives_index_size: Option<Vec<u32>>,
    pub patch_archive_group: Option<ArchiveKey>,

    /// Index of files served loose (outside any archive).
    pub file_index: Option<EncodingKey>,
    pub file_index_size: Option<u32>,
    pub patch_file_index: Option<EncodingKey>,
    pub patch_file_index_size: Option<u32>,
}

impl CdnConfig {
    /// Parse a CDN configuration file.
    pub fn parse<T: BufRead>(f: T) -> Result<Self> {
        let mut parser = ConfigParser::new(f);
        let mut o = CdnConfig::default();
        let mut buf = String::with_capacity(4096);

        while let Some((k, v)) = parser.next(&mut buf)? {
            let k = k.to_ascii_lowercase();
            match k.as_str() {
                "archives" => {
                    o.archives = Some(parse_list(v)?);
                }
                "archives-index-size" => {
                    o.archives_index_size = Some(parse_list(v)?);
                }
                "archive-group" => {
                    o.archive_group = Some(parse_one(v)?);
                }
                "patch-archives" => {
                    o.patch_archives = Some(parse_list(v)?);
                }
                "patch-archives-index-size" => {
                    o.patch_archives_index_size = Some(parse_list(v)?);
                }
                "patch-archive-group" => {
                    o.patch_archive_group = Some(parse_one(v)?);
                }
                "file-index" => {
                    o.file_index = Some(parse_one(v)?);
                }
                "file-index-size" => {
                    o.file_index_size = Some(parse_one(v)?);
                }
                "patch-file-index" => {
                    o.patch_file_index = Some(parse_one(v)?);
                }
                "patch-file-index-size" => {
                    o.patch_file_index_size = Some(parse_one(v)?);
                }
                _ => {
                    warn!("Unknown CDN config key: {k:?}");
                }
            }
        }

        Ok(o)
    }

    /// Iterate `archives` zipped with `archives_index_size`, if both
    /// fields were provided.
    pub fn archives_with_index_size(&self) -> Option<impl Iterator<Item = (&ArchiveKey, u32)>> {
        match (&self.archives, &self.archives_index_size) {
            (Some(archives), Some(sizes)) => Some(archives.iter().zip(sizes.iter().copied())),
            _ => None,
        }
    }
}
