use crate::config::parser::{parse_list, parse_one, parse_pair, ConfigParser};
use crate::keys::{ContentKey, EncodingKey};
use crate::Result;
use std::io::BufRead;
use tracing::*;

/// Build configuration: the per-build table naming the root and encoding
/// tables and the install/download manifests.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BuildConfig {
    /// Content key of the root table.
    pub root: Option<ContentKey>,

    /// Content and encoding key of the encoding table, in that order.
    ///
    /// The field carries exactly two values; any other shape is rejected
    /// at parse time.
    pub encoding: Option<(ContentKey, EncodingKey)>,
    pub encoding_size: Option<(u32, u32)>,

    pub install: Option<Vec<ContentKey>>,
    pub install_size: Option<Vec<u32>>,

    pub download: Option<Vec<ContentKey>>,
    pub download_size: Option<Vec<u32>>,

    pub size: Option<Vec<ContentKey>>,
    pub size_size: Option<Vec<u32>>,

    pub build_name: Option<String>,
    pub build_uid: Option<String>,
    pub build_product: Option<String>,
}

impl BuildConfig {
    /// Parse a build configuration file.
    pub fn parse<T: BufRead>(f: T) -> Result<Self> {
        let mut parser = ConfigParser::new(f);
        let mut o = BuildConfig::default();
        let mut buf = String::with_capacity(4096);

        while let Some((k, v)) = parser.next(&mut buf)? {
            let k = k.to_ascii_lowercase();
            match k.as_str() {
                "root" => {
                    o.root = Some(parse_one(v)?);
                }
                "encoding" => {
                    o.encoding = Some(parse_pair(v)?);
                }
                "encoding-size" => {
                    o.encoding_size = Some(parse_pair(v)?);
                }
                "install" => {
                    o.install = Some(parse_list(v)?);
                }
                "install-size" => {
                    o.install_size = Some(parse_list(v)?);
                }
                "download" => {
                    o.download = Some(parse_list(v)?);
                }
                "download-size" => {
                    o.download_size = Some(parse_list(v)?);
                }
                "size" => {
                    o.size = Some(parse_list(v)?);
                }
                "size-size" => {
                    o.size_size = Some(parse_list(v)?);
                }
                "build-name" => {
                    o.build_name = Some(v.to_string());
                }
                "build-uid" => {
                    o.build_uid = Some(v.to_string());
                }
                "build-product" => {
                    o.build_product = Some(v.to_string());
                }
                _ => {
                    warn!("Unknown build config key: {k:?}");
                }
            }
        }

        Ok(o)
    }
}
