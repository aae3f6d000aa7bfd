use crate::{Error, Result};
use std::io::{BufRead, ErrorKind};
use std::str::FromStr;
use tracing::*;

/// Line scanner for TACT-style configuration files.
///
/// ## Format
///
/// ```text
/// # Comment to be ignored
///
/// option-name = value
/// another-option = many words value
/// ```
///
/// Files often carry trailing newlines.
pub struct ConfigParser<T> {
    inner: T,
}

impl<T: BufRead> ConfigParser<T> {
    pub fn new(inner: T) -> Self {
        ConfigParser { inner }
    }

    /// Get the next `key = value` pair, or `None` at EOF.
    ///
    /// The returned slices point into `buf`, which is cleared on every
    /// call. Comments and empty lines are skipped.
    pub fn next<'a>(&mut self, buf: &'a mut String) -> Result<Option<(&'a str, &'a str)>> {
        loop {
            buf.clear();
            match self.inner.read_line(buf) {
                Ok(0) => return Ok(None),
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e.into()),
                Ok(_) => (),
            }

            let line = buf.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((k, v)) = buf.split_once('=') else {
                warn!("Cannot parse configuration line: {line:?}");
                return Err(Error::ConfigSyntax);
            };

            return Ok(Some((k.trim(), v.trim())));
        }
    }
}

/// Parse a single whitespace-free value (a key or an integer).
pub(crate) fn parse_one<V: FromStr>(v: &str) -> Result<V> {
    v.trim().parse().map_err(|_| Error::ConfigTypeMismatch)
}

/// Parse a whitespace-separated list.
pub(crate) fn parse_list<V: FromStr>(v: &str) -> Result<Vec<V>> {
    v.split_ascii_whitespace()
        .map(|e| e.parse().map_err(|_| Error::ConfigTypeMismatch))
        .collect()
}

/// Parse exactly two whitespace-separated values.
///
/// Any other arity is an error; callers that tolerate one value should use
/// [`parse_list`] and inspect the length themselves.
pub(crate) fn parse_pair<A: FromStr, B: FromStr>(v: &str) -> Result<(A, B)> {
    let mut it = v.split_ascii_whitespace();
    let (Some(a), Some(b), None) = (it.next(), it.next(), it.next()) else {
        return Err(Error::ConfigTypeMismatch);
    };

    Ok((
        a.parse().map_err(|_| Error::ConfigTypeMismatch)?,
        b.parse().map_err(|_| Error::ConfigTypeMismatch)?,
    ))
}
