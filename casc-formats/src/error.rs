use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File has incorrect magic - possibly wrong file format")]
    BadMagic,

    #[error("Malformed key string: {0:?}")]
    MalformedKey(String),

    #[error("Config parser syntax error")]
    ConfigSyntax,

    #[error("Config parser parameter type mismatch")]
    ConfigTypeMismatch,

    #[error("Archive index entry count {count} does not fit in {size} bytes")]
    IndexCountOutOfRange { count: u32, size: u64 },

    #[error("Archive index entry has invalid bounds (offset {offset}, size {size})")]
    IndexEntryBounds { offset: u32, size: u32 },

    #[error("Unsupported key width: {0} bytes")]
    UnsupportedKeyWidth(u8),

    #[error("File ID delta over- or under-flows")]
    FileIdDeltaOverflow,

    #[error("BLTE decode failed: {0}")]
    BlteDecode(String),
}
