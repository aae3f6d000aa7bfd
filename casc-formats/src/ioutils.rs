//! Internal integer-reading helpers

use std::io::{Error, Read};

/// Extension trait for reading the integer widths the CASC formats use.
pub trait ReadInt {
    /// Error type returned on read failures.
    type Error;

    /// Read a `u8`.
    fn read_u8(&mut self) -> Result<u8, Self::Error>;

    /// Read a little-endian `i32`.
    fn read_i32le(&mut self) -> Result<i32, Self::Error>;

    /// Read a little-endian `u32`.
    fn read_u32le(&mut self) -> Result<u32, Self::Error>;

    /// Read a little-endian `u64`.
    fn read_u64le(&mut self) -> Result<u64, Self::Error>;

    /// Read a big-endian `u32`.
    fn read_u32be(&mut self) -> Result<u32, Self::Error>;
}

macro_rules! impl_read_int {
    ($name:ident, $ty:ty, $from:ident) => {
        fn $name(&mut self) -> Result<$ty, Self::Error> {
            let mut b = [0; size_of::<$ty>()];
            self.read_exact(&mut b)?;
            Ok(<$ty>::$from(b))
        }
    };
}

impl<T: Read> ReadInt for T {
    type Error = Error;

    impl_read_int!(read_u8, u8, from_le_bytes);
    impl_read_int!(read_i32le, i32, from_le_bytes);
    impl_read_int!(read_u32le, u32, from_le_bytes);
    impl_read_int!(read_u64le, u64, from_le_bytes);
    impl_read_int!(read_u32be, u32, from_be_bytes);
}
