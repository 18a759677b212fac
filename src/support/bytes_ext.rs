use anyhow::{bail, Result};
use bytes::Bytes;

/// Bounds-checked big-endian reads over a [`Bytes`] cursor.
///
/// The plain `bytes::Buf` getters panic when the buffer runs dry. A
/// truncated CAP component has to surface as an error the caller can wrap
/// with the component name, so every field read in the codec goes through
/// these fallible variants instead.
pub trait SafeBuf {
    /// Consumes exactly `count` bytes, or reports how short the buffer is.
    fn try_take(&mut self, count: usize) -> Result<Vec<u8>>;

    fn try_get_u8(&mut self) -> Result<u8>;
    fn try_get_u16(&mut self) -> Result<u16>;
    fn try_get_u32(&mut self) -> Result<u32>;
}

macro_rules! be_readers {
    ( $( $name:ident => $int:ty ),* $(,)? ) => {
        $(
        fn $name(&mut self) -> Result<$int> {
            const WIDTH: usize = std::mem::size_of::<$int>();
            let taken = self.try_take(WIDTH)?;
            let mut be = [0u8; WIDTH];
            be.copy_from_slice(&taken);
            Ok(<$int>::from_be_bytes(be))
        }
        )*
    };
}

impl SafeBuf for Bytes {
    fn try_take(&mut self, count: usize) -> Result<Vec<u8>> {
        if count > self.len() {
            bail!("needed {count} bytes, {} remain", self.len());
        }
        Ok(self.split_to(count).to_vec())
    }

    be_readers! {
        try_get_u8 => u8,
        try_get_u16 => u16,
        try_get_u32 => u32,
    }
}
