use anyhow::Result;
use bytes::Bytes;
use serde_json::json;

use crate::record::Record;
use crate::support::bytes_ext::SafeBuf;
use crate::support::hex;

/// Custom components (tags 128-255) and the off-card Debug component (tag
/// 12) share a treatment: tag and size are lifted out, the rest stays an
/// opaque info blob.
#[derive(Debug, Clone)]
pub struct OpaqueComponent {
    pub tag: u8,
    pub size: u32,
    pub size_width: usize,
    pub info: Vec<u8>,
}

impl OpaqueComponent {
    pub fn parse(blob: &[u8], long_size_form: bool) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(blob);

        let tag = buf.try_get_u8()?;
        let (size, size_width) = if long_size_form {
            (buf.try_get_u32()?, 4)
        } else {
            (u32::from(buf.try_get_u16()?), 2)
        };
        let info = buf.try_take(buf.len())?;

        Ok(Self {
            tag,
            size,
            size_width,
            info,
        })
    }

    pub fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert("tag-u1".into(), json!(self.tag));
        rec.insert(format!("size-u{}", self.size_width), json!(self.size));
        rec.insert("info".into(), json!(hex::encode(&self.info)));
        rec
    }
}
