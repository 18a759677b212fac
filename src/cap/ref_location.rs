use anyhow::Result;
use bytes::Bytes;
use serde_json::json;

use crate::record::Record;
use crate::support::bytes_ext::SafeBuf;

/// RefLocation component (tag 9): two delta-encoded lists of offsets into
/// Method's info, one for 1-byte constant pool index operands
/// (getfield_T/putfield_T) and one for 2-byte indices.
#[derive(Debug, Clone)]
pub struct RefLocation {
    pub tag: u8,
    pub size: u32,
    pub size_width: usize,
    pub blocks: Vec<RefLocationBlock>,
    /// True when the component used the extended (block-counted) layout.
    pub extended_layout: bool,
}

#[derive(Debug, Clone)]
pub struct RefLocationBlock {
    pub byte_index_deltas: Vec<u8>,
    pub byte2_index_deltas: Vec<u8>,
}

impl RefLocationBlock {
    fn parse(buf: &mut Bytes) -> Result<Self> {
        let byte_index_count = buf.try_get_u16()?;
        let byte_index_deltas = buf.try_take(byte_index_count as usize)?;
        let byte2_index_count = buf.try_get_u16()?;
        let byte2_index_deltas = buf.try_take(byte2_index_count as usize)?;

        Ok(Self {
            byte_index_deltas,
            byte2_index_deltas,
        })
    }

    fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert(
            "byte_index_count-u2".into(),
            json!(self.byte_index_deltas.len()),
        );
        rec.insert(
            "offsets_to_byte_indices-u1l".into(),
            json!(self.byte_index_deltas),
        );
        rec.insert(
            "byte2_index_count-u2".into(),
            json!(self.byte2_index_deltas.len()),
        );
        rec.insert(
            "offsets_to_byte2_indices-u1l".into(),
            json!(self.byte2_index_deltas),
        );
        rec.insert(
            "_absolute_byte_offsets".into(),
            json!(absolute_offsets(&self.byte_index_deltas)),
        );
        rec.insert(
            "_absolute_byte2_offsets".into(),
            json!(absolute_offsets(&self.byte2_index_deltas)),
        );
        rec
    }
}

/// Rebuilds absolute Method-info offsets from the stored forward deltas.
/// A delta of 0xFF adds 255 without marking a site; the next smaller delta
/// completes the jump.
pub fn absolute_offsets(deltas: &[u8]) -> Vec<u32> {
    let mut sites = Vec::new();
    let mut cursor: u32 = 0;
    let mut jump: u32 = 0;

    for &delta in deltas {
        jump += u32::from(delta);
        if delta != 0xff {
            cursor += jump;
            sites.push(cursor);
            jump = 0;
        }
    }

    sites
}

impl RefLocation {
    pub fn parse(blob: &[u8], long_size_form: bool) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(blob);

        let tag = buf.try_get_u8()?;

        if long_size_form {
            let size = buf.try_get_u32()?;
            let block_count = buf.try_get_u8()?;
            let blocks = (0..block_count)
                .map(|_| RefLocationBlock::parse(&mut buf))
                .collect::<Result<Vec<_>>>()?;

            Ok(Self {
                tag,
                size,
                size_width: 4,
                blocks,
                extended_layout: true,
            })
        } else {
            let size = buf.try_get_u16()?;
            let block = RefLocationBlock::parse(&mut buf)?;

            Ok(Self {
                tag,
                size: u32::from(size),
                size_width: 2,
                blocks: vec![block],
                extended_layout: false,
            })
        }
    }

    pub fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert("tag-u1".into(), json!(self.tag));
        rec.insert(format!("size-u{}", self.size_width), json!(self.size));

        if self.extended_layout {
            rec.insert(
                "reference_location_component_block_count-u1".into(),
                json!(self.blocks.len()),
            );
            rec.insert(
                "blocks".into(),
                json!(self
                    .blocks
                    .iter()
                    .map(|b| b.to_record())
                    .collect::<Vec<_>>()),
            );
        } else if let Some(block) = self.blocks.first() {
            for (key, value) in block.to_record() {
                rec.insert(key, value);
            }
        }

        rec
    }
}
