use anyhow::Result;
use bytes::Bytes;
use serde_json::json;

use crate::error::Warning;
use crate::record::Record;
use crate::support::bytes_ext::SafeBuf;
use crate::support::hex;

/// StaticField component (tag 8): everything needed to build the static
/// field image, laid out as {array-init refs, null refs, default
/// primitives, non-default primitives}.
#[derive(Debug, Clone)]
pub struct StaticField {
    pub tag: u8,
    pub size: u16,
    pub image_size: u16,
    pub reference_count: u16,
    pub array_init: Vec<ArrayInitInfo>,
    pub default_value_count: u16,
    pub non_default_values: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ArrayInitInfo {
    pub element_type: u8,
    pub count: u16,
    pub values: Vec<u8>,
}

impl ArrayInitInfo {
    fn type_label(&self) -> String {
        match self.element_type {
            2 => "2 (Boolean)".into(),
            3 => "3 (Byte)".into(),
            4 => "4 (Short)".into(),
            5 => "5 (Int)".into(),
            other => format!("{other} (Unknown Type)"),
        }
    }

    fn element_width(&self) -> usize {
        match self.element_type {
            2 | 3 => 1,
            4 => 2,
            5 => 4,
            _ => 1,
        }
    }

    /// `count` is a byte count; elements are rendered in type-width chunks,
    /// keeping any short trailing chunk.
    fn element_values(&self) -> Vec<String> {
        self.values
            .chunks(self.element_width())
            .map(hex::encode)
            .collect()
    }
}

impl StaticField {
    pub fn parse(blob: &[u8], warnings: &mut Vec<Warning>) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(blob);

        let tag = buf.try_get_u8()?;
        let size = buf.try_get_u16()?;

        let image_size = buf.try_get_u16()?;
        let reference_count = buf.try_get_u16()?;
        let array_init_count = buf.try_get_u16()?;

        let array_init = (0..array_init_count)
            .map(|_| {
                let element_type = buf.try_get_u8()?;
                let count = buf.try_get_u16()?;
                let values = buf.try_take(count as usize)?;
                Ok(ArrayInitInfo {
                    element_type,
                    count,
                    values,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let default_value_count = buf.try_get_u16()?;
        let non_default_value_count = buf.try_get_u16()?;
        let non_default_values = buf.try_take(non_default_value_count as usize)?;

        let expected = u32::from(reference_count) * 2
            + u32::from(default_value_count)
            + u32::from(non_default_value_count);
        if u32::from(image_size) != expected {
            warnings.push(Warning::InvariantViolation(format!(
                "static field image_size {image_size} != 2*{reference_count} + \
                 {default_value_count} + {non_default_value_count}"
            )));
        }

        Ok(Self {
            tag,
            size,
            image_size,
            reference_count,
            array_init,
            default_value_count,
            non_default_values,
        })
    }

    pub fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert("tag-u1".into(), json!(self.tag));
        rec.insert("size-u2".into(), json!(self.size));
        rec.insert("image_size-u2".into(), json!(self.image_size));
        rec.insert("reference_count-u2".into(), json!(self.reference_count));
        rec.insert("array_init_count-u2".into(), json!(self.array_init.len()));
        rec.insert(
            "array_init".into(),
            json!(self
                .array_init
                .iter()
                .map(|init| {
                    json!({
                        "type-u1": init.type_label(),
                        "count-u2": init.count,
                        "values": init.element_values(),
                    })
                })
                .collect::<Vec<_>>()),
        );
        rec.insert(
            "default_value_count-u2".into(),
            json!(self.default_value_count),
        );
        rec.insert(
            "non_default_value_count-u2".into(),
            json!(self.non_default_values.len()),
        );
        rec.insert(
            "non_default_values".into(),
            json!(hex::encode(&self.non_default_values)),
        );
        rec
    }
}
