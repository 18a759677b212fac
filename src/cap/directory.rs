use anyhow::Result;
use bytes::Bytes;
use serde_json::json;

use crate::cap::shared::parse_aid;
use crate::record::Record;
use crate::support::bytes_ext::SafeBuf;
use crate::support::hex;
use crate::types::{ComponentKind, Version};

/// Directory component (tag 2): the size table for every other component
/// plus static-field image metrics and the custom component directory.
#[derive(Debug, Clone)]
pub struct Directory {
    pub tag: u8,
    pub size: u16,
    /// Sizes in table order. The recorded value is each component's `info`
    /// length; zero marks an absent optional component.
    pub component_sizes: Vec<(ComponentKind, u32)>,
    pub image_size: u16,
    pub array_init_count: u16,
    pub array_init_size: u16,
    pub import_count: u8,
    pub applet_count: u8,
    pub method_component_block_count: Option<u8>,
    pub custom_components: Vec<CustomComponentInfo>,
}

#[derive(Debug, Clone)]
pub struct CustomComponentInfo {
    pub component_tag: u8,
    pub size: u32,
    pub aid: Vec<u8>,
}

impl Directory {
    pub fn parse(blob: &[u8], version: Version, extended: bool) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(blob);

        let tag = buf.try_get_u8()?;
        let size = buf.try_get_u16()?;

        let mut component_sizes = Vec::new();
        let mut read_size = |buf: &mut Bytes, kind: ComponentKind| -> Result<()> {
            let value = match kind.size_width(extended) {
                4 => buf.try_get_u32()?,
                _ => u32::from(buf.try_get_u16()?),
            };
            component_sizes.push((kind, value));
            Ok(())
        };

        read_size(&mut buf, ComponentKind::Header)?;
        read_size(&mut buf, ComponentKind::Directory)?;
        read_size(&mut buf, ComponentKind::Applet)?;
        read_size(&mut buf, ComponentKind::Import)?;
        read_size(&mut buf, ComponentKind::ConstantPool)?;
        read_size(&mut buf, ComponentKind::Class)?;
        read_size(&mut buf, ComponentKind::Method)?;
        read_size(&mut buf, ComponentKind::StaticField)?;
        read_size(&mut buf, ComponentKind::RefLocation)?;
        read_size(&mut buf, ComponentKind::Export)?;
        read_size(&mut buf, ComponentKind::Descriptor)?;
        if version.at_least(Version::V2_2) {
            read_size(&mut buf, ComponentKind::Debug)?;
        }
        if version.at_least(Version::V2_3) {
            read_size(&mut buf, ComponentKind::StaticResources)?;
        }

        let image_size = buf.try_get_u16()?;
        let array_init_count = buf.try_get_u16()?;
        let array_init_size = buf.try_get_u16()?;

        let import_count = buf.try_get_u8()?;
        let applet_count = buf.try_get_u8()?;

        let method_component_block_count = if extended {
            Some(buf.try_get_u8()?)
        } else {
            None
        };

        let custom_count = buf.try_get_u8()?;
        let mut custom_components = Vec::with_capacity(custom_count as usize);
        for _ in 0..custom_count {
            let component_tag = buf.try_get_u8()?;
            let size = if extended {
                buf.try_get_u32()?
            } else {
                u32::from(buf.try_get_u16()?)
            };
            let aid = parse_aid(&mut buf)?;
            custom_components.push(CustomComponentInfo {
                component_tag,
                size,
                aid,
            });
        }

        Ok(Self {
            tag,
            size,
            component_sizes,
            image_size,
            array_init_count,
            array_init_size,
            import_count,
            applet_count,
            method_component_block_count,
            custom_components,
        })
    }

    pub fn recorded_size(&self, kind: ComponentKind) -> Option<u32> {
        self.component_sizes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, size)| *size)
    }

    pub fn to_record(&self, extended: bool) -> Record {
        let mut rec = Record::new();
        rec.insert("tag-u1".into(), json!(self.tag));
        rec.insert("size-u2".into(), json!(self.size));

        let mut sizes = Record::new();
        for (kind, value) in &self.component_sizes {
            let key = format!(
                "{}-u{}",
                size_table_name(*kind),
                kind.size_width(extended)
            );
            sizes.insert(key, json!(value));
        }
        rec.insert("component_sizes".into(), json!(sizes));

        rec.insert(
            "static_field_size-u6".into(),
            json!({
                "image_size-u2": self.image_size,
                "array_init_count-u2": self.array_init_count,
                "array_init_size-u2": self.array_init_size,
            }),
        );

        rec.insert("import_count-u1".into(), json!(self.import_count));
        rec.insert("applet_count-u1".into(), json!(self.applet_count));
        if let Some(blocks) = self.method_component_block_count {
            rec.insert("method_component_block_count-u1".into(), json!(blocks));
        }
        rec.insert(
            "custom_count-u1".into(),
            json!(self.custom_components.len()),
        );

        let customs: Vec<serde_json::Value> = self
            .custom_components
            .iter()
            .map(|custom| {
                let mut entry = Record::new();
                entry.insert("component_tag-u1".into(), json!(custom.component_tag));
                entry.insert(
                    format!("size-u{}", if extended { 4 } else { 2 }),
                    json!(custom.size),
                );
                entry.insert("AID_length-u1".into(), json!(custom.aid.len()));
                entry.insert("AID".into(), json!(hex::encode(&custom.aid)));
                json!(entry)
            })
            .collect();
        rec.insert("custom_components".into(), json!(customs));

        rec
    }
}

fn size_table_name(kind: ComponentKind) -> &'static str {
    match kind {
        ComponentKind::Header => "header",
        ComponentKind::Directory => "directory",
        ComponentKind::Applet => "applet",
        ComponentKind::Import => "import",
        ComponentKind::ConstantPool => "constant_pool",
        ComponentKind::Class => "class",
        ComponentKind::Method => "method",
        ComponentKind::StaticField => "static_field",
        ComponentKind::RefLocation => "reference_location",
        ComponentKind::Export => "export",
        ComponentKind::Descriptor => "descriptor",
        ComponentKind::Debug => "debug",
        ComponentKind::StaticResources => "static_resources",
        ComponentKind::Custom(_) => "custom",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_2_1(applet_size: u16) -> Vec<u8> {
        let mut blob = vec![0x02, 0x00, 0x1f];
        for size in [
            18u16,
            31,
            applet_size,
            9,
            24,
            14,
            30,
            13,
            10,
            0,
            40,
        ] {
            blob.extend_from_slice(&size.to_be_bytes());
        }
        // static field metrics, import/applet counts, custom count
        blob.extend_from_slice(&[0x00, 0x02, 0x00, 0x00, 0x00, 0x00]);
        blob.extend_from_slice(&[0x01, 0x01, 0x00]);
        blob
    }

    #[test]
    fn reads_the_2_1_size_table() {
        let dir = Directory::parse(&sample_2_1(12), Version::V2_1, false).unwrap();
        assert_eq!(dir.recorded_size(ComponentKind::Header), Some(18));
        assert_eq!(dir.recorded_size(ComponentKind::Export), Some(0));
        assert_eq!(dir.recorded_size(ComponentKind::Debug), None);
        assert_eq!(dir.import_count, 1);
        assert_eq!(dir.applet_count, 1);
        assert!(dir.custom_components.is_empty());
    }

    #[test]
    fn record_uses_width_suffixed_size_names() {
        let dir = Directory::parse(&sample_2_1(12), Version::V2_1, false).unwrap();
        let rec = dir.to_record(false);
        let sizes = rec["component_sizes"].as_object().unwrap();
        assert!(sizes.contains_key("method-u2"));
        assert!(sizes.contains_key("reference_location-u2"));
        assert!(!sizes.contains_key("debug-u2"));
    }
}
