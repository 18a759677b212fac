use std::collections::HashSet;

use anyhow::Result;
use bytes::Bytes;
use serde_json::json;

use crate::error::Warning;
use crate::record::Record;
use crate::support::bytes_ext::SafeBuf;
use crate::support::hex;

/// StaticResources component (tag 13, 2.3+, always a `.capx` entry): a
/// directory of resource ids and sizes followed by the concatenated blobs.
/// No other component references it; decoded faithfully, usage unchecked.
#[derive(Debug, Clone)]
pub struct StaticResources {
    pub tag: u8,
    pub size: u32,
    pub resources: Vec<ResourceEntry>,
}

#[derive(Debug, Clone)]
pub struct ResourceEntry {
    pub resource_id: u16,
    pub resource_size: u32,
    pub data: Vec<u8>,
}

impl StaticResources {
    pub fn parse(blob: &[u8], warnings: &mut Vec<Warning>) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(blob);

        let tag = buf.try_get_u8()?;
        let size = buf.try_get_u32()?;
        let resource_count = buf.try_get_u16()?;

        let mut directory = Vec::with_capacity(resource_count as usize);
        for _ in 0..resource_count {
            let resource_id = buf.try_get_u16()?;
            let resource_size = buf.try_get_u32()?;
            if resource_size > 32767 {
                warnings.push(Warning::InvariantViolation(format!(
                    "resource {resource_id} declares {resource_size} bytes, above the 32767 cap"
                )));
            }
            directory.push((resource_id, resource_size));
        }

        let mut seen = HashSet::new();
        for (resource_id, _) in &directory {
            if !seen.insert(*resource_id) {
                warnings.push(Warning::InvariantViolation(format!(
                    "duplicate resource id {resource_id}"
                )));
            }
        }

        let resources = directory
            .into_iter()
            .map(|(resource_id, resource_size)| {
                let data = buf.try_take(resource_size as usize)?;
                Ok(ResourceEntry {
                    resource_id,
                    resource_size,
                    data,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            tag,
            size,
            resources,
        })
    }

    pub fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert("tag-u1".into(), json!(self.tag));
        rec.insert("size-u4".into(), json!(self.size));
        rec.insert("resource_count-u2".into(), json!(self.resources.len()));
        rec.insert(
            "resource_directory-u6l".into(),
            json!(self
                .resources
                .iter()
                .map(|r| {
                    json!({
                        "resource_id-u2": r.resource_id,
                        "resource_size-u4": r.resource_size,
                    })
                })
                .collect::<Vec<_>>()),
        );
        rec.insert(
            "static_resources".into(),
            json!(self
                .resources
                .iter()
                .map(|r| hex::encode(&r.data))
                .collect::<Vec<_>>()),
        );
        rec
    }
}
