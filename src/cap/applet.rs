use anyhow::Result;
use bytes::Bytes;
use serde_json::json;

use crate::cap::shared::parse_aid;
use crate::error::Warning;
use crate::record::Record;
use crate::support::bytes_ext::SafeBuf;
use crate::support::hex;

/// Applet component (tag 3), present iff Header declares ACC_APPLET.
#[derive(Debug, Clone)]
pub struct Applet {
    pub tag: u8,
    pub size: u16,
    pub applets: Vec<AppletEntry>,
}

#[derive(Debug, Clone)]
pub struct AppletEntry {
    pub aid: Vec<u8>,
    /// Extended images address the method block holding the installer.
    pub install_method_component_block_index: Option<u8>,
    pub install_method_offset: u16,
}

impl Applet {
    pub fn parse(blob: &[u8], extended: bool, warnings: &mut Vec<Warning>) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(blob);

        let tag = buf.try_get_u8()?;
        let size = buf.try_get_u16()?;
        let count = buf.try_get_u8()?;

        let mut applets = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let aid = parse_aid(&mut buf)?;
            let install_method_component_block_index = if extended {
                Some(buf.try_get_u8()?)
            } else {
                None
            };
            let install_method_offset = buf.try_get_u16()?;
            applets.push(AppletEntry {
                aid,
                install_method_component_block_index,
                install_method_offset,
            });
        }

        // all applet AIDs must share one RID (their first five bytes)
        if let Some(first) = applets.first() {
            let rid = &first.aid[..first.aid.len().min(5)];
            if applets.iter().any(|a| !a.aid.starts_with(rid)) {
                warnings.push(Warning::InvariantViolation(
                    "applet AIDs do not share a common RID".into(),
                ));
            }
        }

        Ok(Self { tag, size, applets })
    }

    pub fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert("tag-u1".into(), json!(self.tag));
        rec.insert("size-u2".into(), json!(self.size));
        rec.insert("count-u1".into(), json!(self.applets.len()));

        let applets: Vec<serde_json::Value> = self
            .applets
            .iter()
            .map(|applet| {
                let mut entry = Record::new();
                entry.insert("AID_length-u1".into(), json!(applet.aid.len()));
                entry.insert("AID".into(), json!(hex::encode(&applet.aid)));
                if let Some(block) = applet.install_method_component_block_index {
                    entry.insert("install_method_component_block_index-u1".into(), json!(block));
                }
                entry.insert(
                    "install_method_offset-u2".into(),
                    json!(applet.install_method_offset),
                );
                json!(entry)
            })
            .collect();
        rec.insert("applets".into(), json!(applets));

        rec
    }
}
