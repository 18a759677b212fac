use anyhow::Result;
use bytes::Bytes;
use serde_json::json;

use crate::cap::shared::PackageInfo;
use crate::record::Record;
use crate::support::bytes_ext::SafeBuf;

/// Import component (tag 4). The index of a package in this table is the
/// package token other components use to reference it.
#[derive(Debug, Clone)]
pub struct Import {
    pub tag: u8,
    pub size: u16,
    pub packages: Vec<PackageInfo>,
}

impl Import {
    pub fn parse(blob: &[u8]) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(blob);

        let tag = buf.try_get_u8()?;
        let size = buf.try_get_u16()?;
        let count = buf.try_get_u8()?;

        let packages = (0..count)
            .map(|_| PackageInfo::parse(&mut buf))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            tag,
            size,
            packages,
        })
    }

    pub fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert("tag-u1".into(), json!(self.tag));
        rec.insert("size-u2".into(), json!(self.size));
        rec.insert("count-u1".into(), json!(self.packages.len()));
        rec.insert(
            "packages".into(),
            json!(self
                .packages
                .iter()
                .map(|p| p.to_record())
                .collect::<Vec<_>>()),
        );
        rec
    }
}
