use anyhow::Result;
use bytes::Bytes;
use serde_json::json;
use tracing::warn;

use crate::cap::shared::{ClassRef, StaticRef};
use crate::record::Record;
use crate::support::bytes_ext::SafeBuf;
use crate::support::hex;
use crate::types::Version;

/// ConstantPool component (tag 5): a flat array of 4-byte typed references.
/// Entries never reference each other; offsets and tokens point into other
/// components.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    pub tag: u8,
    pub size: u16,
    pub entries: Vec<CpEntry>,
}

/// Java Card constant types encode the referencing bytecode family as well
/// as the referent, hence three method flavours where class files have one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpEntry {
    Classref { class_ref: ClassRef, padding: u8 },
    InstanceFieldref { class: ClassRef, token: u8 },
    VirtualMethodref { class: ClassRef, token: u8 },
    SuperMethodref { class: ClassRef, token: u8 },
    StaticFieldref { static_ref: StaticRef },
    StaticMethodref { static_ref: StaticRef },
    Unknown { tag: u8, info: [u8; 3] },
}

impl CpEntry {
    fn parse(buf: &mut Bytes) -> Result<Self> {
        let tag = buf.try_get_u8()?;

        Ok(match tag {
            1 => CpEntry::Classref {
                class_ref: ClassRef::parse(buf)?,
                padding: buf.try_get_u8()?,
            },
            2 => CpEntry::InstanceFieldref {
                class: ClassRef::parse(buf)?,
                token: buf.try_get_u8()?,
            },
            3 => CpEntry::VirtualMethodref {
                class: ClassRef::parse(buf)?,
                token: buf.try_get_u8()?,
            },
            4 => CpEntry::SuperMethodref {
                class: ClassRef::parse(buf)?,
                token: buf.try_get_u8()?,
            },
            5 => CpEntry::StaticFieldref {
                static_ref: StaticRef::parse(buf)?,
            },
            6 => CpEntry::StaticMethodref {
                static_ref: StaticRef::parse(buf)?,
            },
            other => {
                warn!("constant pool entry with unknown tag {other}");
                let info = buf.try_take(3)?;
                CpEntry::Unknown {
                    tag: other,
                    info: [info[0], info[1], info[2]],
                }
            }
        })
    }

    fn tag_label(&self) -> String {
        match self {
            CpEntry::Classref { .. } => "1 (Classref)".into(),
            CpEntry::InstanceFieldref { .. } => "2 (InstanceFieldref)".into(),
            CpEntry::VirtualMethodref { .. } => "3 (VirtualMethodref)".into(),
            CpEntry::SuperMethodref { .. } => "4 (SuperMethodref)".into(),
            CpEntry::StaticFieldref { .. } => "5 (StaticFieldref)".into(),
            CpEntry::StaticMethodref { .. } => "6 (StaticMethodref)".into(),
            CpEntry::Unknown { tag, .. } => format!("{tag} (Unknown)"),
        }
    }

    fn to_record(&self, version: Version) -> Record {
        let mut rec = Record::new();
        rec.insert("tag-u1".into(), json!(self.tag_label()));

        let push_class_ref = |rec: &mut Record, class: &ClassRef| {
            if let Some(fields) = class.to_value().as_object() {
                for (key, value) in fields {
                    rec.insert(key.clone(), value.clone());
                }
            }
        };

        match self {
            CpEntry::Classref { class_ref, padding } => {
                push_class_ref(&mut rec, class_ref);
                rec.insert("padding-u1".into(), json!(padding));
            }
            CpEntry::InstanceFieldref { class, token }
            | CpEntry::VirtualMethodref { class, token }
            | CpEntry::SuperMethodref { class, token } => {
                push_class_ref(&mut rec, class);
                rec.insert("token-u1".into(), json!(token));
            }
            CpEntry::StaticFieldref { static_ref } => {
                if let Some(fields) = static_ref.to_value(false).as_object() {
                    for (key, value) in fields {
                        rec.insert(key.clone(), value.clone());
                    }
                }
            }
            CpEntry::StaticMethodref { static_ref } => {
                let block_index = version.at_least(Version::V2_3);
                if let Some(fields) = static_ref.to_value(block_index).as_object() {
                    for (key, value) in fields {
                        rec.insert(key.clone(), value.clone());
                    }
                }
            }
            CpEntry::Unknown { info, .. } => {
                rec.insert("info".into(), json!(hex::encode(info)));
            }
        }

        rec
    }
}

impl ConstantPool {
    pub fn parse(blob: &[u8]) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(blob);

        let tag = buf.try_get_u8()?;
        let size = buf.try_get_u16()?;
        let count = buf.try_get_u16()?;

        let entries = (0..count)
            .map(|_| CpEntry::parse(&mut buf))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { tag, size, entries })
    }

    pub fn to_record(&self, version: Version) -> Record {
        let mut rec = Record::new();
        rec.insert("tag-u1".into(), json!(self.tag));
        rec.insert("size-u2".into(), json!(self.size));
        rec.insert("count-u2".into(), json!(self.entries.len()));
        rec.insert(
            "constant_pool".into(),
            json!(self
                .entries
                .iter()
                .map(|e| e.to_record(version))
                .collect::<Vec<_>>()),
        );
        rec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_each_reference_family() {
        let blob = [
            0x05, 0x00, 0x12, 0x00, 0x04, //
            0x01, 0x00, 0x02, 0x00, // Classref internal @2
            0x02, 0x00, 0x02, 0x01, // InstanceFieldref internal @2 token 1
            0x06, 0x00, 0x00, 0x87, // StaticMethodref internal offset 0x87
            0x05, 0x81, 0x02, 0x03, // StaticFieldref external p1.c2 t3
        ];
        let pool = ConstantPool::parse(&blob).unwrap();
        assert_eq!(pool.entries.len(), 4);

        assert_eq!(
            pool.entries[0],
            CpEntry::Classref {
                class_ref: ClassRef::Internal { offset: 2 },
                padding: 0
            }
        );
        assert_eq!(
            pool.entries[2],
            CpEntry::StaticMethodref {
                static_ref: StaticRef::Internal {
                    first: 0,
                    offset: 0x87
                }
            }
        );
        assert_eq!(
            pool.entries[3],
            CpEntry::StaticFieldref {
                static_ref: StaticRef::External {
                    package_token: 1,
                    class_token: 2,
                    token: 3
                }
            }
        );
    }

    #[test]
    fn unknown_tags_decode_literally() {
        let blob = [0x05, 0x00, 0x06, 0x00, 0x01, 0x09, 0xaa, 0xbb, 0xcc];
        let pool = ConstantPool::parse(&blob).unwrap();
        assert_eq!(
            pool.entries[0],
            CpEntry::Unknown {
                tag: 9,
                info: [0xaa, 0xbb, 0xcc]
            }
        );
    }

    #[test]
    fn static_method_block_index_label_appears_at_2_3() {
        let blob = [0x05, 0x00, 0x06, 0x00, 0x01, 0x06, 0x00, 0x00, 0x10];
        let pool = ConstantPool::parse(&blob).unwrap();
        let rec = pool.to_record(Version::V2_3);
        let entry = &rec["constant_pool"][0];
        assert!(entry["internal_ref-u3"]
            .as_object()
            .unwrap()
            .contains_key("method_info_block_index-u1"));
    }
}
