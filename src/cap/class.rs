use anyhow::Result;
use bytes::Bytes;
use serde_json::json;
use tracing::trace;

use crate::cap::flags::ClassFlags;
use crate::cap::shared::{ClassRef, NameInfo, TypeDescriptor};
use crate::error::Warning;
use crate::record::Record;
use crate::support::bytes_ext::SafeBuf;
use crate::support::hex;
use crate::types::Version;

/// Class component (tag 6): the signature pool (2.2+) followed by a run of
/// interface_info / class_info structures until the blob is exhausted. The
/// structures carry no length prefix, so every field width matters; an
/// off-by-one here corrupts everything after it.
#[derive(Debug, Clone)]
pub struct Class {
    pub tag: u8,
    pub size: u16,
    pub signature_pool_length: Option<u16>,
    pub signature_pool: Vec<TypeDescriptor>,
    pub items: Vec<ClassItem>,
}

/// One interface_info or class_info, remembering where in `info` it starts:
/// internal class references elsewhere in the CAP point at these offsets.
#[derive(Debug, Clone)]
pub struct ClassItem {
    pub offset: u16,
    pub body: ClassItemBody,
}

#[derive(Debug, Clone)]
pub enum ClassItemBody {
    Interface(InterfaceInfo),
    Class(ClassInfo),
}

#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub flags: ClassFlags,
    pub interface_count: u8,
    pub superinterfaces: Vec<ClassRef>,
    pub interface_name: Option<NameInfo>,
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub flags: ClassFlags,
    pub interface_count: u8,
    pub super_class_ref: ClassRef,
    pub declared_instance_size: u8,
    pub first_reference_token: u8,
    pub reference_count: u8,
    pub public_method_table_base: u8,
    pub public_method_table_count: u8,
    pub package_method_table_base: u8,
    pub package_method_table_count: u8,
    pub public_virtual_method_table: Vec<MethodTableEntry>,
    pub package_virtual_method_table: Vec<MethodTableEntry>,
    pub interfaces: Vec<ImplementedInterfaceInfo>,
    pub remote_interfaces: Option<RemoteInterfaceInfo>,
    pub public_virtual_method_token_mapping: Vec<u8>,
    pub cap22_inheritable_public_method_token_count: Option<u8>,
}

/// Virtual method table slot: a bare offset into Method's info in compact
/// images, a (block, offset) pair in extended ones.
#[derive(Debug, Clone, Copy)]
pub enum MethodTableEntry {
    Compact { offset: u16 },
    Extended { block_index: u8, offset: u16 },
}

#[derive(Debug, Clone)]
pub struct ImplementedInterfaceInfo {
    pub interface: ClassRef,
    pub index: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RemoteInterfaceInfo {
    pub remote_methods: Vec<RemoteMethodInfo>,
    pub hash_modifier: Vec<u8>,
    pub class_name: String,
    pub remote_interfaces: Vec<ClassRef>,
}

#[derive(Debug, Clone)]
pub struct RemoteMethodInfo {
    pub remote_method_hash: [u8; 2],
    pub signature_offset: u16,
    pub virtual_method_token: u8,
}

impl Class {
    pub fn parse(
        blob: &[u8],
        version: Version,
        extended: bool,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(blob);

        let tag = buf.try_get_u8()?;
        let size = buf.try_get_u16()?;
        let info_len = buf.len();

        let mut signature_pool_length = None;
        let mut signature_pool = Vec::new();

        if version.at_least(Version::V2_2) {
            let length = buf.try_get_u16()?;
            signature_pool_length = Some(length);

            let pool_end = buf.len().saturating_sub(length as usize);
            while buf.len() > pool_end {
                signature_pool.push(TypeDescriptor::parse(&mut buf)?);
            }
            if buf.len() < pool_end {
                warnings.push(Warning::InvariantViolation(
                    "class signature pool overruns its declared length".into(),
                ));
            }
        }

        let mut items = Vec::new();
        while !buf.is_empty() {
            let offset = (info_len - buf.len()) as u16;
            let bitfield = buf.try_get_u8()?;
            let flags = ClassFlags::from_raw(bitfield >> 4);
            let interface_count = bitfield & 0x0f;

            let body = if flags.contains(ClassFlags::INTERFACE) {
                trace!("interface_info at info offset {offset}");
                ClassItemBody::Interface(parse_interface_info(
                    &mut buf,
                    flags,
                    interface_count,
                    version,
                )?)
            } else {
                trace!("class_info at info offset {offset}");
                ClassItemBody::Class(parse_class_info(
                    &mut buf,
                    flags,
                    interface_count,
                    version,
                    extended,
                )?)
            };

            items.push(ClassItem { offset, body });
        }

        Ok(Self {
            tag,
            size,
            signature_pool_length,
            signature_pool,
            items,
        })
    }

    /// Info offsets of interface_info structures, for cross-component
    /// checks (Export must only point at interfaces in applet packages).
    pub fn interface_offsets(&self) -> Vec<u16> {
        self.items
            .iter()
            .filter(|item| matches!(item.body, ClassItemBody::Interface(_)))
            .map(|item| item.offset)
            .collect()
    }

    pub fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert("tag-u1".into(), json!(self.tag));
        rec.insert("size-u2".into(), json!(self.size));

        if let Some(length) = self.signature_pool_length {
            rec.insert("signature_pool_length-u2".into(), json!(length));
            rec.insert(
                "signature_pool".into(),
                json!(self
                    .signature_pool
                    .iter()
                    .map(|t| t.to_record())
                    .collect::<Vec<_>>()),
            );
        }

        let mut interfaces = Vec::new();
        let mut classes = Vec::new();
        for item in &self.items {
            match &item.body {
                ClassItemBody::Interface(info) => {
                    interfaces.push(interface_record(item.offset, info))
                }
                ClassItemBody::Class(info) => classes.push(class_record(item.offset, info)),
            }
        }
        rec.insert("interfaces".into(), json!(interfaces));
        rec.insert("classes".into(), json!(classes));

        rec
    }
}

fn parse_interface_info(
    buf: &mut Bytes,
    flags: ClassFlags,
    interface_count: u8,
    version: Version,
) -> Result<InterfaceInfo> {
    let superinterfaces = (0..interface_count)
        .map(|_| ClassRef::parse(buf))
        .collect::<Result<Vec<_>>>()?;

    let interface_name = if version.at_least(Version::V2_2) && flags.contains(ClassFlags::REMOTE) {
        Some(NameInfo::parse(buf)?)
    } else {
        None
    };

    Ok(InterfaceInfo {
        flags,
        interface_count,
        superinterfaces,
        interface_name,
    })
}

fn parse_class_info(
    buf: &mut Bytes,
    flags: ClassFlags,
    interface_count: u8,
    version: Version,
    extended: bool,
) -> Result<ClassInfo> {
    let super_class_ref = ClassRef::parse(buf)?;
    let declared_instance_size = buf.try_get_u8()?;
    let first_reference_token = buf.try_get_u8()?;
    let reference_count = buf.try_get_u8()?;
    let public_method_table_base = buf.try_get_u8()?;
    let public_method_table_count = buf.try_get_u8()?;
    let package_method_table_base = buf.try_get_u8()?;
    let package_method_table_count = buf.try_get_u8()?;

    let parse_table = |buf: &mut Bytes, count: u8| -> Result<Vec<MethodTableEntry>> {
        (0..count)
            .map(|_| {
                Ok(if extended {
                    MethodTableEntry::Extended {
                        block_index: buf.try_get_u8()?,
                        offset: buf.try_get_u16()?,
                    }
                } else {
                    MethodTableEntry::Compact {
                        offset: buf.try_get_u16()?,
                    }
                })
            })
            .collect()
    };

    let public_virtual_method_table = parse_table(buf, public_method_table_count)?;
    let package_virtual_method_table = parse_table(buf, package_method_table_count)?;

    let interfaces = (0..interface_count)
        .map(|_| {
            let interface = ClassRef::parse(buf)?;
            let count = buf.try_get_u8()?;
            let index = buf.try_take(count as usize)?;
            Ok(ImplementedInterfaceInfo { interface, index })
        })
        .collect::<Result<Vec<_>>>()?;

    let remote_interfaces = if version.at_least(Version::V2_2) && flags.contains(ClassFlags::REMOTE)
    {
        let remote_methods_count = buf.try_get_u8()?;
        let remote_methods = (0..remote_methods_count)
            .map(|_| {
                let hash = buf.try_take(2)?;
                Ok(RemoteMethodInfo {
                    remote_method_hash: [hash[0], hash[1]],
                    signature_offset: buf.try_get_u16()?,
                    virtual_method_token: buf.try_get_u8()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let hash_modifier_length = buf.try_get_u8()?;
        let hash_modifier = buf.try_take(hash_modifier_length as usize)?;
        let class_name = NameInfo::parse(buf)?;
        let remote_interfaces_count = buf.try_get_u8()?;
        let remote_interfaces = (0..remote_interfaces_count)
            .map(|_| ClassRef::parse(buf))
            .collect::<Result<Vec<_>>>()?;

        Some(RemoteInterfaceInfo {
            remote_methods,
            hash_modifier,
            class_name: class_name.name,
            remote_interfaces,
        })
    } else {
        None
    };

    let (public_virtual_method_token_mapping, cap22_inheritable_public_method_token_count) =
        if version.at_least(Version::V2_3) {
            let public_method_count =
                public_method_table_base as usize + public_method_table_count as usize;
            let mapping = buf.try_take(public_method_count)?;
            (mapping, Some(buf.try_get_u8()?))
        } else {
            (Vec::new(), None)
        };

    Ok(ClassInfo {
        flags,
        interface_count,
        super_class_ref,
        declared_instance_size,
        first_reference_token,
        reference_count,
        public_method_table_base,
        public_method_table_count,
        package_method_table_base,
        package_method_table_count,
        public_virtual_method_table,
        package_virtual_method_table,
        interfaces,
        remote_interfaces,
        public_virtual_method_token_mapping,
        cap22_inheritable_public_method_token_count,
    })
}

fn bitfield_record(flags: ClassFlags, interface_count: u8) -> serde_json::Value {
    json!({
        "flags-u4b": flags.marked_names(),
        "interface_count-u4b": interface_count,
    })
}

fn method_table_value(table: &[MethodTableEntry]) -> serde_json::Value {
    json!(table
        .iter()
        .map(|entry| match entry {
            MethodTableEntry::Compact { offset } => json!(hex::encode(&offset.to_be_bytes())),
            MethodTableEntry::Extended {
                block_index,
                offset,
            } => json!({
                "method_component_block_index-u1": block_index,
                "method_offset-u2": offset,
            }),
        })
        .collect::<Vec<_>>())
}

fn interface_record(offset: u16, info: &InterfaceInfo) -> serde_json::Value {
    let mut rec = Record::new();
    rec.insert("_offset_in_info".into(), json!(offset));
    rec.insert(
        "bitfield-u1".into(),
        bitfield_record(info.flags, info.interface_count),
    );
    rec.insert(
        "superinterfaces-u2l".into(),
        json!(info
            .superinterfaces
            .iter()
            .map(|s| s.to_value())
            .collect::<Vec<_>>()),
    );
    if let Some(name) = &info.interface_name {
        rec.insert(
            "interface_name".into(),
            json!({
                "interface_name_length-u1": name.length,
                "interface_name-u1l": name.name,
            }),
        );
    }
    json!(rec)
}

fn class_record(offset: u16, info: &ClassInfo) -> serde_json::Value {
    let mut rec = Record::new();
    rec.insert("_offset_in_info".into(), json!(offset));
    rec.insert(
        "bitfield-u1".into(),
        bitfield_record(info.flags, info.interface_count),
    );
    rec.insert(
        "super_class_ref-u2".into(),
        info.super_class_ref.to_value(),
    );
    rec.insert(
        "declared_instance_size-u1".into(),
        json!(info.declared_instance_size),
    );
    rec.insert(
        "first_reference_token-u1".into(),
        json!(info.first_reference_token),
    );
    rec.insert("reference_count-u1".into(), json!(info.reference_count));
    rec.insert(
        "public_method_table_base-u1".into(),
        json!(info.public_method_table_base),
    );
    rec.insert(
        "public_method_table_count-u1".into(),
        json!(info.public_method_table_count),
    );
    rec.insert(
        "package_method_table_base-u1".into(),
        json!(info.package_method_table_base),
    );
    rec.insert(
        "package_method_table_count-u1".into(),
        json!(info.package_method_table_count),
    );
    rec.insert(
        "public_virtual_method_table-u2l".into(),
        method_table_value(&info.public_virtual_method_table),
    );
    rec.insert(
        "package_virtual_method_table-u2l".into(),
        method_table_value(&info.package_virtual_method_table),
    );
    rec.insert(
        "interfaces".into(),
        json!(info
            .interfaces
            .iter()
            .map(|imp| {
                json!({
                    "interface-u2": imp.interface.to_value(),
                    "count-u1": imp.index.len(),
                    "index-u1l": imp.index,
                })
            })
            .collect::<Vec<_>>()),
    );

    if let Some(remote) = &info.remote_interfaces {
        rec.insert(
            "remote_interfaces".into(),
            json!({
                "remote_methods_count-u1": remote.remote_methods.len(),
                "remote_methods-u5l": remote
                    .remote_methods
                    .iter()
                    .map(|m| {
                        json!({
                            "remote_method_hash-u2": hex::encode(&m.remote_method_hash),
                            "signature_offset-u2": m.signature_offset,
                            "virtual_method_token-u1": m.virtual_method_token,
                        })
                    })
                    .collect::<Vec<_>>(),
                "hash_modifier_length-u1": remote.hash_modifier.len(),
                "hash_modifier-u1l": hex::encode(&remote.hash_modifier),
                "class_name_length-u1": remote.class_name.len(),
                "class_name-u1l": remote.class_name,
                "remote_interfaces_count-u1": remote.remote_interfaces.len(),
                "remote_interfaces-u2l": remote
                    .remote_interfaces
                    .iter()
                    .map(|r| r.to_value())
                    .collect::<Vec<_>>(),
            }),
        );
    }

    if !info.public_virtual_method_token_mapping.is_empty()
        || info.cap22_inheritable_public_method_token_count.is_some()
    {
        rec.insert(
            "public_virtual_method_token_mapping-u1l".into(),
            json!(info.public_virtual_method_token_mapping),
        );
    }
    if let Some(count) = info.cap22_inheritable_public_method_token_count {
        rec.insert(
            "CAP22_inheritable_public_method_token_count-u1".into(),
            json!(count),
        );
    }

    json!(rec)
}

#[cfg(test)]
mod tests {
    use super::*;

    // One interface (Shareable, no supers) followed by one class extending
    // an external class, 2.1 layout (no signature pool).
    fn sample_2_1() -> Vec<u8> {
        vec![
            0x06, 0x00, 0x0d, //
            0xc0, // interface: INTERFACE|SHAREABLE, 0 supers
            0x00, // class: 0 interfaces implemented
            0x80, 0x03, // super: external p0.c3
            0x02, // declared_instance_size
            0x00, // first_reference_token
            0x00, // reference_count
            0x00, 0x01, // public table base/count
            0x00, 0x00, // package table base/count
            0x00, 0x87, // public virtual method table[0]
        ]
    }

    #[test]
    fn splits_interfaces_from_classes_on_the_flag_nibble() {
        let mut warnings = Vec::new();
        let class = Class::parse(&sample_2_1(), Version::V2_1, false, &mut warnings).unwrap();

        assert_eq!(class.items.len(), 2);
        assert_eq!(class.interface_offsets(), vec![0]);
        match &class.items[1].body {
            ClassItemBody::Class(info) => {
                assert_eq!(
                    info.super_class_ref,
                    ClassRef::External {
                        package_token: 0,
                        class_token: 3
                    }
                );
                assert_eq!(info.public_virtual_method_table.len(), 1);
                assert!(info.cap22_inheritable_public_method_token_count.is_none());
            }
            other => panic!("expected a class_info, got {other:?}"),
        }
        assert_eq!(class.items[1].offset, 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn signature_pool_is_read_at_2_2() {
        let blob = vec![
            0x06, 0x00, 0x05, //
            0x00, 0x02, // signature_pool_length
            0x01, 0x10, // one descriptor: V
            0xc0, // shareable interface, 0 supers
        ];
        let mut warnings = Vec::new();
        let class = Class::parse(&blob, Version::V2_2, false, &mut warnings).unwrap();
        assert_eq!(class.signature_pool_length, Some(2));
        assert_eq!(class.signature_pool.len(), 1);
        assert_eq!(class.items.len(), 1);
        // items begin after the pool: 2 length bytes + 2 pool bytes
        assert_eq!(class.items[0].offset, 4);
    }
}
