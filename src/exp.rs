//! Export (EXP) files: the published token tables of a package. A single
//! flat binary, no envelope: magic, version, a tagged constant pool, then
//! the exported class descriptions.

use anyhow::{anyhow, Result};
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::warn;

use crate::cap::flags::ExportAccessFlags;
use crate::cap::shared::{parse_aid, parse_version};
use crate::error::{CodecError, Warning};
use crate::record::Record;
use crate::support::bytes_ext::SafeBuf;
use crate::support::hex;
use crate::types::Version;

pub const MAGIC: u32 = 0x00facade;

#[derive(Debug, Clone)]
pub struct Exp {
    pub raw: Vec<u8>,
    pub raw_modified: String,
    pub version: Version,
    pub constant_pool: Vec<ExpConstant>,
    pub this_package: u16,
    /// 2.3+ only.
    pub referenced_packages: Option<Vec<u16>>,
    pub classes: Vec<ExpClassInfo>,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpConstant {
    Utf8 {
        bytes: Vec<u8>,
    },
    Integer {
        bytes: [u8; 4],
    },
    Classref {
        name_index: u16,
    },
    Package {
        flags: u8,
        name_index: u16,
        version: Version,
        aid: Vec<u8>,
    },
}

#[derive(Debug, Clone)]
pub struct ExpClassInfo {
    pub token: u8,
    pub access_flags: ExportAccessFlags,
    pub name_index: u16,
    pub supers: Vec<u16>,
    pub interfaces: Vec<u16>,
    pub fields: Vec<ExpFieldInfo>,
    pub methods: Vec<ExpMethodInfo>,
    /// 2.3+ only.
    pub cap22_inheritable_public_method_token_count: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct ExpFieldInfo {
    pub token: u8,
    pub access_flags: ExportAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<ExpAttributeInfo>,
}

#[derive(Debug, Clone)]
pub struct ExpAttributeInfo {
    pub attribute_name_index: u16,
    pub info: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ExpMethodInfo {
    pub token: u8,
    pub access_flags: ExportAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
}

fn parse_constant(buf: &mut Bytes) -> Result<ExpConstant> {
    let tag = buf.try_get_u8()?;

    Ok(match tag {
        1 => {
            let length = buf.try_get_u16()?;
            let bytes = buf.try_take(length as usize)?;
            if bytes.iter().any(|b| *b == 0x00 || *b >= 0xf0) {
                warn!("Utf8 constant contains byte values the JCVM disallows");
            }
            ExpConstant::Utf8 { bytes }
        }
        3 => {
            let bytes = buf.try_take(4)?;
            ExpConstant::Integer {
                bytes: [bytes[0], bytes[1], bytes[2], bytes[3]],
            }
        }
        7 => ExpConstant::Classref {
            name_index: buf.try_get_u16()?,
        },
        13 => {
            let flags = buf.try_get_u8()?;
            let name_index = buf.try_get_u16()?;
            let version = parse_version(buf)?;
            let aid = parse_aid(buf)?;
            ExpConstant::Package {
                flags,
                name_index,
                version,
                aid,
            }
        }
        // entries are variable length; an unknown tag derails everything after it
        other => return Err(anyhow!("unknown constant pool tag {other}")),
    })
}

fn parse_field(buf: &mut Bytes) -> Result<ExpFieldInfo> {
    let token = buf.try_get_u8()?;
    let access_flags = ExportAccessFlags::from_raw(buf.try_get_u16()?);
    let name_index = buf.try_get_u16()?;
    let descriptor_index = buf.try_get_u16()?;
    let attribute_count = buf.try_get_u16()?;

    let attributes = (0..attribute_count)
        .map(|_| {
            let attribute_name_index = buf.try_get_u16()?;
            let attribute_length = buf.try_get_u32()?;
            let info = buf.try_take(attribute_length as usize)?;
            Ok(ExpAttributeInfo {
                attribute_name_index,
                info,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ExpFieldInfo {
        token,
        access_flags,
        name_index,
        descriptor_index,
        attributes,
    })
}

fn parse_class(buf: &mut Bytes, version: Version) -> Result<ExpClassInfo> {
    let token = buf.try_get_u8()?;
    let access_flags = ExportAccessFlags::from_raw(buf.try_get_u16()?);
    let name_index = buf.try_get_u16()?;

    let supers_count = buf.try_get_u16()?;
    let supers = (0..supers_count)
        .map(|_| buf.try_get_u16())
        .collect::<Result<Vec<_>>>()?;

    let interfaces_count = buf.try_get_u8()?;
    let interfaces = (0..interfaces_count)
        .map(|_| buf.try_get_u16())
        .collect::<Result<Vec<_>>>()?;

    let fields_count = buf.try_get_u16()?;
    let fields = (0..fields_count)
        .map(|_| parse_field(buf))
        .collect::<Result<Vec<_>>>()?;

    let methods_count = buf.try_get_u16()?;
    let methods = (0..methods_count)
        .map(|_| {
            Ok(ExpMethodInfo {
                token: buf.try_get_u8()?,
                access_flags: ExportAccessFlags::from_raw(buf.try_get_u16()?),
                name_index: buf.try_get_u16()?,
                descriptor_index: buf.try_get_u16()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let cap22_inheritable_public_method_token_count = if version.at_least(Version::V2_3) {
        Some(buf.try_get_u8()?)
    } else {
        None
    };

    Ok(ExpClassInfo {
        token,
        access_flags,
        name_index,
        supers,
        interfaces,
        fields,
        methods,
        cap22_inheritable_public_method_token_count,
    })
}

impl Exp {
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut buf = Bytes::copy_from_slice(bytes);
        let mut warnings = Vec::new();

        let hard = |e: anyhow::Error| CodecError::TruncatedComponent {
            component: "ExportFile".into(),
            reason: e.to_string(),
        };

        let magic = buf.try_get_u32().map_err(hard)?;
        if magic != MAGIC {
            return Err(CodecError::InvalidEnvelope(format!(
                "not an EXP file: magic {magic:08x}"
            )));
        }

        let version = parse_version(&mut buf).map_err(hard)?;
        if !version.is_supported() {
            return Err(CodecError::UnsupportedVersion {
                major: version.major,
                minor: version.minor,
            });
        }

        let constant_pool_count = buf.try_get_u16().map_err(hard)?;
        let constant_pool = (0..constant_pool_count)
            .map(|_| parse_constant(&mut buf))
            .collect::<Result<Vec<_>>>()
            .map_err(hard)?;

        let this_package = buf.try_get_u16().map_err(hard)?;
        match constant_pool.get(this_package as usize) {
            Some(ExpConstant::Package { .. }) => {}
            _ => warnings.push(Warning::InvariantViolation(format!(
                "this_package index {this_package} is not a CONSTANT_Package_info"
            ))),
        }

        let referenced_packages = if version.at_least(Version::V2_3) {
            let count = buf.try_get_u8().map_err(hard)?;
            Some(
                (0..count)
                    .map(|_| buf.try_get_u16())
                    .collect::<Result<Vec<_>>>()
                    .map_err(hard)?,
            )
        } else {
            None
        };

        let class_count = buf.try_get_u8().map_err(hard)?;
        let classes = (0..class_count)
            .map(|_| parse_class(&mut buf, version))
            .collect::<Result<Vec<_>>>()
            .map_err(hard)?;

        for warning in &warnings {
            warn!("{warning}");
        }

        Ok(Self {
            raw: bytes.to_vec(),
            raw_modified: String::new(),
            version,
            constant_pool,
            this_package,
            referenced_packages,
            classes,
            warnings,
        })
    }

    /// Shallow encode: the normalized `raw_modified` when set, else the
    /// exact source bytes.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if self.raw_modified.is_empty() {
            return Ok(self.raw.clone());
        }

        let normalized =
            hex::normalize_annotated(&self.raw_modified).map_err(|e| CodecError::MalformedHex {
                component: "ExportFile".into(),
                reason: e.to_string(),
            })?;
        hex::decode(&normalized).map_err(|e| CodecError::MalformedHex {
            component: "ExportFile".into(),
            reason: e.to_string(),
        })
    }

    /// Constant pool entries of package type, with their pool indices.
    pub fn packages(&self) -> Vec<(usize, &ExpConstant)> {
        self.constant_pool
            .iter()
            .enumerate()
            .filter(|(_, entry)| matches!(entry, ExpConstant::Package { .. }))
            .collect()
    }

    pub fn to_json(&self) -> Value {
        let mut rec = Record::new();
        rec.insert("raw".into(), json!(hex::encode(&self.raw)));
        rec.insert("raw_modified".into(), json!(self.raw_modified));
        rec.insert("magic".into(), json!("00facade"));
        rec.insert("version".into(), json!(self.version.to_string()));
        rec.insert(
            "constant_pool_count".into(),
            json!(self.constant_pool.len()),
        );
        rec.insert(
            "constant_pool".into(),
            json!(self
                .constant_pool
                .iter()
                .map(constant_value)
                .collect::<Vec<_>>()),
        );
        rec.insert("this_package".into(), json!(self.this_package));

        if let Some(referenced) = &self.referenced_packages {
            rec.insert("referenced_package_count".into(), json!(referenced.len()));
            rec.insert("referenced_packages".into(), json!(referenced));
        }

        rec.insert("export_class_count".into(), json!(self.classes.len()));
        rec.insert(
            "classes".into(),
            json!(self.classes.iter().map(class_value).collect::<Vec<_>>()),
        );

        json!(rec)
    }
}

fn constant_value(entry: &ExpConstant) -> Value {
    match entry {
        ExpConstant::Utf8 { bytes } => json!({
            "tag": "1/UTF8",
            "length": bytes.len(),
            "bytes": String::from_utf8_lossy(bytes),
        }),
        ExpConstant::Integer { bytes } => json!({
            "tag": "3/Integer",
            "bytes": hex::encode(bytes),
        }),
        ExpConstant::Classref { name_index } => json!({
            "tag": "7/Classref",
            "name_index": name_index,
        }),
        ExpConstant::Package {
            flags,
            name_index,
            version,
            aid,
        } => json!({
            "tag": "13/Package",
            "flags": match flags {
                0 => "0/None".to_string(),
                1 => "1/Library".to_string(),
                other => format!("{other} (Unknown)"),
            },
            "name_index": name_index,
            "version": version.to_string(),
            "aid_length": aid.len(),
            "aid": hex::encode(aid),
        }),
    }
}

fn class_value(class: &ExpClassInfo) -> Value {
    let mut rec = Record::new();
    rec.insert("token".into(), json!(class.token));
    rec.insert(
        "access_flags".into(),
        json!(class.access_flags.joined_names()),
    );
    rec.insert("name_index".into(), json!(class.name_index));
    rec.insert("export_supers_count".into(), json!(class.supers.len()));
    rec.insert("supers".into(), json!(class.supers));
    rec.insert(
        "export_interfaces_count".into(),
        json!(class.interfaces.len()),
    );
    rec.insert("interfaces".into(), json!(class.interfaces));
    rec.insert("export_fields_count".into(), json!(class.fields.len()));
    rec.insert(
        "fields".into(),
        json!(class
            .fields
            .iter()
            .map(|field| {
                json!({
                    "token": field.token,
                    "access_flags": field.access_flags.joined_names(),
                    "name_index": field.name_index,
                    "descriptor_index": field.descriptor_index,
                    "attribute_count": field.attributes.len(),
                    "attributes": field
                        .attributes
                        .iter()
                        .map(|attr| {
                            json!({
                                "attribute_name_index": attr.attribute_name_index,
                                "attribute_length": attr.info.len(),
                                "info": hex::encode(&attr.info),
                            })
                        })
                        .collect::<Vec<_>>(),
                })
            })
            .collect::<Vec<_>>()),
    );
    rec.insert("export_methods_count".into(), json!(class.methods.len()));
    rec.insert(
        "methods".into(),
        json!(class
            .methods
            .iter()
            .map(|method| {
                json!({
                    "token": method.token,
                    "access_flags": method.access_flags.joined_names(),
                    "name_index": method.name_index,
                    "descriptor_index": method.descriptor_index,
                })
            })
            .collect::<Vec<_>>()),
    );
    if let Some(count) = class.cap22_inheritable_public_method_token_count {
        rec.insert(
            "CAP22_inheritable_public_method_token_count".into(),
            json!(count),
        );
    }
    json!(rec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_magic_is_rejected() {
        let err = Exp::decode(&[0xde, 0xad, 0xbe, 0xef, 0x00, 0x02]).unwrap_err();
        assert!(matches!(err, CodecError::InvalidEnvelope(_)));
    }

    #[test]
    fn this_package_must_point_at_a_package_entry() {
        // magic, v2.1, pool with one Utf8, this_package -> 0 (the Utf8)
        let bytes = [
            0x00, 0xfa, 0xca, 0xde, 0x01, 0x02, //
            0x00, 0x01, //
            0x01, 0x00, 0x01, 0x61, // Utf8 "a"
            0x00, 0x00, // this_package
            0x00, // class_count
        ];
        let exp = Exp::decode(&bytes).unwrap();
        assert_eq!(exp.warnings.len(), 1);
        assert!(exp.packages().is_empty());
    }

    #[test]
    fn unedited_encode_is_byte_identical() {
        let bytes = [
            0x00, 0xfa, 0xca, 0xde, 0x01, 0x02, //
            0x00, 0x00, //
            0x00, 0x00, //
            0x00,
        ];
        let exp = Exp::decode(&bytes).unwrap();
        assert_eq!(exp.encode().unwrap(), bytes);
    }
}
