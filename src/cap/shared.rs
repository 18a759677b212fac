//! Primitive shapes reused across component schemas: versions, AIDs,
//! package infos, the two reference unions, and packed-nibble type
//! descriptors.

use anyhow::Result;
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::warn;

use crate::record::Record;
use crate::support::bytes_ext::SafeBuf;
use crate::support::hex;
use crate::types::Version;

/// Reads a `{u1 minor, u1 major}` version pair (minor first on disk).
pub fn parse_version(buf: &mut Bytes) -> Result<Version> {
    let minor = buf.try_get_u8()?;
    let major = buf.try_get_u8()?;
    Ok(Version::new(major, minor))
}

/// Reads `u1 length` + AID bytes. AIDs are 5-16 bytes; out-of-range lengths
/// are reported and read anyway.
pub fn parse_aid(buf: &mut Bytes) -> Result<Vec<u8>> {
    let length = buf.try_get_u8()? as usize;
    if !(5..=16).contains(&length) {
        warn!("AID length {length} outside the legal range [5,16]");
    }
    buf.try_take(length)
}

/// `package_info`: version pair + AID.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub version: Version,
    pub aid: Vec<u8>,
}

impl PackageInfo {
    pub fn parse(buf: &mut Bytes) -> Result<Self> {
        let version = parse_version(buf)?;
        let aid = parse_aid(buf)?;
        Ok(Self { version, aid })
    }

    pub fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert("version-u2".into(), json!(self.version.to_string()));
        rec.insert("AID_length-u1".into(), json!(self.aid.len()));
        rec.insert("AID".into(), json!(hex::encode(&self.aid)));
        rec
    }
}

/// `package_name_info` / interface and class name strings. The JCVM forbids
/// `0x00` and `0xF0..=0xFF` inside names; offenders are reported and kept
/// via lossy decoding.
#[derive(Debug, Clone)]
pub struct NameInfo {
    pub length: u8,
    pub name: String,
}

impl NameInfo {
    pub fn parse(buf: &mut Bytes) -> Result<Self> {
        let length = buf.try_get_u8()?;
        let raw = buf.try_take(length as usize)?;

        if raw.iter().any(|b| *b == 0x00 || *b >= 0xf0) {
            warn!("name contains byte values the JCVM disallows");
        }

        Ok(Self {
            length,
            name: String::from_utf8_lossy(&raw).into_owned(),
        })
    }
}

/// The 2-byte class reference union, discriminated by the high bit of the
/// first byte: set means an external `{package_token, class_token}` pair,
/// clear means an offset into the Class component's info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassRef {
    Internal {
        offset: u16,
    },
    External {
        package_token: u8,
        class_token: u8,
    },
}

impl ClassRef {
    pub fn parse(buf: &mut Bytes) -> Result<Self> {
        let first = buf.try_get_u8()?;
        let second = buf.try_get_u8()?;

        Ok(if first & 0x80 == 0x80 {
            ClassRef::External {
                package_token: first & 0x7f,
                class_token: second,
            }
        } else {
            ClassRef::Internal {
                offset: u16::from(first) << 8 | u16::from(second),
            }
        })
    }

    pub fn from_u16(raw: u16) -> Self {
        if raw & 0x8000 == 0x8000 {
            ClassRef::External {
                package_token: ((raw >> 8) & 0x7f) as u8,
                class_token: (raw & 0xff) as u8,
            }
        } else {
            ClassRef::Internal { offset: raw }
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, ClassRef::Internal { .. })
    }

    pub fn to_value(&self) -> Value {
        match self {
            ClassRef::Internal { offset } => json!({ "internal_class_ref-u2": offset }),
            ClassRef::External {
                package_token,
                class_token,
            } => json!({
                "external_package_token-u1": package_token,
                "external_class_token-u1": class_token,
            }),
        }
    }

    /// Compact spelling used inside pretty-printed type descriptors.
    pub fn pretty(&self) -> String {
        match self {
            ClassRef::Internal { offset } => format!("@{offset}"),
            ClassRef::External {
                package_token,
                class_token,
            } => format!("p{package_token}.c{class_token}"),
        }
    }
}

/// The 3-byte static field/method reference union. External references set
/// the high bit of the first byte; internal ones spend it on padding, or on
/// a method block index for static method refs at format 2.3+.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticRef {
    Internal {
        first: u8,
        offset: u16,
    },
    External {
        package_token: u8,
        class_token: u8,
        token: u8,
    },
}

impl StaticRef {
    pub fn parse(buf: &mut Bytes) -> Result<Self> {
        let first = buf.try_get_u8()?;
        let second = buf.try_get_u8()?;
        let third = buf.try_get_u8()?;

        Ok(if first & 0x80 == 0x80 {
            StaticRef::External {
                package_token: first & 0x7f,
                class_token: second,
                token: third,
            }
        } else {
            StaticRef::Internal {
                first,
                offset: u16::from(second) << 8 | u16::from(third),
            }
        })
    }

    /// `first_is_block_index` renames the leading internal byte for static
    /// method references in 2.3+ images.
    pub fn to_value(&self, first_is_block_index: bool) -> Value {
        match self {
            StaticRef::Internal { first, offset } => {
                let first_key = if first_is_block_index {
                    "method_info_block_index-u1"
                } else {
                    "padding-u1"
                };
                json!({ "internal_ref-u3": { first_key: first, "offset-u2": offset } })
            }
            StaticRef::External {
                package_token,
                class_token,
                token,
            } => json!({
                "external_ref-u3": {
                    "package_token-u1": package_token,
                    "class_token-u1": class_token,
                    "token-u1": token,
                }
            }),
        }
    }
}

/// `type_descriptor`: a nibble count followed by packed type nibbles.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub nibble_count: u8,
    pub bytes: Vec<u8>,
}

impl TypeDescriptor {
    pub fn parse(buf: &mut Bytes) -> Result<Self> {
        let nibble_count = buf.try_get_u8()?;
        let bytes = buf.try_take((nibble_count as usize + 1) / 2)?;
        Ok(Self {
            nibble_count,
            bytes,
        })
    }

    /// Encoded length on disk, including the count byte.
    pub fn encoded_len(&self) -> usize {
        1 + self.bytes.len()
    }

    fn nibbles(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bytes.len() * 2);
        for b in &self.bytes {
            out.push(b >> 4);
            out.push(b & 0x0f);
        }
        out
    }

    /// Human rendering: the raw hex plus decoded JVM-ish element letters.
    /// Reference nibbles (`6`/`E`) swallow the next four nibbles as an
    /// embedded class reference.
    pub fn pretty(&self) -> String {
        let nibbles = self.nibbles();
        let mut parts = Vec::new();
        let mut i = 0;

        while i < nibbles.len() {
            let nibble = nibbles[i];
            // a 0 nibble is padding for odd counts
            if nibble == 0 {
                break;
            }

            let letter = match nibble {
                0x1 => "V",
                0x2 => "Z",
                0x3 => "B",
                0x4 => "S",
                0x5 => "I",
                0x6 => "L",
                0xa => "(Z",
                0xb => "(B",
                0xc => "(S",
                0xd => "(I",
                0xe => "(L",
                _ => {
                    parts.push(format!("?{nibble:x}"));
                    i += 1;
                    continue;
                }
            };
            parts.push(letter.to_string());
            i += 1;

            if (nibble == 0x6 || nibble == 0xe) && i + 4 <= nibbles.len() {
                let raw = (u16::from(nibbles[i]) << 12)
                    | (u16::from(nibbles[i + 1]) << 8)
                    | (u16::from(nibbles[i + 2]) << 4)
                    | u16::from(nibbles[i + 3]);
                parts.push(format!("<{}>", ClassRef::from_u16(raw).pretty()));
                i += 4;
            }
        }

        format!("{}: {}", hex::encode(&self.bytes), parts.join(""))
    }

    pub fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert("nibble_count-u1".into(), json!(self.nibble_count));
        rec.insert("type".into(), json!(self.pretty()));
        rec
    }
}
