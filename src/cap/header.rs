use anyhow::Result;
use bytes::Bytes;
use serde_json::json;
use tracing::trace;

use crate::cap::flags::HeaderFlags;
use crate::cap::shared::{parse_aid, parse_version, NameInfo, PackageInfo};
use crate::error::{CodecError, Warning};
use crate::record::Record;
use crate::support::bytes_ext::SafeBuf;
use crate::support::hex;
use crate::types::Version;

pub const MAGIC: u32 = 0xdecaffed;

/// Header component (tag 1). Read before everything else: its version pair
/// and flags byte steer how every other component is decoded.
#[derive(Debug, Clone)]
pub struct Header {
    pub tag: u8,
    pub size: u16,
    pub magic: u32,
    pub version: Version,
    pub flags: HeaderFlags,
    pub body: HeaderBody,
}

#[derive(Debug, Clone)]
pub enum HeaderBody {
    Compact {
        package: PackageInfo,
        package_name: Option<NameInfo>,
    },
    Extended {
        cap_version: Version,
        cap_aid: Vec<u8>,
        packages: Vec<PackageInfo>,
        package_names: Vec<NameInfo>,
    },
}

impl Header {
    pub fn parse(blob: &[u8], warnings: &mut Vec<Warning>) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(blob);

        let tag = buf.try_get_u8()?;
        let size = buf.try_get_u16()?;
        let magic = buf.try_get_u32()?;

        if magic != MAGIC {
            warnings.push(Warning::InvariantViolation(format!(
                "header magic is {magic:08x}, expected {MAGIC:08x}"
            )));
        }

        let version = parse_version(&mut buf)?;
        if !version.is_supported() {
            return Err(CodecError::UnsupportedVersion {
                major: version.major,
                minor: version.minor,
            }
            .into());
        }

        let flags = HeaderFlags::from_raw(buf.try_get_u8()?);
        trace!("header: format {version}, flags {flags:?}");

        let body = if flags.contains(HeaderFlags::EXTENDED) {
            let cap_version = parse_version(&mut buf)?;
            let cap_aid = parse_aid(&mut buf)?;
            let package_count = buf.try_get_u8()?;

            let packages = (0..package_count)
                .map(|_| PackageInfo::parse(&mut buf))
                .collect::<Result<Vec<_>>>()?;
            let package_names = (0..package_count)
                .map(|_| NameInfo::parse(&mut buf))
                .collect::<Result<Vec<_>>>()?;

            HeaderBody::Extended {
                cap_version,
                cap_aid,
                packages,
                package_names,
            }
        } else {
            let package = PackageInfo::parse(&mut buf)?;
            let package_name = if version.at_least(Version::V2_2) {
                Some(NameInfo::parse(&mut buf)?)
            } else {
                None
            };

            HeaderBody::Compact {
                package,
                package_name,
            }
        };

        Ok(Self {
            tag,
            size,
            magic,
            version,
            flags,
            body,
        })
    }

    pub fn extended(&self) -> bool {
        self.flags.contains(HeaderFlags::EXTENDED)
    }

    /// AID identifying the whole CAP: the package AID in compact images,
    /// the CAP AID in extended ones.
    pub fn cap_aid(&self) -> &[u8] {
        match &self.body {
            HeaderBody::Compact { package, .. } => &package.aid,
            HeaderBody::Extended { cap_aid, .. } => cap_aid,
        }
    }

    pub fn cap_version(&self) -> Version {
        match &self.body {
            HeaderBody::Compact { package, .. } => package.version,
            HeaderBody::Extended { cap_version, .. } => *cap_version,
        }
    }

    pub fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert("tag-u1".into(), json!(self.tag));
        rec.insert("size-u2".into(), json!(self.size));
        rec.insert(
            "magic-u4".into(),
            json!(hex::encode(&self.magic.to_be_bytes())),
        );
        rec.insert(
            "CAP_Format_version-u2".into(),
            json!(self.version.to_string()),
        );
        rec.insert("flags-u1".into(), json!(self.flags.marked_names()));

        match &self.body {
            HeaderBody::Compact {
                package,
                package_name,
            } => {
                rec.insert("package".into(), json!(package.to_record()));
                if let Some(name) = package_name {
                    rec.insert("package_name".into(), name_record(name));
                }
            }
            HeaderBody::Extended {
                cap_version,
                cap_aid,
                packages,
                package_names,
            } => {
                rec.insert("CAP_version-u2".into(), json!(cap_version.to_string()));
                rec.insert("CAP_AID_length-u1".into(), json!(cap_aid.len()));
                rec.insert("CAP_AID".into(), json!(hex::encode(cap_aid)));
                rec.insert("packages_count-u1".into(), json!(packages.len()));
                rec.insert(
                    "packages".into(),
                    json!(packages.iter().map(|p| p.to_record()).collect::<Vec<_>>()),
                );
                rec.insert(
                    "package_names".into(),
                    json!(package_names.iter().map(name_record).collect::<Vec<_>>()),
                );
            }
        }

        rec
    }
}

fn name_record(name: &NameInfo) -> serde_json::Value {
    json!({
        "name_length-u1": name.length,
        "name": name.name,
        "_hint": "length == 0 <=> no remote interface/class",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // tag, size, magic, v2.1, APPLET, package v1.0 AID 4444444444
    const HELLO_21: &[u8] = &[
        0x01, 0x00, 0x0f, 0xde, 0xca, 0xff, 0xed, 0x01, 0x02, 0x04, 0x00, 0x01, 0x05, 0x44, 0x44,
        0x44, 0x44, 0x44,
    ];

    #[test]
    fn parses_a_compact_2_1_header() {
        let mut warnings = Vec::new();
        let header = Header::parse(HELLO_21, &mut warnings).unwrap();

        assert_eq!(header.version, Version::V2_1);
        assert!(header.flags.contains(HeaderFlags::APPLET));
        assert!(!header.extended());
        assert_eq!(header.cap_aid(), &[0x44; 5]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn bad_magic_is_a_warning_not_an_error() {
        let mut tampered = HELLO_21.to_vec();
        tampered[3] = 0x00;
        let mut warnings = Vec::new();
        assert!(Header::parse(&tampered, &mut warnings).is_ok());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn unknown_version_is_fatal() {
        let mut tampered = HELLO_21.to_vec();
        tampered[8] = 0x04;
        let mut warnings = Vec::new();
        let err = Header::parse(&tampered, &mut warnings).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CodecError>(),
            Some(CodecError::UnsupportedVersion { major: 4, minor: 1 })
        ));
    }

    #[test]
    fn record_field_order_tracks_the_wire() {
        let mut warnings = Vec::new();
        let header = Header::parse(HELLO_21, &mut warnings).unwrap();
        let rec = header.to_record();
        let keys: Vec<&String> = rec.keys().collect();
        assert_eq!(
            keys,
            [
                "tag-u1",
                "size-u2",
                "magic-u4",
                "CAP_Format_version-u2",
                "flags-u1",
                "package"
            ]
        );
    }
}
