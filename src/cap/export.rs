use anyhow::Result;
use bytes::Bytes;
use serde_json::json;

use crate::error::Warning;
use crate::record::Record;
use crate::support::bytes_ext::SafeBuf;

/// Export component (tag 10): the externally importable classes of the
/// package and the offsets of their static members. The index of an entry
/// in `class_exports` is that class's published token.
#[derive(Debug, Clone)]
pub struct Export {
    pub tag: u8,
    pub size: u16,
    pub packages: Vec<PackageExports>,
    pub extended_layout: bool,
}

#[derive(Debug, Clone)]
pub struct PackageExports {
    pub class_exports: Vec<ClassExportInfo>,
}

#[derive(Debug, Clone)]
pub struct ClassExportInfo {
    pub class_offset: u16,
    pub static_field_offsets: Vec<u16>,
    pub static_methods: Vec<StaticMethodExport>,
}

#[derive(Debug, Clone)]
pub enum StaticMethodExport {
    Compact { offset: u16 },
    Extended { block_index: u8, offset: u16 },
}

fn parse_class_export(buf: &mut Bytes, extended: bool) -> Result<ClassExportInfo> {
    let class_offset = buf.try_get_u16()?;
    let static_field_count = buf.try_get_u8()?;
    let static_method_count = buf.try_get_u8()?;

    let static_field_offsets = (0..static_field_count)
        .map(|_| buf.try_get_u16())
        .collect::<Result<Vec<_>>>()?;

    let static_methods = (0..static_method_count)
        .map(|_| {
            Ok(if extended {
                StaticMethodExport::Extended {
                    block_index: buf.try_get_u8()?,
                    offset: buf.try_get_u16()?,
                }
            } else {
                StaticMethodExport::Compact {
                    offset: buf.try_get_u16()?,
                }
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ClassExportInfo {
        class_offset,
        static_field_offsets,
        static_methods,
    })
}

impl Export {
    pub fn parse(blob: &[u8], extended: bool) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(blob);

        let tag = buf.try_get_u8()?;
        let size = buf.try_get_u16()?;

        let packages = if extended {
            let package_count = buf.try_get_u8()?;
            (0..package_count)
                .map(|_| {
                    let class_count = buf.try_get_u8()?;
                    let class_exports = (0..class_count)
                        .map(|_| parse_class_export(&mut buf, true))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(PackageExports { class_exports })
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            let class_count = buf.try_get_u8()?;
            let class_exports = (0..class_count)
                .map(|_| parse_class_export(&mut buf, false))
                .collect::<Result<Vec<_>>>()?;
            vec![PackageExports { class_exports }]
        };

        Ok(Self {
            tag,
            size,
            packages,
            extended_layout: extended,
        })
    }

    /// Interface entries must not publish static methods; applet packages
    /// must only export (Shareable) interfaces. Checked against the Class
    /// component's interface offsets.
    pub fn check_against_class(
        &self,
        interface_offsets: &[u16],
        package_has_applets: bool,
        warnings: &mut Vec<Warning>,
    ) {
        for export in self.packages.iter().flat_map(|p| &p.class_exports) {
            let is_interface = interface_offsets.contains(&export.class_offset);

            if is_interface && !export.static_methods.is_empty() {
                warnings.push(Warning::InvariantViolation(format!(
                    "exported interface at class offset {} publishes static methods",
                    export.class_offset
                )));
            }

            if package_has_applets && !is_interface {
                warnings.push(Warning::InvariantViolation(format!(
                    "applet package exports a non-interface at class offset {}",
                    export.class_offset
                )));
            }
        }
    }

    pub fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert("tag-u1".into(), json!(self.tag));
        rec.insert("size-u2".into(), json!(self.size));

        if self.extended_layout {
            rec.insert("package_count-u1".into(), json!(self.packages.len()));
            rec.insert(
                "package_exports".into(),
                json!(self
                    .packages
                    .iter()
                    .map(|package| {
                        json!({
                            "class_count-u1": package.class_exports.len(),
                            "class_exports": package
                                .class_exports
                                .iter()
                                .map(class_export_value)
                                .collect::<Vec<_>>(),
                        })
                    })
                    .collect::<Vec<_>>()),
            );
        } else if let Some(package) = self.packages.first() {
            rec.insert(
                "class_count-u1".into(),
                json!(package.class_exports.len()),
            );
            rec.insert(
                "class_exports".into(),
                json!(package
                    .class_exports
                    .iter()
                    .map(class_export_value)
                    .collect::<Vec<_>>()),
            );
        }

        rec
    }
}

fn class_export_value(export: &ClassExportInfo) -> serde_json::Value {
    let mut rec = Record::new();
    rec.insert("class_offset-u2".into(), json!(export.class_offset));
    rec.insert(
        "static_field_count-u1".into(),
        json!(export.static_field_offsets.len()),
    );
    rec.insert(
        "static_method_count-u1".into(),
        json!(export.static_methods.len()),
    );
    rec.insert(
        "static_field_offsets-u2l".into(),
        json!(export.static_field_offsets),
    );

    let compact: Vec<&StaticMethodExport> = export
        .static_methods
        .iter()
        .filter(|m| matches!(m, StaticMethodExport::Compact { .. }))
        .collect();
    if compact.len() == export.static_methods.len() {
        rec.insert(
            "static_method_offsets-u2l".into(),
            json!(export
                .static_methods
                .iter()
                .map(|m| match m {
                    StaticMethodExport::Compact { offset } => *offset,
                    StaticMethodExport::Extended { offset, .. } => *offset,
                })
                .collect::<Vec<_>>()),
        );
    } else {
        rec.insert(
            "static_methods-u3l".into(),
            json!(export
                .static_methods
                .iter()
                .map(|m| match m {
                    StaticMethodExport::Extended {
                        block_index,
                        offset,
                    } => json!({
                        "method_component_block_index-u1": block_index,
                        "method_offset-u2": offset,
                    }),
                    StaticMethodExport::Compact { offset } => json!(offset),
                })
                .collect::<Vec<_>>()),
        );
    }

    json!(rec)
}
