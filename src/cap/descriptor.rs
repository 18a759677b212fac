use anyhow::Result;
use bytes::Bytes;
use serde_json::json;

use crate::cap::flags::{ClassDescriptorFlags, FieldDescriptorFlags, MethodDescriptorFlags};
use crate::cap::shared::{ClassRef, StaticRef, TypeDescriptor};
use crate::record::Record;
use crate::support::bytes_ext::SafeBuf;

/// Descriptor component (tag 11): full access information for every class,
/// field and method, plus the type pool. Not needed to execute a package,
/// but it is the authority for method boundaries in the Method component.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub tag: u8,
    pub size: u32,
    pub size_width: usize,
    pub packages: Vec<PackageDescriptor>,
    pub types: TypeDescriptorInfo,
    pub extended_layout: bool,
}

#[derive(Debug, Clone)]
pub struct PackageDescriptor {
    pub classes: Vec<ClassDescriptorInfo>,
}

#[derive(Debug, Clone)]
pub struct ClassDescriptorInfo {
    pub token: u8,
    pub access_flags: ClassDescriptorFlags,
    pub this_class_ref: ClassRef,
    pub interfaces: Vec<ClassRef>,
    pub fields: Vec<FieldDescriptorInfo>,
    pub methods: Vec<MethodDescriptorInfo>,
}

#[derive(Debug, Clone)]
pub struct FieldDescriptorInfo {
    pub token: u8,
    pub access_flags: FieldDescriptorFlags,
    pub field_ref: FieldRef,
    pub field_type: FieldType,
}

/// Static fields reuse the 3-byte static reference union; instance fields
/// are a class reference plus an instance token.
#[derive(Debug, Clone)]
pub enum FieldRef {
    Static(StaticRef),
    Instance { class: ClassRef, token: u8 },
}

/// High bit set means an inline primitive type code; clear means a 15-bit
/// offset into the type pool.
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    Primitive(u16),
    Reference(u16),
}

#[derive(Debug, Clone)]
pub struct MethodDescriptorInfo {
    pub token: u8,
    pub access_flags: MethodDescriptorFlags,
    pub method_component_block_index: Option<u8>,
    pub method_offset: u16,
    pub type_offset: u16,
    pub bytecode_count: u16,
    pub exception_handler_count: u16,
    pub exception_handler_index: u16,
}

#[derive(Debug, Clone)]
pub struct TypeDescriptorInfo {
    pub constant_pool_types: Vec<u16>,
    pub type_desc: Vec<TypeDescriptor>,
}

fn parse_field(buf: &mut Bytes) -> Result<FieldDescriptorInfo> {
    let token = buf.try_get_u8()?;
    let access_flags = FieldDescriptorFlags::from_raw(buf.try_get_u8()?);

    let field_ref = if access_flags.contains(FieldDescriptorFlags::STATIC) {
        FieldRef::Static(StaticRef::parse(buf)?)
    } else {
        FieldRef::Instance {
            class: ClassRef::parse(buf)?,
            token: buf.try_get_u8()?,
        }
    };

    let type_word = buf.try_get_u16()?;
    let field_type = if type_word & 0x8000 == 0x8000 {
        FieldType::Primitive(type_word & 0x7fff)
    } else {
        FieldType::Reference(type_word)
    };

    Ok(FieldDescriptorInfo {
        token,
        access_flags,
        field_ref,
        field_type,
    })
}

fn parse_method(buf: &mut Bytes, extended: bool) -> Result<MethodDescriptorInfo> {
    let token = buf.try_get_u8()?;
    let access_flags = MethodDescriptorFlags::from_raw(buf.try_get_u8()?);
    let method_component_block_index = if extended {
        Some(buf.try_get_u8()?)
    } else {
        None
    };

    Ok(MethodDescriptorInfo {
        token,
        access_flags,
        method_component_block_index,
        method_offset: buf.try_get_u16()?,
        type_offset: buf.try_get_u16()?,
        bytecode_count: buf.try_get_u16()?,
        exception_handler_count: buf.try_get_u16()?,
        exception_handler_index: buf.try_get_u16()?,
    })
}

fn parse_class(buf: &mut Bytes, extended: bool) -> Result<ClassDescriptorInfo> {
    let token = buf.try_get_u8()?;
    let access_flags = ClassDescriptorFlags::from_raw(buf.try_get_u8()?);
    let this_class_ref = ClassRef::parse(buf)?;
    let interface_count = buf.try_get_u8()?;
    let field_count = buf.try_get_u16()?;
    let method_count = buf.try_get_u16()?;

    let interfaces = (0..interface_count)
        .map(|_| ClassRef::parse(buf))
        .collect::<Result<Vec<_>>>()?;
    let fields = (0..field_count)
        .map(|_| parse_field(buf))
        .collect::<Result<Vec<_>>>()?;
    let methods = (0..method_count)
        .map(|_| parse_method(buf, extended))
        .collect::<Result<Vec<_>>>()?;

    Ok(ClassDescriptorInfo {
        token,
        access_flags,
        this_class_ref,
        interfaces,
        fields,
        methods,
    })
}

fn parse_types(buf: &mut Bytes) -> Result<TypeDescriptorInfo> {
    let constant_pool_count = buf.try_get_u16()?;
    let constant_pool_types = (0..constant_pool_count)
        .map(|_| buf.try_get_u16())
        .collect::<Result<Vec<_>>>()?;

    let mut type_desc = Vec::new();
    while !buf.is_empty() {
        type_desc.push(TypeDescriptor::parse(buf)?);
    }

    Ok(TypeDescriptorInfo {
        constant_pool_types,
        type_desc,
    })
}

impl Descriptor {
    pub fn parse(blob: &[u8], long_size_form: bool) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(blob);

        let tag = buf.try_get_u8()?;

        let (size, size_width, packages) = if long_size_form {
            let size = buf.try_get_u32()?;
            let package_count = buf.try_get_u8()?;
            let packages = (0..package_count)
                .map(|_| {
                    let class_count = buf.try_get_u8()?;
                    let classes = (0..class_count)
                        .map(|_| parse_class(&mut buf, true))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(PackageDescriptor { classes })
                })
                .collect::<Result<Vec<_>>>()?;
            (size, 4, packages)
        } else {
            let size = buf.try_get_u16()?;
            let class_count = buf.try_get_u8()?;
            let classes = (0..class_count)
                .map(|_| parse_class(&mut buf, false))
                .collect::<Result<Vec<_>>>()?;
            (u32::from(size), 2, vec![PackageDescriptor { classes }])
        };

        let types = parse_types(&mut buf)?;

        Ok(Self {
            tag,
            size,
            size_width,
            packages,
            types,
            extended_layout: long_size_form,
        })
    }

    /// `(method_offset, bytecode_count)` pairs for every concrete method,
    /// the authoritative boundaries for splitting the Method component.
    pub fn method_boundaries(&self) -> Vec<(u32, u16)> {
        self.packages
            .iter()
            .flat_map(|p| &p.classes)
            .flat_map(|c| &c.methods)
            .filter(|m| m.method_offset != 0 && m.bytecode_count != 0)
            .map(|m| (u32::from(m.method_offset), m.bytecode_count))
            .collect()
    }

    pub fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert("tag-u1".into(), json!(self.tag));
        rec.insert(format!("size-u{}", self.size_width), json!(self.size));

        if self.extended_layout {
            rec.insert("package_count-u1".into(), json!(self.packages.len()));
            rec.insert(
                "packages".into(),
                json!(self
                    .packages
                    .iter()
                    .map(|package| {
                        json!({
                            "class_count-u1": package.classes.len(),
                            "classes": package
                                .classes
                                .iter()
                                .map(class_value)
                                .collect::<Vec<_>>(),
                        })
                    })
                    .collect::<Vec<_>>()),
            );
        } else if let Some(package) = self.packages.first() {
            rec.insert("class_count-u1".into(), json!(package.classes.len()));
            rec.insert(
                "classes".into(),
                json!(package.classes.iter().map(class_value).collect::<Vec<_>>()),
            );
        }

        rec.insert(
            "types".into(),
            json!({
                "constant_pool_count": self.types.constant_pool_types.len(),
                "constant_pool_types": self.types.constant_pool_types,
                "type_desc": self
                    .types
                    .type_desc
                    .iter()
                    .map(|t| t.to_record())
                    .collect::<Vec<_>>(),
            }),
        );

        rec
    }
}

fn primitive_type_label(code: u16) -> String {
    match code {
        2 => "Boolean".into(),
        3 => "Byte".into(),
        4 => "Short".into(),
        5 => "Int".into(),
        other => format!("{other} (Unknown)"),
    }
}

fn field_value(field: &FieldDescriptorInfo) -> serde_json::Value {
    let field_ref = match &field.field_ref {
        FieldRef::Static(static_ref) => json!({ "static_field": static_ref.to_value(false) }),
        FieldRef::Instance { class, token } => json!({
            "instance_field": { "class": class.to_value(), "token": token }
        }),
    };

    let field_type = match field.field_type {
        FieldType::Primitive(code) => json!({ "primitive_type": primitive_type_label(code) }),
        FieldType::Reference(offset) => json!({ "reference_type": offset }),
    };

    json!({
        "token": field.token,
        "access_flags": field.access_flags.set_names(),
        "field_ref": field_ref,
        "type": field_type,
    })
}

fn method_value(method: &MethodDescriptorInfo) -> serde_json::Value {
    let mut rec = Record::new();
    rec.insert("token-u1".into(), json!(method.token));
    rec.insert(
        "access_flags-u1".into(),
        json!(method.access_flags.set_names()),
    );
    if let Some(block) = method.method_component_block_index {
        rec.insert("method_component_block_index-u1".into(), json!(block));
    }
    rec.insert("method_offset-u2".into(), json!(method.method_offset));
    rec.insert("type_offset-u2".into(), json!(method.type_offset));
    rec.insert("bytecode_count-u2".into(), json!(method.bytecode_count));
    rec.insert(
        "exception_handler_count-u2".into(),
        json!(method.exception_handler_count),
    );
    rec.insert(
        "exception_handler_index-u2".into(),
        json!(method.exception_handler_index),
    );
    json!(rec)
}

fn class_value(class: &ClassDescriptorInfo) -> serde_json::Value {
    let mut rec = Record::new();
    rec.insert("token-u1".into(), json!(class.token));
    rec.insert(
        "access_flags-u1".into(),
        json!(class.access_flags.set_names()),
    );
    rec.insert("this_class_ref-u2".into(), class.this_class_ref.to_value());
    rec.insert("interface_count-u1".into(), json!(class.interfaces.len()));
    rec.insert("field_count-u2".into(), json!(class.fields.len()));
    rec.insert("method_count-u2".into(), json!(class.methods.len()));
    rec.insert(
        "interfaces".into(),
        json!(class
            .interfaces
            .iter()
            .map(|i| i.to_value())
            .collect::<Vec<_>>()),
    );
    rec.insert(
        "fields".into(),
        json!(class.fields.iter().map(field_value).collect::<Vec<_>>()),
    );
    rec.insert(
        "methods".into(),
        json!(class.methods.iter().map(method_value).collect::<Vec<_>>()),
    );
    json!(rec)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_compact() -> Vec<u8> {
        vec![
            0x0b, 0x00, 0x23, //
            0x01, // class_count
            0x00, // token
            0x01, // PUBLIC
            0x00, 0x01, // this_class_ref internal @1
            0x00, // interface_count
            0x00, 0x01, // field_count
            0x00, 0x01, // method_count
            // field: token 0, PUBLIC|STATIC, static internal ref, boolean
            0x00, 0x09, 0x00, 0x00, 0x00, 0x80, 0x02, //
            // method: token 1, PUBLIC, offset 9, type 2, 3 bytecodes
            0x01, 0x01, 0x00, 0x09, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, //
            // types: one cp entry (class -> 0xffff), one descriptor V
            0x00, 0x01, 0xff, 0xff, 0x01, 0x10,
        ]
    }

    #[test]
    fn compact_descriptor_parses_fields_and_methods() {
        let descriptor = Descriptor::parse(&sample_compact(), false).unwrap();
        let class = &descriptor.packages[0].classes[0];

        assert!(class
            .access_flags
            .contains(ClassDescriptorFlags::PUBLIC));
        assert_eq!(class.fields.len(), 1);
        assert!(matches!(
            class.fields[0].field_type,
            FieldType::Primitive(2)
        ));
        assert_eq!(class.methods[0].bytecode_count, 3);
        assert_eq!(descriptor.types.constant_pool_types, vec![0xffff]);
        assert_eq!(descriptor.types.type_desc.len(), 1);
    }

    #[test]
    fn method_boundaries_skip_interface_rows() {
        let descriptor = Descriptor::parse(&sample_compact(), false).unwrap();
        assert_eq!(descriptor.method_boundaries(), vec![(9, 3)]);
    }
}
