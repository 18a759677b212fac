//! The CAP coordinator: owns the cross-component state (format version,
//! extended flag, directory size table) and drives the per-component codecs
//! in the right order.

pub mod applet;
pub mod class;
pub mod constant_pool;
pub mod custom;
pub mod descriptor;
pub mod directory;
pub mod export;
pub mod flags;
pub mod header;
pub mod import;
pub mod method;
pub mod ref_location;
pub mod shared;
pub mod static_field;
pub mod static_resources;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::envelope;
use crate::error::{CodecError, Warning};
use crate::record::{get_str, Record};
use crate::support::hex;
use crate::types::{ComponentKind, Version};

use self::applet::Applet;
use self::class::Class;
use self::constant_pool::ConstantPool;
use self::custom::OpaqueComponent;
use self::descriptor::Descriptor;
use self::directory::Directory;
use self::export::Export;
use self::flags::HeaderFlags;
use self::header::Header;
use self::import::Import;
use self::method::Method;
use self::ref_location::RefLocation;
use self::static_field::StaticField;
use self::static_resources::StaticResources;

/// Shared decode context, fixed once the Header has been read.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub version: Version,
    pub extended: bool,
}

#[derive(Debug, Clone)]
pub enum Parsed {
    Header(Header),
    Directory(Directory),
    Applet(Applet),
    Import(Import),
    ConstantPool(ConstantPool),
    Class(Class),
    Method(Method),
    StaticField(StaticField),
    RefLocation(RefLocation),
    Export(Export),
    Descriptor(Descriptor),
    StaticResources(StaticResources),
    Opaque(OpaqueComponent),
}

/// One archive entry: its exact source bytes plus whatever structure the
/// decoder recovered. `raw` is authoritative on encode (shallow mode);
/// `raw_modified` overrides it when a user supplies one.
#[derive(Debug, Clone)]
pub struct Component {
    pub name: String,
    pub kind: ComponentKind,
    pub raw: Vec<u8>,
    pub raw_modified: String,
    pub parsed: Option<Parsed>,
}

#[derive(Debug, Clone)]
pub struct Cap {
    pub context: Context,
    pub components: Vec<Component>,
    pub warnings: Vec<Warning>,
}

/// Summary of the identities a CAP carries, for `capinfo`-style listings.
#[derive(Debug, Clone)]
pub struct CapSummary {
    pub package_aid: Vec<u8>,
    pub package_version: String,
    pub applet_aids: Vec<Vec<u8>>,
    pub imports: Vec<(Vec<u8>, String)>,
}

fn hard_error(component: &str, err: anyhow::Error) -> CodecError {
    match err.downcast::<CodecError>() {
        Ok(codec) => codec,
        Err(other) => CodecError::TruncatedComponent {
            component: component.to_string(),
            reason: other.to_string(),
        },
    }
}

impl Cap {
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let entries = envelope::read_cap(bytes)?;

        let find = |kind: ComponentKind| {
            entries
                .iter()
                .find(|(name, _)| ComponentKind::from_file_name(name) == Some(kind))
                .map(|(name, blob)| (name.clone(), blob.clone()))
        };

        let mut warnings = Vec::new();

        let (header_name, header_blob) = find(ComponentKind::Header)
            .ok_or_else(|| CodecError::MissingComponent("Header.cap".into()))?;
        let header = Header::parse(&header_blob, &mut warnings)
            .map_err(|e| hard_error(&header_name, e))?;
        let context = Context {
            version: header.version,
            extended: header.extended(),
        };
        debug!(
            "decoding CAP format {} ({})",
            context.version,
            if context.extended { "extended" } else { "compact" }
        );

        let (directory_name, directory_blob) = find(ComponentKind::Directory)
            .ok_or_else(|| CodecError::MissingComponent("Directory.cap".into()))?;
        let directory = Directory::parse(&directory_blob, context.version, context.extended)
            .map_err(|e| hard_error(&directory_name, e))?;

        let mut components = Vec::with_capacity(entries.len());

        for (name, blob) in &entries {
            let kind = ComponentKind::from_file_name(name)
                .unwrap_or_else(|| ComponentKind::Custom(blob.first().copied().unwrap_or(0)));

            check_tag(name, kind, blob, &mut warnings);

            // an extended CAP is allowed to widen these; a tampered one may
            // not have, so the observed entry name wins
            let long_size_form = match kind {
                ComponentKind::StaticResources => false,
                k if k.widens_when_extended() && context.extended => {
                    let capx = name.to_ascii_lowercase().ends_with(".capx");
                    if !capx {
                        warnings.push(Warning::ShortSizeForm {
                            component: name.clone(),
                        });
                    }
                    capx
                }
                _ => false,
            };

            let parsed = match kind {
                ComponentKind::Header => Some(Parsed::Header(header.clone())),
                ComponentKind::Directory => Some(Parsed::Directory(directory.clone())),
                ComponentKind::Applet => Some(Parsed::Applet(
                    Applet::parse(blob, context.extended, &mut warnings)
                        .map_err(|e| hard_error(name, e))?,
                )),
                ComponentKind::Import => {
                    Some(Parsed::Import(Import::parse(blob).map_err(|e| hard_error(name, e))?))
                }
                ComponentKind::ConstantPool => Some(Parsed::ConstantPool(
                    ConstantPool::parse(blob).map_err(|e| hard_error(name, e))?,
                )),
                ComponentKind::Class => Some(Parsed::Class(
                    Class::parse(blob, context.version, context.extended, &mut warnings)
                        .map_err(|e| hard_error(name, e))?,
                )),
                ComponentKind::Method => Some(Parsed::Method(
                    Method::parse(blob, long_size_form, &mut warnings)
                        .map_err(|e| hard_error(name, e))?,
                )),
                ComponentKind::StaticField => Some(Parsed::StaticField(
                    StaticField::parse(blob, &mut warnings).map_err(|e| hard_error(name, e))?,
                )),
                ComponentKind::RefLocation => Some(Parsed::RefLocation(
                    RefLocation::parse(blob, long_size_form).map_err(|e| hard_error(name, e))?,
                )),
                ComponentKind::Export => Some(Parsed::Export(
                    Export::parse(blob, context.extended).map_err(|e| hard_error(name, e))?,
                )),
                ComponentKind::Descriptor => Some(Parsed::Descriptor(
                    Descriptor::parse(blob, long_size_form).map_err(|e| hard_error(name, e))?,
                )),
                ComponentKind::StaticResources => Some(Parsed::StaticResources(
                    StaticResources::parse(blob, &mut warnings)
                        .map_err(|e| hard_error(name, e))?,
                )),
                ComponentKind::Debug | ComponentKind::Custom(_) => Some(Parsed::Opaque(
                    OpaqueComponent::parse(blob, long_size_form)
                        .map_err(|e| hard_error(name, e))?,
                )),
            };

            components.push(Component {
                name: name.clone(),
                kind,
                raw: blob.clone(),
                raw_modified: String::new(),
                parsed,
            });
        }

        let mut cap = Cap {
            context,
            components,
            warnings: Vec::new(),
        };

        cap.check_directory_sizes(&directory, &mut warnings);
        cap.check_flag_presence(&header, &mut warnings);
        cap.split_methods(&mut warnings);
        cap.check_export(&header, &mut warnings);

        for warning in &warnings {
            warn!("{warning}");
        }
        cap.warnings = warnings;

        Ok(cap)
    }

    fn component(&self, kind: ComponentKind) -> Option<&Component> {
        self.components.iter().find(|c| c.kind == kind)
    }

    pub fn header(&self) -> Option<&Header> {
        match self.component(ComponentKind::Header)?.parsed.as_ref()? {
            Parsed::Header(h) => Some(h),
            _ => None,
        }
    }

    pub fn directory(&self) -> Option<&Directory> {
        match self.component(ComponentKind::Directory)?.parsed.as_ref()? {
            Parsed::Directory(d) => Some(d),
            _ => None,
        }
    }

    pub fn applet(&self) -> Option<&Applet> {
        match self.component(ComponentKind::Applet)?.parsed.as_ref()? {
            Parsed::Applet(a) => Some(a),
            _ => None,
        }
    }

    pub fn import(&self) -> Option<&Import> {
        match self.component(ComponentKind::Import)?.parsed.as_ref()? {
            Parsed::Import(i) => Some(i),
            _ => None,
        }
    }

    pub fn constant_pool(&self) -> Option<&ConstantPool> {
        match self.component(ComponentKind::ConstantPool)?.parsed.as_ref()? {
            Parsed::ConstantPool(p) => Some(p),
            _ => None,
        }
    }

    pub fn class_component(&self) -> Option<&Class> {
        match self.component(ComponentKind::Class)?.parsed.as_ref()? {
            Parsed::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn method(&self) -> Option<&Method> {
        match self.component(ComponentKind::Method)?.parsed.as_ref()? {
            Parsed::Method(m) => Some(m),
            _ => None,
        }
    }

    pub fn static_field(&self) -> Option<&StaticField> {
        match self.component(ComponentKind::StaticField)?.parsed.as_ref()? {
            Parsed::StaticField(s) => Some(s),
            _ => None,
        }
    }

    pub fn ref_location(&self) -> Option<&RefLocation> {
        match self.component(ComponentKind::RefLocation)?.parsed.as_ref()? {
            Parsed::RefLocation(r) => Some(r),
            _ => None,
        }
    }

    pub fn export(&self) -> Option<&Export> {
        match self.component(ComponentKind::Export)?.parsed.as_ref()? {
            Parsed::Export(e) => Some(e),
            _ => None,
        }
    }

    pub fn descriptor(&self) -> Option<&Descriptor> {
        match self.component(ComponentKind::Descriptor)?.parsed.as_ref()? {
            Parsed::Descriptor(d) => Some(d),
            _ => None,
        }
    }

    fn observed_size_width(component: &Component, extended: bool) -> usize {
        match component.parsed.as_ref() {
            Some(Parsed::Method(m)) => m.size_width,
            Some(Parsed::RefLocation(r)) => r.size_width,
            Some(Parsed::Descriptor(d)) => d.size_width,
            Some(Parsed::Opaque(o)) => o.size_width,
            _ => component.kind.size_width(extended),
        }
    }

    fn check_directory_sizes(&self, directory: &Directory, warnings: &mut Vec<Warning>) {
        for (kind, recorded) in &directory.component_sizes {
            match self.component(*kind) {
                Some(component) => {
                    let header_len = 1 + Self::observed_size_width(component, self.context.extended);
                    let actual = component.raw.len().saturating_sub(header_len) as u32;
                    if actual != *recorded {
                        warnings.push(Warning::InconsistentSize {
                            component: component.name.clone(),
                            recorded: *recorded,
                            actual,
                        });
                    }
                }
                None => {
                    if *recorded != 0 {
                        warnings.push(Warning::InconsistentSize {
                            component: format!("{}.cap", kind.stem()),
                            recorded: *recorded,
                            actual: 0,
                        });
                    }
                }
            }
        }

        for custom in &directory.custom_components {
            let found = self.components.iter().find(|c| {
                matches!(c.kind, ComponentKind::Custom(tag) if tag == custom.component_tag)
            });
            match found {
                Some(component) => {
                    let header_len = 1 + Self::observed_size_width(component, self.context.extended);
                    let actual = component.raw.len().saturating_sub(header_len) as u32;
                    if actual != custom.size {
                        warnings.push(Warning::InconsistentSize {
                            component: component.name.clone(),
                            recorded: custom.size,
                            actual,
                        });
                    }
                }
                None => warnings.push(Warning::InvariantViolation(format!(
                    "directory lists custom component tag {} that is not in the archive",
                    custom.component_tag
                ))),
            }
        }
    }

    fn check_flag_presence(&self, header: &Header, warnings: &mut Vec<Warning>) {
        let has_applet = self.component(ComponentKind::Applet).is_some();
        let has_export = self.component(ComponentKind::Export).is_some();

        if header.flags.contains(HeaderFlags::APPLET) != has_applet {
            warnings.push(Warning::InvariantViolation(format!(
                "header ACC_APPLET is {} but the Applet component is {}",
                header.flags.contains(HeaderFlags::APPLET),
                if has_applet { "present" } else { "absent" }
            )));
        }
        if header.flags.contains(HeaderFlags::EXPORT) != has_export {
            warnings.push(Warning::InvariantViolation(format!(
                "header ACC_EXPORT is {} but the Export component is {}",
                header.flags.contains(HeaderFlags::EXPORT),
                if has_export { "present" } else { "absent" }
            )));
        }
    }

    fn split_methods(&mut self, warnings: &mut Vec<Warning>) {
        let boundaries = match self.descriptor() {
            Some(descriptor) => descriptor.method_boundaries(),
            None => return,
        };
        if boundaries.is_empty() {
            return;
        }

        if let Some(component) = self
            .components
            .iter_mut()
            .find(|c| c.kind == ComponentKind::Method)
        {
            if let Some(Parsed::Method(method)) = component.parsed.as_mut() {
                method.split_methods(&boundaries, warnings);
            }
        }
    }

    fn check_export(&self, header: &Header, warnings: &mut Vec<Warning>) {
        let (Some(export), Some(class)) = (self.export(), self.class_component()) else {
            return;
        };
        export.check_against_class(
            &class.interface_offsets(),
            header.flags.contains(HeaderFlags::APPLET),
            warnings,
        );
    }

    /// The intermediate form: component filename -> record, in envelope
    /// order, every record led by `raw` / `raw_modified`.
    pub fn to_json(&self) -> Value {
        let mut root = Record::new();

        for component in &self.components {
            let mut rec = Record::new();
            rec.insert("raw".into(), json!(hex::encode(&component.raw)));
            rec.insert("raw_modified".into(), json!(component.raw_modified));

            if let Some(parsed) = &component.parsed {
                let fields = match parsed {
                    Parsed::Header(h) => h.to_record(),
                    Parsed::Directory(d) => d.to_record(self.context.extended),
                    Parsed::Applet(a) => a.to_record(),
                    Parsed::Import(i) => i.to_record(),
                    Parsed::ConstantPool(p) => p.to_record(self.context.version),
                    Parsed::Class(c) => c.to_record(),
                    Parsed::Method(m) => m.to_record(),
                    Parsed::StaticField(s) => s.to_record(),
                    Parsed::RefLocation(r) => r.to_record(),
                    Parsed::Export(e) => e.to_record(),
                    Parsed::Descriptor(d) => d.to_record(),
                    Parsed::StaticResources(s) => s.to_record(),
                    Parsed::Opaque(o) => o.to_record(),
                };
                for (key, value) in fields {
                    rec.insert(key, value);
                }
            }

            root.insert(component.name.clone(), json!(rec));
        }

        json!(root)
    }

    /// Shallow encode of this decoded CAP: every component contributes its
    /// `raw_modified` (normalized) when set, else its exact `raw` bytes.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let entries = self
            .components
            .iter()
            .map(|component| {
                let bytes = if component.raw_modified.is_empty() {
                    component.raw.clone()
                } else {
                    decode_modified(&component.name, &component.raw_modified)?
                };
                Ok((component.name.clone(), bytes))
            })
            .collect::<Result<Vec<_>, CodecError>>()?;

        envelope::write_cap(&entries)
    }

    pub fn summary(&self) -> CapSummary {
        let (package_aid, package_version) = match self.header() {
            Some(header) => (
                header.cap_aid().to_vec(),
                header.cap_version().to_string(),
            ),
            None => (Vec::new(), String::new()),
        };

        let applet_aids = self
            .applet()
            .map(|applet| applet.applets.iter().map(|a| a.aid.clone()).collect())
            .unwrap_or_default();

        let imports = self
            .import()
            .map(|import| {
                import
                    .packages
                    .iter()
                    .map(|p| (p.aid.clone(), p.version.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        CapSummary {
            package_aid,
            package_version,
            applet_aids,
            imports,
        }
    }
}

fn check_tag(name: &str, kind: ComponentKind, blob: &[u8], warnings: &mut Vec<Warning>) {
    if let ComponentKind::Custom(_) = kind {
        return;
    }
    let expected = kind.tag();
    let found = blob.first().copied().unwrap_or(0);
    if found != expected {
        warnings.push(Warning::TagMismatch {
            component: name.to_string(),
            expected,
            found,
        });
    }
}

fn decode_modified(component: &str, raw_modified: &str) -> Result<Vec<u8>, CodecError> {
    let normalized =
        hex::normalize_annotated(raw_modified).map_err(|e| CodecError::MalformedHex {
            component: component.to_string(),
            reason: e.to_string(),
        })?;
    hex::decode(&normalized).map_err(|e| CodecError::MalformedHex {
        component: component.to_string(),
        reason: e.to_string(),
    })
}

/// Shallow encode straight from the intermediate form. Components are
/// emitted in record order; each contributes its normalized `raw_modified`
/// when set, else its `raw` bytes. No invariant is checked and no size is
/// recomputed: consistency-dependent edits are deliberately left alone.
pub fn encode_json(intermediate: &Value) -> Result<Vec<u8>, CodecError> {
    let root = intermediate
        .as_object()
        .ok_or_else(|| CodecError::InvalidEnvelope("intermediate form is not an object".into()))?;

    let mut entries = Vec::with_capacity(root.len());

    for (name, record) in root {
        let modified = get_str(record, "raw_modified").unwrap_or_default();
        let bytes = if !modified.is_empty() {
            decode_modified(name, modified)?
        } else {
            match get_str(record, "raw") {
                Some(raw) => hex::decode(raw).map_err(|e| CodecError::MalformedHex {
                    component: name.clone(),
                    reason: e.to_string(),
                })?,
                None => {
                    return Err(CodecError::MalformedHex {
                        component: name.clone(),
                        reason: "record carries neither raw_modified nor raw".into(),
                    })
                }
            }
        };
        entries.push((name.clone(), bytes));
    }

    envelope::write_cap(&entries)
}
