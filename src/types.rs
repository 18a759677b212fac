use std::fmt;

/// CAP / EXP format generation. Both file families use the same three
/// published generations, so one type covers them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const V2_1: Version = Version { major: 2, minor: 1 };
    pub const V2_2: Version = Version { major: 2, minor: 2 };
    pub const V2_3: Version = Version { major: 2, minor: 3 };

    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    pub fn at_least(&self, other: Version) -> bool {
        *self >= other
    }

    pub fn is_supported(&self) -> bool {
        matches!(*self, Version::V2_1 | Version::V2_2 | Version::V2_3)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// The twelve standard component kinds plus the custom tag range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Header,
    Directory,
    Applet,
    Import,
    ConstantPool,
    Class,
    Method,
    StaticField,
    RefLocation,
    Export,
    Descriptor,
    Debug,
    StaticResources,
    Custom(u8),
}

impl ComponentKind {
    pub const STANDARD: [ComponentKind; 13] = [
        ComponentKind::Header,
        ComponentKind::Directory,
        ComponentKind::Applet,
        ComponentKind::Import,
        ComponentKind::ConstantPool,
        ComponentKind::Class,
        ComponentKind::Method,
        ComponentKind::StaticField,
        ComponentKind::RefLocation,
        ComponentKind::Export,
        ComponentKind::Descriptor,
        ComponentKind::Debug,
        ComponentKind::StaticResources,
    ];

    pub fn tag(&self) -> u8 {
        match self {
            ComponentKind::Header => 1,
            ComponentKind::Directory => 2,
            ComponentKind::Applet => 3,
            ComponentKind::Import => 4,
            ComponentKind::ConstantPool => 5,
            ComponentKind::Class => 6,
            ComponentKind::Method => 7,
            ComponentKind::StaticField => 8,
            ComponentKind::RefLocation => 9,
            ComponentKind::Export => 10,
            ComponentKind::Descriptor => 11,
            ComponentKind::Debug => 12,
            ComponentKind::StaticResources => 13,
            ComponentKind::Custom(tag) => *tag,
        }
    }

    /// The entry basename stem, as it appears inside a CAP archive.
    pub fn stem(&self) -> &'static str {
        match self {
            ComponentKind::Header => "Header",
            ComponentKind::Directory => "Directory",
            ComponentKind::Applet => "Applet",
            ComponentKind::Import => "Import",
            ComponentKind::ConstantPool => "ConstantPool",
            ComponentKind::Class => "Class",
            ComponentKind::Method => "Method",
            ComponentKind::StaticField => "StaticField",
            ComponentKind::RefLocation => "RefLocation",
            ComponentKind::Export => "Export",
            ComponentKind::Descriptor => "Descriptor",
            ComponentKind::Debug => "Debug",
            ComponentKind::StaticResources => "StaticResources",
            ComponentKind::Custom(_) => "Custom",
        }
    }

    /// Resolves an archive entry basename (`Method.cap`, `method.capx`, ...)
    /// to a standard kind. Custom components are resolved by the caller from
    /// the leading tag byte instead.
    pub fn from_file_name(name: &str) -> Option<ComponentKind> {
        let lower = name.to_ascii_lowercase();
        let stem = lower
            .strip_suffix(".capx")
            .or_else(|| lower.strip_suffix(".cap"))?;

        ComponentKind::STANDARD
            .into_iter()
            .find(|kind| kind.stem().eq_ignore_ascii_case(stem))
    }

    /// Components that widen their size field to u4 in the extended format
    /// and spill into a `.capx` entry.
    pub fn widens_when_extended(&self) -> bool {
        matches!(
            self,
            ComponentKind::Method
                | ComponentKind::RefLocation
                | ComponentKind::Descriptor
                | ComponentKind::Debug
                | ComponentKind::Custom(_)
        )
    }

    /// Width in bytes of this component's leading `size` field.
    pub fn size_width(&self, extended: bool) -> usize {
        match self {
            ComponentKind::StaticResources => 4,
            kind if extended && kind.widens_when_extended() => 4,
            _ => 2,
        }
    }
}
