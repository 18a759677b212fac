//! Flag fields scattered through the CAP schemas. Each one maps a byte or a
//! nibble to a closed set of names; unknown bits are reported and dropped
//! rather than failing, since tampered files are expected input.

use bitflags::bitflags;
use tracing::warn;

macro_rules! lenient_flags {
    ( $flag_type:ident, $raw_type:ty ) => {
        impl $flag_type {
            /// Decodes a raw flag field, shedding any bits outside the
            /// defined set. The stray mask is reported so a tampered field
            /// is visible in the log without derailing the decode.
            pub fn from_raw(raw: $raw_type) -> Self {
                let known = Self::from_bits_truncate(raw);
                let stray = raw & !known.bits();
                if stray != 0 {
                    warn!(
                        "{} carries undefined bit(s) 0x{stray:02x} in raw value 0x{raw:02x}",
                        stringify!($flag_type)
                    );
                }
                known
            }
        }
    };
}

bitflags! {
    /// Header component flags byte.
    pub struct HeaderFlags: u8 {
        const INT = 0x01;
        const EXPORT = 0x02;
        const APPLET = 0x04;
        const EXTENDED = 0x08;
    }
}

bitflags! {
    /// Flags nibble of `interface_info` / `class_info`.
    pub struct ClassFlags: u8 {
        const REMOTE = 0x02;
        const SHAREABLE = 0x04;
        const INTERFACE = 0x08;
    }
}

bitflags! {
    /// Flags nibble of a `method_header_info`.
    pub struct MethodHeaderFlags: u8 {
        const ABSTRACT = 0x04;
        const EXTENDED = 0x08;
    }
}

bitflags! {
    /// `access_flags` byte of a field descriptor.
    pub struct FieldDescriptorFlags: u8 {
        const PUBLIC = 0x01;
        const PRIVATE = 0x02;
        const PROTECTED = 0x04;
        const STATIC = 0x08;
        const FINAL = 0x10;
    }
}

bitflags! {
    /// `access_flags` byte of a method descriptor.
    pub struct MethodDescriptorFlags: u8 {
        const PUBLIC = 0x01;
        const PRIVATE = 0x02;
        const PROTECTED = 0x04;
        const STATIC = 0x08;
        const FINAL = 0x10;
        const ABSTRACT = 0x40;
        const INIT = 0x80;
    }
}

bitflags! {
    /// `access_flags` byte of a class descriptor.
    pub struct ClassDescriptorFlags: u8 {
        const PUBLIC = 0x01;
        const FINAL = 0x10;
        const INTERFACE = 0x40;
        const ABSTRACT = 0x80;
    }
}

bitflags! {
    /// `access_flags` word in EXP files and Export-component consumers.
    pub struct ExportAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SHAREABLE = 0x0800;
        const REMOTE = 0x1000;
    }
}

lenient_flags!(HeaderFlags, u8);
lenient_flags!(ClassFlags, u8);
lenient_flags!(MethodHeaderFlags, u8);
lenient_flags!(FieldDescriptorFlags, u8);
lenient_flags!(MethodDescriptorFlags, u8);
lenient_flags!(ClassDescriptorFlags, u8);
lenient_flags!(ExportAccessFlags, u16);

impl HeaderFlags {
    /// Every flag spelled out, present or not, the way the JSON form lists
    /// them (`"APPLET"` vs `"No-APPLET"`).
    pub fn marked_names(&self) -> Vec<String> {
        [
            (Self::INT, "INT"),
            (Self::EXPORT, "EXPORT"),
            (Self::APPLET, "APPLET"),
            (Self::EXTENDED, "EXTENDED"),
        ]
        .iter()
        .map(|(flag, name)| {
            if self.contains(*flag) {
                (*name).to_string()
            } else {
                format!("No-{name}")
            }
        })
        .collect()
    }
}

impl ClassFlags {
    pub fn marked_names(&self) -> Vec<String> {
        [
            (Self::REMOTE, "REMOTE"),
            (Self::SHAREABLE, "SHAREABLE"),
            (Self::INTERFACE, "INTERFACE"),
        ]
        .iter()
        .map(|(flag, name)| {
            if self.contains(*flag) {
                (*name).to_string()
            } else {
                format!("Not-{name}")
            }
        })
        .collect()
    }
}

impl FieldDescriptorFlags {
    pub fn set_names(&self) -> Vec<&'static str> {
        [
            (Self::PUBLIC, "PUBLIC"),
            (Self::PRIVATE, "PRIVATE"),
            (Self::PROTECTED, "PROTECTED"),
            (Self::STATIC, "STATIC"),
            (Self::FINAL, "FINAL"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect()
    }
}

impl MethodDescriptorFlags {
    pub fn set_names(&self) -> Vec<&'static str> {
        [
            (Self::PUBLIC, "PUBLIC"),
            (Self::PRIVATE, "PRIVATE"),
            (Self::PROTECTED, "PROTECTED"),
            (Self::STATIC, "STATIC"),
            (Self::FINAL, "FINAL"),
            (Self::ABSTRACT, "ABSTRACT"),
            (Self::INIT, "INIT"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect()
    }
}

impl ClassDescriptorFlags {
    pub fn set_names(&self) -> Vec<&'static str> {
        [
            (Self::PUBLIC, "PUBLIC"),
            (Self::FINAL, "FINAL"),
            (Self::INTERFACE, "INTERFACE"),
            (Self::ABSTRACT, "ABSTRACT"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect()
    }
}

impl ExportAccessFlags {
    /// Dash-joined modifier spelling used by the EXP intermediate form.
    pub fn joined_names(&self) -> String {
        [
            (Self::PUBLIC, "Public"),
            (Self::FINAL, "Final"),
            (Self::INTERFACE, "Interface"),
            (Self::ABSTRACT, "Abstract"),
            (Self::SHAREABLE, "Shareable"),
            (Self::REMOTE, "Remote"),
            (Self::PROTECTED, "Protected"),
            (Self::STATIC, "Static"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join("-")
    }
}
