use thiserror::Error;

/// Hard failures. Decoding only aborts when the envelope is unreadable or a
/// component runs out of bytes mid-field; everything else is a [`Warning`].
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unreadable CAP archive: {0}")]
    InvalidEnvelope(String),

    #[error("archive entry '{0}' is neither a standard component nor a custom component")]
    UnknownEntry(String),

    #[error("unsupported CAP format version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("component '{component}' is truncated: {reason}")]
    TruncatedComponent { component: String, reason: String },

    #[error("raw_modified for '{component}' is not valid hex: {reason}")]
    MalformedHex { component: String, reason: String },

    #[error("mandatory component '{0}' was not found in the archive")]
    MissingComponent(String),
}

/// Findings that are reported but never abort a decode. The tool exists to
/// study tampered CAP files, so inconsistencies are data, not failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    #[error("directory records {recorded} bytes for '{component}' but the component holds {actual}")]
    InconsistentSize {
        component: String,
        recorded: u32,
        actual: u32,
    },

    #[error("component '{component}' carries tag {found} where {expected} was expected")]
    TagMismatch {
        component: String,
        expected: u8,
        found: u8,
    },

    #[error("header declares the extended format but '{component}' arrived in short-size form")]
    ShortSizeForm { component: String },

    #[error("possible {mnemonic} (0x{opcode:02x}) in method at offset {method_offset}")]
    ForbiddenInstruction {
        method_offset: u32,
        opcode: u8,
        mnemonic: &'static str,
    },

    #[error("{0}")]
    InvariantViolation(String),
}
