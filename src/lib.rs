//! Capastrophic: a toolkit for inspecting and manipulating Java Card CAP
//! and EXP files.
//!
//! The codec decodes a CAP archive (or a flat EXP file) into an ordered,
//! human-editable JSON form and reassembles a binary from it. Reassembly is
//! "shallow": each component emits its recorded source bytes, or a
//! user-edited `raw_modified` hex override, verbatim. A decode-then-encode
//! with no edits reproduces every component blob byte for byte, and edits
//! stay local to the component they were made in. The tool exists to study
//! (possibly tampered) CAP files, so decoding is deliberately tolerant:
//! inconsistencies become warnings, and only an unreadable envelope or a
//! truncated component aborts.

pub mod cap;
pub mod envelope;
pub mod error;
pub mod exp;
pub mod record;
pub mod support;
pub mod types;
