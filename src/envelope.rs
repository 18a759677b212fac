//! The outermost layer of a CAP file: a ZIP archive holding one named entry
//! per component. Nothing here interprets component internals; entries are
//! opaque byte strings keyed by their basename.

use std::io::{Cursor, Read, Write};

use indexmap::IndexMap;
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::CodecError;
use crate::types::ComponentKind;

/// Reads every component entry out of a CAP archive, in archive order.
///
/// Entries whose basename does not end in `.cap`/`.capx` (manifests,
/// directories) are skipped. A `.cap`/`.capx` basename outside the standard
/// set is accepted as a custom component when its leading tag byte is in the
/// custom range 128-255, and rejected as [`CodecError::UnknownEntry`]
/// otherwise. Duplicate basenames keep the last occurrence.
pub fn read_cap(bytes: &[u8]) -> Result<IndexMap<String, Vec<u8>>, CodecError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| CodecError::InvalidEnvelope(e.to_string()))?;

    let mut entries = IndexMap::new();

    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| CodecError::InvalidEnvelope(e.to_string()))?;

        if !file.is_file() {
            continue;
        }

        let name = file.name().to_string();
        let base = name.rsplit('/').next().unwrap_or(&name).to_string();
        let lower = base.to_ascii_lowercase();

        if !lower.ends_with(".cap") && !lower.ends_with(".capx") {
            debug!("skipping non-component entry '{name}'");
            continue;
        }

        let mut blob = Vec::new();
        file.read_to_end(&mut blob)
            .map_err(|e| CodecError::InvalidEnvelope(e.to_string()))?;

        if ComponentKind::from_file_name(&base).is_none() {
            let tag = blob.first().copied().unwrap_or(0);
            if tag < 128 {
                return Err(CodecError::UnknownEntry(base));
            }
        }

        entries.insert(base, blob);
    }

    Ok(entries)
}

/// Writes components back into a ZIP archive, preserving caller order.
/// Entries are stored uncompressed so the component bytes land verbatim.
pub fn write_cap(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, CodecError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);

    for (name, blob) in entries {
        writer
            .start_file(name, options)
            .map_err(|e| CodecError::InvalidEnvelope(e.to_string()))?;
        writer
            .write_all(blob)
            .map_err(|e| CodecError::InvalidEnvelope(e.to_string()))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| CodecError::InvalidEnvelope(e.to_string()))?;

    Ok(cursor.into_inner())
}
