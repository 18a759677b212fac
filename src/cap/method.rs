use anyhow::Result;
use bytes::Bytes;
use serde_json::json;
use tracing::debug;

use crate::cap::flags::MethodHeaderFlags;
use crate::error::Warning;
use crate::record::Record;
use crate::support::bytes_ext::SafeBuf;
use crate::support::hex;

/// Method component (tag 7): exception handler table(s) plus the method
/// bodies. The bodies carry no length prefixes of their own; their
/// boundaries come from the Descriptor component when it is present, so the
/// region is kept opaque here and split in a second pass.
#[derive(Debug, Clone)]
pub struct Method {
    pub tag: u8,
    pub size: u32,
    /// Width of the size field as observed on disk (2 or 4). An extended
    /// CAP can still ship a short-size Method component when tampered with;
    /// we decode what we see.
    pub size_width: usize,
    pub body: MethodBody,
}

#[derive(Debug, Clone)]
pub enum MethodBody {
    Compact(MethodBlock),
    Extended {
        block_offsets: Vec<u32>,
        blocks: Vec<MethodBlock>,
    },
}

#[derive(Debug, Clone)]
pub struct MethodBlock {
    pub handler_count: u8,
    pub handlers: Vec<ExceptionHandler>,
    /// Offset of the methods region within the component info.
    pub methods_offset: u32,
    pub methods: Vec<u8>,
    /// Individual method_info structures, recovered from Descriptor
    /// boundaries; empty when no authority was available.
    pub split: Vec<MethodInfo>,
}

#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    pub start_offset: u16,
    pub stop_bit: bool,
    pub active_length: u16,
    pub handler_offset: u16,
    pub catch_type_index: u16,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub offset: u32,
    pub flags: MethodHeaderFlags,
    pub max_stack: u8,
    pub nargs: u8,
    pub max_locals: u8,
    pub bytecodes: Vec<u8>,
}

impl ExceptionHandler {
    fn parse(buf: &mut Bytes) -> Result<Self> {
        let start_offset = buf.try_get_u16()?;
        let bitfield = buf.try_get_u16()?;
        Ok(Self {
            start_offset,
            stop_bit: bitfield >> 15 == 1,
            active_length: bitfield & 0x7fff,
            handler_offset: buf.try_get_u16()?,
            catch_type_index: buf.try_get_u16()?,
        })
    }

    fn to_value(&self) -> serde_json::Value {
        json!({
            "start_offset-u2": self.start_offset,
            "bitfield-u2": {
                "stop": u16::from(self.stop_bit),
                "active_length": self.active_length,
            },
            "handler_offset-u2": self.handler_offset,
            "catch_type_index-u2": self.catch_type_index,
        })
    }
}

fn parse_block(
    buf: &mut Bytes,
    block_start: u32,
    methods_len: Option<usize>,
    warnings: &mut Vec<Warning>,
) -> Result<MethodBlock> {
    let handler_count = buf.try_get_u8()?;
    let handlers = (0..handler_count)
        .map(|_| ExceptionHandler::parse(buf))
        .collect::<Result<Vec<_>>>()?;

    // handlers must be sorted ascending by handler_offset
    if handlers
        .windows(2)
        .any(|pair| pair[0].handler_offset > pair[1].handler_offset)
    {
        warnings.push(Warning::InvariantViolation(
            "exception handlers are not sorted by handler_offset".into(),
        ));
    }

    let methods_offset = block_start + 1 + 8 * u32::from(handler_count);
    let methods = match methods_len {
        Some(len) => buf.try_take(len.min(buf.len()))?,
        None => buf.try_take(buf.len())?,
    };

    Ok(MethodBlock {
        handler_count,
        handlers,
        methods_offset,
        methods,
        split: Vec::new(),
    })
}

impl Method {
    pub fn parse(
        blob: &[u8],
        long_size_form: bool,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(blob);

        let tag = buf.try_get_u8()?;

        if long_size_form {
            let size = buf.try_get_u32()?;
            let block_count = buf.try_get_u8()?;
            let block_offsets = (0..block_count)
                .map(|_| buf.try_get_u32())
                .collect::<Result<Vec<_>>>()?;

            let mut blocks = Vec::with_capacity(block_count as usize);
            for (index, &start) in block_offsets.iter().enumerate() {
                let end = block_offsets
                    .get(index + 1)
                    .copied()
                    .unwrap_or(size)
                    .max(start);
                let block_len = (end - start) as usize;
                debug!("method block {index}: info offsets {start}..{end}");

                let handler_count_peek = buf.first().copied().unwrap_or(0);
                let header_len = 1 + 8 * usize::from(handler_count_peek);
                let methods_len = block_len.saturating_sub(header_len);
                blocks.push(parse_block(&mut buf, start, Some(methods_len), warnings)?);
            }

            Ok(Self {
                tag,
                size,
                size_width: 4,
                body: MethodBody::Extended {
                    block_offsets,
                    blocks,
                },
            })
        } else {
            let size = buf.try_get_u16()?;
            let block = parse_block(&mut buf, 0, None, warnings)?;

            Ok(Self {
                tag,
                size: u32::from(size),
                size_width: 2,
                body: MethodBody::Compact(block),
            })
        }
    }

    /// Splits the compact methods region along Descriptor-supplied
    /// `(method_offset, bytecode_count)` boundaries. Out-of-range entries
    /// are reported and skipped; without any authority the region stays one
    /// opaque blob.
    pub fn split_methods(&mut self, boundaries: &[(u32, u16)], warnings: &mut Vec<Warning>) {
        let block = match &mut self.body {
            MethodBody::Compact(block) => block,
            // extended blocks keep their interiors opaque
            MethodBody::Extended { .. } => return,
        };

        let mut sorted: Vec<(u32, u16)> = boundaries.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let region_start = block.methods_offset;
        let region_end = region_start + block.methods.len() as u32;

        for (offset, bytecode_count) in sorted {
            if offset < region_start || offset >= region_end {
                warnings.push(Warning::InvariantViolation(format!(
                    "descriptor method_offset {offset} falls outside the methods region"
                )));
                continue;
            }

            let local = (offset - region_start) as usize;
            let first = block.methods[local];
            let flags = MethodHeaderFlags::from_raw(first >> 4);

            let (header_len, max_stack, nargs, max_locals) =
                if flags.contains(MethodHeaderFlags::EXTENDED) {
                    if local + 4 > block.methods.len() {
                        warnings.push(Warning::InvariantViolation(format!(
                            "extended method header at {offset} is cut short"
                        )));
                        continue;
                    }
                    (
                        4usize,
                        block.methods[local + 1],
                        block.methods[local + 2],
                        block.methods[local + 3],
                    )
                } else {
                    if local + 2 > block.methods.len() {
                        warnings.push(Warning::InvariantViolation(format!(
                            "method header at {offset} is cut short"
                        )));
                        continue;
                    }
                    let second = block.methods[local + 1];
                    (2usize, first & 0x0f, second >> 4, second & 0x0f)
                };

            let body_start = local + header_len;
            let body_end = body_start + bytecode_count as usize;
            if body_end > block.methods.len() {
                warnings.push(Warning::InvariantViolation(format!(
                    "method at {offset} claims {bytecode_count} bytecodes past the region end"
                )));
                continue;
            }

            let bytecodes = block.methods[body_start..body_end].to_vec();

            // cannot tell operands from opcodes without decoding, hence
            // "possible" and at most one report per method
            if let Some(position) = bytecodes.iter().position(|b| *b == 0xfe || *b == 0xff) {
                let opcode = bytecodes[position];
                warnings.push(Warning::ForbiddenInstruction {
                    method_offset: offset,
                    opcode,
                    mnemonic: if opcode == 0xfe { "impdep1" } else { "impdep2" },
                });
            }

            block.split.push(MethodInfo {
                offset,
                flags,
                max_stack,
                nargs,
                max_locals,
                bytecodes,
            });
        }
    }

    pub fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert("tag-u1".into(), json!(self.tag));
        rec.insert(format!("size-u{}", self.size_width), json!(self.size));

        match &self.body {
            MethodBody::Compact(block) => {
                rec.insert("handler_count-u1".into(), json!(block.handler_count));
                rec.insert(
                    "exception_handlers".into(),
                    json!(block
                        .handlers
                        .iter()
                        .map(|h| h.to_value())
                        .collect::<Vec<_>>()),
                );
                rec.insert("methods".into(), json!(hex::encode(&block.methods)));
                if !block.split.is_empty() {
                    rec.insert(
                        "method_infos".into(),
                        json!(block
                            .split
                            .iter()
                            .map(method_info_value)
                            .collect::<Vec<_>>()),
                    );
                }
            }
            MethodBody::Extended {
                block_offsets,
                blocks,
            } => {
                rec.insert(
                    "method_component_block_count-u1".into(),
                    json!(blocks.len()),
                );
                rec.insert(
                    "method_component_block_offsets-u4".into(),
                    json!(block_offsets),
                );
                rec.insert(
                    "blocks".into(),
                    json!(blocks
                        .iter()
                        .map(|block| {
                            json!({
                                "handler_count": block.handler_count,
                                "exception_handlers": block
                                    .handlers
                                    .iter()
                                    .map(|h| h.to_value())
                                    .collect::<Vec<_>>(),
                                "methods": hex::encode(&block.methods),
                            })
                        })
                        .collect::<Vec<_>>()),
                );
            }
        }

        rec
    }
}

fn method_info_value(info: &MethodInfo) -> serde_json::Value {
    let mut names = Vec::new();
    if info.flags.contains(MethodHeaderFlags::ABSTRACT) {
        names.push("ABSTRACT");
    }
    if info.flags.contains(MethodHeaderFlags::EXTENDED) {
        names.push("EXTENDED");
    }

    json!({
        "offset-u2": info.offset,
        "flags-u4b": names,
        "max_stack": info.max_stack,
        "nargs": info.nargs,
        "max_locals": info.max_locals,
        "bytecode_count-u2": info.bytecodes.len(),
        "bytecodes": hex::encode(&info.bytecodes),
    })
}
