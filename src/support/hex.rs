use anyhow::{bail, Result};

/// Lowercase hex, the canonical spelling of every `raw` field.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Case-insensitive decode of a plain (already normalized) hex string.
pub fn decode(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        bail!("odd number of hex digits ({})", hex.len());
    }

    let mut out = Vec::with_capacity(hex.len() / 2);
    let digits: Vec<char> = hex.chars().collect();
    for pair in digits.chunks(2) {
        let hi = hex_value(pair[0])?;
        let lo = hex_value(pair[1])?;
        out.push((hi << 4) | lo);
    }

    Ok(out)
}

fn hex_value(c: char) -> Result<u8> {
    c.to_digit(16)
        .map(|d| d as u8)
        .ok_or_else(|| anyhow::anyhow!("'{c}' is not a hex digit"))
}

/// Normalizes an annotated `raw_modified` string down to plain lowercase hex.
///
/// `(...)` and `[...]` are comments and vanish with their contents. `<...>`
/// is an inline annotation: the angle brackets and any comments inside them
/// vanish, the hex payload stays. Whitespace, `|` and `,` are separators.
/// Grouping does not nest; the first matching closer ends a group.
pub fn normalize_annotated(input: &str) -> Result<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '(' => i = skip_comment(&chars, i, ')')?,
            '[' => i = skip_comment(&chars, i, ']')?,
            '<' => {
                i += 1;
                loop {
                    match chars.get(i) {
                        None => bail!("unclosed '<' annotation"),
                        Some('>') => {
                            i += 1;
                            break;
                        }
                        Some('(') => i = skip_comment(&chars, i, ')')?,
                        Some('[') => i = skip_comment(&chars, i, ']')?,
                        Some(c) if is_separator(*c) => i += 1,
                        Some(c) if c.is_ascii_hexdigit() => {
                            out.push(c.to_ascii_lowercase());
                            i += 1;
                        }
                        Some(c) => bail!("unexpected character '{c}' inside annotation"),
                    }
                }
            }
            c if is_separator(c) => i += 1,
            c if c.is_ascii_hexdigit() => {
                out.push(c.to_ascii_lowercase());
                i += 1;
            }
            c => bail!("unexpected character '{c}'"),
        }
    }

    if out.len() % 2 != 0 {
        bail!("normalized hex has odd length ({})", out.len());
    }

    Ok(out)
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == '|' || c == ','
}

fn skip_comment(chars: &[char], open: usize, closer: char) -> Result<usize> {
    let mut i = open + 1;
    while i < chars.len() {
        if chars[i] == closer {
            return Ok(i + 1);
        }
        i += 1;
    }
    bail!("unclosed '{}' comment", chars[open]);
}
