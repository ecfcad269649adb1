//! Program image loaders.
//!
//! Two text formats are accepted:
//!
//! - Intel HEX (`:LLAAAATT[DD...]CC`), record types 00 (data), 01 (EOF),
//!   02 (extended segment address) and 04 (extended linear address). Byte
//!   address `a` lands in word `a / 2`, high byte first.
//! - Word lists as read by `$readmemh`: whitespace-separated hex words,
//!   `@addr` origin directives and `//`, `#` or `;` comments.

use crate::error::{Error, Result};

/// Parse Intel HEX and load into word memory.
///
/// Returns the number of words spanned (highest word address reached + 1).
pub fn parse_hex(hex: &str, words: &mut [u16]) -> Result<usize> {
    let mut max_word = 0usize;
    let mut base_addr: u32 = 0;

    for (n, line) in hex.lines().enumerate() {
        let line_no = n + 1;
        let line = line.trim();
        if line.is_empty() { continue; }
        if !line.starts_with(':') {
            continue; // skip non-hex lines
        }

        let bytes = hex_line_to_bytes(&line[1..])
            .map_err(|reason| Error::Parse { line: line_no, reason })?;
        if bytes.len() < 5 {
            return Err(Error::Parse { line: line_no, reason: "record too short".into() });
        }

        let byte_count = bytes[0] as usize;
        if bytes.len() != byte_count + 5 {
            return Err(Error::Parse { line: line_no, reason: format!("length field says {} bytes", byte_count) });
        }
        let addr = ((bytes[1] as u16) << 8) | bytes[2] as u16;
        let record_type = bytes[3];

        let sum: u8 = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        if sum != 0 {
            return Err(Error::Checksum { line: line_no, sum });
        }

        match record_type {
            0x00 => {
                let full_addr = base_addr + addr as u32;
                for i in 0..byte_count {
                    let byte_addr = full_addr as usize + i;
                    let w = byte_addr / 2;
                    if w >= words.len() {
                        return Err(Error::Overflow(w));
                    }
                    let b = bytes[4 + i] as u16;
                    words[w] = if byte_addr % 2 == 0 {
                        (words[w] & 0x00FF) | (b << 8)
                    } else {
                        (words[w] & 0xFF00) | b
                    };
                    max_word = max_word.max(w + 1);
                }
            }
            0x01 => break,
            0x02 => {
                if byte_count >= 2 {
                    base_addr = (((bytes[4] as u32) << 8) | bytes[5] as u32) << 4;
                }
            }
            0x04 => {
                if byte_count >= 2 {
                    base_addr = ((bytes[4] as u32) << 8 | bytes[5] as u32) << 16;
                }
            }
            // start address records carry nothing to load
            _ => {}
        }
    }

    Ok(max_word)
}

/// Parse a `$readmemh`-style word list.
///
/// Returns the number of words spanned (highest word address reached + 1).
pub fn parse_words(text: &str, words: &mut [u16]) -> Result<usize> {
    let mut at = 0usize;
    let mut max_word = 0usize;

    for (n, raw) in text.lines().enumerate() {
        let line_no = n + 1;
        let line = strip_comment(raw);
        for tok in line.split_whitespace() {
            if let Some(origin) = tok.strip_prefix('@') {
                at = parse_hex_u32(origin)
                    .ok_or_else(|| Error::Parse { line: line_no, reason: format!("bad origin '{}'", tok) })?
                    as usize;
                continue;
            }
            let v = parse_hex_u32(tok)
                .filter(|&v| v <= 0xFFFF)
                .ok_or_else(|| Error::Parse { line: line_no, reason: format!("bad word '{}'", tok) })?;
            if at >= words.len() {
                return Err(Error::Overflow(at));
            }
            words[at] = v as u16;
            at += 1;
            max_word = max_word.max(at);
        }
    }

    Ok(max_word)
}

/// Load either format, picking Intel HEX when the first record starts with `:`.
pub fn load_image(text: &str, words: &mut [u16]) -> Result<usize> {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty());
    match first {
        Some(l) if l.starts_with(':') => parse_hex(text, words),
        _ => parse_words(text, words),
    }
}

fn strip_comment(line: &str) -> &str {
    let mut end = line.len();
    for pat in ["//", "#", ";"] {
        if let Some(i) = line.find(pat) {
            end = end.min(i);
        }
    }
    &line[..end]
}

fn parse_hex_u32(tok: &str) -> Option<u32> {
    let t = tok.trim_start_matches("0x").trim_start_matches("0X");
    if t.is_empty() || t.len() > 8 {
        return None;
    }
    u32::from_str_radix(t, 16).ok()
}

/// Convert hex character pairs to bytes
fn hex_line_to_bytes(hex_str: &str) -> std::result::Result<Vec<u8>, String> {
    let chars: Vec<char> = hex_str.chars().collect();
    if chars.len() % 2 != 0 {
        return Err("odd number of hex characters".into());
    }

    let mut bytes = Vec::with_capacity(chars.len() / 2);
    for chunk in chars.chunks(2) {
        let hi = hex_char(chunk[0])?;
        let lo = hex_char(chunk[1])?;
        bytes.push((hi << 4) | lo);
    }
    Ok(bytes)
}

fn hex_char(c: char) -> std::result::Result<u8, String> {
    c.to_digit(16)
        .map(|d| d as u8)
        .ok_or_else(|| format!("invalid hex character '{}'", c))
}
