//! Decoding of escaped byte-string literals
//!
//! Modules are embedded in scripts as string literals in the text-format
//! escape syntax, e.g. `"\00asm\01\00\00\00"`. [`unescape`] turns such a
//! literal (without the surrounding quotes) back into the exact bytes it
//! denotes. Unescaped characters contribute their UTF-8 encoding.

use std::iter::Peekable;
use std::str::CharIndices;

/// An invalid escape sequence, with the byte offset it starts at.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct LiteralError {
    pub message: String,
    pub offset: usize,
}

impl LiteralError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        LiteralError {
            message: message.into(),
            offset,
        }
    }
}

/// Decode an escaped string literal into bytes.
pub fn unescape(literal: &str) -> Result<Vec<u8>, LiteralError> {
    let mut bytes = Vec::with_capacity(literal.len());
    let mut chars = literal.char_indices().peekable();
    let mut buf = [0u8; 4];

    while let Some((offset, c)) = chars.next() {
        if c == '\\' {
            unescape_one(&mut chars, offset, &mut bytes)?;
        } else {
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }

    Ok(bytes)
}

fn unescape_one(
    chars: &mut Peekable<CharIndices<'_>>,
    start: usize,
    bytes: &mut Vec<u8>,
) -> Result<(), LiteralError> {
    let (_, c) = chars
        .next()
        .ok_or_else(|| LiteralError::new("unterminated escape sequence", start))?;

    match c {
        't' => bytes.push(0x09),
        'n' => bytes.push(0x0A),
        'r' => bytes.push(0x0D),
        '"' => bytes.push(0x22),
        '\'' => bytes.push(0x27),
        '\\' => bytes.push(0x5C),
        'u' => unescape_unicode(chars, start, bytes)?,
        c => {
            let high = c
                .to_digit(16)
                .ok_or_else(|| LiteralError::new(format!("invalid escape sequence: \\{c}"), start))?;
            let (_, low) = chars
                .next()
                .ok_or_else(|| LiteralError::new("unterminated hex escape", start))?;
            let low = low
                .to_digit(16)
                .ok_or_else(|| LiteralError::new(format!("invalid hex digit: {low:?}"), start))?;
            bytes.push(((high << 4) | low) as u8);
        }
    }

    Ok(())
}

/// `\u{...}`, appending the code point's UTF-8 bytes.
fn unescape_unicode(
    chars: &mut Peekable<CharIndices<'_>>,
    start: usize,
    bytes: &mut Vec<u8>,
) -> Result<(), LiteralError> {
    match chars.next() {
        Some((_, '{')) => {}
        Some((_, c)) => return Err(LiteralError::new(format!("expected '{{' after \\u, got {c:?}"), start)),
        None => return Err(LiteralError::new("unterminated unicode escape", start)),
    }

    let mut code_point: u32 = 0;
    let mut digits = 0;
    while let Some(&(_, c)) = chars.peek() {
        let Some(digit) = c.to_digit(16) else { break };
        code_point = code_point
            .checked_mul(16)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| LiteralError::new("unicode escape value too large", start))?;
        digits += 1;
        chars.next();
    }
    if digits == 0 {
        return Err(LiteralError::new("empty unicode escape", start));
    }

    match chars.next() {
        Some((_, '}')) => {}
        Some((_, c)) => return Err(LiteralError::new(format!("expected '}}' in unicode escape, got {c:?}"), start)),
        None => return Err(LiteralError::new("unterminated unicode escape", start)),
    }

    let c = char::from_u32(code_point)
        .ok_or_else(|| LiteralError::new(format!("invalid unicode code point: U+{code_point:X}"), start))?;
    let mut buf = [0u8; 4];
    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    Ok(())
}
