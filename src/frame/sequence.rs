//! Delimiter sequences written as escaped text.
//!
//! Project settings store delimiters the way a user types them
//! (`"\r\n"`, `"\x02"`, `"*/"`); [`parse_escaped`] turns that text into
//! the raw bytes the extractor searches for.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FramewireError, Result};

/// Decode `\n`, `\r`, `\t`, `\0`, `\\` and `\xHH` escapes.
///
/// Any other character is copied through as its UTF-8 bytes.
///
/// # Example
///
/// ```
/// use framewire::frame::parse_escaped;
///
/// assert_eq!(&parse_escaped(r"\r\n").unwrap()[..], b"\r\n");
/// assert_eq!(&parse_escaped(r"\x02$").unwrap()[..], b"\x02$");
/// ```
pub fn parse_escaped(text: &str) -> Result<Bytes> {
    let mut out = BytesMut::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut utf8 = [0u8; 4];
            out.put_slice(c.encode_utf8(&mut utf8).as_bytes());
            continue;
        }

        match chars.next() {
            Some('n') => out.put_u8(b'\n'),
            Some('r') => out.put_u8(b'\r'),
            Some('t') => out.put_u8(b'\t'),
            Some('0') => out.put_u8(0),
            Some('\\') => out.put_u8(b'\\'),
            Some('x') => {
                let hi = chars.next();
                let lo = chars.next();
                let digits: String = hi.into_iter().chain(lo).collect();
                let byte = u8::from_str_radix(&digits, 16)
                    .ok()
                    .filter(|_| digits.len() == 2)
                    .ok_or_else(|| {
                        FramewireError::InvalidSettings(format!(
                            "invalid \\x escape in sequence {text:?}"
                        ))
                    })?;
                out.put_u8(byte);
            }
            Some(other) => {
                return Err(FramewireError::InvalidSettings(format!(
                    "unknown escape \\{other} in sequence {text:?}"
                )))
            }
            None => {
                return Err(FramewireError::InvalidSettings(format!(
                    "dangling backslash in sequence {text:?}"
                )))
            }
        }
    }

    Ok(out.freeze())
}
