//! Byte-per-unit codec with an escape for everything outside 2..128

use super::{CodecProfile, StringCodec};
use crate::buffer::ByteArray;
use crate::error::{Error, Result};

/// Terminates an encoded string
pub const TERMINATOR: u8 = 0;
/// Introduces a two-byte UTF-16 unit
pub const ESCAPE: u8 = 1;

/// Plain string codec
///
/// Each UTF-16 unit in `2..128` is written as one byte; any other unit is
/// written as `ESCAPE, high byte, low byte`. The string ends with
/// `TERMINATOR`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainStringCodec;

impl PlainStringCodec {
    fn is_direct(unit: u16) -> bool {
        unit > ESCAPE as u16 && unit < 0x80
    }
}

impl StringCodec for PlainStringCodec {
    fn encode(&self, value: &str, out: &mut ByteArray) -> Result<()> {
        for unit in value.encode_utf16() {
            if Self::is_direct(unit) {
                out.add(unit as u8);
            } else {
                out.add(ESCAPE);
                out.add((unit >> 8) as u8);
                out.add(unit as u8);
            }
        }
        out.add(TERMINATOR);
        Ok(())
    }

    fn decode(&self, data: &[u8], offset: &mut usize) -> Result<String> {
        let mut units = Vec::new();
        let mut pos = *offset;
        loop {
            let byte = *data.get(pos).ok_or_else(|| {
                Error::Corruption(format!("Unterminated string starting at offset {}", offset))
            })?;
            pos += 1;
            match byte {
                TERMINATOR => break,
                ESCAPE => {
                    let pair = data.get(pos..pos + 2).ok_or_else(|| {
                        Error::Corruption(format!("Truncated escape at offset {}", pos - 1))
                    })?;
                    units.push(((pair[0] as u16) << 8) | pair[1] as u16);
                    pos += 2;
                }
                b if b < 0x80 => units.push(b as u16),
                b => {
                    return Err(Error::Corruption(format!(
                        "Unescaped byte {:#04x} at offset {}",
                        b,
                        pos - 1
                    )))
                }
            }
        }

        let decoded = String::from_utf16(&units)
            .map_err(|e| Error::Corruption(format!("Invalid UTF-16 in encoded string: {}", e)))?;
        *offset = pos;
        Ok(decoded)
    }

    fn mem_used(&self) -> usize {
        0
    }

    fn profile(&self) -> CodecProfile {
        CodecProfile::Plain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_is_one_byte_per_char() -> Result<()> {
        let bytes = PlainStringCodec.encode_to_vec("Foo.bar")?;
        assert_eq!(bytes, b"Foo.bar\0".to_vec());
        Ok(())
    }

    #[test]
    fn test_sentinels_and_wide_chars_are_escaped() -> Result<()> {
        let bytes = PlainStringCodec.encode_to_vec("\u{0}\u{1}\u{e9}\u{65e5}")?;
        assert_eq!(
            bytes,
            vec![1, 0x00, 0x00, 1, 0x00, 0x01, 1, 0x00, 0xe9, 1, 0x65, 0xe5, 0]
        );
        assert_eq!(PlainStringCodec.decode_from(&bytes)?, "\u{0}\u{1}\u{e9}\u{65e5}");
        Ok(())
    }

    #[test]
    fn test_empty_string() -> Result<()> {
        let bytes = PlainStringCodec.encode_to_vec("")?;
        assert_eq!(bytes, vec![0]);
        assert_eq!(PlainStringCodec.decode_from(&bytes)?, "");
        Ok(())
    }

    #[test]
    fn test_decode_stops_at_terminator() -> Result<()> {
        let mut offset = 0;
        let data = b"ab\0cd\0";
        assert_eq!(PlainStringCodec.decode(data, &mut offset)?, "ab");
        assert_eq!(offset, 3);
        assert_eq!(PlainStringCodec.decode(data, &mut offset)?, "cd");
        assert_eq!(offset, 6);
        Ok(())
    }

    #[test]
    fn test_corrupt_inputs() {
        let mut offset = 0;
        assert!(matches!(
            PlainStringCodec.decode(b"abc", &mut offset),
            Err(Error::Corruption(_))
        ));
        // Offset is untouched on failure
        assert_eq!(offset, 0);

        assert!(matches!(
            PlainStringCodec.decode(&[b'a', 1, 0x00], &mut offset),
            Err(Error::Corruption(_))
        ));
        assert!(matches!(
            PlainStringCodec.decode(&[0xC3, 0], &mut offset),
            Err(Error::Corruption(_))
        ));
        // Lone surrogate
        assert!(matches!(
            PlainStringCodec.decode(&[1, 0xD8, 0x00, 0], &mut offset),
            Err(Error::Corruption(_))
        ));
    }
}
