//! RFC 4648 base32 text form (uppercase, no padding).
//!
//! Used for every identifier that appears in a file name or a log line.

use crate::error::{CoreError, Result};

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Encode bytes as unpadded uppercase base32.
pub fn encode(data: &[u8]) -> String {
    let mut result = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for &byte in data {
        buffer = (buffer << 8) | (byte as u64);
        bits_in_buffer += 8;

        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = ((buffer >> bits_in_buffer) & 0x1f) as usize;
            result.push(ALPHABET[index] as char);
        }
    }

    if bits_in_buffer > 0 {
        let index = ((buffer << (5 - bits_in_buffer)) & 0x1f) as usize;
        result.push(ALPHABET[index] as char);
    }

    result
}

/// Decode unpadded base32. Lowercase input is accepted.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for ch in text.bytes() {
        let value = match ch {
            b'A'..=b'Z' => ch - b'A',
            b'a'..=b'z' => ch - b'a',
            b'2'..=b'7' => ch - b'2' + 26,
            _ => {
                return Err(CoreError::InvalidBase32(format!(
                    "unexpected character {:?}",
                    ch as char
                )))
            }
        };
        buffer = (buffer << 5) | value as u64;
        bits_in_buffer += 5;

        if bits_in_buffer >= 8 {
            bits_in_buffer -= 8;
            out.push((buffer >> bits_in_buffer) as u8);
        }
    }

    // Leftover bits must be zero padding from the final quantum.
    if bits_in_buffer >= 5 || buffer & ((1 << bits_in_buffer) - 1) != 0 {
        return Err(CoreError::InvalidBase32("trailing bits".into()));
    }

    Ok(out)
}

/// Decode into a fixed-size array.
pub fn decode_array<const N: usize>(text: &str) -> Result<[u8; N]> {
    let bytes = decode(text)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CoreError::InvalidLength {
            expected: N,
            got: bytes.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc4648_vectors() {
        assert_eq!(encode(b""), "");
        assert_eq!(encode(b"f"), "MY");
        assert_eq!(encode(b"fo"), "MZXQ");
        assert_eq!(encode(b"foo"), "MZXW6");
        assert_eq!(encode(b"foob"), "MZXW6YQ");
        assert_eq!(encode(b"fooba"), "MZXW6YTB");
        assert_eq!(encode(b"foobar"), "MZXW6YTBOI");
    }

    #[test]
    fn test_decode_vectors() {
        assert_eq!(decode("MZXW6YTBOI").unwrap(), b"foobar");
        assert_eq!(decode("mzxw6ytboi").unwrap(), b"foobar");
        assert_eq!(decode("").unwrap(), b"");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("MZ1W").is_err());
        assert!(decode("MZ=W").is_err());
        // "MZ" is valid, "MZ7" carries non-zero trailing bits
        assert!(decode("MZ7").is_err());
    }

    #[test]
    fn test_decode_array_length() {
        let text = encode(&[0xAB; 32]);
        assert_eq!(decode_array::<32>(&text).unwrap(), [0xAB; 32]);
        assert!(decode_array::<16>(&text).is_err());
    }
}
