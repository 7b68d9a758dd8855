//! Variable-length size prefix written before every word.
//!
//! | length                        | encoding                      | bytes |
//! |-------------------------------|-------------------------------|-------|
//! | `0x00..=0x7F`                 | `0xxxxxxx`                    | 1     |
//! | `0x80..=0x3FFF`               | `10xxxxxx xxxxxxxx`           | 2     |
//! | `0x4000..=0x1F_FFFF`          | `110xxxxx xxxxxxxx xxxxxxxx`  | 3     |
//! | `0x20_0000..=0xFFF_FFFF`      | `1110xxxx` + 3 bytes          | 4     |
//!
//! The protocol also defines a 5-byte class (`0xF0` followed by a 32-bit length).
//! Words of that size are rejected with [`ProtocolError::FrameTooLarge`].
//!
//! More details about the protocol can be found in the Mikrotik Wiki:
//! [Mikrotik API Protocol](https://wiki.mikrotik.com/wiki/Manual:API#Protocol)

use std::{io::Read, ops::Deref};

use crate::error::{ProtocolError, StreamError};

/// Largest word length that can be encoded (`0xFFF_FFFF`).
pub const MAX_WORD_LEN: u32 = 0x0FFF_FFFF;

/// Longest header this codec reads, including the unsupported 5-byte class.
pub const MAX_HEADER_LEN: usize = 5;

/// An encoded length header, 1 to 4 bytes long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPrefix {
    bytes: [u8; 4],
    len: u8,
}

impl Deref for LengthPrefix {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes[..self.len as usize]
    }
}

impl AsRef<[u8]> for LengthPrefix {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

/// Encodes `len` with the smallest header class that can hold it.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] for lengths of `0x1000_0000` and above.
pub fn encode_length(len: u32) -> Result<LengthPrefix, ProtocolError> {
    let be = len.to_be_bytes();
    let prefix = match len {
        0x00..=0x7F => LengthPrefix {
            bytes: [be[3], 0, 0, 0],
            len: 1,
        },
        0x80..=0x3FFF => LengthPrefix {
            bytes: [be[2] | 0x80, be[3], 0, 0],
            len: 2,
        },
        0x4000..=0x1F_FFFF => LengthPrefix {
            bytes: [be[1] | 0xC0, be[2], be[3], 0],
            len: 3,
        },
        0x20_0000..=MAX_WORD_LEN => LengthPrefix {
            bytes: [be[0] | 0xE0, be[1], be[2], be[3]],
            len: 4,
        },
        _ => {
            return Err(ProtocolError::FrameTooLarge {
                len: len.into(),
                limit: MAX_WORD_LEN,
            });
        }
    };
    Ok(prefix)
}

/// Returns the total header length announced by the first header byte.
///
/// # Errors
///
/// Returns [`ProtocolError::ControlByte`] for the reserved bytes `0xF8..=0xFF`.
pub fn header_len(first: u8) -> Result<usize, ProtocolError> {
    if first & 0x80 == 0x00 {
        Ok(1)
    } else if first & 0xC0 == 0x80 {
        Ok(2)
    } else if first & 0xE0 == 0xC0 {
        Ok(3)
    } else if first & 0xF0 == 0xE0 {
        Ok(4)
    } else if first & 0xF8 == 0xF0 {
        Ok(5)
    } else {
        Err(ProtocolError::ControlByte(first))
    }
}

/// Decodes a length header from the start of `data`.
///
/// Returns the length and the number of header bytes consumed, or `Ok(None)` when `data`
/// holds only part of the header.
///
/// # Errors
///
/// Returns [`ProtocolError::ControlByte`] for a reserved first byte and
/// [`ProtocolError::FrameTooLarge`] for the 5-byte class.
pub fn decode_length(data: &[u8]) -> Result<Option<(u32, usize)>, ProtocolError> {
    let Some(&first) = data.first() else {
        return Ok(None);
    };
    let needed = header_len(first)?;
    let Some(header) = data.get(..needed) else {
        return Ok(None);
    };

    let mut c: u32 = match needed {
        1 => return Ok(Some((first.into(), 1))),
        2 => (first & !0xC0).into(),
        3 => (first & !0xE0).into(),
        4 => (first & !0xF0).into(),
        _ => {
            let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
            return Err(ProtocolError::FrameTooLarge {
                len: len.into(),
                limit: MAX_WORD_LEN,
            });
        }
    };
    for byte in &header[1..] {
        c <<= 8;
        c += u32::from(*byte);
    }
    Ok(Some((c, needed)))
}

/// Reads one length header from a blocking stream, consuming exactly the header bytes.
///
/// # Errors
///
/// Returns [`StreamError::Closed`] if the stream ends inside the header.
pub fn read_length<R: Read + ?Sized>(reader: &mut R) -> Result<u32, StreamError> {
    let mut header = [0_u8; MAX_HEADER_LEN];
    reader.read_exact(&mut header[..1])?;
    let needed = header_len(header[0])?;
    reader.read_exact(&mut header[1..needed])?;
    let (len, _) = decode_length(&header[..needed])?.ok_or(StreamError::Closed)?;
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_length_classes() {
        let cases: &[(u32, &[u8])] = &[
            (0, &[0x00]),
            (1, &[0x01]),
            (0x7F, &[0x7F]),
            (0x80, &[0x80, 0x80]),
            (0x3FFF, &[0xBF, 0xFF]),
            (0x4000, &[0xC0, 0x40, 0x00]),
            (0x1F_FFFF, &[0xDF, 0xFF, 0xFF]),
            (0x20_0000, &[0xE0, 0x20, 0x00, 0x00]),
            (0xFFF_FFFF, &[0xEF, 0xFF, 0xFF, 0xFF]),
        ];

        for (len, expected) in cases {
            let prefix = encode_length(*len).unwrap();
            assert_eq!(&*prefix, *expected, "length {len:#x}");
            assert_eq!(decode_length(&prefix).unwrap(), Some((*len, expected.len())));
        }
    }

    #[test]
    fn test_encode_length_too_large() {
        assert_eq!(
            encode_length(0x1000_0000),
            Err(ProtocolError::FrameTooLarge {
                len: 0x1000_0000,
                limit: MAX_WORD_LEN
            })
        );
    }

    #[test]
    fn test_decode_length_partial_header() {
        assert_eq!(decode_length(&[]).unwrap(), None);
        assert_eq!(decode_length(&[0xC0, 0x40]).unwrap(), None);
        assert_eq!(decode_length(&[0xE0, 0x20, 0x00]).unwrap(), None);
    }

    #[test]
    fn test_decode_length_five_byte_class() {
        assert_eq!(
            decode_length(&[0xF0, 0x10, 0x00, 0x00, 0x00]),
            Err(ProtocolError::FrameTooLarge {
                len: 0x1000_0000,
                limit: MAX_WORD_LEN
            })
        );
    }

    #[test]
    fn test_decode_length_control_byte() {
        assert_eq!(decode_length(&[0xF8]), Err(ProtocolError::ControlByte(0xF8)));
        assert_eq!(decode_length(&[0xFF, 0x00]), Err(ProtocolError::ControlByte(0xFF)));
    }

    #[test]
    fn test_read_length_consumes_only_header() {
        let data = [0x80, 0x85, b'x'];
        let mut reader = &data[..];
        assert_eq!(read_length(&mut reader).unwrap(), 0x85);
        assert_eq!(reader, b"x");
    }

    #[test]
    fn test_read_length_closed_mid_header() {
        let mut reader: &[u8] = &[0xC0, 0x40];
        assert!(matches!(read_length(&mut reader), Err(StreamError::Closed)));
    }

    proptest! {
        #[test]
        fn prop_length_round_trip(len in 0..=MAX_WORD_LEN) {
            let prefix = encode_length(len).unwrap();
            let expected_len = match len {
                0x00..=0x7F => 1,
                0x80..=0x3FFF => 2,
                0x4000..=0x1F_FFFF => 3,
                _ => 4,
            };
            prop_assert_eq!(prefix.len(), expected_len);
            prop_assert_eq!(decode_length(&prefix).unwrap(), Some((len, expected_len)));
            let mut reader = &prefix[..];
            prop_assert_eq!(read_length(&mut reader).unwrap(), len);
        }
    }
}
