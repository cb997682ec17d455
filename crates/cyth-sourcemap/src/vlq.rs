//! Base64 variable-length quantities.
//!
//! Each character is a 6-bit digit. Bit 5 marks a continuation, the low five
//! bits are payload, least significant group first. Bit 0 of the assembled
//! value is the sign.

use crate::error::SourceMapError;

const CONTINUATION_BIT: u8 = 0b10_0000;
const PAYLOAD_MASK: u8 = 0b01_1111;
const PAYLOAD_BITS: u32 = 5;

/// Map one character of the `A-Za-z0-9+/` alphabet to its digit value.
fn digit_value(byte: u8) -> Option<u8> {
    match byte {
        b'A'..=b'Z' => Some(byte - b'A'),
        b'a'..=b'z' => Some(byte - b'a' + 26),
        b'0'..=b'9' => Some(byte - b'0' + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

/// Cursor over the values of a single comma-delimited segment.
pub(crate) struct SegmentReader<'a> {
    text: &'a str,
    pos: usize,
    segment: usize,
}

impl<'a> SegmentReader<'a> {
    pub(crate) fn new(text: &'a str, segment: usize) -> Self {
        Self {
            text,
            pos: 0,
            segment,
        }
    }

    pub(crate) fn has_more(&self) -> bool {
        self.pos < self.text.len()
    }

    /// Decode the next signed value, advancing past its digits.
    pub(crate) fn next_value(&mut self) -> Result<i64, SourceMapError> {
        let bytes = self.text.as_bytes();
        let mut assembled: u64 = 0;
        let mut shift = 0u32;

        loop {
            let Some(&byte) = bytes.get(self.pos) else {
                return Err(SourceMapError::Truncated {
                    segment: self.segment,
                });
            };
            let digit = digit_value(byte).ok_or_else(|| SourceMapError::InvalidDigit {
                character: self.text[self.pos..].chars().next().unwrap_or('\u{fffd}'),
                segment: self.segment,
            })?;
            self.pos += 1;

            if shift > 30 {
                return Err(SourceMapError::Overflow {
                    segment: self.segment,
                });
            }
            assembled |= u64::from(digit & PAYLOAD_MASK) << shift;
            shift += PAYLOAD_BITS;

            if digit & CONTINUATION_BIT == 0 {
                break;
            }
        }

        if assembled > u64::from(u32::MAX) {
            return Err(SourceMapError::Overflow {
                segment: self.segment,
            });
        }

        let magnitude = (assembled >> 1) as i64;
        Ok(if assembled & 1 == 1 { -magnitude } else { magnitude })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(text: &str) -> Result<Vec<i64>, SourceMapError> {
        let mut reader = SegmentReader::new(text, 0);
        let mut out = Vec::new();
        while reader.has_more() {
            out.push(reader.next_value()?);
        }
        Ok(out)
    }

    #[test]
    fn single_digit_values() {
        assert_eq!(values("A").unwrap(), vec![0]);
        assert_eq!(values("C").unwrap(), vec![1]);
        assert_eq!(values("D").unwrap(), vec![-1]);
        assert_eq!(values("E").unwrap(), vec![2]);
        assert_eq!(values("F").unwrap(), vec![-2]);
        // Largest single-digit payload: 15 << 1.
        assert_eq!(values("e").unwrap(), vec![15]);
        assert_eq!(values("f").unwrap(), vec![-15]);
    }

    #[test]
    fn continuation_digits_are_little_endian() {
        // 'g' = 32 (continuation, payload 0), 'B' = 1 -> assembled 32 -> 16.
        assert_eq!(values("gB").unwrap(), vec![16]);
        // 'k' = 36 (continuation, payload 4), 'B' = 1 -> 4 | 32 = 36 -> 18.
        assert_eq!(values("kB").unwrap(), vec![18]);
        // '2' = 54 (continuation, payload 22), 'H' = 7 -> 22 | 224 = 246 -> 123.
        assert_eq!(values("2H").unwrap(), vec![123]);
    }

    #[test]
    fn negative_zero_decodes_to_zero() {
        assert_eq!(values("B").unwrap(), vec![0]);
    }

    #[test]
    fn several_values_in_one_segment() {
        assert_eq!(values("AAgBC").unwrap(), vec![0, 0, 16, 1]);
    }

    #[test]
    fn rejects_characters_outside_alphabet() {
        let err = values("A*").unwrap_err();
        assert!(matches!(
            err,
            SourceMapError::InvalidDigit { character: '*', .. }
        ));
    }

    #[test]
    fn rejects_dangling_continuation() {
        let err = values("g").unwrap_err();
        assert!(matches!(err, SourceMapError::Truncated { .. }));
    }

    #[test]
    fn rejects_values_wider_than_32_bits() {
        let err = values("gggggggB").unwrap_err();
        assert!(matches!(err, SourceMapError::Overflow { .. }));
    }
}
