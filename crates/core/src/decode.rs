//! Primitive integer decoders used by the crash-log parsers.
//!
//! These are deliberately lenient: they never fail and never allocate. Callers
//! are expected to slice out exactly the bytes they want decoded.

/// Sentinel returned by [`nibble`] for bytes that are not hex digits.
pub const INVALID: u8 = 0xFF;

/// Map one ASCII hex digit (case-insensitive) to its 4-bit value.
///
/// Returns [`INVALID`] for any other byte.
pub fn nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => INVALID,
    }
}

/// Accumulate decimal digits left to right (`res = res * 10 + digit`).
///
/// Non-digit bytes are not rejected; they contribute `byte - b'0'` like any
/// other byte. Arithmetic wraps at 32 bits.
pub fn decimal_to_integer(bytes: &[u8]) -> i32 {
    bytes.iter().fold(0i32, |res, &b| {
        res.wrapping_mul(10).wrapping_add(i32::from(b).wrapping_sub(i32::from(b'0')))
    })
}

/// Accumulate hex nibbles left to right, skipping bytes that are not hex digits.
///
/// A leading `0x` needs no special handling: `x` is not a nibble, and the `0`
/// in front of it contributes nothing.
pub fn hex_to_integer(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |res, &b| match nibble(b) {
        INVALID => res,
        n => res.wrapping_mul(16).wrapping_add(u64::from(n)),
    })
}

/// Convenience for `&str` tokens.
pub fn hex_str(s: &str) -> u64 {
    hex_to_integer(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nibble_is_total() {
        for b in 0u8..=255 {
            let n = nibble(b);
            if b.is_ascii_hexdigit() {
                assert!(n < 16, "byte {b:#x} should decode");
            } else {
                assert_eq!(n, INVALID, "byte {b:#x} should be invalid");
            }
        }
        assert_eq!(nibble(b'f'), 15);
        assert_eq!(nibble(b'F'), 15);
        assert_eq!(nibble(b'7'), 7);
    }

    #[test]
    fn hex_prefix_is_skipped() {
        assert_eq!(hex_to_integer(b"0x1A"), 26);
        assert_eq!(hex_to_integer(b"1A"), 26);
        assert_eq!(hex_str("0x0000000100004000"), 0x1_0000_4000);
    }

    #[test]
    fn decimal_wraps_like_i32() {
        assert_eq!(decimal_to_integer(b"2011"), 2011);
        assert_eq!(decimal_to_integer(b""), 0);
        assert_eq!(decimal_to_integer(b"4294967296"), 0);
    }
}
