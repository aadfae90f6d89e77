//! ASCII hex helpers.
//!
//! RSP carries every number as big-endian hex text. Decoding accepts both
//! cases; encoding always emits upper case.

/// Returns whether `byte` is one of `0-9`, `A-F`, `a-f`.
pub fn is_hex_digit(byte: u8) -> bool {
    byte.is_ascii_hexdigit()
}

/// Returns the value of a single hex digit.
pub fn digit_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Returns the upper-case ASCII digit for the low nibble of `nibble`.
pub fn to_digit(nibble: u8) -> u8 {
    let nibble = nibble & 0x0F;
    if nibble < 10 {
        b'0' + nibble
    } else {
        b'A' + nibble - 10
    }
}

/// Scans hex digits from the start of `data` up to the first non-digit.
///
/// Returns the value and the number of digits consumed, or `None` if no
/// digit was found or the value does not fit in 64 bits.
pub fn parse_hex(data: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut consumed = 0;
    for &byte in data {
        let Some(digit) = digit_value(byte) else {
            break;
        };
        value = value.checked_mul(16)?.checked_add(digit as u64)?;
        consumed += 1;
    }
    if consumed == 0 {
        return None;
    }
    Some((value, consumed))
}

/// Reads exactly `length` hex digits from the start of `data`.
///
/// Returns `None` if fewer than `length` bytes are available, any of them
/// is not a hex digit, or the value does not fit in 64 bits.
pub fn read_hex(data: &[u8], length: usize) -> Option<u64> {
    let digits = data.get(..length)?;
    digits.iter().try_fold(0u64, |value, &byte| {
        value
            .checked_mul(16)?
            .checked_add(digit_value(byte)? as u64)
    })
}
