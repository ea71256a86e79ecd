//! Compact (variable-length) integer encoding.
//!
//! The two low bits of the first byte select the mode:
//!
//! | bits | layout                                    | range          |
//! |------|-------------------------------------------|----------------|
//! | `00` | 1 byte, value in the upper six bits       | `0..2^6`       |
//! | `01` | 2 bytes LE, value in the upper 14 bits    | `2^6..2^14`    |
//! | `10` | 4 bytes LE, value in the upper 30 bits    | `2^14..2^30`   |
//! | `11` | upper six bits = byte count − 4, then LE  | `2^30..`       |
//!
//! Decoding only accepts the smallest mode able to hold the value.

use crate::error::CodecError;
use crate::input::Input;

const SINGLE_MAX: u128 = (1 << 6) - 1;
const TWO_MAX: u128 = (1 << 14) - 1;
const FOUR_MAX: u128 = (1 << 30) - 1;

/// Append the compact encoding of `value` to `out`.
pub fn encode_compact(value: u128, out: &mut Vec<u8>) {
    if value <= SINGLE_MAX {
        out.push((value as u8) << 2);
    } else if value <= TWO_MAX {
        out.extend_from_slice(&(((value as u16) << 2) | 0b01).to_le_bytes());
    } else if value <= FOUR_MAX {
        out.extend_from_slice(&(((value as u32) << 2) | 0b10).to_le_bytes());
    } else {
        let len = big_mode_len(value);
        out.push((((len - 4) as u8) << 2) | 0b11);
        out.extend_from_slice(&value.to_le_bytes()[..len]);
    }
}

/// Compact encoding of `value` as a fresh buffer.
pub fn compact_to_vec(value: u128) -> Vec<u8> {
    let mut out = Vec::with_capacity(compact_len(value));
    encode_compact(value, &mut out);
    out
}

/// Number of bytes [`encode_compact`] produces for `value`.
pub fn compact_len(value: u128) -> usize {
    if value <= SINGLE_MAX {
        1
    } else if value <= TWO_MAX {
        2
    } else if value <= FOUR_MAX {
        4
    } else {
        1 + big_mode_len(value)
    }
}

fn big_mode_len(value: u128) -> usize {
    let bits = 128 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(4)
}

/// Decode one compact integer, rejecting every non-canonical form.
pub fn decode_compact(input: &mut Input<'_>) -> Result<u128, CodecError> {
    let first = input.read_byte()?;
    match first & 0b11 {
        0b00 => Ok(u128::from(first >> 2)),
        0b01 => {
            let second = input.read_byte()?;
            let value = u128::from(u16::from_le_bytes([first, second]) >> 2);
            if value <= SINGLE_MAX {
                return Err(CodecError::NonCanonicalCompact { value, mode: 2 });
            }
            Ok(value)
        }
        0b10 => {
            let rest = input.read_bytes(3)?;
            let raw = u32::from_le_bytes([first, rest[0], rest[1], rest[2]]);
            let value = u128::from(raw >> 2);
            if value <= TWO_MAX {
                return Err(CodecError::NonCanonicalCompact { value, mode: 4 });
            }
            Ok(value)
        }
        _ => {
            let len = usize::from(first >> 2) + 4;
            if len > 16 {
                return Err(CodecError::CompactOverflow { bits: 128 });
            }
            let bytes = input.read_bytes(len)?;
            let mut buf = [0u8; 16];
            buf[..len].copy_from_slice(bytes);
            let value = u128::from_le_bytes(buf);
            // the top byte must carry data, otherwise a shorter form existed
            if value <= FOUR_MAX || bytes[len - 1] == 0 {
                return Err(CodecError::NonCanonicalCompact { value, mode: len + 1 });
            }
            Ok(value)
        }
    }
}

/// Decode a compact integer and check it fits into `bits` bits.
pub fn decode_compact_bits(input: &mut Input<'_>, bits: u16) -> Result<u128, CodecError> {
    let value = decode_compact(input)?;
    if bits < 128 && value >> bits != 0 {
        return Err(CodecError::CompactOverflow { bits });
    }
    Ok(value)
}

/// Decode a compact length prefix as `usize`.
pub fn decode_length(input: &mut Input<'_>) -> Result<usize, CodecError> {
    let value = decode_compact(input)?;
    usize::try_from(value).map_err(|_| CodecError::CompactOverflow {
        bits: usize::BITS as u16,
    })
}
