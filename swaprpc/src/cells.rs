//! 32-bit cell view over a byte region.
//!
//! A batch region is read and written as an array of little-endian 32-bit
//! cells. Integers use the cells directly; floats go through their bit
//! pattern so the same cell index can be addressed either way. Strings are
//! stored length-prefixed, one Unicode scalar value per cell, which keeps
//! cursor arithmetic uniform across all argument kinds.

use crate::error::{Error, Result};

/// Bytes per cell.
pub const CELL_BYTES: usize = 4;

/// Number of whole cells in a region.
#[inline]
pub fn cell_count(region: &[u8]) -> usize {
    region.len() / CELL_BYTES
}

/// Read the i32 cell at `pos`.
#[inline]
pub fn read_i32(region: &[u8], pos: usize) -> Result<i32> {
    let off = pos * CELL_BYTES;
    let end = off + CELL_BYTES;
    if end > region.len() {
        return Err(Error::CapacityExceeded {
            needed: pos + 1,
            capacity: cell_count(region),
        });
    }
    let mut raw = [0u8; CELL_BYTES];
    raw.copy_from_slice(&region[off..end]);
    Ok(i32::from_le_bytes(raw))
}

/// Write the i32 cell at `pos`.
#[inline]
pub fn write_i32(region: &mut [u8], pos: usize, value: i32) -> Result<()> {
    let off = pos * CELL_BYTES;
    let end = off + CELL_BYTES;
    if end > region.len() {
        return Err(Error::CapacityExceeded {
            needed: pos + 1,
            capacity: cell_count(region),
        });
    }
    region[off..end].copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Read the f32 cell at `pos`, preserving the 32-bit pattern.
#[inline]
pub fn read_f32(region: &[u8], pos: usize) -> Result<f32> {
    Ok(f32::from_bits(read_i32(region, pos)? as u32))
}

/// Write the f32 cell at `pos`, preserving the 32-bit pattern.
#[inline]
pub fn write_f32(region: &mut [u8], pos: usize, value: f32) -> Result<()> {
    write_i32(region, pos, value.to_bits() as i32)
}

/// Write a length-prefixed string starting at `pos`.
///
/// Returns the position of the first cell after the string.
pub fn write_str(region: &mut [u8], pos: usize, s: &str) -> Result<usize> {
    let len = s.chars().count();
    write_i32(region, pos, len as i32)?;
    let mut pos = pos + 1;
    for c in s.chars() {
        write_i32(region, pos, c as i32)?;
        pos += 1;
    }
    Ok(pos)
}

/// Read a length-prefixed string starting at `pos`.
///
/// Returns the string and the position of the first cell after it.
pub fn read_str(region: &[u8], pos: usize) -> Result<(String, usize)> {
    let len = read_i32(region, pos)? as u32 as usize;
    let mut pos = pos + 1;
    let mut out = String::with_capacity(len.min(64));
    for _ in 0..len {
        let cell = read_i32(region, pos)? as u32;
        let c = char::from_u32(cell).ok_or(Error::InvalidCodeUnit(cell))?;
        out.push(c);
        pos += 1;
    }
    Ok((out, pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i32_roundtrip() {
        let mut region = vec![0u8; 64];
        for (pos, value) in [(0, 0), (1, -1), (2, i32::MAX), (3, i32::MIN), (15, 12345)] {
            write_i32(&mut region, pos, value).unwrap();
            assert_eq!(read_i32(&region, pos).unwrap(), value);
        }
    }

    #[test]
    fn test_f32_bit_pattern() {
        let mut region = vec![0u8; 16];
        for value in [0.0f32, -1.5, f32::MIN_POSITIVE, f32::INFINITY] {
            write_f32(&mut region, 0, value).unwrap();
            assert_eq!(read_f32(&region, 0).unwrap().to_bits(), value.to_bits());
        }
        // A non-canonical NaN keeps its payload bits.
        let odd_nan = f32::from_bits(0x7fc0_1234);
        write_f32(&mut region, 0, odd_nan).unwrap();
        assert_eq!(read_f32(&region, 0).unwrap().to_bits(), odd_nan.to_bits());
    }

    #[test]
    fn test_out_of_bounds() {
        let mut region = vec![0u8; 8];
        assert!(matches!(
            read_i32(&region, 2),
            Err(Error::CapacityExceeded {
                needed: 3,
                capacity: 2
            })
        ));
        assert!(write_i32(&mut region, 2, 1).is_err());
        assert!(write_i32(&mut region, 1, 1).is_ok());
    }

    #[test]
    fn test_str_roundtrip() {
        let mut region = vec![0u8; 256];
        for s in ["", "hi", "données", "日本語", "a\u{1F600}b"] {
            let end = write_str(&mut region, 1, s).unwrap();
            assert_eq!(end, 1 + 1 + s.chars().count());
            let (decoded, pos) = read_str(&region, 1).unwrap();
            assert_eq!(decoded, s);
            assert_eq!(pos, end);
        }
    }

    #[test]
    fn test_str_too_long() {
        let mut region = vec![0u8; 16];
        assert!(matches!(
            write_str(&mut region, 0, "abcdef"),
            Err(Error::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_str_invalid_code_unit() {
        let mut region = vec![0u8; 16];
        write_i32(&mut region, 0, 1).unwrap();
        write_i32(&mut region, 1, 0xD800).unwrap(); // lone surrogate
        assert!(matches!(
            read_str(&region, 0),
            Err(Error::InvalidCodeUnit(0xD800))
        ));
    }
}
