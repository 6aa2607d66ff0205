//! Security access key derivation
//!
//! The supported families use a 16-bit modular multiplication: the two
//! seed bytes form a big-endian word, the product with a per-level magic
//! number is truncated to 16 bits and returned big-endian.

use crate::error::KeygenError;

/// Known security access levels.
pub mod security_level {
    pub const LEVEL_1: u8 = 1;
    pub const LEVEL_2: u8 = 2;
    pub const LEVEL_3: u8 = 3;
}

const MAGIC_LEVEL_2: u16 = 0x4D4E;
const MAGIC_LEVEL_3: u16 = 0x6F31;

/// Derive the two-byte key for a seed at the given access level.
///
/// The level 1 magic number is not known; requesting it fails with
/// [`KeygenError::MissingMagic`] rather than guessing.
pub fn generate_key(seed: [u8; 2], level: u8) -> Result<[u8; 2], KeygenError> {
    let magic = match level {
        security_level::LEVEL_1 => return Err(KeygenError::MissingMagic(level)),
        security_level::LEVEL_2 => MAGIC_LEVEL_2,
        security_level::LEVEL_3 => MAGIC_LEVEL_3,
        other => return Err(KeygenError::InvalidLevel(other)),
    };

    let x = u16::from_be_bytes(seed);
    let key = magic.wrapping_mul(x);
    Ok(key.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_2_multiplies_by_its_magic() {
        assert_eq!(generate_key([0x00, 0x01], 2).unwrap(), [0x4D, 0x4E]);
    }

    #[test]
    fn level_3_truncates_to_sixteen_bits() {
        // 0x6F31 * 0x1234 mod 0x10000 = 0x39A4
        assert_eq!(generate_key([0x12, 0x34], 3).unwrap(), [0x39, 0xA4]);
    }

    #[test]
    fn zero_seed_yields_zero_key() {
        assert_eq!(generate_key([0x00, 0x00], 2).unwrap(), [0x00, 0x00]);
    }

    #[test]
    fn level_1_magic_is_missing() {
        assert_eq!(
            generate_key([0x12, 0x34], 1).unwrap_err(),
            KeygenError::MissingMagic(1)
        );
    }

    #[test]
    fn other_levels_are_invalid() {
        assert_eq!(
            generate_key([0x12, 0x34], 0).unwrap_err(),
            KeygenError::InvalidLevel(0)
        );
        assert_eq!(
            generate_key([0x12, 0x34], 4).unwrap_err(),
            KeygenError::InvalidLevel(4)
        );
    }
}
