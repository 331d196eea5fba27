//! CRC-32/IEEE checksum used to authenticate payload framing.

/// Computes the CRC-32/IEEE checksum of `payload`, matching the value stored in the
/// header's checksum field.
#[inline]
pub fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}
