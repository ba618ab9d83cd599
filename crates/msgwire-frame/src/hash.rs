//! Wire-level type discriminants.

const SEED: u32 = 131;
const MASK: u32 = 0x7FFF_FFFF;

/// BKDR hash of a message type name, masked to 31 bits.
///
/// Identical names produce identical discriminants in every process, which
/// is what lets independently built peers agree on `type_id` values.
pub const fn type_hash(name: &str) -> u32 {
    let bytes = name.as_bytes();
    let mut hash: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        hash = hash.wrapping_mul(SEED).wrapping_add(bytes[i] as u32);
        i += 1;
    }
    hash & MASK
}
