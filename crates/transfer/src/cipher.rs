//! Byte obfuscation applied to every chunk.
//!
//! XOR with a single-byte key derived from the room PIN. This only keeps
//! casual observers from reading raw file bytes off the channel: the key
//! space is 256 values and the key travels with the room code. It carries
//! no state across chunks, so chunk boundaries and order do not matter.

/// Returns `bytes` XOR-ed with `key`. Applying it twice restores the input.
pub fn transform(bytes: &[u8], key: u8) -> Vec<u8> {
    bytes.iter().map(|b| b ^ key).collect()
}

/// In-place variant of [`transform`].
pub fn transform_in_place(bytes: &mut [u8], key: u8) {
    if key == 0 {
        return;
    }
    for b in bytes {
        *b ^= key;
    }
}
