//! # Draw Stream Seeding
//!
//! Deterministic, seedable randomness only. The server owns one 32-byte
//! master seed; each currency derives its own ChaCha20 stream from it so
//! that draws on one currency never perturb the sequence observed by
//! another.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::catalog::CurrencyId;

/// Derives the independent draw stream for one currency.
///
/// The currency id is mixed into every 8-byte word of the master seed with
/// wrapping adds, rotations and a golden-ratio multiplier, so adjacent
/// currency ids land on unrelated streams.
#[must_use]
pub fn currency_rng(master: &[u8; 32], currency: CurrencyId) -> ChaCha20Rng {
    let mut seed = *master;
    for (i, chunk) in seed.chunks_exact_mut(8).enumerate() {
        let word = u64::from_le_bytes(chunk.try_into().unwrap());
        let mixed = word
            .wrapping_add(u64::from(currency))
            .rotate_left(13 + (i as u32) * 7)
            ^ 0x9E37_79B9_7F4A_7C15u64.wrapping_mul(u64::from(currency).wrapping_add(1));
        chunk.copy_from_slice(&mixed.to_le_bytes());
    }
    ChaCha20Rng::from_seed(seed)
}
