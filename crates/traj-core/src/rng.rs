//! Deterministic per-run RNG and seed derivation.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

/// Deterministic RNG handle handed to simulation code.
///
/// Every run receives its own substream: the seed is derived by hashing
/// `(master_seed, run_index)` with SipHash-1-3 under fixed zero keys, so a
/// resumed or merged run sees the same stream it would have seen originally.
#[derive(Debug, Clone)]
pub struct RunRng {
    rng: StdRng,
}

impl RunRng {
    /// Creates a new RNG handle from a seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates the handle for a given run of a master seed.
    pub fn for_run(master_seed: u64, run_index: usize) -> Self {
        Self::from_seed(derive_run_seed(master_seed, run_index))
    }
}

impl RngCore for RunRng {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

/// Derives the deterministic seed for a specific run index.
pub fn derive_run_seed(master_seed: u64, run_index: usize) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u64(master_seed);
    hasher.write_u64(run_index as u64);
    hasher.finish()
}
