// Random pass data
//
// Each random pass draws a fresh block from an OS-seeded generator. No
// cryptographic strength is claimed for the overwrite data.

use super::BlockFill;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

pub struct RandomFill {
    rng: StdRng,
}

impl RandomFill {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic stream, for benchmarks and tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl BlockFill for RandomFill {
    fn fill(&mut self, buf: &mut [u8]) {
        self.rng.fill_bytes(buf);
    }
}
