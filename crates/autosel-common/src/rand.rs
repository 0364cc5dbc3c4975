pub use rand::{Rng, SeedableRng, rngs::StdRng};

use rand::distr::StandardUniform;
use rand::prelude::Distribution;

/// Returns a random number generator seeded from entropy.
#[inline(always)]
pub fn get_seeded_rng() -> StdRng {
    StdRng::from_os_rng()
}

/// Returns a generator seeded with a fixed value, for reproducible runs.
#[inline(always)]
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Generates random data from a thread-local RNG.
#[inline]
pub fn gen_random<T>() -> T
where
    StandardUniform: Distribution<T>,
{
    rand::rng().random()
}
