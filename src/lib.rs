//! sensorbench -- simulated sensor test bench.
//!
//! This crate provides simulated temperature and pressure sensors, a
//! cancellable time-paced sampling engine, pass/fail analysis against each
//! sensor's thresholds, and JSON persistence of test results.

pub mod analysis;
pub mod config;
pub mod device;
pub mod engine;
pub mod logging;
pub mod session;
pub mod storage;

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Random source for a session: reproducible when seeded, entropy otherwise.
pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => {
            tracing::debug!(seed, "using seeded random source");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let a: Vec<u32> = make_rng(Some(5)).sample_iter(rand::distributions::Standard).take(8).collect();
        let b: Vec<u32> = make_rng(Some(5)).sample_iter(rand::distributions::Standard).take(8).collect();
        assert_eq!(a, b);
    }
}
