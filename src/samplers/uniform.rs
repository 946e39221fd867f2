//! Uniform random sampler drawing minimal samples without replacement.

use crate::core::Sampler;
use crate::utils::UniformRandomGenerator;

/// Uniform random sampler drawing minimal samples without replacement.
pub struct UniformRandomSampler {
    rng: UniformRandomGenerator<usize>,
}

impl Default for UniformRandomSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformRandomSampler {
    /// Construct a new sampler with a random seed.
    pub fn new() -> Self {
        Self {
            rng: UniformRandomGenerator::new(),
        }
    }

    /// Construct a sampler from a fixed seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: UniformRandomGenerator::from_seed(seed),
        }
    }

    pub fn with_seed(seed: Option<u64>) -> Self {
        Self {
            rng: UniformRandomGenerator::with_seed(seed),
        }
    }
}

impl Sampler for UniformRandomSampler {
    fn sample(&mut self, point_count: usize, sample_size: usize, out_indices: &mut [usize]) -> bool {
        if sample_size == 0
            || point_count == 0
            || sample_size > point_count
            || out_indices.len() < sample_size
        {
            return false;
        }

        self.rng
            .gen_unique(&mut out_indices[..sample_size], 0, point_count - 1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_distinct_indices_in_range() {
        let mut sampler = UniformRandomSampler::from_seed(5);
        let mut out = [0usize; 4];
        for _ in 0..100 {
            assert!(sampler.sample(10, 4, &mut out));
            assert!(out.iter().all(|&i| i < 10));
            let mut sorted = out;
            sorted.sort_unstable();
            assert!(sorted.windows(2).all(|w| w[0] != w[1]));
        }
    }

    #[test]
    fn refuses_impossible_samples() {
        let mut sampler = UniformRandomSampler::from_seed(5);
        let mut out = [0usize; 4];
        assert!(!sampler.sample(3, 4, &mut out));
        assert!(!sampler.sample(10, 0, &mut out));
        assert!(!sampler.sample(10, 5, &mut out));
    }
}
