//! Miscellaneous utilities shared across samplers and estimators.

use rand::distributions::Uniform;
use rand::prelude::*;

/// Uniform integer random-number generator drawing sets of distinct values.
///
/// By default this uses an entropy-seeded RNG, but test code (and callers
/// wanting reproducible runs) can construct it from a fixed seed.
pub struct UniformRandomGenerator<T>
where
    T: Copy + rand::distributions::uniform::SampleUniform + PartialOrd,
{
    rng: StdRng,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Default for UniformRandomGenerator<T>
where
    T: Copy + rand::distributions::uniform::SampleUniform + PartialOrd,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> UniformRandomGenerator<T>
where
    T: Copy + rand::distributions::uniform::SampleUniform + PartialOrd,
{
    /// Construct with a random seed.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Construct with a fixed seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            _marker: std::marker::PhantomData,
        }
    }

    /// Seeded when `seed` is set, entropy-seeded otherwise.
    pub fn with_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::new, Self::from_seed)
    }

    /// Draw a single value in `[min, max]`.
    pub fn next_in(&mut self, min: T, max: T) -> T {
        self.rng.sample(Uniform::new_inclusive(min, max))
    }

    /// Fill `out` with distinct random values in `[min, max]`.
    ///
    /// Rejection sampling, suitable for the small sample sizes of minimal
    /// solvers. The caller guarantees that the range holds at least
    /// `out.len()` values.
    pub fn gen_unique(&mut self, out: &mut [T], min: T, max: T)
    where
        T: Eq,
    {
        let dist = Uniform::new_inclusive(min, max);
        let n = out.len();
        for i in 0..n {
            loop {
                let candidate = self.rng.sample(&dist);
                if out[..i].iter().all(|&v| v != candidate) {
                    out[i] = candidate;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::UniformRandomGenerator;

    #[test]
    fn unique_samples_within_bounds() {
        let mut rng = UniformRandomGenerator::<u32>::from_seed(1234);
        let mut buf = [0u32; 5];
        rng.gen_unique(&mut buf, 0, 10);

        assert!(buf.iter().all(|&v| v <= 10));

        for i in 0..buf.len() {
            for j in (i + 1)..buf.len() {
                assert_ne!(buf[i], buf[j]);
            }
        }
    }

    #[test]
    fn deterministic_with_same_seed() {
        let mut rng1 = UniformRandomGenerator::<u32>::from_seed(42);
        let mut rng2 = UniformRandomGenerator::<u32>::with_seed(Some(42));

        let a1: Vec<u32> = (0..10).map(|_| rng1.next_in(0, 100)).collect();
        let a2: Vec<u32> = (0..10).map(|_| rng2.next_in(0, 100)).collect();

        assert_eq!(a1, a2);
    }

    #[test]
    fn full_range_draw_is_a_permutation() {
        let mut rng = UniformRandomGenerator::<usize>::from_seed(7);
        let mut buf = [0usize; 4];
        rng.gen_unique(&mut buf, 0, 3);
        let mut sorted = buf;
        sorted.sort_unstable();
        assert_eq!(sorted, [0, 1, 2, 3]);
    }
}
