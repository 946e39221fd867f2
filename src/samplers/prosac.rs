//! PROSAC sampler: progressively grows the subset of high-quality points.

use ordered_float::OrderedFloat;

use crate::core::Sampler;
use crate::utils::UniformRandomGenerator;

/// PROSAC sampler.
///
/// Observations are ranked once by descending quality score. Sample `t` is
/// drawn from the prefix of the ranking whose length is given by the PROSAC
/// growth function, always containing the newest member of that prefix.
/// After `ransac_convergence_iterations` samples it falls back to uniform
/// sampling over all observations.
pub struct ProsacSampler {
    rng: UniformRandomGenerator<usize>,
    ordering: Vec<usize>,
    growth_function: Vec<usize>,
    sample_size: Option<usize>,
    point_number: usize,
    ransac_convergence_iterations: usize,
    kth_sample_number: usize,
    subset_size: usize,
}

impl ProsacSampler {
    /// Rank observations by `quality_scores` (highest first).
    pub fn from_quality_scores(
        quality_scores: &[f64],
        ransac_convergence_iterations: usize,
        seed: Option<u64>,
    ) -> Self {
        let mut ordering: Vec<usize> = (0..quality_scores.len()).collect();
        ordering.sort_by_key(|&i| std::cmp::Reverse(OrderedFloat(quality_scores[i])));
        Self::with_ordering(ordering, ransac_convergence_iterations, seed)
    }

    /// Use an explicit ranking: `ordering[0]` is the best observation.
    pub fn with_ordering(
        ordering: Vec<usize>,
        ransac_convergence_iterations: usize,
        seed: Option<u64>,
    ) -> Self {
        Self {
            rng: UniformRandomGenerator::with_seed(seed),
            ordering,
            growth_function: Vec::new(),
            sample_size: None,
            point_number: 0,
            ransac_convergence_iterations: ransac_convergence_iterations.max(1),
            kth_sample_number: 1,
            subset_size: 0,
        }
    }

    /// Ranking used by the sampler.
    pub fn ordering(&self) -> &[usize] {
        &self.ordering
    }

    /// Current size of the sampled prefix.
    pub fn subset_size(&self) -> usize {
        self.subset_size
    }

    fn increment_iteration_number(&mut self) {
        self.kth_sample_number += 1;

        if self.kth_sample_number > self.ransac_convergence_iterations {
            return;
        }
        if self.subset_size < self.point_number
            && self.kth_sample_number > self.growth_function[self.subset_size - 1]
        {
            self.subset_size += 1;
        }
    }

    fn initialize(&mut self, point_number: usize, sample_size: usize) {
        self.point_number = point_number;
        self.sample_size = Some(sample_size);
        self.growth_function.clear();
        self.growth_function.resize(point_number, 0);

        let mut t_n = self.ransac_convergence_iterations as f64;
        for i in 0..sample_size {
            t_n *= (sample_size - i) as f64 / (point_number - i) as f64;
        }

        let mut t_n_prime: usize = 1;
        for i in 0..point_number {
            if i < sample_size {
                self.growth_function[i] = t_n_prime;
                continue;
            }
            let t_n_plus1 = (i + 1) as f64 * t_n / (i + 1 - sample_size) as f64;
            self.growth_function[i] = t_n_prime + ((t_n_plus1 - t_n).ceil() as usize);
            t_n = t_n_plus1;
            t_n_prime = self.growth_function[i];
        }

        self.kth_sample_number = 1;
        self.subset_size = sample_size;
    }
}

impl Sampler for ProsacSampler {
    fn sample(&mut self, point_count: usize, sample_size: usize, out_indices: &mut [usize]) -> bool {
        if sample_size == 0
            || point_count == 0
            || sample_size > point_count
            || out_indices.len() < sample_size
            || self.ordering.len() != point_count
        {
            return false;
        }

        if self.sample_size != Some(sample_size) || self.point_number != point_count {
            self.initialize(point_count, sample_size);
        }

        let positions = &mut out_indices[..sample_size];
        if self.kth_sample_number > self.ransac_convergence_iterations {
            self.rng.gen_unique(positions, 0, point_count - 1);
        } else {
            // The newest member of the prefix is always part of the sample.
            let newest = self.subset_size - 1;
            if sample_size > 1 {
                self.rng
                    .gen_unique(&mut positions[..sample_size - 1], 0, newest - 1);
            }
            positions[sample_size - 1] = newest;
        }

        for index in positions.iter_mut() {
            *index = self.ordering[*index];
        }

        self.increment_iteration_number();
        true
    }

    fn reset(&mut self) {
        self.kth_sample_number = 1;
        if let Some(s) = self.sample_size {
            self.subset_size = s;
        }
    }
}
