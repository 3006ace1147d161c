//! Simple random number generator for reproducible runs.
//!
//! A lightweight xorshift PRNG drives weight initialization, dropout masks and
//! batch shuffling so that a run seeded with the same value is repeatable.

const FALLBACK_STATE: u64 = 0x9e3779b97f4a7c15;

/// Xorshift generator. Cheap to clone; clones continue the same stream.
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    /// Create a new RNG with explicit seed (if zero, use a fixed value).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { FALLBACK_STATE } else { seed };
        Self { state }
    }

    /// Derive an independent generator, advancing this one.
    ///
    /// Layers that need their own stream (dropout) fork from the model RNG so
    /// that two layers never replay the same mask sequence.
    pub fn fork(&mut self) -> SimpleRng {
        SimpleRng::new(self.next_u64() ^ FALLBACK_STATE)
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform sample in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        // 24 mantissa bits keep the result strictly below 1.0
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Uniform sample in [low, high).
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32()
    }

    /// Integer sample in [0, upper).
    pub fn gen_usize(&mut self, upper: usize) -> usize {
        if upper == 0 {
            0
        } else {
            (self.next_u64() % upper as u64) as usize
        }
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, data: &mut [T]) {
        if data.len() <= 1 {
            return;
        }
        for i in (1..data.len()).rev() {
            let j = self.gen_usize(i + 1);
            data.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_deterministic() {
        let mut rng1 = SimpleRng::new(42);
        let mut rng2 = SimpleRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.next_u32(), rng2.next_u32());
        }
    }

    #[test]
    fn test_rng_next_f32_range() {
        let mut rng = SimpleRng::new(12345);

        for _ in 0..10_000 {
            let val = rng.next_f32();
            assert!((0.0..1.0).contains(&val));
        }
    }

    #[test]
    fn test_rng_gen_range_f32() {
        let mut rng = SimpleRng::new(67890);

        for _ in 0..1000 {
            let val = rng.gen_range_f32(-1.0, 1.0);
            assert!((-1.0..1.0).contains(&val));
        }
    }

    #[test]
    fn test_rng_gen_usize_zero() {
        let mut rng = SimpleRng::new(22222);
        assert_eq!(rng.gen_usize(0), 0);
    }

    #[test]
    fn test_fork_diverges_from_parent() {
        let mut parent = SimpleRng::new(7);
        let mut child = parent.fork();
        let a: Vec<u32> = (0..8).map(|_| parent.next_u32()).collect();
        let b: Vec<u32> = (0..8).map(|_| child.next_u32()).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = SimpleRng::new(33333);
        let mut data: Vec<usize> = (0..10).collect();
        let original = data.clone();

        rng.shuffle(&mut data);

        let mut sorted = data.clone();
        sorted.sort();
        assert_eq!(sorted, original);
        assert_ne!(data, original);
    }

    #[test]
    fn test_shuffle_single() {
        let mut rng = SimpleRng::new(55555);
        let mut data = vec![42];
        rng.shuffle(&mut data);
        assert_eq!(data, vec![42]);
    }
}
