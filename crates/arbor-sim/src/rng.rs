use serde::{Deserialize, Serialize};

/// Small deterministic RNG: a seed replays the same run on every platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    /// Independent stream derived from this seed, for a separate consumer
    /// such as the fault injector.
    #[must_use]
    pub const fn fork(&self, salt: u64) -> Self {
        Self::new(self.state ^ salt.rotate_left(17))
    }

    #[must_use]
    pub const fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        // Low bits of an LCG are weak; mix the high half down.
        self.state ^ (self.state >> 29)
    }

    /// Next value in `[0, upper_exclusive)`.
    #[must_use]
    pub const fn next_bounded(&mut self, upper_exclusive: u64) -> u64 {
        if upper_exclusive == 0 {
            return 0;
        }
        self.next_u64() % upper_exclusive
    }

    /// Bernoulli trial with integer percent.
    #[must_use]
    pub fn hit_rate_percent(&mut self, percent: u8) -> bool {
        if percent == 0 {
            return false;
        }
        if percent >= 100 {
            return true;
        }
        self.next_bounded(100) < u64::from(percent)
    }

    /// Uniform pick from `items`; `None` when empty.
    pub fn pick<T: Copy>(&mut self, items: &[T]) -> Option<T> {
        let index = usize::try_from(self.next_bounded(items.len() as u64)).ok()?;
        items.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::DeterministicRng;

    #[test]
    fn same_seed_same_stream() {
        let mut a = DeterministicRng::new(7);
        let mut b = DeterministicRng::new(7);
        for _ in 0..32 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn forks_diverge_from_parent() {
        let parent = DeterministicRng::new(7);
        let mut fork = parent.fork(1);
        let mut copy = parent;
        assert_ne!(fork.next_u64(), copy.next_u64());
    }

    #[test]
    fn bounded_and_percent_edges() {
        let mut rng = DeterministicRng::new(1);
        assert_eq!(rng.next_bounded(0), 0);
        assert!((0..100).all(|_| rng.next_bounded(3) < 3));
        assert!(!rng.hit_rate_percent(0));
        assert!(rng.hit_rate_percent(100));
        assert_eq!(rng.pick::<u8>(&[]), None);
        assert_eq!(rng.pick(&[9]), Some(9));
    }
}
