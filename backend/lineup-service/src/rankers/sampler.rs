use parking_lot::Mutex;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Source of randomness for sampling rankers and experiment selection.
///
/// Production uses the thread-local RNG; tests seed one for reproducible runs.
#[derive(Debug, Default)]
pub struct Sampler {
    seeded: Option<Mutex<StdRng>>,
}

impl Sampler {
    pub fn from_entropy() -> Self {
        Self { seeded: None }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            seeded: Some(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// Run `f` with exclusive access to the RNG
    pub fn with_rng<T>(&self, f: impl FnOnce(&mut dyn RngCore) -> T) -> T {
        match &self.seeded {
            Some(rng) => f(&mut *rng.lock()),
            None => f(&mut rand::thread_rng()),
        }
    }

    /// Pick one entry with probability proportional to its weight.
    ///
    /// Falls back to the first entry when the weights cannot form a
    /// distribution (all zero, negative, or not finite).
    pub fn choose_weighted<'a, T>(&self, items: &'a [T], weight: impl Fn(&T) -> f64) -> Option<&'a T> {
        match items.len() {
            0 => None,
            1 => items.first(),
            _ => match WeightedIndex::new(items.iter().map(weight)) {
                Ok(dist) => self.with_rng(|rng| items.get(dist.sample(rng))),
                Err(_) => items.first(),
            },
        }
    }
}
