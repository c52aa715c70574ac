use std::collections::VecDeque;

use rand::seq::SliceRandom;
use rand::Rng;

/// Shuffled working copy of a randomizer candidate list.
///
/// Draws rotate-and-requeue: the element taken moves to the back, so when a
/// randomizer must supply more draws than it has distinct items, repeats are
/// deferred as long as possible and cycle in the same shuffled order.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    items: VecDeque<String>,
}

impl Pool {
    /// Shuffles once on construction; draw order is fixed afterwards.
    pub fn new<R: Rng + ?Sized>(candidates: Vec<String>, rng: &mut R) -> Self {
        let mut items = candidates;
        items.shuffle(rng);
        Self {
            items: items.into(),
        }
    }

    pub fn take(&mut self) -> Option<String> {
        let item = self.items.pop_front()?;
        self.items.push_back(item.clone());
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::Pool;

    fn candidates(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("theme-{i}")).collect()
    }

    #[test]
    fn take_rotates_without_consuming() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut pool = Pool::new(candidates(4), &mut rng);
        assert_eq!(pool.len(), 4);
        for _ in 0..12 {
            assert!(pool.take().is_some());
            assert_eq!(pool.len(), 4);
        }
    }

    #[test]
    fn no_repeat_within_a_span_shorter_than_pool_size() {
        for size in 2..=6 {
            let mut rng = StdRng::seed_from_u64(size as u64);
            let mut pool = Pool::new(candidates(size), &mut rng);
            let draws: Vec<String> = (0..size * 3).filter_map(|_| pool.take()).collect();
            for window in draws.windows(size) {
                let mut seen = window.to_vec();
                seen.sort();
                seen.dedup();
                assert_eq!(seen.len(), size, "repeat within span for size {size}");
            }
        }
    }

    #[test]
    fn cycle_order_is_stable_across_wraps() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut pool = Pool::new(candidates(3), &mut rng);
        let first: Vec<String> = (0..3).filter_map(|_| pool.take()).collect();
        let second: Vec<String> = (0..3).filter_map(|_| pool.take()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut pool = Pool::new(Vec::new(), &mut rng);
        assert!(pool.is_empty());
        assert_eq!(pool.take(), None);
    }
}
