//! Lossy in-memory link for deterministic testing.
//!
//! Real networks drop, reorder, duplicate, and damage packets.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! [`LossyLink`] sits between two sans-IO endpoints and applies a seeded
//! fault model to every datagram handed to it:
//!
//! | Fault       | Description                                        |
//! |-------------|----------------------------------------------------|
//! | Loss        | Drop the datagram with probability `loss_rate`.    |
//! | Reordering  | Hold it back with probability `reorder_rate` until |
//! |             | the next datagram has overtaken it.                |
//! | Duplication | Deliver it twice with probability `duplicate_rate`. |
//! | Corruption  | Flip one random bit with probability `corrupt_rate`. |
//!
//! The same seed always yields the same fault sequence, so a failing test
//! can be replayed exactly.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Configuration for the fault model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkConfig {
    pub loss_rate: f64,
    pub reorder_rate: f64,
    pub duplicate_rate: f64,
    pub corrupt_rate: f64,
}

/// What the link has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub offered: u64,
    pub dropped: u64,
    pub reordered: u64,
    pub duplicated: u64,
    pub corrupted: u64,
}

#[derive(Debug)]
pub struct LossyLink {
    config: LinkConfig,
    rng: StdRng,
    stats: LinkStats,
    /// A datagram waiting for the next one to overtake it.
    held: Option<Vec<u8>>,
}

impl LossyLink {
    pub fn new(config: LinkConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            stats: LinkStats::default(),
            held: None,
        }
    }

    /// A link that delivers everything unchanged.
    pub fn perfect() -> Self {
        Self::new(LinkConfig::default(), 0)
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Pass `datagram` through the link; returns the copies that arrive, in
    /// arrival order.
    ///
    /// A held-back datagram is released behind the next one offered, so it
    /// arrives after a datagram that was sent later.
    pub fn transmit(&mut self, datagram: Vec<u8>) -> Vec<Vec<u8>> {
        self.stats.offered += 1;
        let released = self.held.take();

        let mut arrived = self.mangle(datagram);
        if released.is_none()
            && !arrived.is_empty()
            && self.rng.random_bool(self.config.reorder_rate)
        {
            self.held = arrived.pop();
            self.stats.reordered += 1;
        }
        arrived.extend(released);
        arrived
    }

    /// Drop, corrupt or duplicate one datagram.
    fn mangle(&mut self, datagram: Vec<u8>) -> Vec<Vec<u8>> {
        if self.rng.random_bool(self.config.loss_rate) {
            self.stats.dropped += 1;
            return Vec::new();
        }

        let mut datagram = datagram;
        if !datagram.is_empty() && self.rng.random_bool(self.config.corrupt_rate) {
            let bit = self.rng.random_range(0..datagram.len() * 8);
            datagram[bit / 8] ^= 1 << (bit % 8);
            self.stats.corrupted += 1;
        }

        if self.rng.random_bool(self.config.duplicate_rate) {
            self.stats.duplicated += 1;
            vec![datagram.clone(), datagram]
        } else {
            vec![datagram]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_link_is_transparent() {
        let mut link = LossyLink::perfect();
        assert_eq!(link.transmit(vec![1, 2, 3]), vec![vec![1, 2, 3]]);
        assert_eq!(
            link.stats(),
            LinkStats {
                offered: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn total_loss_drops_everything() {
        let mut link = LossyLink::new(
            LinkConfig {
                loss_rate: 1.0,
                ..Default::default()
            },
            7,
        );
        for _ in 0..10 {
            assert!(link.transmit(vec![0xAA]).is_empty());
        }
        assert_eq!(link.stats().dropped, 10);
    }

    #[test]
    fn corruption_flips_exactly_one_bit() {
        let mut link = LossyLink::new(
            LinkConfig {
                corrupt_rate: 1.0,
                ..Default::default()
            },
            42,
        );
        let original = vec![0u8; 16];
        let out = link.transmit(original.clone());
        assert_eq!(out.len(), 1);
        let flipped: u32 = out[0]
            .iter()
            .zip(&original)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        assert_eq!(flipped, 1);
    }

    #[test]
    fn reordering_lets_the_next_datagram_overtake() {
        let mut link = LossyLink::new(
            LinkConfig {
                reorder_rate: 1.0,
                ..Default::default()
            },
            3,
        );
        assert!(link.transmit(vec![1]).is_empty());
        assert_eq!(link.transmit(vec![2]), vec![vec![2], vec![1]]);
        assert!(link.transmit(vec![3]).is_empty());
        assert_eq!(link.stats().reordered, 2);
    }

    #[test]
    fn same_seed_same_faults() {
        let config = LinkConfig {
            loss_rate: 0.3,
            reorder_rate: 0.2,
            duplicate_rate: 0.2,
            corrupt_rate: 0.2,
        };
        let mut a = LossyLink::new(config, 99);
        let mut b = LossyLink::new(config, 99);
        for i in 0..50u8 {
            assert_eq!(a.transmit(vec![i; 8]), b.transmit(vec![i; 8]));
        }
        assert_eq!(a.stats(), b.stats());
    }
}
