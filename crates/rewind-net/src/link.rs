//! Simulated network link.
//!
//! [`LinkConditioner`] sits on the receiving side of an in-process
//! [`Endpoint`](crate::Endpoint) and turns a perfect channel into one that
//! drops, duplicates, delays and reorders packets. Time is measured in link
//! steps: one step per [`LinkConditioner::advance`] call, which the endpoint
//! performs once per poll.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rewind_config::LinkConfig;

/// Counters describing what the link did to the traffic it carried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Packets handed to the link.
    pub submitted: u64,
    /// Packets the link discarded.
    pub dropped: u64,
    /// Extra copies the link injected.
    pub duplicated: u64,
    /// Packets (including duplicates) released to the receiver.
    pub delivered: u64,
}

#[derive(Debug)]
struct InFlight {
    due: u64,
    sequence: u64,
    payload: Vec<u8>,
}

/// Lossy, jittery link with a seeded RNG so runs are reproducible.
#[derive(Debug)]
pub struct LinkConditioner {
    drop_rate: f64,
    duplicate_rate: f64,
    min_latency: u32,
    max_latency: u32,
    rng: StdRng,
    step: u64,
    next_sequence: u64,
    in_flight: Vec<InFlight>,
    stats: LinkStats,
}

impl LinkConditioner {
    /// Create a conditioner from link configuration.
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            drop_rate: config.drop_rate.clamp(0.0, 1.0),
            duplicate_rate: config.duplicate_rate.clamp(0.0, 1.0),
            min_latency: config.min_latency_steps,
            max_latency: config.max_latency_steps.max(config.min_latency_steps),
            rng: StdRng::seed_from_u64(config.seed),
            step: 0,
            next_sequence: 0,
            in_flight: Vec::new(),
            stats: LinkStats::default(),
        }
    }

    /// A link that delivers everything, once, in order, on the next step.
    pub fn ideal() -> Self {
        Self::new(&LinkConfig {
            drop_rate: 0.0,
            duplicate_rate: 0.0,
            min_latency_steps: 0,
            max_latency_steps: 0,
            seed: 0,
        })
    }

    /// Hand a packet to the link.
    pub fn submit(&mut self, payload: Vec<u8>) {
        self.stats.submitted += 1;

        if self.drop_rate > 0.0 && self.rng.random_bool(self.drop_rate) {
            self.stats.dropped += 1;
            tracing::trace!(step = self.step, "link dropped packet");
            return;
        }

        if self.duplicate_rate > 0.0 && self.rng.random_bool(self.duplicate_rate) {
            self.stats.duplicated += 1;
            self.enqueue(payload.clone());
        }
        self.enqueue(payload);
    }

    fn enqueue(&mut self, payload: Vec<u8>) {
        let latency = self.rng.random_range(self.min_latency..=self.max_latency);
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.in_flight.push(InFlight {
            due: self.step + u64::from(latency),
            sequence,
            payload,
        });
    }

    /// Advance one step and release every packet that is now due.
    ///
    /// Packets come out ordered by due step, then by submission order, so
    /// unequal latencies reorder traffic.
    pub fn advance(&mut self) -> Vec<Vec<u8>> {
        self.step += 1;
        let step = self.step;

        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_flight)
            .into_iter()
            .partition(|p| p.due <= step);
        self.in_flight = pending;

        due.sort_by_key(|p| (p.due, p.sequence));
        self.stats.delivered += due.len() as u64;
        due.into_iter().map(|p| p.payload).collect()
    }

    /// Number of packets submitted but not yet released.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Traffic counters so far.
    pub fn stats(&self) -> LinkStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(n: u8) -> Vec<u8> {
        vec![n]
    }

    #[test]
    fn test_ideal_link_delivers_in_order_next_step() {
        let mut link = LinkConditioner::ideal();
        for n in 0..5 {
            link.submit(packet(n));
        }
        let out = link.advance();
        assert_eq!(out, (0..5).map(packet).collect::<Vec<_>>());
        assert_eq!(link.in_flight(), 0);
        assert_eq!(link.stats().delivered, 5);
    }

    #[test]
    fn test_latency_holds_packets() {
        let mut link = LinkConditioner::new(&LinkConfig {
            drop_rate: 0.0,
            duplicate_rate: 0.0,
            min_latency_steps: 3,
            max_latency_steps: 3,
            seed: 1,
        });
        link.submit(packet(1));
        assert!(link.advance().is_empty());
        assert!(link.advance().is_empty());
        assert_eq!(link.advance(), vec![packet(1)]);
    }

    #[test]
    fn test_full_drop_rate_loses_everything() {
        let mut link = LinkConditioner::new(&LinkConfig {
            drop_rate: 1.0,
            duplicate_rate: 0.0,
            min_latency_steps: 0,
            max_latency_steps: 0,
            seed: 1,
        });
        for n in 0..10 {
            link.submit(packet(n));
        }
        assert!(link.advance().is_empty());
        assert_eq!(link.stats().dropped, 10);
    }

    #[test]
    fn test_full_duplicate_rate_doubles_traffic() {
        let mut link = LinkConditioner::new(&LinkConfig {
            drop_rate: 0.0,
            duplicate_rate: 1.0,
            min_latency_steps: 0,
            max_latency_steps: 0,
            seed: 1,
        });
        link.submit(packet(4));
        assert_eq!(link.advance(), vec![packet(4), packet(4)]);
        assert_eq!(link.stats().duplicated, 1);
    }

    #[test]
    fn test_jitter_reorders_but_loses_nothing() {
        let mut link = LinkConditioner::new(&LinkConfig {
            drop_rate: 0.0,
            duplicate_rate: 0.0,
            min_latency_steps: 0,
            max_latency_steps: 6,
            seed: 99,
        });
        for n in 0..50 {
            link.submit(packet(n));
        }
        let mut received = Vec::new();
        for _ in 0..10 {
            received.extend(link.advance());
        }
        assert_eq!(received.len(), 50);
        let mut sorted = received.clone();
        sorted.sort();
        assert_eq!(sorted, (0..50).map(packet).collect::<Vec<_>>());
        assert_ne!(received, sorted, "seeded jitter should reorder packets");
    }

    #[test]
    fn test_same_seed_same_behaviour() {
        let config = LinkConfig {
            drop_rate: 0.3,
            duplicate_rate: 0.2,
            min_latency_steps: 0,
            max_latency_steps: 4,
            seed: 1234,
        };
        let run = || {
            let mut link = LinkConditioner::new(&config);
            let mut out = Vec::new();
            for n in 0..40 {
                link.submit(packet(n));
                out.extend(link.advance());
            }
            out
        };
        assert_eq!(run(), run());
    }
}
