//! The send/receive seam used by the netcode core.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use rewind_config::LinkConfig;

use crate::link::{LinkConditioner, LinkStats};
use crate::messages::{
    EntityId, Envelope, InputPayload, Message, StatePayload, deserialize_envelope,
    serialize_envelope,
};

/// Outbound half of the network: fire-and-forget sends addressed to an entity.
///
/// Implementations must not block and must not report delivery failures to
/// the caller; a lost packet is indistinguishable from a slow one.
pub trait Transport {
    /// Client → server: one tick of input for `entity`.
    fn send_input(&self, entity: EntityId, input: &InputPayload);

    /// Server → owning client: the latest authoritative state of `entity`.
    fn send_state(&self, entity: EntityId, state: &StatePayload);
}

/// Traffic counters for an [`Endpoint`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointStats {
    /// Envelopes serialized and handed to the channel.
    pub sent: u64,
    /// Envelopes decoded and returned from [`Endpoint::poll`].
    pub received: u64,
    /// Packets discarded because they failed to decode or validate.
    pub malformed: u64,
}

/// In-process endpoint carrying serialized envelopes over a channel.
///
/// Sending is thread-safe (`&self`) so a network thread can share the
/// endpoint's outbound side; receiving happens once per frame via
/// [`poll`](Self::poll), which runs incoming bytes through the link
/// conditioner and the deserialization boundary.
pub struct Endpoint {
    outbound: Sender<Vec<u8>>,
    inbound: Receiver<Vec<u8>>,
    link: LinkConditioner,
    sent: AtomicU64,
    received: u64,
    malformed: u64,
}

impl Endpoint {
    /// Two connected endpoints. Each direction gets its own conditioner
    /// seeded from `link` (the second with `seed + 1`).
    pub fn pair(link: &LinkConfig) -> (Endpoint, Endpoint) {
        let reverse = LinkConfig {
            seed: link.seed.wrapping_add(1),
            ..link.clone()
        };
        Self::pair_with(LinkConditioner::new(link), LinkConditioner::new(&reverse))
    }

    /// Two connected endpoints over perfect links.
    pub fn pair_ideal() -> (Endpoint, Endpoint) {
        Self::pair_with(LinkConditioner::ideal(), LinkConditioner::ideal())
    }

    /// Two connected endpoints with explicit receive-side conditioners.
    pub fn pair_with(a_link: LinkConditioner, b_link: LinkConditioner) -> (Endpoint, Endpoint) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        (Self::new(a_tx, a_rx, a_link), Self::new(b_tx, b_rx, b_link))
    }

    /// An endpoint that delivers to itself. Used by a host, which is both
    /// the server and the owning client of its entity.
    pub fn loopback(link: LinkConditioner) -> Endpoint {
        let (tx, rx) = unbounded();
        Self::new(tx, rx, link)
    }

    fn new(outbound: Sender<Vec<u8>>, inbound: Receiver<Vec<u8>>, link: LinkConditioner) -> Self {
        Self {
            outbound,
            inbound,
            link,
            sent: AtomicU64::new(0),
            received: 0,
            malformed: 0,
        }
    }

    fn send(&self, envelope: Envelope) {
        match serialize_envelope(&envelope) {
            Ok(bytes) => {
                if self.outbound.send(bytes).is_err() {
                    tracing::trace!("peer endpoint closed, dropping {}", envelope.entity);
                    return;
                }
                self.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => tracing::warn!("failed to serialize message for {}: {e}", envelope.entity),
        }
    }

    /// Drain everything that arrived, advance the link one step, and return
    /// the envelopes that made it through, in delivery order.
    pub fn poll(&mut self) -> Vec<Envelope> {
        for bytes in self.inbound.try_iter() {
            self.link.submit(bytes);
        }

        let mut envelopes = Vec::new();
        for bytes in self.link.advance() {
            match deserialize_envelope(&bytes) {
                Ok(envelope) => envelopes.push(envelope),
                Err(e) => {
                    self.malformed += 1;
                    tracing::warn!("discarding malformed packet ({} bytes): {e}", bytes.len());
                }
            }
        }
        self.received += envelopes.len() as u64;
        envelopes
    }

    /// Inject raw bytes as if they had arrived from the peer.
    pub fn inject_raw(&mut self, bytes: Vec<u8>) {
        self.link.submit(bytes);
    }

    /// Traffic counters for this endpoint.
    pub fn stats(&self) -> EndpointStats {
        EndpointStats {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received,
            malformed: self.malformed,
        }
    }

    /// Counters of the receive-side link.
    pub fn link_stats(&self) -> LinkStats {
        self.link.stats()
    }
}

impl Transport for Endpoint {
    fn send_input(&self, entity: EntityId, input: &InputPayload) {
        self.send(Envelope {
            entity,
            message: Message::InputSubmit(*input),
        });
    }

    fn send_state(&self, entity: EntityId, state: &StatePayload) {
        self.send(Envelope {
            entity,
            message: Message::StateBroadcast(*state),
        });
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    #[test]
    fn test_pair_delivers_both_directions() {
        let (mut client, mut server) = Endpoint::pair_ideal();

        client.send_input(EntityId(1), &InputPayload::idle(10));
        let received = server.poll();
        assert_eq!(
            received,
            vec![Envelope {
                entity: EntityId(1),
                message: Message::InputSubmit(InputPayload::idle(10)),
            }]
        );

        let state = StatePayload::at_rest(10, Vec3::new(1.0, 0.0, 0.0));
        server.send_state(EntityId(1), &state);
        let received = client.poll();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message, Message::StateBroadcast(state));

        assert_eq!(client.stats().sent, 1);
        assert_eq!(client.stats().received, 1);
        assert_eq!(server.stats().sent, 1);
    }

    #[test]
    fn test_loopback_delivers_to_self() {
        let mut host = Endpoint::loopback(LinkConditioner::ideal());
        host.send_input(EntityId(3), &InputPayload::idle(1));
        host.send_state(EntityId(3), &StatePayload::at_rest(1, Vec3::ZERO));
        let received = host.poll();
        assert_eq!(received.len(), 2);
        assert!(matches!(received[0].message, Message::InputSubmit(_)));
        assert!(matches!(received[1].message, Message::StateBroadcast(_)));
    }

    #[test]
    fn test_malformed_packets_are_counted_and_dropped() {
        let mut endpoint = Endpoint::loopback(LinkConditioner::ideal());
        endpoint.inject_raw(vec![]);
        endpoint.inject_raw(vec![crate::PROTOCOL_VERSION, 0xFF, 0xFF]);
        endpoint.send_input(EntityId(1), &InputPayload::idle(2));

        let received = endpoint.poll();
        assert_eq!(received.len(), 1);
        assert_eq!(endpoint.stats().malformed, 2);
    }

    #[test]
    fn test_send_from_another_thread() {
        let (client, mut server) = Endpoint::pair_ideal();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for tick in 0..16 {
                    client.send_input(EntityId(7), &InputPayload::idle(tick));
                }
            });
        });
        let received = server.poll();
        assert_eq!(received.len(), 16);
    }

    #[test]
    fn test_closed_peer_does_not_panic() {
        let (client, server) = Endpoint::pair_ideal();
        drop(server);
        client.send_input(EntityId(1), &InputPayload::idle(0));
        assert_eq!(client.stats().sent, 0);
    }
}
