use std::collections::HashSet;
use std::time::Instant;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use super::{ConnectPoint, CounterSource, LinkRef, PortCounters};

// ─── Constants ───────────────────────────────────────────────────

/// Ports 1 and 2 of every switch face its ring neighbours.
const EAST_PORT: &str = "1";
const WEST_PORT: &str = "2";

/// Upper bound of the per-poll packet delta on a busy port.
const MAX_PACKETS_PER_POLL: u64 = 50_000;

const MIN_FRAME_BYTES: u64 = 64;
const MAX_FRAME_BYTES: u64 = 1_500;

// ─── Public type ─────────────────────────────────────────────────

/// In-memory ring of OpenFlow-style switches producing random delta
/// counters. Stands in for the controller when no real one is attached.
pub struct SimulatedTopology {
    links: Vec<LinkRef>,
    started: Instant,
    /// Probability (0–100) that a port has no sample for a given poll.
    missing_pct: u8,
    inner: Mutex<Inner>,
}

struct Inner {
    rng: StdRng,
    /// Ports whose statistics are withheld until restored.
    silenced: HashSet<(String, String)>,
}

impl SimulatedTopology {
    /// Builds a bidirectional ring of `switches` devices. Fewer than two
    /// switches means no links.
    pub fn ring(switches: usize, seed: u64) -> Self {
        let mut links = Vec::with_capacity(switches * 2);
        if switches >= 2 {
            for i in 0..switches {
                let a = device_id(i);
                let b = device_id((i + 1) % switches);
                links.push(LinkRef::new(
                    ConnectPoint::new(a.clone(), EAST_PORT),
                    ConnectPoint::new(b.clone(), WEST_PORT),
                ));
                links.push(LinkRef::new(
                    ConnectPoint::new(b, WEST_PORT),
                    ConnectPoint::new(a, EAST_PORT),
                ));
            }
        }

        Self {
            links,
            started: Instant::now(),
            missing_pct: 0,
            inner: Mutex::new(Inner {
                rng: StdRng::seed_from_u64(seed),
                silenced: HashSet::new(),
            }),
        }
    }

    /// Randomly withhold samples, `pct` percent of the time per port.
    pub fn with_missing_samples(mut self, pct: u8) -> Self {
        self.missing_pct = pct.min(100);
        self
    }

    /// Stop reporting statistics for one port until [`restore`](Self::restore).
    pub fn silence(&self, device_id: &str, port: &str) {
        self.inner
            .lock()
            .silenced
            .insert((device_id.to_owned(), port.to_owned()));
    }

    pub fn restore(&self, device_id: &str, port: &str) {
        self.inner
            .lock()
            .silenced
            .remove(&(device_id.to_owned(), port.to_owned()));
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

impl CounterSource for SimulatedTopology {
    fn active_links(&self) -> Vec<LinkRef> {
        self.links.clone()
    }

    fn delta_counters(&self, device_id: &str, port: &str) -> Option<PortCounters> {
        let mut inner = self.inner.lock();
        if inner
            .silenced
            .contains(&(device_id.to_owned(), port.to_owned()))
        {
            return None;
        }
        if self.missing_pct > 0 && inner.rng.gen_range(0u8..100) < self.missing_pct {
            return None;
        }

        let rng = &mut inner.rng;
        let rx = rng.gen_range(0..=MAX_PACKETS_PER_POLL);
        let tx = rng.gen_range(0..=MAX_PACKETS_PER_POLL);
        // Drops and errors stay rare: at most ~0.1 % of the traffic.
        let rx_dropped = rng.gen_range(0..=rx / 1_000);
        let tx_dropped = rng.gen_range(0..=tx / 1_000);
        let rx_errors = rng.gen_range(0..=rx / 5_000);
        let tx_errors = rng.gen_range(0..=tx / 5_000);
        let frame = rng.gen_range(MIN_FRAME_BYTES..=MAX_FRAME_BYTES);

        Some(PortCounters {
            duration_secs: self.started.elapsed().as_secs(),
            packets_received: Some(rx),
            packets_sent: Some(tx),
            rx_dropped: Some(rx_dropped),
            tx_dropped: Some(tx_dropped),
            rx_errors: Some(rx_errors),
            tx_errors: Some(tx_errors),
            bytes_received: Some(rx * frame),
            bytes_sent: Some(tx * frame),
        })
    }
}

/// ONOS-style OpenFlow device id, e.g. `of:0000000000000001`.
fn device_id(i: usize) -> String {
    format!("of:{:016x}", i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_has_two_links_per_switch() {
        let topo = SimulatedTopology::ring(4, 7);
        let links = topo.active_links();
        assert_eq!(links.len(), 8);
        assert_eq!(links[0].src, ConnectPoint::new("of:0000000000000001", "1"));
        assert_eq!(links[0].dst, ConnectPoint::new("of:0000000000000002", "2"));
        // last switch wraps around to the first
        assert_eq!(links[6].dst.device_id, "of:0000000000000001");
    }

    #[test]
    fn tiny_rings_have_no_links() {
        assert_eq!(SimulatedTopology::ring(0, 1).link_count(), 0);
        assert_eq!(SimulatedTopology::ring(1, 1).link_count(), 0);
    }

    #[test]
    fn counters_stay_consistent() {
        let topo = SimulatedTopology::ring(3, 42);
        for link in topo.active_links() {
            let c = topo
                .delta_counters(&link.src.device_id, &link.src.port)
                .unwrap();
            let rx = c.packets_received.unwrap();
            assert!(c.rx_dropped.unwrap() <= rx);
            assert!(c.bytes_received.unwrap() >= rx * MIN_FRAME_BYTES);
        }
    }

    #[test]
    fn silenced_ports_report_nothing() {
        let topo = SimulatedTopology::ring(2, 1);
        topo.silence("of:0000000000000001", "1");
        assert!(topo.delta_counters("of:0000000000000001", "1").is_none());
        assert!(topo.delta_counters("of:0000000000000002", "2").is_some());
        topo.restore("of:0000000000000001", "1");
        assert!(topo.delta_counters("of:0000000000000001", "1").is_some());
    }

    #[test]
    fn full_missing_rate_withholds_everything() {
        let topo = SimulatedTopology::ring(2, 1).with_missing_samples(100);
        assert!(topo.delta_counters("of:0000000000000001", "1").is_none());
    }
}
