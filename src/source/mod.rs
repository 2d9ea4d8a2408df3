pub mod simulated;

pub use simulated::SimulatedTopology;

use serde::Serialize;

// ─── Topology types ──────────────────────────────────────────────

/// One end of a link: a device and one of its ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectPoint {
    pub device_id: String,
    pub port: String,
}

impl ConnectPoint {
    pub fn new(device_id: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            port: port.into(),
        }
    }
}

/// An active link between two connect points.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LinkRef {
    pub src: ConnectPoint,
    pub dst: ConnectPoint,
}

impl LinkRef {
    pub fn new(src: ConnectPoint, dst: ConnectPoint) -> Self {
        Self { src, dst }
    }
}

/// Delta port statistics as reported by the control plane.
///
/// Every counter is the increase since the previous poll. A counter the
/// device does not report is `None`, which is distinct from zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortCounters {
    pub duration_secs: u64,
    pub packets_received: Option<u64>,
    pub packets_sent: Option<u64>,
    pub rx_dropped: Option<u64>,
    pub tx_dropped: Option<u64>,
    pub rx_errors: Option<u64>,
    pub tx_errors: Option<u64>,
    pub bytes_received: Option<u64>,
    pub bytes_sent: Option<u64>,
}

// ─── Collaborator trait ──────────────────────────────────────────

/// Read side of the network controller: topology plus port statistics.
pub trait CounterSource: Send + Sync {
    /// Links that are currently up. Order carries no meaning.
    fn active_links(&self) -> Vec<LinkRef>;

    /// Delta counters for one port, or `None` when the controller has no
    /// sample for it yet.
    fn delta_counters(&self, device_id: &str, port: &str) -> Option<PortCounters>;
}
