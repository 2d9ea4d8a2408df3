use std::collections::BTreeMap;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use tracing::info;

use super::{RecordSink, SinkState};
use crate::error::SinkError;
use crate::record::StatsRecord;

// ─── Wire format ─────────────────────────────────────────────────

/// Message key: the link, identified by its two devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkKey<'a> {
    pub src_device_id: &'a str,
    pub dst_device_id: &'a str,
}

/// One published message per record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokerMessage<'a> {
    pub key: LinkKey<'a>,
    pub value: BTreeMap<&'static str, u64>,
    pub timestamp: String,
}

impl<'a> BrokerMessage<'a> {
    pub fn from_record(record: &'a StatsRecord) -> Self {
        Self {
            key: LinkKey {
                src_device_id: record.src_device_id(),
                dst_device_id: record.dst_device_id(),
            },
            value: record.metrics().collect(),
            timestamp: record
                .timestamp()
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}

// ─── Sink ────────────────────────────────────────────────────────

/// Publishes records to a Redis pub/sub channel.
///
/// A sink that never connected drops every record with
/// [`SinkError::Unavailable`]; the caller decides how loudly to complain.
pub struct BrokerSink {
    url: String,
    topic: String,
    timeout: Duration,
    conn: Option<ConnectionManager>,
    state: SinkState,
    shut_down: bool,
}

impl BrokerSink {
    pub fn new(url: &str, topic: &str, timeout: Duration) -> Self {
        Self {
            url: url.to_owned(),
            topic: topic.to_owned(),
            timeout,
            conn: None,
            state: SinkState::Closed,
            shut_down: false,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// `ConnectionManager` reconnects on its own once established, so only
    /// the first connect is bounded here.
    async fn connect(&self) -> Result<ConnectionManager, SinkError> {
        let client = redis::Client::open(self.url.as_str())?;
        match tokio::time::timeout(self.timeout, ConnectionManager::new(client)).await {
            Ok(conn) => Ok(conn?),
            Err(_) => Err(SinkError::Timeout(self.timeout_ms())),
        }
    }
}

impl RecordSink for BrokerSink {
    fn describe(&self) -> String {
        format!("{} ({})", self.topic, self.url)
    }

    fn state(&self) -> SinkState {
        self.state
    }

    async fn open(&mut self) -> Result<(), SinkError> {
        if self.state == SinkState::Open {
            return Ok(());
        }
        self.state = SinkState::Opening;
        match self.connect().await {
            Ok(conn) => {
                self.conn = Some(conn);
                self.state = SinkState::Open;
                self.shut_down = false;
                info!(url = %self.url, topic = %self.topic, "connected to broker");
                Ok(())
            }
            Err(e) => {
                self.state = SinkState::Closed;
                Err(e)
            }
        }
    }

    async fn write(&mut self, record: &StatsRecord) -> Result<(), SinkError> {
        if self.shut_down {
            return Err(SinkError::ShutDown(self.describe()));
        }
        let timeout = self.timeout;
        let timeout_ms = self.timeout_ms();
        let Some(conn) = self.conn.as_mut() else {
            return Err(SinkError::Unavailable(format!("broker {}", self.url)));
        };

        let payload = serde_json::to_string(&BrokerMessage::from_record(record))?;
        let publish = conn.publish::<_, _, i64>(self.topic.as_str(), payload);
        match tokio::time::timeout(timeout, publish).await {
            Ok(res) => res.map(|_receivers| ()).map_err(SinkError::from),
            Err(_) => Err(SinkError::Timeout(timeout_ms)),
        }
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        if self.conn.take().is_some() {
            self.shut_down = true;
            info!(topic = %self.topic, "broker connection released");
        }
        self.state = SinkState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ConnectPoint, LinkRef, PortCounters};
    use chrono::{TimeZone, Utc};

    fn record() -> StatsRecord {
        let link = LinkRef::new(
            ConnectPoint::new("device:1", "3"),
            ConnectPoint::new("device:2", "7"),
        );
        let counters = PortCounters {
            duration_secs: 42,
            packets_received: Some(100),
            packets_sent: Some(200),
            tx_errors: Some(2),
            bytes_sent: Some(12_800),
            ..PortCounters::default()
        };
        let ts = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        StatsRecord::new(ts, &link, &counters)
    }

    #[test]
    fn message_keys_on_device_pair() {
        let rec = record();
        let json = serde_json::to_value(BrokerMessage::from_record(&rec)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "key": { "src_device_id": "device:1", "dst_device_id": "device:2" },
                "value": {
                    "age_seconds": 42,
                    "packets_received": 100,
                    "packets_sent": 200,
                    "tx_errors": 2,
                    "bytes_sent": 12800
                },
                "timestamp": "2026-10-19T12:00:00.000Z"
            })
        );
    }

    #[tokio::test]
    async fn unreachable_broker_drops_writes() {
        let mut sink = BrokerSink::new("not a redis url", "link_stats", Duration::from_millis(200));
        assert!(sink.open().await.is_err());
        assert_eq!(sink.state(), SinkState::Closed);

        let err = sink.write(&record()).await.unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));

        // closing a sink that never connected is fine, and it stays usable
        sink.close().await.unwrap();
        assert!(matches!(
            sink.write(&record()).await,
            Err(SinkError::Unavailable(_))
        ));
    }

    #[test]
    fn describe_names_topic_and_url() {
        let sink = BrokerSink::new(
            "redis://10.0.0.5:6379/",
            "onos_link_stats",
            Duration::from_secs(1),
        );
        assert_eq!(sink.describe(), "onos_link_stats (redis://10.0.0.5:6379/)");
        assert_eq!(sink.topic(), "onos_link_stats");
    }
}
