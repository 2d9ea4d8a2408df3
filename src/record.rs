use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::RecordParseError;
use crate::source::{LinkRef, PortCounters};

/// Column order of every CSV row.
pub const CSV_HEADER: &str =
    "Time,DeviceId,SrcPort,DstDeviceId,DstPort,Age,PktsRecvd,PktsSent,RxPktDrop,TxPktDrop,RxPktErr,TxPktErn";

const CSV_COLUMNS: usize = 12;

/// Normalized statistics of one link at one instant.
///
/// Built once per (link, tick) and never mutated afterwards; the fields are
/// private so a record can only come out of [`StatsRecord::new`] or a parsed
/// CSV row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsRecord {
    timestamp: DateTime<Utc>,
    src_device_id: String,
    src_port: String,
    dst_device_id: String,
    dst_port: String,
    age_seconds: u64,
    packets_received: Option<u64>,
    packets_sent: Option<u64>,
    rx_dropped: Option<u64>,
    tx_dropped: Option<u64>,
    rx_errors: Option<u64>,
    tx_errors: Option<u64>,
    bytes_received: Option<u64>,
    bytes_sent: Option<u64>,
}

impl StatsRecord {
    pub fn new(timestamp: DateTime<Utc>, link: &LinkRef, counters: &PortCounters) -> Self {
        Self {
            timestamp,
            src_device_id: link.src.device_id.clone(),
            src_port: link.src.port.clone(),
            dst_device_id: link.dst.device_id.clone(),
            dst_port: link.dst.port.clone(),
            age_seconds: counters.duration_secs,
            packets_received: counters.packets_received,
            packets_sent: counters.packets_sent,
            rx_dropped: counters.rx_dropped,
            tx_dropped: counters.tx_dropped,
            rx_errors: counters.rx_errors,
            tx_errors: counters.tx_errors,
            bytes_received: counters.bytes_received,
            bytes_sent: counters.bytes_sent,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    pub fn src_device_id(&self) -> &str {
        &self.src_device_id
    }
    pub fn src_port(&self) -> &str {
        &self.src_port
    }
    pub fn dst_device_id(&self) -> &str {
        &self.dst_device_id
    }
    pub fn dst_port(&self) -> &str {
        &self.dst_port
    }
    pub fn age_seconds(&self) -> u64 {
        self.age_seconds
    }
    pub fn packets_received(&self) -> Option<u64> {
        self.packets_received
    }
    pub fn packets_sent(&self) -> Option<u64> {
        self.packets_sent
    }
    pub fn rx_dropped(&self) -> Option<u64> {
        self.rx_dropped
    }
    pub fn tx_dropped(&self) -> Option<u64> {
        self.tx_dropped
    }
    pub fn rx_errors(&self) -> Option<u64> {
        self.rx_errors
    }
    pub fn tx_errors(&self) -> Option<u64> {
        self.tx_errors
    }
    pub fn bytes_received(&self) -> Option<u64> {
        self.bytes_received
    }
    pub fn bytes_sent(&self) -> Option<u64> {
        self.bytes_sent
    }

    /// Counters as `(metric name, value)` pairs, skipping the ones the
    /// device did not report.
    pub fn metrics(&self) -> impl Iterator<Item = (&'static str, u64)> {
        [
            ("age_seconds", Some(self.age_seconds)),
            ("packets_received", self.packets_received),
            ("packets_sent", self.packets_sent),
            ("rx_dropped", self.rx_dropped),
            ("tx_dropped", self.tx_dropped),
            ("rx_errors", self.rx_errors),
            ("tx_errors", self.tx_errors),
            ("bytes_received", self.bytes_received),
            ("bytes_sent", self.bytes_sent),
        ]
        .into_iter()
        .filter_map(|(name, v)| v.map(|v| (name, v)))
    }

    /// One CSV row in [`CSV_HEADER`] order, without the trailing newline.
    /// Missing counters become empty fields.
    pub fn to_csv_row(&self) -> String {
        let opt = |v: Option<u64>| v.map(|v| v.to_string()).unwrap_or_default();
        [
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.src_device_id.clone(),
            self.src_port.clone(),
            self.dst_device_id.clone(),
            self.dst_port.clone(),
            self.age_seconds.to_string(),
            opt(self.packets_received),
            opt(self.packets_sent),
            opt(self.rx_dropped),
            opt(self.tx_dropped),
            opt(self.rx_errors),
            opt(self.tx_errors),
        ]
        .join(",")
    }

    /// Read a row produced by [`to_csv_row`](Self::to_csv_row) back by
    /// position. Byte counters are not part of the CSV and come back as
    /// `None`.
    pub fn parse_csv_row(row: &str) -> Result<Self, RecordParseError> {
        let cols: Vec<&str> = row.trim_end_matches(['\r', '\n']).split(',').collect();
        if cols.len() != CSV_COLUMNS {
            return Err(RecordParseError::ColumnCount {
                expected: CSV_COLUMNS,
                found: cols.len(),
            });
        }

        let timestamp = DateTime::parse_from_rfc3339(cols[0])
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| RecordParseError::Column {
                column: "Time",
                value: cols[0].to_owned(),
            })?;
        let age_seconds = cols[5].parse().map_err(|_| RecordParseError::Column {
            column: "Age",
            value: cols[5].to_owned(),
        })?;

        Ok(Self {
            timestamp,
            src_device_id: cols[1].to_owned(),
            src_port: cols[2].to_owned(),
            dst_device_id: cols[3].to_owned(),
            dst_port: cols[4].to_owned(),
            age_seconds,
            packets_received: parse_counter("PktsRecvd", cols[6])?,
            packets_sent: parse_counter("PktsSent", cols[7])?,
            rx_dropped: parse_counter("RxPktDrop", cols[8])?,
            tx_dropped: parse_counter("TxPktDrop", cols[9])?,
            rx_errors: parse_counter("RxPktErr", cols[10])?,
            tx_errors: parse_counter("TxPktErn", cols[11])?,
            bytes_received: None,
            bytes_sent: None,
        })
    }
}

fn parse_counter(column: &'static str, value: &str) -> Result<Option<u64>, RecordParseError> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| RecordParseError::Column {
            column,
            value: value.to_owned(),
        })
}
