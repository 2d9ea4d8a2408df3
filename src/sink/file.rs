use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{RecordSink, SinkState};
use crate::error::SinkError;
use crate::record::{StatsRecord, CSV_HEADER};

/// Appends records as CSV rows to `<base>.csv`.
///
/// Opening rotates an existing `<base>.csv` to `<base>-old.csv` and starts
/// a fresh file with the header row. Every row is flushed before `write`
/// returns.
pub struct FileSink {
    path: PathBuf,
    old_path: PathBuf,
    file: Option<File>,
    state: SinkState,
    shut_down: bool,
}

impl FileSink {
    pub fn new(base_name: impl AsRef<Path>) -> Self {
        let base = base_name.as_ref();
        Self {
            path: with_suffix(base, ".csv"),
            old_path: with_suffix(base, "-old.csv"),
            file: None,
            state: SinkState::Closed,
            shut_down: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn old_path(&self) -> &Path {
        &self.old_path
    }

    async fn create(&self) -> std::io::Result<File> {
        if fs::try_exists(&self.path).await? {
            debug!(path = %self.path.display(), "rotating previous stats file");
            // rename does not replace an existing target on every platform
            match fs::remove_file(&self.old_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            fs::rename(&self.path, &self.old_path).await?;
        }

        let mut file = File::create(&self.path).await?;
        file.write_all(CSV_HEADER.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(file)
    }
}

impl RecordSink for FileSink {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn state(&self) -> SinkState {
        self.state
    }

    async fn open(&mut self) -> Result<(), SinkError> {
        if self.state == SinkState::Open {
            return Ok(());
        }
        self.state = SinkState::Opening;
        match self.create().await {
            Ok(file) => {
                self.file = Some(file);
                self.state = SinkState::Open;
                self.shut_down = false;
                info!(path = %self.path.display(), "port stats file opened");
                Ok(())
            }
            Err(source) => {
                self.state = SinkState::Closed;
                Err(SinkError::Open {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }

    async fn write(&mut self, record: &StatsRecord) -> Result<(), SinkError> {
        if self.shut_down {
            return Err(SinkError::ShutDown(self.describe()));
        }
        let Some(file) = self.file.as_mut() else {
            return Err(SinkError::Unavailable(self.path.display().to_string()));
        };

        let mut row = record.to_csv_row();
        row.push('\n');

        let res = async {
            file.write_all(row.as_bytes()).await?;
            file.flush().await
        }
        .await;

        res.map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        let Some(mut file) = self.file.take() else {
            self.state = SinkState::Closed;
            return Ok(());
        };
        self.state = SinkState::Closed;
        self.shut_down = true;

        let res = async {
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        debug!(path = %self.path.display(), "port stats file closed");

        res.map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ConnectPoint, LinkRef, PortCounters};
    use chrono::Utc;

    fn record(src_port: &str, rx: u64) -> StatsRecord {
        let link = LinkRef::new(
            ConnectPoint::new("device:1", src_port),
            ConnectPoint::new("device:2", "7"),
        );
        let counters = PortCounters {
            duration_secs: 10,
            packets_received: Some(rx),
            packets_sent: Some(rx * 2),
            rx_dropped: Some(0),
            tx_dropped: Some(0),
            rx_errors: Some(0),
            tx_errors: Some(0),
            ..PortCounters::default()
        };
        StatsRecord::new(Utc::now(), &link, &counters)
    }

    #[tokio::test]
    async fn writes_header_then_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(dir.path().join("port_stats"));
        assert_eq!(sink.state(), SinkState::Closed);

        sink.open().await.unwrap();
        assert_eq!(sink.state(), SinkState::Open);

        let records: Vec<_> = (1..=3).map(|i| record(&i.to_string(), i * 10)).collect();
        for r in &records {
            sink.write(r).await.unwrap();
        }

        // rows are flushed per write, readable before close
        let text = std::fs::read_to_string(dir.path().join("port_stats.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1 + records.len());
        assert_eq!(lines[0], CSV_HEADER);
        for (line, r) in lines[1..].iter().zip(&records) {
            assert_eq!(&StatsRecord::parse_csv_row(line).unwrap(), r);
        }

        sink.close().await.unwrap();
        assert_eq!(sink.state(), SinkState::Closed);
    }

    #[tokio::test]
    async fn reopening_rotates_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("port_stats");

        let mut first = FileSink::new(&base);
        first.open().await.unwrap();
        first.write(&record("1", 5)).await.unwrap();
        first.write(&record("2", 6)).await.unwrap();
        first.close().await.unwrap();
        let before = std::fs::read_to_string(first.path()).unwrap();

        // a stale -old file is replaced
        std::fs::write(dir.path().join("port_stats-old.csv"), "stale\n").unwrap();

        let mut second = FileSink::new(&base);
        second.open().await.unwrap();
        second.close().await.unwrap();

        let old = std::fs::read_to_string(dir.path().join("port_stats-old.csv")).unwrap();
        assert_eq!(old, before);
        let fresh = std::fs::read_to_string(dir.path().join("port_stats.csv")).unwrap();
        assert_eq!(fresh, format!("{CSV_HEADER}\n"));
    }

    #[tokio::test]
    async fn write_before_open_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(dir.path().join("never_opened"));
        let err = sink.write(&record("1", 1)).await.unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
    }

    #[tokio::test]
    async fn write_after_close_is_a_shutdown_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(dir.path().join("port_stats"));
        sink.open().await.unwrap();
        sink.close().await.unwrap();
        // second close is a no-op
        sink.close().await.unwrap();

        let err = sink.write(&record("1", 1)).await.unwrap_err();
        assert!(matches!(err, SinkError::ShutDown(_)));
    }

    #[tokio::test]
    async fn open_failure_leaves_sink_closed() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(dir.path().join("missing_dir").join("port_stats"));
        let err = sink.open().await.unwrap_err();
        assert!(matches!(err, SinkError::Open { .. }));
        assert_eq!(sink.state(), SinkState::Closed);
    }

    #[test]
    fn paths_derive_from_base_name() {
        let sink = FileSink::new("stats/links");
        assert_eq!(sink.path(), Path::new("stats/links.csv"));
        assert_eq!(sink.old_path(), Path::new("stats/links-old.csv"));
    }
}
