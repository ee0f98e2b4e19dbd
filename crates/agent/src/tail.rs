//! Access-log tailing.
//!
//! The tunnel process writes one line per accepted connection:
//!
//! ```text
//! 2026/01/28 11:23:18.306521 from 188.170.87.33:20129 accepted tcp:example.com:443 [node >> DIRECT] email: 154
//! ```
//!
//! Only accepts appear; disconnects are derived collector-side by the
//! stale-closure sweep. [`SnapshotTailer`] reads the last N bytes for
//! bootstrap and ad-hoc scans; [`RealtimeTailer`] remembers `(inode,
//! offset)` and reads only what was appended, resetting on rotation.

use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use argus_core::ConnectionReport;

use crate::error::AgentError;

static ACCEPT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d{4}/\d{2}/\d{2}\s+\d{2}:\d{2}:\d{2}(?:\.\d+)?)\s+from\s+(\d+\.\d+\.\d+\.\d+):(\d+)\s+accepted.*?email:\s*(\d+)",
    )
    .expect("static pattern")
});

/// Parse a log timestamp, microseconds preserved. Falls back to `now`:
/// a clock-less report is better than a dropped one.
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    let raw = raw.trim();
    for format in ["%Y/%m/%d %H:%M:%S%.f", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return naive.and_utc();
        }
    }
    Utc::now()
}

#[derive(Debug, Default, Clone, Copy)]
struct ParseStats {
    lines: usize,
    accepted: usize,
    matched: usize,
}

/// Parse accept lines into reports, deduplicating on `(user id, ip)` and
/// keeping the latest timestamp for each pair.
fn parse_lines<'a, I>(lines: I, node_uuid: Uuid) -> (Vec<ConnectionReport>, ParseStats)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut stats = ParseStats::default();
    let mut latest: std::collections::HashMap<(String, String), DateTime<Utc>> =
        std::collections::HashMap::new();

    for line in lines {
        stats.lines += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Cheap pre-filter before the regex.
        if !line.to_lowercase().contains("accepted") {
            continue;
        }
        stats.accepted += 1;

        let Some(captures) = ACCEPT_LINE.captures(line) else {
            debug!(line = line.get(..100).unwrap_or(line), "accept line failed the pattern");
            continue;
        };
        stats.matched += 1;

        let connected_at = parse_timestamp(&captures[1]);
        let user = format!("user_{}", &captures[4]);
        let ip = captures[2].to_owned();

        latest
            .entry((user, ip))
            .and_modify(|t| *t = (*t).max(connected_at))
            .or_insert(connected_at);
    }

    let reports = latest
        .into_iter()
        .map(|((user_email, ip_address), connected_at)| ConnectionReport {
            user_email,
            ip_address,
            node_uuid,
            connected_at,
            disconnected_at: None,
            bytes_sent: 0,
            bytes_received: 0,
        })
        .collect();
    (reports, stats)
}

#[cfg(unix)]
fn inode_of(meta: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn inode_of(_meta: &std::fs::Metadata) -> Option<u64> {
    None
}

/// One-shot tail reader: last N bytes, every matching line.
pub struct SnapshotTailer {
    path: PathBuf,
    buffer_size: u64,
    node_uuid: Uuid,
}

impl SnapshotTailer {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, buffer_size: u64, node_uuid: Uuid) -> Self {
        Self {
            path: path.into(),
            buffer_size,
            node_uuid,
        }
    }

    /// Read and parse the log tail.
    ///
    /// # Errors
    ///
    /// [`AgentError::LogUnreadable`] when the file is missing or cannot be
    /// opened; the caller treats that as an empty batch.
    pub async fn collect(&self) -> Result<Vec<ConnectionReport>, AgentError> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| AgentError::LogUnreadable(e.to_string()))?;
        if meta.len() == 0 {
            return Ok(Vec::new());
        }

        let start = meta.len().saturating_sub(self.buffer_size);
        let content = read_from(&self.path, start).await?;
        let (reports, stats) = parse_lines(content.lines(), self.node_uuid);
        info!(
            lines = stats.lines,
            accepted = stats.accepted,
            matched = stats.matched,
            connections = reports.len(),
            "snapshot parse"
        );
        Ok(reports)
    }
}

/// Incremental tail reader with rotation detection.
///
/// Remembers `(inode, byte offset)` across polls. Rotation shows up as an
/// inode change or a file shorter than the offset; both reset the offset
/// to zero so the new file is read from its start. The first poll seeds
/// the offset `buffer_size` bytes before EOF so startup never replays
/// history beyond that.
pub struct RealtimeTailer {
    path: PathBuf,
    buffer_size: u64,
    node_uuid: Uuid,
    offset: u64,
    inode: Option<u64>,
    initialized: bool,
}

impl RealtimeTailer {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, buffer_size: u64, node_uuid: Uuid) -> Self {
        Self {
            path: path.into(),
            buffer_size,
            node_uuid,
            offset: 0,
            inode: None,
            initialized: false,
        }
    }

    async fn initialize(&mut self) -> Result<(), AgentError> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| AgentError::LogUnreadable(e.to_string()))?;
        self.inode = inode_of(&meta);
        self.offset = meta.len().saturating_sub(self.buffer_size);
        info!(
            file_size = meta.len(),
            start_offset = self.offset,
            "realtime tailer initialized"
        );
        Ok(())
    }

    fn detect_rotation(&mut self, meta: &std::fs::Metadata) {
        let current_inode = inode_of(meta);
        if let (Some(old), Some(new)) = (self.inode, current_inode)
            && old != new
        {
            info!(old_inode = old, new_inode = new, "log rotated, resetting offset");
            self.offset = 0;
        } else if meta.len() < self.offset {
            info!(
                offset = self.offset,
                size = meta.len(),
                "log shrank, resetting offset"
            );
            self.offset = 0;
        }
        self.inode = current_inode;
    }

    /// Read newly appended lines and parse them.
    ///
    /// # Errors
    ///
    /// [`AgentError::LogUnreadable`] when the file is missing or cannot be
    /// opened. The remembered position is kept so a reappearing file
    /// resumes cleanly.
    pub async fn poll(&mut self) -> Result<Vec<ConnectionReport>, AgentError> {
        if !self.initialized {
            self.initialize().await?;
            self.initialized = true;
        }

        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| AgentError::LogUnreadable(e.to_string()))?;
        self.detect_rotation(&meta);

        if meta.len() <= self.offset {
            return Ok(Vec::new());
        }

        let content = read_from(&self.path, self.offset).await?;
        let old_offset = self.offset;
        self.offset = meta.len();

        let (reports, stats) = parse_lines(content.lines(), self.node_uuid);
        if !reports.is_empty() {
            info!(
                from = old_offset,
                to = self.offset,
                lines = stats.lines,
                matched = stats.matched,
                connections = reports.len(),
                "realtime parse"
            );
        }
        Ok(reports)
    }
}

async fn read_from(path: &std::path::Path, offset: u64) -> Result<String, AgentError> {
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| AgentError::LogUnreadable(e.to_string()))?;
    file.seek(std::io::SeekFrom::Start(offset))
        .await
        .map_err(|e| AgentError::LogUnreadable(e.to_string()))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .await
        .map_err(|e| AgentError::LogUnreadable(e.to_string()))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LINE_A: &str = "2026/01/28 11:23:18.306521 from 188.170.87.33:20129 accepted tcp:accounts.google.com:443 [Sweden1 >> DIRECT] email: 154";
    const LINE_B: &str = "2026/01/28 11:24:02.112233 from 10.20.30.40:1111 accepted tcp:example.com:443 [Sweden1 >> DIRECT] email: 7";
    const NOISE: &str = "2026/01/28 11:23:19 [Warning] connection closed unexpectedly";

    fn node() -> Uuid {
        Uuid::nil()
    }

    #[test]
    fn accept_line_parses_fields_and_microseconds() {
        let (reports, stats) = parse_lines([LINE_A, NOISE], node());
        assert_eq!(stats.matched, 1);
        assert_eq!(reports.len(), 1);
        let r = &reports[0];
        assert_eq!(r.user_email, "user_154");
        assert_eq!(r.ip_address, "188.170.87.33");
        assert_eq!(r.connected_at.timestamp_subsec_micros(), 306_521);
        assert_eq!(r.disconnected_at, None);
        assert_eq!(r.bytes_sent, 0);
    }

    #[test]
    fn duplicate_pairs_keep_the_latest_timestamp() {
        let earlier = "2026/01/28 11:20:00 from 188.170.87.33:1111 accepted tcp:a.com:443 email: 154";
        let (reports, _) = parse_lines([earlier, LINE_A], node());
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].connected_at.timestamp_subsec_micros(), 306_521);
    }

    #[test]
    fn timestamp_without_fraction_parses() {
        let ts = parse_timestamp("2026/01/28 11:23:18");
        assert_eq!(ts.timestamp_subsec_micros(), 0);
    }

    #[test]
    fn unparsable_timestamp_falls_back_to_now() {
        let before = Utc::now();
        let ts = parse_timestamp("not a timestamp");
        assert!(ts >= before);
    }

    #[tokio::test]
    async fn snapshot_reads_the_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        std::fs::write(&path, format!("{NOISE}\n{LINE_A}\n{LINE_B}\n")).unwrap();

        let tailer = SnapshotTailer::new(&path, 64 * 1024, node());
        let reports = tailer.collect().await.unwrap();
        assert_eq!(reports.len(), 2);
    }

    #[tokio::test]
    async fn missing_log_is_unreadable() {
        let tailer = SnapshotTailer::new("/nonexistent/access.log", 1024, node());
        assert!(matches!(
            tailer.collect().await,
            Err(AgentError::LogUnreadable(_))
        ));
    }

    #[tokio::test]
    async fn realtime_reads_only_appended_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        std::fs::write(&path, format!("{LINE_A}\n")).unwrap();

        let mut tailer = RealtimeTailer::new(&path, 64 * 1024, node());

        // First poll bootstraps from the tail.
        let first = tailer.poll().await.unwrap();
        assert_eq!(first.len(), 1);

        // Nothing new: replaying from the remembered offset is empty.
        assert!(tailer.poll().await.unwrap().is_empty());

        // Append one line; only it comes back.
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{LINE_B}").unwrap();
        drop(file);

        let second = tailer.poll().await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].user_email, "user_7");
    }

    #[tokio::test]
    async fn rotation_resets_to_the_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        std::fs::write(&path, format!("{LINE_A}\n{LINE_A}\n{LINE_A}\n")).unwrap();

        let mut tailer = RealtimeTailer::new(&path, 64 * 1024, node());
        tailer.poll().await.unwrap();

        // Replace the file: new inode, smaller size.
        std::fs::remove_file(&path).unwrap();
        std::fs::write(&path, format!("{LINE_B}\n")).unwrap();

        let reports = tailer.poll().await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].user_email, "user_7");
    }

    #[tokio::test]
    async fn startup_offset_skips_deep_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        // Two lines; the buffer only covers the second one.
        let content = format!("{LINE_A}\n{LINE_B}\n");
        std::fs::write(&path, &content).unwrap();

        let tail_len = (LINE_B.len() + 1) as u64;
        let mut tailer = RealtimeTailer::new(&path, tail_len, node());
        let reports = tailer.poll().await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].user_email, "user_7");
    }
}
