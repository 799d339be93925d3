//! Rotating ring of log files
//!
//! Each slot moves through `CreateNew -> AppendExisting -> (span elapsed) ->
//! next slot`. The index advances `(i + 1) % ring_size`; the advance from the
//! last slot back to slot 0 exports the whole ring before slot 0 is
//! overwritten.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::export::ExportJob;
use super::integrity::{self, IntegrityStatus};
use crate::config::RecorderConfig;
use crate::format::{BinaryFramer, RecorderIdentity};
use crate::stats::PipelineStats;
use crate::{RecorderError, Result, Timestamp};

/// Extension of ring files.
pub const LOG_EXTENSION: &str = "rec";

/// Write mode of the current slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Next write truncates the file
    CreateNew,
    /// Next write appends
    AppendExisting,
}

/// Outcome of the startup integrity pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Status of every slot in index order
    pub statuses: Vec<IntegrityStatus>,
    pub resume_index: u16,
    pub state: FileState,
    /// Export produced because recovery advanced past the last slot
    pub export: Option<PathBuf>,
}

/// Where a record landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub index: u16,
    /// Export produced by a wrap before this write
    pub export: Option<PathBuf>,
}

/// The on-disk ring. Owned by the writer task.
pub struct FileRotationStore {
    directory: PathBuf,
    export_directory: PathBuf,
    ring_size: u16,
    file_span_ms: u64,
    framer: BinaryFramer,
    identity: RecorderIdentity,
    config_text: String,
    index: u16,
    state: FileState,
    /// Timestamp of the first record in the current slot
    file_start: Option<Timestamp>,
    /// Bytes of complete records in the current slot
    committed_len: u64,
    stats: Arc<PipelineStats>,
}

impl FileRotationStore {
    /// Open the ring directory, creating it if needed.
    ///
    /// Call [`FileRotationStore::recover`] before the first write.
    pub fn open(config: &RecorderConfig, stats: Arc<PipelineStats>) -> Result<Self> {
        let directory = config.log.directory.clone();
        fs::create_dir_all(&directory)
            .map_err(|e| RecorderError::file_error(directory.clone(), e))?;

        Ok(Self {
            directory,
            export_directory: config.export_directory(),
            ring_size: config.log.ring_size,
            file_span_ms: config.log.file_span_ms,
            framer: BinaryFramer::new(&config.identity),
            identity: config.identity.clone(),
            config_text: config.source_text(),
            index: 0,
            state: FileState::CreateNew,
            file_start: None,
            committed_len: 0,
            stats,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn current_index(&self) -> u16 {
        self.index
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    pub fn ring_size(&self) -> u16 {
        self.ring_size
    }

    /// Configuration text embedded in exports.
    pub fn config_text(&self) -> &str {
        &self.config_text
    }

    /// Path of ring slot `index`.
    pub fn file_path(&self, index: u16) -> PathBuf {
        self.directory.join(format!("{}.{}", index, LOG_EXTENSION))
    }

    /// Check and repair one slot.
    pub fn verify_integrity(&self, index: u16) -> Result<IntegrityStatus> {
        let status = integrity::verify_integrity(&self.file_path(index))?;
        match status {
            IntegrityStatus::Repaired => self.stats.record_repair(),
            IntegrityStatus::Invalid => self.stats.record_discard(),
            IntegrityStatus::Valid | IntegrityStatus::Absent | IntegrityStatus::Unreadable => {}
        }
        Ok(status)
    }

    /// Verify every slot and pick the slot to resume in.
    ///
    /// The slot whose first record is newest is resumed: appended to if its
    /// span has not yet elapsed at `now`, otherwise the ring advances past it.
    pub fn recover(&mut self, now: Timestamp) -> Result<RecoveryReport> {
        let mut statuses = Vec::with_capacity(usize::from(self.ring_size));
        let mut newest: Option<(u16, Timestamp, u64)> = None;

        for index in 0..self.ring_size {
            let checked = self.verify_integrity(index).and_then(|status| {
                if !status.is_usable() {
                    return Ok((status, None));
                }
                integrity::summarize_file(&self.file_path(index)).map(|summary| (status, summary))
            });
            let status = match checked {
                Ok((status, Some(summary))) => {
                    let is_newer = newest
                        .is_none_or(|(_, ts, _)| summary.first.as_millis() > ts.as_millis());
                    if is_newer {
                        newest = Some((index, summary.first, summary.complete_len as u64));
                    }
                    status
                }
                Ok((status, None)) => status,
                Err(e) => {
                    warn!(index, error = %e, "Log file unreadable, slot skipped");
                    IntegrityStatus::Unreadable
                }
            };
            statuses.push(status);
        }

        let mut export = None;
        match newest {
            Some((index, first, committed_len)) => {
                self.index = index;
                self.file_start = Some(first);
                self.committed_len = committed_len;
                self.state = FileState::AppendExisting;
                if now.has_elapsed(&first, self.file_span_ms) {
                    export = self.advance();
                }
            }
            None => {
                self.index = 0;
                self.file_start = None;
                self.committed_len = 0;
                self.state = FileState::CreateNew;
            }
        }

        info!(
            resume_index = self.index,
            state = ?self.state,
            repaired = statuses.iter().filter(|s| **s == IntegrityStatus::Repaired).count(),
            discarded = statuses.iter().filter(|s| **s == IntegrityStatus::Invalid).count(),
            "Log ring recovered"
        );
        Ok(RecoveryReport { statuses, resume_index: self.index, state: self.state, export })
    }

    /// Move to the next slot, exporting the ring on wraparound.
    fn advance(&mut self) -> Option<PathBuf> {
        let next = (self.index + 1) % self.ring_size;
        debug!(from = self.index, to = next, "Rotating log file");

        let export = if next == 0 {
            match self.export_ring() {
                Ok(path) => Some(path),
                Err(e) => {
                    self.stats.record_export_failure();
                    warn!(error = %e, "Ring export failed");
                    None
                }
            }
        } else {
            None
        };

        self.index = next;
        self.state = FileState::CreateNew;
        self.file_start = None;
        self.committed_len = 0;
        export
    }

    /// Write a framed header and payload to the current slot.
    ///
    /// `CreateNew` truncates the slot first; `AppendExisting` writes after the
    /// last complete record, cutting off anything a failed write left behind.
    /// On error the file is cut back to its last complete record and the state
    /// is unchanged.
    pub fn write(&mut self, timestamp: Timestamp, header: &[u8], payload: &[u8]) -> Result<()> {
        let path = self.file_path(self.index);
        let io = |e| RecorderError::file_error(path.clone(), e);

        let committed = match self.state {
            FileState::CreateNew => 0,
            FileState::AppendExisting => self.committed_len,
        };
        let mut file = match self.state {
            FileState::CreateNew => File::create(&path).map_err(io)?,
            FileState::AppendExisting => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(io)?,
        };

        let written = (|| {
            file.set_len(committed)?;
            file.seek(SeekFrom::Start(committed))?;
            file.write_all(header)?;
            file.write_all(payload)?;
            file.sync_data()
        })();
        if let Err(e) = written {
            if let Err(cut) = file.set_len(committed) {
                warn!(error = %cut, bytes = committed, "Could not cut back failed record");
            }
            return Err(io(e));
        }

        self.committed_len = committed + (header.len() + payload.len()) as u64;
        if self.state == FileState::CreateNew {
            self.state = FileState::AppendExisting;
            self.file_start = Some(timestamp);
        }
        Ok(())
    }

    /// Frame and persist one flushed log buffer.
    ///
    /// `first` is the timestamp of the first sample in `payload` and decides
    /// whether the current slot's span has elapsed.
    pub fn write_record(
        &mut self,
        first: Timestamp,
        sample_count: u16,
        payload: &[u8],
    ) -> Result<WriteOutcome> {
        let span_elapsed =
            self.file_start.is_some_and(|start| first.has_elapsed(&start, self.file_span_ms));
        let export = if self.state == FileState::AppendExisting && span_elapsed {
            self.advance()
        } else {
            None
        };

        let header = self.framer.stream_header(first, payload, sample_count)?;
        self.write(first, &header, payload)?;
        debug!(
            index = self.index,
            bytes = header.len() + payload.len(),
            samples = sample_count,
            "Wrote log record"
        );
        Ok(WriteOutcome { index: self.index, export })
    }

    /// Compile every usable ring file into one export file.
    pub fn export_ring(&self) -> Result<PathBuf> {
        let path = ExportJob {
            framer: &self.framer,
            identity: &self.identity,
            config_text: &self.config_text,
            export_directory: &self.export_directory,
            sources: (0..self.ring_size).map(|i| self.file_path(i)).collect(),
        }
        .run()?;
        self.stats.record_export();
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{CompilationHeader, RecordWalker, StreamHeader};
    use crate::test_utils::minimal_config;

    fn open_store(
        dir: &Path,
        ring_size: u16,
        span_ms: u64,
    ) -> (FileRotationStore, Arc<PipelineStats>) {
        let mut config = minimal_config(dir);
        config.log.ring_size = ring_size;
        config.log.file_span_ms = span_ms;
        let stats = Arc::new(PipelineStats::new());
        let store = FileRotationStore::open(&config, stats.clone()).expect("open store");
        (store, stats)
    }

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_millis(1_700_000_000_000 + ms)
    }

    #[test]
    fn first_write_creates_then_appends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut store, _) = open_store(dir.path(), 4, 10_000);
        store.recover(ts(0)).expect("recover");
        assert_eq!(store.state(), FileState::CreateNew);

        store.write_record(ts(0), 1, b"one").expect("write");
        assert_eq!(store.state(), FileState::AppendExisting);
        store.write_record(ts(100), 1, b"two").expect("write");

        let data = fs::read(store.file_path(0)).expect("read");
        let records: Vec<_> = RecordWalker::new(&data).collect::<Result<_>>().expect("walk");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].payload, b"two");
    }

    #[test]
    fn rotates_after_span_and_exports_once_per_wrap() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut store, stats) = open_store(dir.path(), 3, 1000);
        store.recover(ts(0)).expect("recover");

        let mut exports = Vec::new();
        let mut indices = Vec::new();
        // two records per span, three spans per ring, two full rings
        for step in 0..12u64 {
            let outcome = store.write_record(ts(step * 500), 1, &[step as u8]).expect("write");
            indices.push(outcome.index);
            exports.extend(outcome.export);
        }

        assert_eq!(indices, vec![0, 0, 1, 1, 2, 2, 0, 0, 1, 1, 2, 2]);
        assert_eq!(exports.len(), 1);
        assert_eq!(stats.snapshot().exports, 1);

        // the export was compiled before slot 0 was overwritten
        let export = fs::read(&exports[0]).expect("read export");
        let text = store.config_text().to_string();
        assert!(export.starts_with(text.as_bytes()));
        let header = CompilationHeader::parse(&export[text.len()..]).expect("compilation header");
        assert_eq!(header.stream_count, 6);
        assert_eq!(header.first, ts(0));
        assert_eq!(header.last, ts(2500));

        let body = &export[text.len() + CompilationHeader::LEN..];
        let payloads: Vec<u8> = RecordWalker::new(body)
            .map(|r| r.map(|r| r.payload[0]))
            .collect::<Result<_>>()
            .expect("walk export");
        assert_eq!(payloads, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn export_orders_files_by_time_not_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut store, _) = open_store(dir.path(), 3, 1000);
        store.recover(ts(0)).expect("recover");

        // fill slots 0,1,2 then wrap into slot 0 again
        for step in 0..4u64 {
            store.write_record(ts(step * 1000), 1, &[step as u8]).expect("write");
        }
        assert_eq!(store.current_index(), 0);

        let export = store.export_ring().expect("export");
        let data = fs::read(export).expect("read");
        let text_len = store.config_text().len();
        let body = &data[text_len + CompilationHeader::LEN..];
        let order: Vec<u8> = RecordWalker::new(body)
            .map(|r| r.map(|r| r.payload[0]))
            .collect::<Result<_>>()
            .expect("walk");
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn recovery_resumes_newest_slot() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let (mut store, _) = open_store(dir.path(), 4, 10_000);
            store.recover(ts(0)).expect("recover");
            for step in 0..3u64 {
                store.write_record(ts(step * 10_000), 1, b"x").expect("write");
            }
            assert_eq!(store.current_index(), 2);
        }

        // restart inside slot 2's span: keep appending there
        let (mut store, _) = open_store(dir.path(), 4, 10_000);
        let report = store.recover(ts(25_000)).expect("recover");
        assert_eq!(report.resume_index, 2);
        assert_eq!(report.state, FileState::AppendExisting);
        assert_eq!(
            report.statuses,
            vec![
                IntegrityStatus::Valid,
                IntegrityStatus::Valid,
                IntegrityStatus::Valid,
                IntegrityStatus::Absent
            ]
        );

        // restart after the span: move on to slot 3
        let (mut store, _) = open_store(dir.path(), 4, 10_000);
        let report = store.recover(ts(30_000)).expect("recover");
        assert_eq!(report.resume_index, 3);
        assert_eq!(report.state, FileState::CreateNew);
    }

    #[test]
    fn recovery_repairs_interrupted_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut store, _) = open_store(dir.path(), 2, 60_000);
        store.recover(ts(0)).expect("recover");
        store.write_record(ts(0), 1, b"good").expect("write");

        let path = store.file_path(0);
        let mut file = OpenOptions::new().append(true).open(&path).expect("open");
        let torn = BinaryFramer::new(&minimal_config(dir.path()).identity)
            .frame_record(ts(100), b"interrupted", 1)
            .expect("record");
        file.write_all(&torn[..StreamHeader::LEN + 3]).expect("append");
        drop(file);

        let (mut store, stats) = open_store(dir.path(), 2, 60_000);
        let report = store.recover(ts(200)).expect("recover");
        assert_eq!(report.statuses[0], IntegrityStatus::Repaired);
        assert_eq!(report.resume_index, 0);
        assert_eq!(report.state, FileState::AppendExisting);
        assert_eq!(stats.snapshot().records_repaired, 1);
    }

    #[test]
    fn stray_tail_is_cut_before_the_next_append() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut store, _) = open_store(dir.path(), 2, 60_000);
        store.recover(ts(0)).expect("recover");
        store.write_record(ts(0), 1, b"one").expect("write");

        // header of a record whose payload never made it to disk
        let orphan = store.framer.stream_header(ts(50), b"two", 1).expect("header");
        let mut file = OpenOptions::new().append(true).open(store.file_path(0)).expect("open");
        file.write_all(&orphan).expect("append");
        drop(file);

        store.write_record(ts(100), 1, b"three").expect("write");

        let data = fs::read(store.file_path(0)).expect("read");
        let payloads: Vec<Vec<u8>> = RecordWalker::new(&data)
            .map(|r| r.map(|r| r.payload.to_vec()))
            .collect::<Result<_>>()
            .expect("every record walks");
        assert_eq!(payloads, vec![b"one".to_vec(), b"three".to_vec()]);
        assert_eq!(
            integrity::verify_integrity(&store.file_path(0)).expect("check"),
            IntegrityStatus::Valid
        );
    }

    #[test]
    fn failed_write_leaves_the_store_usable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut store, _) = open_store(dir.path(), 2, 60_000);
        store.recover(ts(0)).expect("recover");

        // a directory in the slot's place makes the create fail
        fs::create_dir(store.file_path(0)).expect("block slot");
        assert!(store.write_record(ts(0), 1, b"lost").is_err());
        assert_eq!(store.state(), FileState::CreateNew);

        fs::remove_dir(store.file_path(0)).expect("unblock slot");
        store.write_record(ts(100), 1, b"kept").expect("write");
        store.write_record(ts(200), 1, b"more").expect("write");

        let data = fs::read(store.file_path(0)).expect("read");
        let records: Vec<_> = RecordWalker::new(&data).collect::<Result<_>>().expect("walk");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload, b"kept");
        assert_eq!(records[0].header.timestamp, ts(100));
    }

    #[test]
    fn resumed_slot_appends_after_its_last_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let (mut store, _) = open_store(dir.path(), 2, 60_000);
            store.recover(ts(0)).expect("recover");
            store.write_record(ts(0), 1, b"before").expect("write");
        }

        let (mut store, _) = open_store(dir.path(), 2, 60_000);
        store.recover(ts(1000)).expect("recover");
        store.write_record(ts(1000), 1, b"after").expect("write");

        let data = fs::read(store.file_path(0)).expect("read");
        let payloads: Vec<Vec<u8>> = RecordWalker::new(&data)
            .map(|r| r.map(|r| r.payload.to_vec()))
            .collect::<Result<_>>()
            .expect("walk");
        assert_eq!(payloads, vec![b"before".to_vec(), b"after".to_vec()]);
    }

    #[test]
    fn unreadable_slot_does_not_stop_recovery() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let (mut store, _) = open_store(dir.path(), 3, 60_000);
            store.recover(ts(0)).expect("recover");
            store.write_record(ts(0), 1, b"ok").expect("write");
        }
        // reading a directory fails with an I/O error other than NotFound
        fs::create_dir(dir.path().join("1.rec")).expect("block slot");

        let (mut store, _) = open_store(dir.path(), 3, 60_000);
        let report = store.recover(ts(1000)).expect("recovery continues");
        assert_eq!(
            report.statuses,
            vec![IntegrityStatus::Valid, IntegrityStatus::Unreadable, IntegrityStatus::Absent]
        );
        assert_eq!(report.resume_index, 0);
        assert_eq!(report.state, FileState::AppendExisting);
    }

    #[test]
    fn recovery_past_last_slot_wraps_and_exports() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let (mut store, _) = open_store(dir.path(), 2, 1000);
            store.recover(ts(0)).expect("recover");
            store.write_record(ts(0), 1, b"a").expect("write");
            store.write_record(ts(1000), 1, b"b").expect("write");
            assert_eq!(store.current_index(), 1);
        }

        let (mut store, stats) = open_store(dir.path(), 2, 1000);
        let report = store.recover(ts(5000)).expect("recover");
        assert_eq!(report.resume_index, 0);
        assert!(report.export.is_some());
        assert_eq!(stats.snapshot().exports, 1);
    }
}
