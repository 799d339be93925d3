//! Ring export
//!
//! An export file is the configuration text, a compilation header, and the
//! raw bytes of every usable ring file in chronological order. Each ring file
//! is copied to a staging directory before it is read, so an append to the
//! live file can never be observed half done.

use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::integrity::{FileSummary, summarize};
use crate::format::codec::pad_identifier;
use crate::format::{BinaryFramer, RecorderIdentity};
use crate::{RecorderError, Result};

/// Inserted between the identity block and the date in export file names.
pub const EXPORT_FILLER: &str = "_LOG_";
pub const EXPORT_EXTENSION: &str = "cmp";
const STAGING_DIR: &str = ".staging";

/// Moves a finished export file off the recorder.
#[async_trait::async_trait]
pub trait ExportTransport: Send + Sync + 'static {
    async fn deliver(&self, path: PathBuf) -> Result<()>;
}

/// Transport that leaves exports in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

#[async_trait::async_trait]
impl ExportTransport for NullTransport {
    async fn deliver(&self, path: PathBuf) -> Result<()> {
        debug!(path = %path.display(), "No export transport configured");
        Ok(())
    }
}

/// File name for an export produced at `at`.
///
/// Identifiers keep their underscore padding so every name has the same
/// length.
pub fn export_file_name(identity: &RecorderIdentity, at: DateTime<Local>) -> String {
    let mut name = String::with_capacity(64);
    for id in [&identity.consist_id, &identity.car_id, &identity.device_id] {
        name.push_str(&String::from_utf8_lossy(&pad_identifier(id)));
    }
    name.push_str(EXPORT_FILLER);
    name.push_str(&at.format("%Y%m%d%H%M%S").to_string());
    name.push('.');
    name.push_str(EXPORT_EXTENSION);
    name
}

/// A staged ring file ready to be concatenated.
struct StagedFile {
    summary: FileSummary,
    data: Vec<u8>,
}

/// Everything needed to compile one export.
pub struct ExportJob<'a> {
    pub framer: &'a BinaryFramer,
    pub identity: &'a RecorderIdentity,
    pub config_text: &'a str,
    pub export_directory: &'a Path,
    pub sources: Vec<PathBuf>,
}

impl ExportJob<'_> {
    /// Build the export file and return its path.
    pub fn run(self) -> Result<PathBuf> {
        let staging = self.export_directory.join(STAGING_DIR);
        fs::create_dir_all(&staging)
            .map_err(|e| RecorderError::file_error(staging.clone(), e))?;

        let result = self.compile(&staging);
        if let Err(e) = fs::remove_dir_all(&staging) {
            debug!(error = %e, "Could not remove export staging directory");
        }
        result
    }

    fn compile(&self, staging: &Path) -> Result<PathBuf> {
        let mut files = Vec::new();
        for source in &self.sources {
            if let Some(staged) = stage(source, staging)? {
                files.push(staged);
            }
        }

        files.sort_by_key(|f| f.summary.first.as_millis());
        let (Some(oldest), Some(newest)) = (files.first(), files.last()) else {
            return Err(RecorderError::export_failed("no usable log files to export"));
        };
        let first = oldest.summary.first;
        let last = newest.summary.last;
        let records: u32 = files.iter().map(|f| f.summary.records).sum();
        let header = self.framer.compilation_header(first, last, records);

        let name = export_file_name(self.identity, Local::now());
        let path = self.export_directory.join(&name);
        let partial = self.export_directory.join(format!("{}.part", name));

        let write = || -> std::io::Result<()> {
            let mut out = BufWriter::new(File::create(&partial)?);
            out.write_all(self.config_text.as_bytes())?;
            out.write_all(&header)?;
            for file in &files {
                out.write_all(&file.data)?;
            }
            out.into_inner().map_err(|e| e.into_error())?.sync_all()
        };
        write().map_err(|e| RecorderError::file_error(partial.clone(), e))?;
        fs::rename(&partial, &path).map_err(|e| RecorderError::file_error(path.clone(), e))?;

        info!(
            path = %path.display(),
            files = files.len(),
            records,
            first = first.seconds,
            last = last.seconds,
            "Ring exported"
        );
        Ok(path)
    }
}

/// Copy `source` into `staging` and read back its complete records.
fn stage(source: &Path, staging: &Path) -> Result<Option<StagedFile>> {
    let Some(file_name) = source.file_name() else {
        return Ok(None);
    };
    if !source.exists() {
        return Ok(None);
    }

    let copy = staging.join(file_name);
    fs::copy(source, &copy).map_err(|e| RecorderError::file_error(source.to_path_buf(), e))?;
    let mut data = fs::read(&copy).map_err(|e| RecorderError::file_error(copy.clone(), e))?;

    let Some(summary) = summarize(&data) else {
        debug!(path = %source.display(), "Skipping log file without records");
        return Ok(None);
    };
    data.truncate(summary.complete_len);
    Ok(Some(StagedFile { summary, data }))
}
