//! Output path generation, relocation and tracking
//!
//! The manager owns one record per recording file. Backends either write to
//! the requested path directly or hand back a temp path that gets relocated
//! here; either way the engine only reports a recording complete once the
//! final file verifiably exists with content.

use crate::error::{RecorderError, RecorderResult};
use crate::recorder::state::RecordingOptions;
use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lifecycle status of one tracked output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStatus {
    /// A session is writing to this file. Never a sweep candidate.
    Recording,

    /// The file was verified after stop.
    Completed,

    /// The file was removed (by a sweep or an aborted session).
    Deleted,
}

/// One tracked recording file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputFileRecord {
    pub recording_id: String,

    /// Where the backend first wrote.
    pub temp_path: PathBuf,

    /// Verified final location, once known.
    pub final_path: Option<PathBuf>,

    pub size_bytes: u64,

    pub status: OutputStatus,

    pub created_at: DateTime<Utc>,
}

/// Result of moving a recording into its final location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeOutcome {
    /// Where the usable file ended up.
    pub final_path: PathBuf,

    /// True when relocation failed and the temp path was kept. The file is
    /// still usable; the caller just didn't get the requested location.
    pub degraded: bool,
}

/// Generates output paths, relocates finished files, and tracks records.
pub struct OutputManager {
    scratch_dir: PathBuf,
    pub(super) records: Mutex<Vec<OutputFileRecord>>,
}

impl OutputManager {
    /// Create a manager rooted at the given scratch directory.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> RecorderResult<Self> {
        let scratch_dir = scratch_dir.into();
        std::fs::create_dir_all(&scratch_dir)?;
        Ok(Self {
            scratch_dir,
            records: Mutex::new(Vec::new()),
        })
    }

    /// Create a manager with a scratch directory under the OS temp dir.
    pub fn with_default_scratch() -> RecorderResult<Self> {
        Self::new(std::env::temp_dir().join("deskrec"))
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Build the output path for a recording and make sure its directory
    /// exists: caller-provided filename or a timestamped one, under the
    /// requested directory or the scratch dir.
    pub fn generate_path(&self, options: &RecordingOptions) -> RecorderResult<PathBuf> {
        let directory = options
            .recording_directory
            .clone()
            .unwrap_or_else(|| self.scratch_dir.clone());
        std::fs::create_dir_all(&directory)?;

        let filename = match &options.filename {
            Some(name) if Path::new(name).extension().is_some() => name.clone(),
            Some(name) => format!("{}.mp4", name),
            None => format!("recording-{}.mp4", Local::now().format("%Y%m%d-%H%M%S")),
        };

        Ok(directory.join(filename))
    }

    /// Start tracking the file a new session is writing.
    pub fn register_active(&self, recording_id: impl Into<String>, temp_path: &Path) {
        let record = OutputFileRecord {
            recording_id: recording_id.into(),
            temp_path: temp_path.to_path_buf(),
            final_path: None,
            size_bytes: 0,
            status: OutputStatus::Recording,
            created_at: Utc::now(),
        };
        self.records.lock().push(record);
    }

    /// Move a finished recording to where the caller asked for it.
    ///
    /// If the backend already wrote to the final path this is a no-op.
    /// Otherwise try an atomic rename, then fall back to
    /// copy-verify-delete for cross-device moves. If both fail the temp
    /// path is kept and reported as degraded rather than an error: the
    /// caller still gets a usable file.
    pub fn finalize(
        &self,
        produced_path: &Path,
        expected_path: &Path,
        recording_id: &str,
    ) -> FinalizeOutcome {
        let outcome = if produced_path == expected_path {
            FinalizeOutcome {
                final_path: expected_path.to_path_buf(),
                degraded: false,
            }
        } else {
            match self.relocate(produced_path, expected_path) {
                Ok(()) => FinalizeOutcome {
                    final_path: expected_path.to_path_buf(),
                    degraded: false,
                },
                Err(error) => {
                    tracing::warn!(
                        %error,
                        produced = %produced_path.display(),
                        expected = %expected_path.display(),
                        "could not relocate recording, keeping temp path"
                    );
                    FinalizeOutcome {
                        final_path: produced_path.to_path_buf(),
                        degraded: true,
                    }
                }
            }
        };

        let mut records = self.records.lock();
        if let Some(record) = records
            .iter_mut()
            .find(|r| r.recording_id == recording_id)
        {
            record.final_path = Some(outcome.final_path.clone());
        }

        outcome
    }

    fn relocate(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        match std::fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(rename_error) => {
                tracing::debug!(
                    %rename_error,
                    "rename failed, falling back to copy-verify-delete"
                );
                let source_len = std::fs::metadata(from)?.len();
                let copied = std::fs::copy(from, to)?;
                if copied != source_len {
                    // Partial copy: remove it and report the original error.
                    let _ = std::fs::remove_file(to);
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        format!("copy wrote {} of {} bytes", copied, source_len),
                    ));
                }
                std::fs::remove_file(from)?;
                Ok(())
            }
        }
    }

    /// Verify that a finished recording exists with content.
    pub fn confirm_complete(&self, path: &Path) -> RecorderResult<u64> {
        let metadata = std::fs::metadata(path).map_err(|_| {
            RecorderError::File(format!("output file missing: {}", path.display()))
        })?;
        if metadata.len() == 0 {
            return Err(RecorderError::File(format!(
                "output file is empty: {}",
                path.display()
            )));
        }
        Ok(metadata.len())
    }

    /// Mark a recording's file verified and complete.
    pub fn mark_completed(&self, recording_id: &str, final_path: &Path, size_bytes: u64) {
        let mut records = self.records.lock();
        if let Some(record) = records
            .iter_mut()
            .find(|r| r.recording_id == recording_id)
        {
            record.final_path = Some(final_path.to_path_buf());
            record.size_bytes = size_bytes;
            record.status = OutputStatus::Completed;
        }
    }

    /// Mark a recording aborted. Its record stops being active so retention
    /// can reclaim whatever was written.
    pub fn mark_aborted(&self, recording_id: &str) {
        let mut records = self.records.lock();
        if let Some(record) = records
            .iter_mut()
            .find(|r| r.recording_id == recording_id)
        {
            record.status = OutputStatus::Deleted;
        }
    }

    /// Re-track files left in the scratch directory by a previous run, so a
    /// startup sweep can reclaim them. Returns how many were adopted.
    pub fn adopt_scratch_files(&self) -> RecorderResult<usize> {
        let mut adopted = 0;
        let mut records = self.records.lock();

        for entry in std::fs::read_dir(&self.scratch_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if records.iter().any(|r| {
                r.temp_path == path || r.final_path.as_deref() == Some(path.as_path())
            }) {
                continue;
            }

            let metadata = entry.metadata()?;
            let created_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            records.push(OutputFileRecord {
                recording_id: format!("adopted-{}", adopted),
                temp_path: path.clone(),
                final_path: Some(path),
                size_bytes: metadata.len(),
                status: OutputStatus::Completed,
                created_at,
            });
            adopted += 1;
        }

        Ok(adopted)
    }

    /// Snapshot of all tracked records.
    pub fn records(&self) -> Vec<OutputFileRecord> {
        self.records.lock().clone()
    }
}
