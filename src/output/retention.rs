//! Retention sweeps
//!
//! Periodic deletion of stale or oversized recordings, plus a cap on how
//! many files stay tracked. Active recordings are never candidates.

use super::lifecycle::{OutputManager, OutputStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum age before a tracked file is reclaimed.
pub const DEFAULT_MAX_FILE_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default per-file size limit.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Default cap on tracked records.
pub const DEFAULT_MAX_TRACKED: usize = 50;

/// What a sweep is allowed to reclaim.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Files older than this are deleted.
    pub max_file_age: Duration,

    /// Files larger than this are deleted.
    pub max_file_bytes: u64,

    /// At most this many records stay tracked; the oldest inactive ones
    /// are evicted beyond it.
    pub max_tracked: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_file_age: DEFAULT_MAX_FILE_AGE,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_tracked: DEFAULT_MAX_TRACKED,
        }
    }
}

/// What one sweep reclaimed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Files deleted for age or size.
    pub deleted: usize,

    /// Bytes freed by deletions and evictions.
    pub freed_bytes: u64,

    /// Records dropped to honor the tracking cap.
    pub evicted: usize,
}

impl OutputManager {
    /// Delete tracked files that violate the policy, then evict the oldest
    /// inactive records beyond the tracking cap.
    ///
    /// A record in `Recording` status is never touched, whatever its age or
    /// size. Eviction deletes the file only when it still lives in the
    /// scratch directory; files the caller moved elsewhere just stop being
    /// tracked.
    pub fn sweep(&self, policy: &RetentionPolicy) -> SweepReport {
        let mut report = SweepReport::default();
        let now = Utc::now();
        let scratch_dir = self.scratch_dir().to_path_buf();
        let mut records = self.records.lock();

        for record in records.iter_mut() {
            if record.status != OutputStatus::Completed {
                continue;
            }

            let path = record
                .final_path
                .clone()
                .unwrap_or_else(|| record.temp_path.clone());
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

            let age = (now - record.created_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            let too_old = age > policy.max_file_age;
            let too_big = size > policy.max_file_bytes;
            if !too_old && !too_big {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(
                        path = %path.display(),
                        too_old,
                        too_big,
                        "retention sweep deleted recording"
                    );
                    report.deleted += 1;
                    report.freed_bytes += size;
                    record.status = OutputStatus::Deleted;
                }
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                    record.status = OutputStatus::Deleted;
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "sweep could not delete file");
                }
            }
        }

        // Tracking cap: drop the oldest inactive records first.
        while records.len() > policy.max_tracked {
            let oldest_inactive = records
                .iter()
                .enumerate()
                .filter(|(_, r)| r.status != OutputStatus::Recording)
                .min_by_key(|(_, r)| r.created_at)
                .map(|(index, _)| index);

            let Some(index) = oldest_inactive else {
                break;
            };
            let record = records.remove(index);

            if record.status == OutputStatus::Completed {
                let path = record
                    .final_path
                    .clone()
                    .unwrap_or_else(|| record.temp_path.clone());
                if path.starts_with(&scratch_dir) {
                    if let Ok(metadata) = std::fs::metadata(&path) {
                        if std::fs::remove_file(&path).is_ok() {
                            report.freed_bytes += metadata.len();
                        }
                    }
                }
            }
            report.evicted += 1;
        }

        if report.deleted > 0 || report.evicted > 0 {
            tracing::info!(
                deleted = report.deleted,
                evicted = report.evicted,
                freed_bytes = report.freed_bytes,
                "retention sweep finished"
            );
        }

        report
    }
}
