//! CSV export of companies that ended a run with a temporary id

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::{ResolutionError, ResolutionResult};
use crate::models::UnknownCompanyRecord;

const RUN_ID_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct UnknownCompanyExporter {
    directory: PathBuf,
}

impl UnknownCompanyExporter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// `unknown_companies_<YYYYMMDD_HHMMSS>_<run id prefix>.csv`
    pub fn file_name(run_id: &str, at: DateTime<Utc>) -> String {
        let prefix: String = run_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(RUN_ID_PREFIX_LEN)
            .collect();
        format!(
            "unknown_companies_{}_{}.csv",
            at.format("%Y%m%d_%H%M%S"),
            prefix
        )
    }

    /// Write one file for the run; nothing is written for an empty list
    pub fn export(
        &self,
        run_id: &str,
        records: &[UnknownCompanyRecord],
    ) -> ResolutionResult<Option<PathBuf>> {
        if records.is_empty() {
            return Ok(None);
        }

        std::fs::create_dir_all(&self.directory).map_err(|e| {
            ResolutionError::export(format!(
                "cannot create export directory {}: {e}",
                self.directory.display()
            ))
        })?;

        let path = self.directory.join(Self::file_name(run_id, Utc::now()));
        let mut writer = csv::Writer::from_path(&path)
            .map_err(|e| ResolutionError::export(format!("cannot open {}: {e}", path.display())))?;
        for record in records {
            writer
                .serialize(record)
                .map_err(|e| ResolutionError::export(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| ResolutionError::export(e.to_string()))?;

        info!(
            rows = records.len(),
            path = %path.display(),
            "Unknown-company export written"
        );
        Ok(Some(path))
    }
}
