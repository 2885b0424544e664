use std::path::{Path, PathBuf};

use crate::{paths::state_path_for, RetailError};

/// Resolved paths for a single run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub log_path: PathBuf,
    pub state_path: PathBuf,
}

impl Config {
    /// Validate the log path and work out where its state lives.
    ///
    /// Only inspects paths, so a configuration error is always reported before anything is read or written.
    pub fn resolve(
        log_path: impl AsRef<Path>,
        requested_state: Option<&Path>,
    ) -> Result<Self, RetailError> {
        let log_path = log_path.as_ref();
        if log_path.as_os_str().is_empty() {
            return Err(RetailError::Config("log path is empty".to_string()));
        }
        if log_path.is_dir() {
            return Err(RetailError::Config(format!(
                "log path `{}` is a directory",
                log_path.display()
            )));
        }

        let state_path = state_path_for(log_path, requested_state)?;
        if state_path.is_dir() {
            return Err(RetailError::Config(format!(
                "state path `{}` is a directory",
                state_path.display()
            )));
        }

        Ok(Self {
            log_path: log_path.to_path_buf(),
            state_path,
        })
    }
}
