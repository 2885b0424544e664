use std::{io, path::PathBuf};

use thiserror::Error;

use crate::state::StateError;

/// Everything that can stop a run. None of these are retried: the run aborts and the previously committed
/// state stays on disk untouched.
#[derive(Error, Debug)]
pub enum RetailError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("while working with `{}`", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("while loading state from `{}`", .path.display())]
    State {
        path: PathBuf,
        #[source]
        source: StateError,
    },

    #[error("while writing to output")]
    Output(#[source] io::Error),
}

impl RetailError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Shorthand for attaching a path to an `io::Result`.
pub(crate) trait IoContext<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T, RetailError>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T, RetailError> {
        self.map_err(|source| RetailError::io(path, source))
    }
}
