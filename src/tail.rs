use std::{
    fs::File,
    io::{self, Read, Write},
    os::unix::prelude::MetadataExt,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{
    error::IoContext,
    locate::locate_predecessor,
    reconcile::{reconcile, LiveFileStat, RotationVerdict},
    source::{open_at, Compression, Source},
    state::{Format, PersistedState},
    Config, RetailError,
};

const CHUNK_SIZE: usize = 64 * 1024;

/// Outcome of a successful run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub verdict: RotationVerdict,
    /// Rotated file whose tail was delivered before the live log, if one was found.
    pub predecessor: Option<PathBuf>,
    pub predecessor_bytes: u64,
    pub current_bytes: u64,
    /// State committed at the end of the run.
    pub state: PersistedState,
}

/// Delivers what was appended to a log since the previous run, following at most one rotation.
///
/// ## Usage
///
/// ```rust no_run
/// # use retail::{Config, RetailError, Tail};
/// let config = Config::resolve("/var/log/mail.log", None)?;
/// let report = Tail::new(config).run(&mut std::io::stdout().lock())?;
/// eprintln!("delivered {} bytes", report.predecessor_bytes + report.current_bytes);
/// # Ok::<(), RetailError>(())
/// ```
///
/// ## Working principles
///
/// The state file stores inode, offset and size of the log as of the previous run. Comparing them to the live
/// file tells whether it was truncated in place (same inode, smaller) or replaced (different inode). After a
/// rotation the rest of the rotated file is delivered first, starting at the stored offset, followed by the new
/// log from its beginning. New state is written only after all output was produced, so a failed run leaves the
/// previous state in place and the next run delivers the same bytes again.
pub struct Tail {
    config: Config,
}

impl Tail {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Write everything not yet delivered to `out` and commit the new state.
    pub fn run(&self, out: &mut impl Write) -> Result<Report, RetailError> {
        let log_path = &self.config.log_path;
        let state_path = &self.config.state_path;

        // identity and content must come from the same file even if it gets rotated right now
        let log = File::open(log_path).with_path(log_path)?;
        let live = LiveFileStat::from_metadata(&log.metadata().with_path(log_path)?);

        let prior = match PersistedState::maybe_load(state_path).map_err(|source| {
            RetailError::State {
                path: state_path.clone(),
                source,
            }
        })? {
            Some((state, Format::Versioned)) => state,
            Some((state, Format::Legacy)) => {
                warn!(path = %state_path.display(), "state file uses legacy layout, it will be rewritten");
                state
            }
            None => {
                info!(path = %state_path.display(), "no state yet, reading log from the start");
                PersistedState::initial(live.inode)
            }
        };

        let verdict = reconcile(&prior, &live);
        debug!(?prior, ?live, ?verdict, "reconciled state with live log");

        let mut start = prior.offset;
        let mut predecessor_bytes = 0;
        let predecessor = locate_predecessor(log_path, &prior, verdict)?;
        if verdict.is_rotation() {
            match &predecessor {
                Some(path) => {
                    let source = open_at(path, prior.offset).with_path(path)?;
                    predecessor_bytes = flush(path, source, out)?;
                    debug!(path = %path.display(), bytes = predecessor_bytes, "flushed rotated log");
                }
                None => warn!(
                    ?verdict,
                    lost_from = prior.offset,
                    "rotated log not found, undelivered lines of it are skipped"
                ),
            }
            start = 0;
        }

        let source = log
            .try_clone()
            .and_then(|file| Source::new(file, Compression::None, start))
            .with_path(log_path)?;
        let current_bytes = flush(log_path, source, out)?;
        out.flush().map_err(RetailError::Output)?;

        let offset = start + current_bytes;
        // a truncation racing with this run must not leave a state that looks corrupted
        let size = log.metadata().with_path(log_path)?.size().max(offset);
        let state = PersistedState {
            inode: live.inode,
            offset,
            size,
        };
        state.persist(state_path).with_path(state_path)?;
        debug!(?state, "committed state");

        Ok(Report {
            verdict,
            predecessor,
            predecessor_bytes,
            current_bytes,
            state,
        })
    }
}

/// Copy `source` to `out` until end of input, returning the number of bytes copied.
fn flush(path: &Path, mut source: impl Read, out: &mut impl Write) -> Result<u64, RetailError> {
    let mut buf = vec![0; CHUNK_SIZE];
    let mut copied = 0;
    loop {
        let read = match source.read(&mut buf) {
            Ok(0) => return Ok(copied),
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(RetailError::io(path, e)),
        };
        out.write_all(&buf[..read]).map_err(RetailError::Output)?;
        copied += read as u64;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FailingRead;

    impl Read for FailingRead {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::PermissionDenied.into())
        }
    }

    #[test]
    fn flush_copies_everything_across_chunks() {
        let content: Vec<u8> = (0..CHUNK_SIZE * 2 + 17).map(|i| i as u8).collect();
        let mut out: Vec<u8> = vec![];
        let copied = flush(Path::new("app.log"), Cursor::new(&content), &mut out).unwrap();
        assert_eq!(copied, content.len() as u64);
        assert_eq!(out, content);
    }

    #[test]
    fn write_failure_is_output_error() {
        let result = flush(Path::new("app.log"), Cursor::new(b"data"), &mut BrokenPipe);
        assert!(matches!(result, Err(RetailError::Output(_))));
    }

    #[test]
    fn read_failure_names_the_file() {
        let result = flush(Path::new("app.log.1"), FailingRead, &mut Vec::<u8>::new());
        match result {
            Err(RetailError::Io { path, .. }) => assert_eq!(path, PathBuf::from("app.log.1")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
