use std::{
    ffi::{OsStr, OsString},
    os::unix::{ffi::OsStrExt, prelude::MetadataExt},
    path::{Path, PathBuf},
    time::SystemTime,
};

use tracing::{debug, trace};

use crate::{
    error::IoContext, paths::split_log_path, source::Compression, PersistedState, RetailError,
    RotationVerdict,
};

/// Directory entry considered as a rotated predecessor of the log file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RotationCandidate {
    pub path: PathBuf,
    pub name: OsString,
    pub inode: u64,
    pub mtime: SystemTime,
}

/// Rule deciding whether a sibling of the log file is its rotated predecessor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    /// The file kept the inode we were reading and was renamed to an extension of the log name.
    SameInode(u64),
    /// Newest file whose name extends the log name.
    MostRecentByPrefix,
    /// Newest compressed file whose name extends the log name.
    MostRecentCompressed,
}

impl Predicate {
    /// `incumbent` is the modification time of the best match so far, if any.
    pub fn accepts(
        &self,
        base_name: &OsStr,
        candidate: &RotationCandidate,
        incumbent: Option<SystemTime>,
    ) -> bool {
        let name = candidate.name.as_bytes();
        let base = base_name.as_bytes();
        let newer = incumbent.map_or(true, |mtime| candidate.mtime > mtime);
        let extends_base = name.len() > base.len() && name.starts_with(base);
        match self {
            Predicate::SameInode(inode) => candidate.inode == *inode && name.starts_with(base),
            Predicate::MostRecentByPrefix => extends_base && newer,
            Predicate::MostRecentCompressed => {
                extends_base && newer && Compression::from_name(&candidate.name).is_compressed()
            }
        }
    }
}

/// Pick the predicate winner among `candidates`, in the order given.
///
/// Replacing the incumbent requires a strictly later modification time, so among equally old matches the
/// first one seen is kept.
pub fn select(
    base_name: &OsStr,
    predicate: Predicate,
    candidates: impl IntoIterator<Item = RotationCandidate>,
) -> Option<RotationCandidate> {
    let mut best: Option<RotationCandidate> = None;
    for candidate in candidates {
        let incumbent = best.as_ref().map(|best| best.mtime);
        if !predicate.accepts(base_name, &candidate, incumbent) {
            continue;
        }
        if incumbent.map_or(true, |mtime| candidate.mtime > mtime) {
            trace!(path = %candidate.path.display(), "new best rotation candidate");
            best = Some(candidate);
        }
    }
    best
}

/// Scan `directory` (one level deep) for the file `predicate` selects as the rotated version of `base_name`.
///
/// Entries whose names are not longer than `base_name` are never candidates, which also keeps the live log
/// out of the result. Failing to stat any other entry aborts the scan.
pub fn locate(
    directory: &Path,
    base_name: &OsStr,
    predicate: Predicate,
) -> Result<Option<PathBuf>, RetailError> {
    let mut candidates = vec![];
    for entry in std::fs::read_dir(directory).with_path(directory)? {
        let entry = entry.with_path(directory)?;
        let name = entry.file_name();
        if name.len() <= base_name.len() {
            continue;
        }
        let path = entry.path();
        let metadata = std::fs::metadata(&path).with_path(&path)?;
        if !metadata.is_file() {
            continue;
        }
        let mtime = metadata.modified().with_path(&path)?;
        candidates.push(RotationCandidate {
            path,
            name,
            inode: metadata.ino(),
            mtime,
        });
    }

    Ok(select(base_name, predicate, candidates).map(|candidate| candidate.path))
}

/// Find where the bytes we have not delivered yet went after a rotation.
///
/// A truncated log is matched to its newest sibling. A renamed log is first looked up by the inode we were
/// reading; if that file is gone, the newest compressed sibling is assumed to be it.
pub fn locate_predecessor(
    log_path: &Path,
    prior: &PersistedState,
    verdict: RotationVerdict,
) -> Result<Option<PathBuf>, RetailError> {
    let renamed = [
        Predicate::SameInode(prior.inode),
        Predicate::MostRecentCompressed,
    ];
    let strategies: &[Predicate] = match verdict {
        RotationVerdict::NoRotation => return Ok(None),
        RotationVerdict::Truncated => &[Predicate::MostRecentByPrefix],
        RotationVerdict::Renamed => &renamed,
    };
    let (directory, base_name) = split_log_path(log_path)?;

    for &predicate in strategies {
        if let Some(found) = locate(&directory, base_name, predicate)? {
            debug!(?predicate, path = %found.display(), "located rotated log");
            return Ok(Some(found));
        }
        debug!(?predicate, "no rotated log matched");
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use std::{
        fs::File,
        io::Write,
        time::{Duration, UNIX_EPOCH},
    };

    use filetime::{set_file_mtime, FileTime};
    use rstest::{fixture, rstest};
    use tempfile::{tempdir, TempDir};

    use super::*;

    fn inode_of(path: impl AsRef<Path>) -> u64 {
        std::fs::metadata(path).unwrap().ino()
    }

    fn candidate(name: &str, inode: u64, mtime_secs: u64) -> RotationCandidate {
        RotationCandidate {
            path: PathBuf::from("/var/log").join(name),
            name: name.into(),
            inode,
            mtime: UNIX_EPOCH + Duration::from_secs(mtime_secs),
        }
    }

    fn base() -> &'static OsStr {
        OsStr::new("app.log")
    }

    fn touch(dir: &Path, name: &str, content: &[u8], mtime_secs: i64) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap().write_all(content).unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(mtime_secs, 0)).unwrap();
        path
    }

    #[fixture]
    fn logdir() -> TempDir {
        let dir = tempdir().unwrap();
        touch(dir.path(), "app.log", b"live", 5_000);
        touch(dir.path(), "app.log.1", b"older", 3_000);
        touch(dir.path(), "app.log.2.gz", b"oldest", 2_000);
        touch(dir.path(), "offset.app.log", b"", 9_000);
        touch(dir.path(), "other.log.9", b"", 9_000);
        dir
    }

    #[rstest]
    #[case::same_inode(Predicate::SameInode(7), "app.log.1", 7, true)]
    #[case::other_inode(Predicate::SameInode(7), "app.log.1", 8, false)]
    #[case::same_inode_foreign_name(Predicate::SameInode(7), "mail.log.1", 7, false)]
    #[case::prefix(Predicate::MostRecentByPrefix, "app.log-20240101", 1, true)]
    #[case::exact_name(Predicate::MostRecentByPrefix, "app.log", 1, false)]
    #[case::prefixed_base(Predicate::MostRecentByPrefix, "offset.app.log", 1, false)]
    #[case::compressed(Predicate::MostRecentCompressed, "app.log.1.gz", 1, true)]
    #[case::uncompressed(Predicate::MostRecentCompressed, "app.log.1", 1, false)]
    fn predicate_matches_names(
        #[case] predicate: Predicate,
        #[case] name: &str,
        #[case] inode: u64,
        #[case] accepted: bool,
    ) {
        assert_eq!(
            predicate.accepts(base(), &candidate(name, inode, 10), None),
            accepted
        );
    }

    #[rstest]
    #[case(Predicate::MostRecentByPrefix)]
    #[case(Predicate::MostRecentCompressed)]
    fn recency_predicates_reject_older_than_incumbent(#[case] predicate: Predicate) {
        let c = candidate("app.log.1.gz", 1, 10);
        let at = |secs| Some(UNIX_EPOCH + Duration::from_secs(secs));
        assert!(predicate.accepts(base(), &c, at(9)));
        assert!(!predicate.accepts(base(), &c, at(10)));
        assert!(!predicate.accepts(base(), &c, at(11)));
    }

    #[test]
    fn equal_mtime_keeps_first_seen() {
        let first = candidate("app.log.a", 1, 10);
        let second = candidate("app.log.b", 2, 10);
        let picked = select(
            base(),
            Predicate::MostRecentByPrefix,
            vec![first.clone(), second.clone()],
        );
        assert_eq!(picked, Some(first.clone()));

        let picked = select(base(), Predicate::MostRecentByPrefix, vec![second.clone(), first]);
        assert_eq!(picked, Some(second));
    }

    #[test]
    fn newest_wins_regardless_of_order() {
        let items = vec![
            candidate("app.log.3", 1, 10),
            candidate("app.log.1", 2, 30),
            candidate("app.log.2", 3, 20),
        ];
        for rotation in 0..items.len() {
            let mut order = items.clone();
            order.rotate_left(rotation);
            let picked = select(base(), Predicate::MostRecentByPrefix, order).unwrap();
            assert_eq!(picked.name, "app.log.1");
        }
    }

    #[test]
    fn same_inode_prefers_newest_among_hard_links() {
        let picked = select(
            base(),
            Predicate::SameInode(4),
            vec![
                candidate("app.log.1", 4, 10),
                candidate("app.log.old", 4, 20),
                candidate("app.log.2", 5, 30),
            ],
        )
        .unwrap();
        assert_eq!(picked.name, "app.log.old");
    }

    #[rstest]
    fn scan_finds_newest_sibling(logdir: TempDir) {
        let found = locate(logdir.path(), base(), Predicate::MostRecentByPrefix).unwrap();
        assert_eq!(found, Some(logdir.path().join("app.log.1")));
    }

    #[rstest]
    fn scan_finds_moved_inode(logdir: TempDir) {
        let inode = inode_of(logdir.path().join("app.log.2.gz"));
        let found = locate(logdir.path(), base(), Predicate::SameInode(inode)).unwrap();
        assert_eq!(found, Some(logdir.path().join("app.log.2.gz")));
    }

    #[rstest]
    fn scan_finds_compressed_sibling(logdir: TempDir) {
        let found = locate(logdir.path(), base(), Predicate::MostRecentCompressed).unwrap();
        assert_eq!(found, Some(logdir.path().join("app.log.2.gz")));
    }

    #[test]
    fn scan_never_returns_live_log_or_directories() {
        let dir = tempdir().unwrap();
        let live = touch(dir.path(), "app.log", b"live", 5_000);
        std::fs::create_dir(dir.path().join("app.log.d")).unwrap();
        let inode = inode_of(&live);

        assert_eq!(
            locate(dir.path(), base(), Predicate::SameInode(inode)).unwrap(),
            None
        );
        assert_eq!(
            locate(dir.path(), base(), Predicate::MostRecentByPrefix).unwrap(),
            None
        );
    }

    #[test]
    fn unstatable_entry_aborts_scan() {
        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("app.log.1"))
            .unwrap();

        let result = locate(dir.path(), base(), Predicate::MostRecentByPrefix);
        assert!(matches!(result, Err(RetailError::Io { .. })));
    }

    #[rstest]
    fn rename_policy_falls_back_to_compressed(logdir: TempDir) {
        let prior = PersistedState {
            inode: u64::MAX,
            offset: 0,
            size: 0,
        };
        let found = locate_predecessor(
            &logdir.path().join("app.log"),
            &prior,
            RotationVerdict::Renamed,
        )
        .unwrap();
        assert_eq!(found, Some(logdir.path().join("app.log.2.gz")));
    }

    #[test]
    fn no_rotation_does_not_scan() {
        let prior = PersistedState::initial(1);
        let found = locate_predecessor(
            Path::new("/nonexistent/dir/app.log"),
            &prior,
            RotationVerdict::NoRotation,
        )
        .unwrap();
        assert_eq!(found, None);
    }
}
