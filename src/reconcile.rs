use std::{fs::Metadata, os::unix::prelude::MetadataExt};

use crate::PersistedState;

/// Identity and length of the log file as seen in this run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LiveFileStat {
    pub inode: u64,
    pub size: u64,
}

impl LiveFileStat {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            inode: metadata.ino(),
            size: metadata.size(),
        }
    }
}

/// What happened to the log file since the state was committed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RotationVerdict {
    NoRotation,
    /// Same inode but the file shrank: contents were copied elsewhere and the file truncated in place.
    Truncated,
    /// Inode changed: the file was moved aside and a new one created under the old name.
    Renamed,
}

impl RotationVerdict {
    pub fn is_rotation(self) -> bool {
        self != Self::NoRotation
    }
}

/// Classify the live file against previously committed state.
pub fn reconcile(prior: &PersistedState, live: &LiveFileStat) -> RotationVerdict {
    if prior.inode == live.inode && prior.size > live.size {
        RotationVerdict::Truncated
    } else if prior.inode != live.inode {
        RotationVerdict::Renamed
    } else {
        RotationVerdict::NoRotation
    }
}
