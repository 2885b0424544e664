use std::{
    fs::{File, OpenOptions, Permissions},
    io::{self, Read, Write},
    os::unix::fs::{OpenOptionsExt, PermissionsExt},
    path::Path,
};

use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Leading bytes of every state file written by this crate.
pub const MAGIC: [u8; 4] = *b"RTLS";
/// Current on-disk format version.
pub const VERSION: u16 = 1;
/// Owner and group may read and write the state file, everyone else gets nothing.
pub const STATE_FILE_MODE: u32 = 0o660;

/// Position marker committed at the end of each run.
///
/// `offset` is the number of bytes of the file identified by `inode` that were already delivered, `size` is the
/// length that file had when it was last observed. A valid state always has `offset <= size`.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedState {
    pub inode: u64,
    pub offset: u64,
    pub size: u64,
}

/// Layout the state was decoded from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    /// Magic-prefixed, versioned, little-endian record.
    Versioned,
    /// Headerless native-endian record written by releases predating the version header. Rewritten as
    /// `Versioned` on the next commit.
    Legacy,
}

/// Possible errors that could happen while working with persistent state storage
#[derive(Error, Debug)]
pub enum StateError {
    #[error("while working with underlying file")]
    IO(#[from] io::Error),

    #[error("while trying to (de)serialize state")]
    Serde(#[from] bincode::Error),

    #[error("state file has format version {0}, only version {} is supported", VERSION)]
    UnsupportedVersion(u16),

    #[error("state file layout is not recognized ({0} bytes)")]
    Unrecognized(usize),

    #[error("stored offset {offset} is beyond stored size {size}, state is corrupted")]
    OffsetBeyondSize { offset: u64, size: u64 },
}

#[derive(Serialize, Deserialize)]
struct Header {
    magic: [u8; 4],
    version: u16,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    header: Header,
    state: PersistedState,
}

impl PersistedState {
    /// State used when nothing was persisted yet: the live file is treated as never read and is not
    /// considered rotated.
    pub fn initial(inode: u64) -> Self {
        Self {
            inode,
            offset: 0,
            size: 0,
        }
    }

    /// Decode a state record from raw file contents, rejecting anything inconsistent.
    pub fn decode(bytes: &[u8]) -> Result<(Self, Format), StateError> {
        let (state, format) = if bytes.starts_with(&MAGIC) {
            let header: Header = codec().allow_trailing_bytes().deserialize(bytes)?;
            if header.version != VERSION {
                return Err(StateError::UnsupportedVersion(header.version));
            }
            let envelope: Envelope = codec().deserialize(bytes)?;
            (envelope.state, Format::Versioned)
        } else {
            let state = decode_legacy(bytes).ok_or(StateError::Unrecognized(bytes.len()))?;
            (state, Format::Legacy)
        };

        if state.offset > state.size {
            return Err(StateError::OffsetBeyondSize {
                offset: state.offset,
                size: state.size,
            });
        }
        Ok((state, format))
    }

    pub fn encode(&self) -> Result<Vec<u8>, StateError> {
        let envelope = Envelope {
            header: Header {
                magic: MAGIC,
                version: VERSION,
            },
            state: *self,
        };
        Ok(codec().serialize(&envelope)?)
    }

    /// Read state stored at `path`. Returns `None` if there is no such file.
    pub fn maybe_load(path: &Path) -> Result<Option<(Self, Format)>, StateError> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = vec![];
        file.read_to_end(&mut bytes)?;
        Self::decode(&bytes).map(Some)
    }

    /// Overwrite the state file at `path`, creating it if needed and resetting its permissions.
    pub fn persist(&self, path: &Path) -> io::Result<()> {
        let bytes = self
            .encode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .mode(STATE_FILE_MODE)
            .open(path)?;
        // mode() only applies on creation and is subject to umask
        overwrite(&mut file, &bytes, |file| {
            file.set_permissions(Permissions::from_mode(STATE_FILE_MODE))
        })
    }
}

/// Fixed-width little-endian integers, no trailing bytes allowed.
fn codec() -> impl Options {
    bincode::options().with_fixint_encoding()
}

/// Replace the contents of `file` with `bytes`. `prepare` runs before anything is truncated, so when it fails
/// the previously committed state is still there.
fn overwrite(
    file: &mut File,
    bytes: &[u8],
    prepare: impl FnOnce(&File) -> io::Result<()>,
) -> io::Result<()> {
    prepare(file)?;
    file.set_len(0)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// `ino_t`, `fpos_t`, `off_t` written back to back in native byte order. `fpos_t` is either a bare `off_t`
/// (24 byte record) or glibc's `{ off_t, mbstate_t }` (32 byte record); the position is its first word.
fn decode_legacy(bytes: &[u8]) -> Option<PersistedState> {
    let size_at = match bytes.len() {
        24 => 16,
        32 => 24,
        _ => return None,
    };
    let inode = u64::from_ne_bytes(word(bytes, 0));
    let offset = u64::try_from(i64::from_ne_bytes(word(bytes, 8))).ok()?;
    let size = u64::try_from(i64::from_ne_bytes(word(bytes, size_at))).ok()?;
    Some(PersistedState {
        inode,
        offset,
        size,
    })
}

fn word(bytes: &[u8], at: usize) -> [u8; 8] {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    word
}
