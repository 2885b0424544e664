use std::{
    ffi::{OsStr, OsString},
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

use crate::RetailError;

/// Prefix prepended to the log's file name to name its state file.
pub const STATE_FILE_PREFIX: &str = "offset.";

/// Split a log path into its containing directory and file name.
///
/// A bare file name lives in the current directory.
pub fn split_log_path(log_path: &Path) -> Result<(PathBuf, &OsStr), RetailError> {
    let base_name = log_path.file_name().ok_or_else(|| {
        RetailError::Config(format!(
            "log path `{}` does not name a file",
            log_path.display()
        ))
    })?;
    let directory = match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((directory, base_name))
}

/// Where the state for `log_path` is kept.
///
/// `requested` may name the state file itself, or a directory (existing, or spelled with a trailing `/`) to put
/// `offset.<log name>` into. Without it the state file sits next to the log.
///
/// ## Example
///
/// ```rust
/// use std::path::{Path, PathBuf};
/// let state = retail::paths::state_path_for(Path::new("/var/log/mail.log"), None)?;
/// assert_eq!(state, PathBuf::from("/var/log/offset.mail.log"));
/// # Ok::<(), retail::RetailError>(())
/// ```
pub fn state_path_for(log_path: &Path, requested: Option<&Path>) -> Result<PathBuf, RetailError> {
    let (log_directory, base_name) = split_log_path(log_path)?;
    let state_name = prepend_to_file_name(STATE_FILE_PREFIX, base_name);

    match requested {
        Some(requested) if requested.as_os_str().is_empty() => Ok(log_directory.join(state_name)),
        Some(requested) if names_directory(requested) => Ok(requested.join(state_name)),
        Some(requested) => Ok(requested.to_path_buf()),
        None => Ok(log_directory.join(state_name)),
    }
}

fn names_directory(path: &Path) -> bool {
    path.as_os_str().as_bytes().ends_with(b"/") || path.is_dir()
}

fn prepend_to_file_name(prefix: &str, name: &OsStr) -> OsString {
    let mut os_string = OsString::from(prefix);
    os_string.push(name);
    os_string
}
