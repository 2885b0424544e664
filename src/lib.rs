//! # Retail
//!
//! Retail prints the lines appended to a log file since it was last run and remembers where it stopped, which
//! makes it suitable for cron-driven log checks. It keeps working when the log is rotated between runs, be it by
//! moving the file aside (optionally compressing it) or by copying and truncating it in place.
//!
//! * `Tail` runs a whole check: it loads the state, looks for the rotated file if needed, delivers new bytes and
//! commits the new state.
//!
//! ```rust no_run
//! # use retail::{Config, RetailError, Tail};
//! // state goes to /var/log/offset.mail.log
//! let config = Config::resolve("/var/log/mail.log", None)?;
//! Tail::new(config).run(&mut std::io::stdout().lock())?;
//! # Ok::<(), RetailError>(())
//! ```
//!
//! * `reconcile` and `locate_predecessor` expose the rotation decision on its own, for callers that manage
//! state and output themselves.
//!
//! ```rust
//! # use retail::{reconcile, LiveFileStat, PersistedState, RotationVerdict};
//! let prior = PersistedState { inode: 12, offset: 400, size: 1000 };
//! // same file, but it shrank: it was copied out and truncated
//! let live = LiveFileStat { inode: 12, size: 50 };
//! assert_eq!(reconcile(&prior, &live), RotationVerdict::Truncated);
//! ```
//!
//! * `source::open_at` opens a plain, gzip or zstd compressed file as a byte stream starting at a given
//! (decompressed) offset.
//!

mod config;
mod error;
pub mod locate;
pub mod paths;
mod reconcile;
pub mod source;
mod state;
mod tail;

pub use config::Config;
pub use error::RetailError;
pub use locate::{locate, locate_predecessor, Predicate, RotationCandidate};
pub use reconcile::{reconcile, LiveFileStat, RotationVerdict};
pub use state::{Format, PersistedState, StateError};
pub use tail::{Report, Tail};
