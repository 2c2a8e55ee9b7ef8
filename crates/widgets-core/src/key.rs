//! Composite identities of poll options and todo tasks.
//!
//! Both pair the creating sender with that sender's local creation index,
//! which makes keys unique without coordination. The two widgets render the
//! pair in opposite orders on the wire (`sender,idx` for polls, `idx,sender`
//! for tasks); each scheme is kept exactly as peers expect it.

use std::fmt;
use std::str::FromStr;

use crate::identity::SenderId;

/// Error returned when a wire key string does not name a well-formed key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed key '{0}'")]
pub struct ParseKeyError(pub String);

fn parse_idx(raw: &str) -> Option<u32> {
    let canonical = !raw.is_empty()
        && raw.bytes().all(|b| b.is_ascii_digit())
        && !(raw.len() > 1 && raw.starts_with('0'));
    if canonical { raw.parse().ok() } else { None }
}

/// Identity of a poll option, rendered `"{sender},{idx}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PollKey {
    pub sender: SenderId,
    pub idx: u32,
}

impl PollKey {
    #[must_use]
    pub const fn new(sender: SenderId, idx: u32) -> Self {
        Self { sender, idx }
    }
}

impl fmt::Display for PollKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.sender, self.idx)
    }
}

impl FromStr for PollKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseKeyError(s.to_string());
        let (sender, idx) = s.split_once(',').ok_or_else(err)?;
        Ok(Self {
            sender: sender.parse().map_err(|_| err())?,
            idx: parse_idx(idx).ok_or_else(err)?,
        })
    }
}

/// Identity of a todo task, rendered `"{idx},{sender}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub idx: u32,
    pub sender: SenderId,
}

impl TaskKey {
    #[must_use]
    pub const fn new(idx: u32, sender: SenderId) -> Self {
        Self { idx, sender }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.idx, self.sender)
    }
}

impl FromStr for TaskKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseKeyError(s.to_string());
        let (idx, sender) = s.split_once(',').ok_or_else(err)?;
        Ok(Self {
            idx: parse_idx(idx).ok_or_else(err)?,
            sender: sender.parse().map_err(|_| err())?,
        })
    }
}
