//! Display-name lookup used when materializing voter lists.

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use crate::identity::UserId;

/// Rendered for voters the directory does not know.
pub const UNKNOWN_USER: &str = "Unknown user";

/// Resolves user ids to display names.
pub trait UserDirectory {
    fn full_name(&self, user: UserId) -> Option<String>;

    /// Comma-separated display names, in the order given.
    fn display_names(&self, users: &mut dyn Iterator<Item = UserId>) -> String {
        users
            .map(|id| {
                self.full_name(id)
                    .unwrap_or_else(|| UNKNOWN_USER.to_string())
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl<S: BuildHasher> UserDirectory for HashMap<UserId, String, S> {
    fn full_name(&self, user: UserId) -> Option<String> {
        self.get(&user).cloned()
    }
}

impl UserDirectory for BTreeMap<UserId, String> {
    fn full_name(&self, user: UserId) -> Option<String> {
        self.get(&user).cloned()
    }
}

/// A directory that knows nobody; every voter renders as unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDirectory;

impl UserDirectory for NoDirectory {
    fn full_name(&self, _user: UserId) -> Option<String> {
        None
    }
}
