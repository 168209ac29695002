//! Sender allow-list.

use std::collections::HashSet;

use switchyard_core::User;

/// The set of sender handles permitted to interact with the bot.
///
/// A sender is allowed iff it has a handle and either no list is configured
/// or the handle is on the list. Senders without a handle, or with an empty
/// one, are never allowed.
/// Entries may be written with or without the leading `@`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    handles: Option<HashSet<String>>,
}

impl AllowList {
    /// Allows every sender that has a handle.
    pub fn open() -> Self {
        Self::default()
    }

    /// Allows only the listed handles.
    pub fn only<I, T>(handles: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            handles: Some(
                handles
                    .into_iter()
                    .map(|h| h.as_ref().trim_start_matches('@').to_string())
                    .collect(),
            ),
        }
    }

    /// Builds an allow-list from an optional configuration entry.
    pub fn from_config(handles: Option<&[String]>) -> Self {
        match handles {
            Some(handles) => Self::only(handles),
            None => Self::open(),
        }
    }

    /// Returns `true` when a list is configured.
    pub fn is_restricted(&self) -> bool {
        self.handles.is_some()
    }

    /// Applies the allow rule to a (possibly missing) sender.
    pub fn is_allowed(&self, sender: Option<&User>) -> bool {
        let Some(handle) = sender.and_then(User::handle).filter(|h| !h.is_empty()) else {
            return false;
        };
        match &self.handles {
            Some(handles) => handles.contains(handle),
            None => true,
        }
    }
}
