//! Unit identity - who an exposure or achievement belongs to
//!
//! Events are tied either to a resolved internal user or, when no user record
//! exists, to a raw identifier plus a tag describing what the identifier is
//! (device id, anonymous id, IP address, ...). Identifier-tagged events cannot
//! be joined to a user.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal user record, resolved through the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct User {
    id: u64,
    username: String,
}

impl User {
    /// Create a user.
    #[must_use]
    pub fn new(id: u64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }

    /// Get the database id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Get the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

/// The unit an event is recorded against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitIdentity {
    /// Resolved internal user
    User {
        /// The user
        user: User,
    },
    /// Raw identifier with its type tag
    External {
        /// Identifier value
        identifier: String,
        /// What the identifier is
        identifier_type: String,
    },
}

/// Borrowed identity key, ignoring usernames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKey<'a> {
    /// Internal user id
    User(u64),
    /// Identifier value and type
    External {
        /// Identifier value
        identifier: &'a str,
        /// What the identifier is
        identifier_type: &'a str,
    },
}

impl UnitIdentity {
    /// Identity of an internal user.
    #[must_use]
    pub const fn user(user: User) -> Self {
        Self::User { user }
    }

    /// Identity of a raw identifier.
    #[must_use]
    pub fn external(identifier: impl Into<String>, identifier_type: impl Into<String>) -> Self {
        Self::External {
            identifier: identifier.into(),
            identifier_type: identifier_type.into(),
        }
    }

    /// The resolved user, if any.
    #[must_use]
    pub const fn as_user(&self) -> Option<&User> {
        match self {
            Self::User { user } => Some(user),
            Self::External { .. } => None,
        }
    }

    /// Whether both identities refer to the same unit.
    ///
    /// Users match on id; identifiers match on value and type.
    #[must_use]
    pub fn same_unit(&self, other: &Self) -> bool {
        self.key() == other.key()
    }

    /// Hashable key that is equal exactly when [`same_unit`](Self::same_unit)
    /// holds.
    #[must_use]
    pub fn key(&self) -> UnitKey<'_> {
        match self {
            Self::User { user } => UnitKey::User(user.id),
            Self::External {
                identifier,
                identifier_type,
            } => UnitKey::External {
                identifier,
                identifier_type,
            },
        }
    }

    /// False for external identities with an empty identifier or type.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match self {
            Self::User { .. } => true,
            Self::External {
                identifier,
                identifier_type,
            } => !identifier.is_empty() && !identifier_type.is_empty(),
        }
    }
}

impl fmt::Display for UnitIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User { user } => write!(f, "{user}"),
            Self::External {
                identifier,
                identifier_type,
            } => write!(f, "{identifier_type}: {identifier}"),
        }
    }
}
