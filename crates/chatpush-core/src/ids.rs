//! Connection and account identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, time-ordered identifier.
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            /// Wrap an existing identifier string.
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(
    /// Identity of one accepted socket. A new handshake always yields a new id.
    ConnectionId,
    "conn"
);

/// Opaque account key that groups the connections of one logical account.
///
/// Serialized as the bare string. The frontend calls this the cookie id.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Wrap an account key.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The membership slot a connection occupies in the registry.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Scope {
    /// Administrative observers: receive every broadcast.
    Global,
    /// Connections of one account.
    Account(AccountId),
}

impl Scope {
    /// Resolve an optional account key. Absent or empty keys map to [`Scope::Global`].
    pub fn from_account(account: Option<&AccountId>) -> Self {
        match account {
            Some(id) if !id.is_empty() => Self::Account(id.clone()),
            _ => Self::Global,
        }
    }

    /// The account key, if this is an account scope.
    pub fn account(&self) -> Option<&AccountId> {
        match self {
            Self::Global => None,
            Self::Account(id) => Some(id),
        }
    }
}

impl From<Option<AccountId>> for Scope {
    fn from(account: Option<AccountId>) -> Self {
        match account {
            Some(id) if !id.is_empty() => Self::Account(id),
            _ => Self::Global,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Account(id) => write!(f, "account:{id}"),
        }
    }
}
