//! Identities of users, messages and event senders.
//!
//! Seed data embedded in a widget's setup payload is replayed as if it were
//! sent by [`SenderId::Canned`]. Real traffic always carries a numeric user
//! id, so the two never collide even though both render into the same key
//! strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Literal used on the wire and inside keys for seed-replay senders.
pub const CANNED: &str = "canned";

/// A chat user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The chat message hosting a widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Origin of an inbound widget event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SenderId {
    /// A live event from a real user.
    User(UserId),
    /// Synthetic replay of the widget's embedded seed data.
    Canned,
}

impl SenderId {
    #[must_use]
    pub const fn user(id: u64) -> Self {
        Self::User(UserId(id))
    }

    /// The user behind this sender, if any.
    #[must_use]
    pub const fn user_id(self) -> Option<UserId> {
        match self {
            Self::User(id) => Some(id),
            Self::Canned => None,
        }
    }

    #[must_use]
    pub const fn is_canned(self) -> bool {
        matches!(self, Self::Canned)
    }
}

impl From<UserId> for SenderId {
    fn from(id: UserId) -> Self {
        Self::User(id)
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "{id}"),
            Self::Canned => f.write_str(CANNED),
        }
    }
}

/// Error returned when a sender segment is neither a user id nor `canned`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid sender '{0}': expected a user id or 'canned'")]
pub struct ParseSenderError(pub String);

impl FromStr for SenderId {
    type Err = ParseSenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == CANNED {
            return Ok(Self::Canned);
        }
        // Reject signs and whitespace that u64::from_str would not, but keep
        // the rendering canonical so keys round-trip exactly.
        if s.is_empty()
            || !s.bytes().all(|b| b.is_ascii_digit())
            || (s.len() > 1 && s.starts_with('0'))
        {
            return Err(ParseSenderError(s.to_string()));
        }
        s.parse::<u64>()
            .map(Self::user)
            .map_err(|_| ParseSenderError(s.to_string()))
    }
}

impl Serialize for SenderId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::User(id) => serializer.serialize_u64(id.0),
            Self::Canned => serializer.serialize_str(CANNED),
        }
    }
}

impl<'de> Deserialize<'de> for SenderId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Id(u64),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Id(id) => Ok(Self::user(id)),
            Raw::Name(name) if name == CANNED => Ok(Self::Canned),
            Raw::Name(name) => Err(serde::de::Error::custom(ParseSenderError(name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_form() {
        assert_eq!(SenderId::user(42).to_string(), "42");
        assert_eq!(SenderId::Canned.to_string(), "canned");
    }

    #[test]
    fn parse_accepts_ids_and_canned() {
        assert_eq!("17".parse::<SenderId>(), Ok(SenderId::user(17)));
        assert_eq!("canned".parse::<SenderId>(), Ok(SenderId::Canned));
    }

    #[test]
    fn parse_rejects_non_canonical_numbers() {
        for raw in ["", "-1", "+4", " 4", "04", "Canned", "4.0"] {
            assert!(raw.parse::<SenderId>().is_err(), "{raw:?} should not parse");
        }
    }

    #[test]
    fn serde_uses_number_or_literal() {
        assert_eq!(serde_json::to_string(&SenderId::user(9)).expect("ser"), "9");
        assert_eq!(
            serde_json::to_string(&SenderId::Canned).expect("ser"),
            "\"canned\""
        );
        let back: SenderId = serde_json::from_str("\"canned\"").expect("de");
        assert_eq!(back, SenderId::Canned);
        assert!(serde_json::from_str::<SenderId>("\"bob\"").is_err());
    }

    #[test]
    fn user_id_accessor() {
        assert_eq!(SenderId::user(3).user_id(), Some(UserId(3)));
        assert_eq!(SenderId::Canned.user_id(), None);
        assert!(SenderId::Canned.is_canned());
    }
}
