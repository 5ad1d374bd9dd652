/// Data models for the group registry.
/// Represents connections, groups, and the results of registry operations.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every group pairs exactly two connections: its creator and one partner.
pub const GROUP_CAPACITY: usize = 2;

/// Stable identifier the transport assigns to a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        ConnectionId(id.into())
    }

    /// Fresh random identifier for a newly accepted connection
    pub fn generate() -> Self {
        ConnectionId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        ConnectionId::new(id)
    }
}

/// Occupant of a group's second, auto-matched slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub connection: ConnectionId,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct Group {
    /// Spelling used by the connection that created the group
    pub name: String,
    /// Case-insensitive lookup key, see [`group_key`]
    pub key: String,
    pub creator: ConnectionId,
    pub partner: Option<Partner>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub(crate) fn new(name: &str, creator: ConnectionId) -> Self {
        Group {
            name: name.to_string(),
            key: group_key(name),
            creator,
            partner: None,
            created_at: Utc::now(),
        }
    }

    /// A group is open for auto-match iff its partner slot is empty.
    pub fn is_open(&self) -> bool {
        self.partner.is_none()
    }

    pub fn is_partner(&self, connection: &ConnectionId) -> bool {
        self.partner
            .as_ref()
            .is_some_and(|p| &p.connection == connection)
    }
}

/// Normalized form of a group name; two names naming the same group share a key.
pub fn group_key(name: &str) -> String {
    name.to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachResult {
    /// Canonical name of the group the connection is now attached to
    pub group_name: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// The caller now occupies the partner slot of this group
    Matched(String),
    /// The caller already held the partner slot of this group; nothing changed
    AlreadyPaired(String),
    NoOpenGroup,
}

impl MatchResult {
    pub fn group_name(&self) -> Option<&str> {
        match self {
            MatchResult::Matched(name) | MatchResult::AlreadyPaired(name) => Some(name),
            MatchResult::NoOpenGroup => None,
        }
    }
}

/// One group a disconnecting connection was part of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub group_name: String,
    /// True when the connection created the group and the group is gone
    pub removed_group: bool,
    /// Partner evicted along with a removed group
    pub released_partner: Option<Partner>,
    /// Name the connection supplied when it was matched as partner
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetachResult {
    pub departures: Vec<Departure>,
}

impl DetachResult {
    pub fn notify_group_name(&self) -> Option<&str> {
        self.departures.first().map(|d| d.group_name.as_str())
    }

    pub fn removed_group(&self) -> bool {
        self.departures.iter().any(|d| d.removed_group)
    }

    pub fn is_empty(&self) -> bool {
        self.departures.is_empty()
    }
}

// Response DTOs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupSnapshot {
    pub name: String,
    pub creator: ConnectionId,
    pub partner: Option<ConnectionId>,
    pub partner_name: Option<String>,
    pub open: bool,
    pub capacity: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&Group> for GroupSnapshot {
    fn from(group: &Group) -> Self {
        GroupSnapshot {
            name: group.name.clone(),
            creator: group.creator.clone(),
            partner: group.partner.as_ref().map(|p| p.connection.clone()),
            partner_name: group.partner.as_ref().map(|p| p.display_name.clone()),
            open: group.is_open(),
            capacity: GROUP_CAPACITY,
            created_at: group.created_at,
        }
    }
}
