//! Types for channel state and statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Operation recorded in the statistics table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatCommand {
    Push,
    Pop,
    Ack,
    ChannelPause,
    ChannelResume,
    ChannelStatus,
    LockChannel,
    UnlockChannel,
    LockStatus,
    ClearChannel,
    DeleteChannel,
    ChannelList,
}

impl StatCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pop => "pop",
            Self::Ack => "ack",
            Self::ChannelPause => "channel_pause",
            Self::ChannelResume => "channel_resume",
            Self::ChannelStatus => "channel_status",
            Self::LockChannel => "lock_channel",
            Self::UnlockChannel => "unlock_channel",
            Self::LockStatus => "lock_status",
            Self::ClearChannel => "clear_channel",
            Self::DeleteChannel => "delete_channel",
            Self::ChannelList => "channel_list",
        }
    }
}

impl fmt::Display for StatCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed operation, waiting in the statistics buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatEvent {
    pub application: String,
    pub command: StatCommand,
    /// Channel name or item string the operation touched; may be empty.
    pub target: String,
}

impl StatEvent {
    /// Counter key: `command:target`.
    pub fn counter_key(&self) -> String {
        format!("{}:{}", self.command, self.target)
    }
}

/// Per-channel statistics record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub channel: String,
    pub stats: BTreeMap<String, u64>,
    pub is_paused: bool,
    pub count: u64,
}

/// Row of the channel listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    pub count: u64,
    pub paused: bool,
    pub locked: bool,
}

impl ChannelInfo {
    /// Wire form: `name|count|paused|locked`.
    pub fn to_row(&self) -> String {
        format!("{}|{}|{}|{}", self.name, self.count, self.paused, self.locked)
    }

    /// Parse a `name|count|paused|locked` row. Returns `None` if malformed.
    pub fn from_row(row: &str) -> Option<Self> {
        let mut fields = row.split('|');
        let name = fields.next()?.to_string();
        let count = fields.next()?.parse().ok()?;
        let paused = fields.next()?.parse().ok()?;
        let locked = fields.next()?.parse().ok()?;
        if name.is_empty() || fields.next().is_some() {
            return None;
        }
        Some(Self {
            name,
            count,
            paused,
            locked,
        })
    }
}
