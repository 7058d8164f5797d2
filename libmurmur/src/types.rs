//! Entity, event and action types shared across the agent.
//!
//! Entities mirror the fields of the server's JSON payloads that the agent
//! actually reads; everything else is dropped at deserialization.

use serde::{Deserialize, Serialize};

/// Status visibility as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
    #[serde(other)]
    Unknown,
}

/// An account, as returned by lookups and carried inside statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// Handle, e.g. `user` or `user@domain`.
    pub acct: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub id: String,
    #[serde(default)]
    pub acct: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
}

/// A status payload as delivered by the streaming feed or the REST API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub visibility: Visibility,
    /// Raw content; may carry the server's HTML wrapper.
    #[serde(default)]
    pub content: String,
    /// Content warning. Servers send an empty string when unset.
    #[serde(default)]
    pub spoiler_text: Option<String>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
    #[serde(default)]
    pub in_reply_to_account_id: Option<String>,
    pub account: Account,
    #[serde(default)]
    pub url: Option<String>,
}

impl Status {
    /// Content warning, with the server's empty-string-for-none folded away.
    pub fn content_warning(&self) -> Option<&str> {
        self.spoiler_text.as_deref().filter(|s| !s.is_empty())
    }
}

/// Follow relationship of another account toward the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub followed_by: bool,
}

/// Raw notification payload carried inside a streaming frame.
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub account: Option<Account>,
    #[serde(default)]
    pub status: Option<Status>,
}

/// One decoded streaming event, consumed exactly once by the handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Someone started following the bot.
    Follow { account: Account },
    /// A direct mention of the bot arrived.
    Mention { status: Status },
}

/// Exactly one action is derived per inbound event. An action carries
/// everything the executor needs; the executor does no further
/// business-rule branching.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// No side effect.
    Skip,
    /// Reply directly to the sender.
    Reply {
        message: String,
        recipient: Account,
        in_reply_to_id: Option<String>,
    },
    /// Relay to a third party, then confirm to the sender.
    Forward {
        sender: Account,
        recipient: Account,
        message: String,
        spoiler_text: String,
        in_reply_to_id: Option<String>,
    },
    /// Welcome a new follower.
    Follow { sender: Account, bot_account: Account },
    /// Escalate an abuse report to the moderators.
    Report {
        sender: Account,
        anonymous_sender: Account,
        reported_message: Status,
        report: Status,
    },
}

impl Action {
    /// Lowercase tag for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Skip => "skip",
            Action::Reply { .. } => "reply",
            Action::Forward { .. } => "forward",
            Action::Follow { .. } => "follow",
            Action::Report { .. } => "report",
        }
    }
}
