//! JSON frames carried over a transport session.
//!
//! Agent to maintainer:
//!   `{"cmd":"add","host":"10.0.0.5:27017","hidden":false,"priority":0,"votes":0}`
//!
//! Maintainer to agent:
//!   `{"added":"10.0.0.5:27017","success":true}`
//!   `{"success":false,"error":"internal error"}`
//!   `{"removed":"10.0.0.5:27017"}` (unsolicited, broadcast on eviction)

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

pub const ADD_CMD: &str = "add";
pub const ERR_NO_CMD: &str = "no cmd";
pub const ERR_UNKNOWN_CMD: &str = "unknown cmd";
pub const ERR_INVALID_ADD: &str = "invalid add";

/// Attributes an agent asks to be registered with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    /// Host to register. `None` lets the maintainer use the peer address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub hidden: bool,
    pub priority: f64,
    pub votes: u32,
}

impl Default for Registration {
    fn default() -> Self {
        Self {
            host: None,
            hidden: false,
            priority: 0.0,
            votes: 0,
        }
    }
}

#[derive(Serialize)]
struct AddFrame<'a> {
    cmd: &'static str,
    #[serde(flatten)]
    registration: &'a Registration,
}

impl Registration {
    /// Encode as an `add` command frame.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(&AddFrame {
            cmd: ADD_CMD,
            registration: self,
        })
        .unwrap_or_default()
    }
}

/// Wire shape of an `add` command. Every attribute is optional and an
/// explicit `null` is treated like an absent field.
#[derive(Debug, Deserialize)]
struct AddFields {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    hidden: Option<bool>,
    #[serde(default)]
    priority: Option<f64>,
    #[serde(default)]
    votes: Option<u32>,
}

impl From<AddFields> for Registration {
    fn from(f: AddFields) -> Self {
        Self {
            host: f.host.filter(|h| !h.is_empty()),
            hidden: f.hidden.unwrap_or(false),
            priority: f.priority.unwrap_or(0.0),
            votes: f.votes.unwrap_or(0),
        }
    }
}

/// A decoded agent command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add(Registration),
    /// The frame had no `cmd` field.
    Missing,
    /// The frame named a command this maintainer does not know.
    Unknown(String),
    /// An `add` whose attributes have the wrong types.
    Invalid(String),
}

/// Decode an agent frame. Only malformed JSON is an error; every other
/// problem is a [`Command`] variant the maintainer answers.
pub fn parse_command(text: &str) -> Result<Command, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Ok(Command::Missing);
    }
    let cmd = match value.get("cmd") {
        None | Some(serde_json::Value::Null) => return Ok(Command::Missing),
        Some(serde_json::Value::String(s)) if s.is_empty() => return Ok(Command::Missing),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => return Ok(Command::Unknown(other.to_string())),
    };
    if cmd != ADD_CMD {
        return Ok(Command::Unknown(cmd));
    }
    match serde_json::from_value::<AddFields>(value) {
        Ok(fields) => Ok(Command::Add(fields.into())),
        Err(e) => Ok(Command::Invalid(e.to_string())),
    }
}

/// A maintainer frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Added { added: String, success: bool },
    Failed { success: bool, error: String },
    Removed { removed: String },
}

impl Reply {
    pub fn added(host: impl Into<String>) -> Self {
        Self::Added {
            added: host.into(),
            success: true,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            success: false,
            error: error.into(),
        }
    }

    pub fn removed(host: impl Into<String>) -> Self {
        Self::Removed {
            removed: host.into(),
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct ReplyFields {
    #[serde(default)]
    added: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    removed: Option<String>,
}

/// What an agent learns from a maintainer frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Registration accepted under this host.
    Added(String),
    /// Registration refused.
    Rejected(String),
    /// A member was evicted.
    Removed(String),
    /// Valid JSON carrying nothing the agent acts on.
    Unrecognized,
}

/// Decode a maintainer frame.
pub fn parse_notice(text: &str) -> Result<Notice, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Ok(Notice::Unrecognized);
    }
    let fields: ReplyFields = match serde_json::from_value(value) {
        Ok(f) => f,
        Err(_) => return Ok(Notice::Unrecognized),
    };
    if fields.added.is_some() || fields.success.is_some() {
        return Ok(match (fields.success, fields.added) {
            (Some(true), Some(host)) => Notice::Added(host),
            _ => Notice::Rejected(fields.error.unwrap_or_else(|| "unknown error".into())),
        });
    }
    match fields.removed {
        Some(host) => Ok(Notice::Removed(host)),
        None => Ok(Notice::Unrecognized),
    }
}
