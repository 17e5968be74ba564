use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// A remote service endpoint and the application credentials registered on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: i64,
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub created_at: DateTime<Utc>,
}

/// One tenant account, always loaded together with its instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: i64,
    pub name: String,
    pub instance: Instance,
    pub access_token: String,
    pub enabled: bool,
    pub streaming: bool,
    pub autofollow: bool,
    pub replies: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to insert a new board row
#[derive(Debug, Clone)]
pub struct NewBoard {
    pub name: String,
    pub instance_id: i64,
    pub access_token: String,
    pub enabled: bool,
    pub streaming: bool,
    pub autofollow: bool,
    pub replies: bool,
}

/// Boolean board settings that can be flipped with `toggle_board_option`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum BoardOption {
    Enabled,
    Streaming,
    Autofollow,
    Replies,
}

impl BoardOption {
    /// Column backing this option in the `boards` table
    pub fn column(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Streaming => "streaming",
            Self::Autofollow => "autofollow",
            Self::Replies => "replies",
        }
    }
}

/// Row returned by `list_boards`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSummary {
    pub name: String,
    pub enabled: bool,
    pub running: bool,
    pub streaming: bool,
    pub autofollow: bool,
    pub replies: bool,
}

impl BoardSummary {
    /// Serialized as a positional tuple, the shape the CLI client prints as a table
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!([
            self.name,
            self.enabled,
            self.running,
            self.streaming,
            self.autofollow,
            self.replies
        ])
    }
}
