use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Opaque, ordered notification id used as the polling cursor.
///
/// Mastodon ids are decimal strings of varying length, so a longer id is
/// always newer; ids of equal length compare lexically (which also covers
/// servers that hand out fixed-width alphanumeric flake ids).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NotificationId(String);

#[cfg(test)]
impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for NotificationId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for NotificationId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for NotificationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        string_or_number(deserializer).map(Self)
    }
}

/// Some servers send numeric ids as JSON numbers
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Account {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Handle, `user` for local accounts and `user@domain` for remote ones
    #[serde(default)]
    pub acct: String,
    #[serde(default)]
    pub locked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Status {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub visibility: Visibility,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    Follow { account: Account },
    Mention { account: Account, status: Status },
    /// Any notification type the board does not react to
    Unhandled { kind: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawNotification")]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
}

impl Notification {
    /// Decode one notification from a page or stream payload.
    ///
    /// A notification whose body does not match its type comes back as
    /// `Unhandled` so it still gets dismissed and still moves the cursor.
    /// Only an item without a readable id is dropped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let error = match Self::deserialize(value) {
            Ok(notification) => return Some(notification),
            Err(e) => e,
        };

        let id = match value.get("id").map(NotificationId::deserialize) {
            Some(Ok(id)) => id,
            _ => {
                log::warn!("dropping notification without a usable id: {}", error);
                return None;
            }
        };
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        log::warn!("malformed {} notification {}: {}", kind, id, error);
        Some(Self {
            id,
            kind: NotificationKind::Unhandled { kind },
        })
    }
}

#[derive(Deserialize)]
struct RawNotification {
    id: NotificationId,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    account: Option<Account>,
    #[serde(default)]
    status: Option<Status>,
}

impl TryFrom<RawNotification> for Notification {
    type Error = String;

    fn try_from(raw: RawNotification) -> Result<Self, Self::Error> {
        let kind = match raw.kind.as_str() {
            "follow" => NotificationKind::Follow {
                account: raw
                    .account
                    .ok_or_else(|| format!("follow notification {} has no account", raw.id))?,
            },
            "mention" => NotificationKind::Mention {
                account: raw
                    .account
                    .ok_or_else(|| format!("mention notification {} has no account", raw.id))?,
                status: raw
                    .status
                    .ok_or_else(|| format!("mention notification {} has no status", raw.id))?,
            },
            _ => NotificationKind::Unhandled { kind: raw.kind },
        };

        Ok(Self { id: raw.id, kind })
    }
}
