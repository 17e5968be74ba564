use serde::Deserialize;
use strum::{AsRefStr, Display, EnumString};

/// Subset of `GET /api/v1/instance` the workers look at
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub urls: Option<InstanceUrls>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceUrls {
    #[serde(default)]
    pub streaming_api: Option<String>,
}

impl InstanceInfo {
    pub fn streaming_api(&self) -> Option<&str> {
        self.urls
            .as_ref()
            .and_then(|u| u.streaming_api.as_deref())
            .filter(|u| !u.is_empty())
    }

    /// Pleroma and Akkoma report a Mastodon-compatible version string
    pub fn is_mastodon_compatible_fork(&self) -> bool {
        self.version.contains("compatible")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub following: bool,
}

/// Application credentials issued by `POST /api/v1/apps`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVerb {
    Get,
    Post,
}

/// Remote API methods that may be invoked through the `mastoapi` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ApiMethod {
    AccountVerifyCredentials,
    Instance,
    Account,
    AccountFollowing,
    AccountFollowers,
    AccountFollow,
    AccountUnfollow,
    Notifications,
    Notification,
    NotificationDismiss,
    Status,
    StatusReblog,
    StatusUnreblog,
}

impl ApiMethod {
    /// HTTP verb and path under `/api/v1/`; `{id}` is filled from the first positional argument
    pub fn route(&self) -> (HttpVerb, &'static str) {
        match self {
            Self::AccountVerifyCredentials => (HttpVerb::Get, "accounts/verify_credentials"),
            Self::Instance => (HttpVerb::Get, "instance"),
            Self::Account => (HttpVerb::Get, "accounts/{id}"),
            Self::AccountFollowing => (HttpVerb::Get, "accounts/{id}/following"),
            Self::AccountFollowers => (HttpVerb::Get, "accounts/{id}/followers"),
            Self::AccountFollow => (HttpVerb::Post, "accounts/{id}/follow"),
            Self::AccountUnfollow => (HttpVerb::Post, "accounts/{id}/unfollow"),
            Self::Notifications => (HttpVerb::Get, "notifications"),
            Self::Notification => (HttpVerb::Get, "notifications/{id}"),
            Self::NotificationDismiss => (HttpVerb::Post, "notifications/{id}/dismiss"),
            Self::Status => (HttpVerb::Get, "statuses/{id}"),
            Self::StatusReblog => (HttpVerb::Post, "statuses/{id}/reblog"),
            Self::StatusUnreblog => (HttpVerb::Post, "statuses/{id}/unreblog"),
        }
    }

    pub fn takes_id(&self) -> bool {
        self.route().1.contains("{id}")
    }
}
