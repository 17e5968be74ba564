//! Remote social API seam.
//!
//! Workers only talk to an instance through [`MastodonApi`]; the supervisor
//! builds per-board clients and performs app registration through
//! [`MastodonConnector`]. The HTTP implementation lives in [`client`].

pub mod client;
pub mod error;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use client::HttpConnector;
pub use error::{ApiError, ApiResult};
pub use types::{ApiMethod, AppCredentials, InstanceInfo, Relationship};

use crate::models::{Account, Notification, NotificationId};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

/// Operations a board performs with its own credentials
#[async_trait]
pub trait MastodonApi: Send + Sync {
    async fn verify_credentials(&self) -> ApiResult<Account>;

    async fn instance(&self) -> ApiResult<InstanceInfo>;

    /// Every account the given account follows, across all pages
    async fn following(&self, account_id: &str) -> ApiResult<Vec<Account>>;

    /// Every follower of the given account, across all pages
    async fn followers(&self, account_id: &str) -> ApiResult<Vec<Account>>;

    /// Notifications newer than `since_id`, oldest first
    async fn notifications_since(&self, since_id: Option<&NotificationId>) -> ApiResult<Vec<Notification>>;

    async fn dismiss_notification(&self, id: &NotificationId) -> ApiResult<()>;

    async fn follow(&self, account_id: &str) -> ApiResult<Relationship>;

    async fn reblog(&self, status_id: &str) -> ApiResult<()>;

    /// Raw passthrough for diagnostics
    async fn call(&self, method: ApiMethod, args: &[Value], kwargs: &Map<String, Value>) -> ApiResult<Value>;

    /// Authenticated websocket URL for the given streaming endpoint
    fn streaming_url(&self, streaming_api: &str) -> ApiResult<Url>;
}

/// Builds board clients and handles the one-time account setup handshake
#[async_trait]
pub trait MastodonConnector: Send + Sync {
    fn connect(&self, base_url: &str, access_token: &str) -> Arc<dyn MastodonApi>;

    async fn register_app(&self, base_url: &str, client_name: &str) -> ApiResult<AppCredentials>;

    /// Password grant login, returns an access token
    async fn log_in(
        &self,
        base_url: &str,
        app: &AppCredentials,
        username: &str,
        password: &str,
    ) -> ApiResult<String>;
}
