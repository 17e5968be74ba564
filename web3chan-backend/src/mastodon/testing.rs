//! Scripted stand-ins for a remote instance

use super::error::{ApiError, ApiResult};
use super::types::{ApiMethod, AppCredentials, InstanceInfo, Relationship};
use super::{MastodonApi, MastodonConnector};
use crate::models::{Account, Notification, NotificationId, NotificationKind, Status, Visibility};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    VerifyCredentials,
    Instance,
    Following(String),
    Followers(String),
    Notifications(Option<NotificationId>),
    Dismiss(NotificationId),
    Follow(String),
    Reblog(String),
    Call(ApiMethod),
}

pub fn unavailable() -> ApiError {
    ApiError::Status {
        status: 503,
        body: "unavailable".to_string(),
    }
}

pub fn account(id: &str, locked: bool) -> Account {
    Account {
        id: id.to_string(),
        acct: format!("user{}", id),
        locked,
    }
}

pub fn follow_notification(id: &str, account_id: &str, locked: bool) -> Notification {
    Notification {
        id: NotificationId::new(id),
        kind: NotificationKind::Follow {
            account: account(account_id, locked),
        },
    }
}

pub fn mention_notification(
    id: &str,
    account_id: &str,
    status_id: &str,
    visibility: Visibility,
    in_reply_to_id: Option<&str>,
) -> Notification {
    Notification {
        id: NotificationId::new(id),
        kind: NotificationKind::Mention {
            account: account(account_id, false),
            status: Status {
                id: status_id.to_string(),
                visibility,
                in_reply_to_id: in_reply_to_id.map(str::to_string),
            },
        },
    }
}

pub struct FakeApi {
    pub calls: Mutex<Vec<ApiCall>>,
    pub instance: Mutex<InstanceInfo>,
    pub following: Mutex<Vec<String>>,
    pub followers: Mutex<Vec<String>>,
    /// Consumed one per fetch; an empty queue yields an empty batch
    pub batches: Mutex<VecDeque<ApiResult<Vec<Notification>>>>,
    pub follow_result_following: AtomicBool,
    pub fail_verify: AtomicBool,
    pub fail_relationships: AtomicBool,
    pub fail_follow: AtomicBool,
    pub fail_reblog: AtomicBool,
    pub fail_dismiss: AtomicBool,
    /// Make the notification fetch never complete
    pub hang_notifications: AtomicBool,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            instance: Mutex::new(InstanceInfo {
                version: "4.2.0".to_string(),
                urls: None,
            }),
            following: Mutex::new(Vec::new()),
            followers: Mutex::new(Vec::new()),
            batches: Mutex::new(VecDeque::new()),
            follow_result_following: AtomicBool::new(true),
            fail_verify: AtomicBool::new(false),
            fail_relationships: AtomicBool::new(false),
            fail_follow: AtomicBool::new(false),
            fail_reblog: AtomicBool::new(false),
            fail_dismiss: AtomicBool::new(false),
            hang_notifications: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    /// Calls that change remote state
    pub fn mutations(&self) -> Vec<ApiCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, ApiCall::Follow(_) | ApiCall::Reblog(_)))
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    pub fn push_batch(&self, batch: ApiResult<Vec<Notification>>) {
        self.batches.lock().push_back(batch);
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl MastodonApi for FakeApi {
    async fn verify_credentials(&self) -> ApiResult<Account> {
        self.record(ApiCall::VerifyCredentials);
        if self.fail_verify.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(account("1", false))
    }

    async fn instance(&self) -> ApiResult<InstanceInfo> {
        self.record(ApiCall::Instance);
        Ok(self.instance.lock().clone())
    }

    async fn following(&self, account_id: &str) -> ApiResult<Vec<Account>> {
        self.record(ApiCall::Following(account_id.to_string()));
        if self.fail_relationships.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.following.lock().iter().map(|id| account(id, false)).collect())
    }

    async fn followers(&self, account_id: &str) -> ApiResult<Vec<Account>> {
        self.record(ApiCall::Followers(account_id.to_string()));
        if self.fail_relationships.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.followers.lock().iter().map(|id| account(id, false)).collect())
    }

    async fn notifications_since(&self, since_id: Option<&NotificationId>) -> ApiResult<Vec<Notification>> {
        self.record(ApiCall::Notifications(since_id.cloned()));
        if self.hang_notifications.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.batches.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn dismiss_notification(&self, id: &NotificationId) -> ApiResult<()> {
        self.record(ApiCall::Dismiss(id.clone()));
        if self.fail_dismiss.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }

    async fn follow(&self, account_id: &str) -> ApiResult<Relationship> {
        self.record(ApiCall::Follow(account_id.to_string()));
        if self.fail_follow.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(Relationship {
            following: self.follow_result_following.load(Ordering::SeqCst),
        })
    }

    async fn reblog(&self, status_id: &str) -> ApiResult<()> {
        self.record(ApiCall::Reblog(status_id.to_string()));
        if self.fail_reblog.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }

    async fn call(&self, method: ApiMethod, args: &[Value], kwargs: &Map<String, Value>) -> ApiResult<Value> {
        self.record(ApiCall::Call(method));
        Ok(serde_json::json!({
            "method": method.as_ref(),
            "args": args,
            "kwargs": kwargs,
        }))
    }

    fn streaming_url(&self, streaming_api: &str) -> ApiResult<Url> {
        Ok(Url::parse(streaming_api)?)
    }
}

/// Hands out the same [`FakeApi`] for every board
pub struct FakeConnector {
    pub api: Arc<FakeApi>,
    pub registrations: AtomicUsize,
    pub logins: AtomicUsize,
    pub fail_register: AtomicBool,
    pub fail_login: AtomicBool,
}

impl FakeConnector {
    pub fn new(api: Arc<FakeApi>) -> Self {
        Self {
            api,
            registrations: AtomicUsize::new(0),
            logins: AtomicUsize::new(0),
            fail_register: AtomicBool::new(false),
            fail_login: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MastodonConnector for FakeConnector {
    fn connect(&self, _base_url: &str, _access_token: &str) -> Arc<dyn MastodonApi> {
        self.api.clone()
    }

    async fn register_app(&self, base_url: &str, _client_name: &str) -> ApiResult<AppCredentials> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let n = self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(AppCredentials {
            client_id: format!("client-{}-{}", n, base_url),
            client_secret: "secret".to_string(),
        })
    }

    async fn log_in(
        &self,
        _base_url: &str,
        _app: &AppCredentials,
        username: &str,
        _password: &str,
    ) -> ApiResult<String> {
        if self.fail_login.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(format!("token-{}", username))
    }
}
