//! reqwest-backed Mastodon API client

use super::error::{ApiError, ApiResult};
use super::types::{ApiMethod, AppCredentials, HttpVerb, InstanceInfo, Relationship};
use super::{MastodonApi, MastodonConnector};
use crate::models::{Account, Notification, NotificationId};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Page size requested from list endpoints
const PAGE_LIMIT: &str = "50";
const OAUTH_SCOPES: &str = "read write follow";
const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct MastodonClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl MastodonClient {
    pub fn new(client: Client, base_url: &str, access_token: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.access_token)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let request = self.authorized(self.client.get(self.endpoint(path)));
        let resp = check_status(request.send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let request = self.authorized(self.client.post(self.endpoint(path)));
        let resp = check_status(request.send().await?).await?;
        Ok(resp.json().await?)
    }

    /// Follow `rel="next"` links until the server runs out of pages
    async fn get_all<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> ApiResult<Vec<T>> {
        let mut items = Vec::new();
        let mut request = self.authorized(self.client.get(self.endpoint(path)).query(query));

        loop {
            let resp = check_status(request.send().await?).await?;
            let next = resp
                .headers()
                .get(header::LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_page_url);

            let page: Vec<T> = resp.json().await?;
            let empty = page.is_empty();
            items.extend(page);

            match next {
                Some(url) if !empty => request = self.authorized(self.client.get(url)),
                _ => break,
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl MastodonApi for MastodonClient {
    async fn verify_credentials(&self) -> ApiResult<Account> {
        self.get_json("accounts/verify_credentials").await
    }

    async fn instance(&self) -> ApiResult<InstanceInfo> {
        self.get_json("instance").await
    }

    async fn following(&self, account_id: &str) -> ApiResult<Vec<Account>> {
        self.get_all(
            &format!("accounts/{}/following", account_id),
            &[("limit", PAGE_LIMIT.to_string())],
        )
        .await
    }

    async fn followers(&self, account_id: &str) -> ApiResult<Vec<Account>> {
        self.get_all(
            &format!("accounts/{}/followers", account_id),
            &[("limit", PAGE_LIMIT.to_string())],
        )
        .await
    }

    async fn notifications_since(&self, since_id: Option<&NotificationId>) -> ApiResult<Vec<Notification>> {
        let mut query = vec![("limit", PAGE_LIMIT.to_string())];
        if let Some(id) = since_id {
            query.push(("since_id", id.to_string()));
        }

        // Items are decoded one by one so a single odd shape can't wedge the cursor
        let page: Vec<Value> = self.get_all("notifications", &query).await?;
        let mut notifications: Vec<Notification> = page.iter().filter_map(Notification::from_value).collect();
        // The server pages newest first
        notifications.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(notifications)
    }

    async fn dismiss_notification(&self, id: &NotificationId) -> ApiResult<()> {
        let request = self.authorized(
            self.client
                .post(self.endpoint(&format!("notifications/{}/dismiss", id))),
        );
        check_status(request.send().await?).await?;
        Ok(())
    }

    async fn follow(&self, account_id: &str) -> ApiResult<Relationship> {
        self.post_json(&format!("accounts/{}/follow", account_id)).await
    }

    async fn reblog(&self, status_id: &str) -> ApiResult<()> {
        let _: Value = self.post_json(&format!("statuses/{}/reblog", status_id)).await?;
        Ok(())
    }

    async fn call(&self, method: ApiMethod, args: &[Value], kwargs: &Map<String, Value>) -> ApiResult<Value> {
        let (verb, template) = method.route();
        let mut positional = args.iter();
        let mut kwargs = kwargs.clone();

        let path = if method.takes_id() {
            let id = positional
                .next()
                .cloned()
                .or_else(|| kwargs.remove("id"))
                .and_then(|v| value_to_param(&v))
                .ok_or_else(|| ApiError::invalid_args(format!("{} requires an id argument", method)))?;
            template.replace("{id}", &id)
        } else {
            template.to_string()
        };

        if positional.next().is_some() {
            return Err(ApiError::invalid_args(format!(
                "too many positional arguments for {}",
                method
            )));
        }

        let params = kwargs
            .iter()
            .map(|(key, value)| {
                value_to_param(value)
                    .map(|v| (key.clone(), v))
                    .ok_or_else(|| ApiError::invalid_args(format!("argument '{}' must be a scalar", key)))
            })
            .collect::<ApiResult<Vec<(String, String)>>>()?;

        let url = self.endpoint(&path);
        let builder = match verb {
            HttpVerb::Get => self.client.get(url).query(&params),
            HttpVerb::Post => self.client.post(url).form(&params),
        };

        let resp = check_status(self.authorized(builder).send().await?).await?;
        let text = resp.text().await?;
        if text.trim().is_empty() {
            Ok(Value::Null)
        } else {
            Ok(serde_json::from_str(&text)?)
        }
    }

    fn streaming_url(&self, streaming_api: &str) -> ApiResult<Url> {
        let mut url = Url::parse(streaming_api)?;
        let scheme = match url.scheme() {
            "https" => Some("wss"),
            "http" => Some("ws"),
            _ => None,
        };
        if let Some(scheme) = scheme {
            url.set_scheme(scheme)
                .map_err(|_| ApiError::Stream(format!("cannot use {} as a websocket url", streaming_api)))?;
        }

        url.set_path("/api/v1/streaming");
        url.query_pairs_mut()
            .clear()
            .append_pair("access_token", &self.access_token);
        Ok(url)
    }
}

/// Shares one HTTP client between every board and the setup handshake
#[derive(Clone)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    pub fn new() -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("web3chan/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[async_trait]
impl MastodonConnector for HttpConnector {
    fn connect(&self, base_url: &str, access_token: &str) -> Arc<dyn MastodonApi> {
        Arc::new(MastodonClient::new(self.client.clone(), base_url, access_token))
    }

    async fn register_app(&self, base_url: &str, client_name: &str) -> ApiResult<AppCredentials> {
        let url = format!("{}/api/v1/apps", base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(url)
            .form(&[
                ("client_name", client_name),
                ("redirect_uris", OOB_REDIRECT_URI),
                ("scopes", OAUTH_SCOPES),
            ])
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }

    async fn log_in(
        &self,
        base_url: &str,
        app: &AppCredentials,
        username: &str,
        password: &str,
    ) -> ApiResult<String> {
        let url = format!("{}/oauth/token", base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", app.client_id.as_str()),
                ("client_secret", app.client_secret.as_str()),
                ("username", username),
                ("password", password),
                ("scope", OAUTH_SCOPES),
            ])
            .send()
            .await?;
        let token: TokenResponse = check_status(resp).await?.json().await?;
        Ok(token.access_token)
    }
}

async fn check_status(resp: Response) -> ApiResult<Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Extract the `rel="next"` target from a Link header
pub fn next_page_url(link: &str) -> Option<String> {
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

fn value_to_param(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
