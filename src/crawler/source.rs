//! Upstream profile source
//!
//! [`ProfileSource`] is the seam between the crawl engine and the network.
//! [`SteamSource`] talks to the Steam Web API (vanity resolution, friend
//! lists) and to the community site's comment render endpoint.

use crate::config::SteamConfig;
use crate::{FetchError, FetchResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Browser user agent sent with every request
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// One page of rendered comment markup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentPage {
    pub html: String,

    /// Total comments on the profile, when the upstream reports it
    pub total_count: Option<usize>,
}

/// Network operations the crawl engine needs from the upstream
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Maps a vanity name to a canonical profile id
    ///
    /// Returns `FetchError::Resolution` when the upstream does not know the name.
    async fn resolve_vanity(&self, name: &str) -> FetchResult<String>;

    /// Fetches `count` comments starting at offset `start`
    async fn fetch_comment_page(
        &self,
        node_id: &str,
        start: usize,
        count: usize,
    ) -> FetchResult<CommentPage>;

    /// Returns the canonical ids of the profile's friends
    async fn fetch_friends(&self, node_id: &str) -> FetchResult<Vec<String>>;
}

/// Builds the shared HTTP client
///
/// The connection pool is shared by every worker. `max_connections_per_host`
/// caps the idle connections kept per host; it does not limit concurrency.
/// In-flight requests are bounded by the worker count, since each worker
/// has at most one request outstanding.
pub fn build_http_client(config: &SteamConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
    );
    headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_max_idle_per_host(config.max_connections_per_host)
        .gzip(true)
        .brotli(true)
        .build()
}

#[derive(Debug, Deserialize)]
struct VanityEnvelope {
    response: VanityResponse,
}

#[derive(Debug, Deserialize)]
struct VanityResponse {
    success: i64,
    #[serde(default)]
    steamid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FriendsEnvelope {
    #[serde(default)]
    friendslist: Option<FriendList>,
}

#[derive(Debug, Deserialize)]
struct FriendList {
    #[serde(default)]
    friends: Vec<Friend>,
}

#[derive(Debug, Deserialize)]
struct Friend {
    steamid: String,
}

#[derive(Debug, Deserialize)]
struct CommentRender {
    #[serde(default)]
    comments_html: Option<String>,
    #[serde(default)]
    total_count: Option<serde_json::Value>,
}

/// Steam Web API + community site client
#[derive(Debug, Clone)]
pub struct SteamSource {
    client: Client,
    api_key: String,
    api_base: String,
    community_base: String,
}

impl SteamSource {
    pub fn new(config: &SteamConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_http_client(config)?, config))
    }

    pub fn with_client(client: Client, config: &SteamConfig) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            community_base: config.community_base.trim_end_matches('/').to_string(),
        }
    }

    /// Sends a request, mapping transport failures and non-2xx statuses
    ///
    /// URLs are stripped from transport errors so the API key in the query
    /// string never reaches the logs.
    async fn send(&self, request: RequestBuilder, endpoint: &str) -> FetchResult<Response> {
        let response = request.send().await.map_err(|source| FetchError::Http {
            url: endpoint.to_string(),
            source: source.without_url(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(response: Response, endpoint: &str) -> FetchResult<T> {
        response.json::<T>().await.map_err(|source| {
            if source.is_decode() {
                FetchError::Malformed {
                    url: endpoint.to_string(),
                    message: source.to_string(),
                }
            } else {
                FetchError::Http {
                    url: endpoint.to_string(),
                    source: source.without_url(),
                }
            }
        })
    }
}

#[async_trait]
impl ProfileSource for SteamSource {
    async fn resolve_vanity(&self, name: &str) -> FetchResult<String> {
        let endpoint = format!("{}/ISteamUser/ResolveVanityURL/v0001/", self.api_base);
        let request = self
            .client
            .get(&endpoint)
            .query(&[("key", self.api_key.as_str()), ("vanityurl", name)]);

        let response = self.send(request, &endpoint).await?;
        let envelope: VanityEnvelope = Self::read_json(response, &endpoint).await?;

        match envelope.response {
            VanityResponse {
                success: 1,
                steamid: Some(id),
            } => Ok(id),
            _ => Err(FetchError::Resolution {
                reference: name.to_string(),
            }),
        }
    }

    async fn fetch_comment_page(
        &self,
        node_id: &str,
        start: usize,
        count: usize,
    ) -> FetchResult<CommentPage> {
        let endpoint = format!(
            "{}/comment/Profile/render/{}/-1/",
            self.community_base, node_id
        );
        let start = start.to_string();
        let count = count.to_string();
        let request = self.client.post(&endpoint).form(&[
            ("start", start.as_str()),
            ("count", count.as_str()),
            ("feature2", "-1"),
        ]);

        let response = self.send(request, &endpoint).await?;
        let render: CommentRender = Self::read_json(response, &endpoint).await?;

        let total_count = render.total_count.and_then(|value| match value {
            serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        Ok(CommentPage {
            html: render.comments_html.unwrap_or_default(),
            total_count,
        })
    }

    async fn fetch_friends(&self, node_id: &str) -> FetchResult<Vec<String>> {
        let endpoint = format!("{}/ISteamUser/GetFriendList/v0001/", self.api_base);
        let request = self.client.get(&endpoint).query(&[
            ("key", self.api_key.as_str()),
            ("steamid", node_id),
            ("relationship", "friend"),
        ]);

        let response = self.send(request, &endpoint).await?;
        let envelope: FriendsEnvelope = Self::read_json(response, &endpoint).await?;

        Ok(envelope
            .friendslist
            .map(|list| list.friends.into_iter().map(|f| f.steamid).collect())
            .unwrap_or_default())
    }
}
