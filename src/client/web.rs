//! HTTP client for a tinyq server.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::transport::{PopOutcome, QueueTransport};
use crate::config::WorkerConfig;
use crate::constants::{self, MSG_EMPTY, MSG_LOCKED, MSG_PAUSED};
use crate::daemon::services::state::{ChannelInfo, ChannelStats};
use crate::error::{Error, Result};
use crate::item::{Item, Payload};
use crate::protocol::Envelope;

/// Connection settings for [`WebClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub url: String,
    pub application: String,
    pub token: Option<String>,
    /// Worker sleep after an empty, paused or failed poll.
    pub backoff: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for ClientOptions {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            url: config.url.clone(),
            application: config.app.clone(),
            token: config.token.clone(),
            backoff: config.backoff(),
        }
    }
}

/// Client for the `/tinyq` HTTP surface.
///
/// Every request carries the `app` (and, if set, `token`) query parameter.
/// `WebClient` is `Clone`; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct WebClient {
    http: reqwest::Client,
    base: String,
    options: ClientOptions,
}

impl WebClient {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL doesn't parse or the application
    /// name is empty.
    pub fn new(options: ClientOptions) -> Result<Self> {
        Url::parse(&options.url)
            .map_err(|e| Error::Config(format!("invalid server URL '{}': {e}", options.url)))?;
        if options.application.is_empty() {
            return Err(Error::Config("application name cannot be empty".to_string()));
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base: options.url.trim_end_matches('/').to_string(),
            options,
        })
    }

    pub fn application(&self) -> &str {
        &self.options.application
    }

    pub fn backoff(&self) -> Duration {
        self.options.backoff
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{path}", self.base))
            .map_err(|e| Error::Config(format!("invalid endpoint '{path}': {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            if let Some(token) = &self.options.token {
                query.append_pair("token", token);
            }
            query.append_pair("app", &self.options.application);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(%url, "GET");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http(format!("server responded {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Http(format!("invalid response body: {e}")))
    }

    async fn envelope(&self, path: &str, params: &[(&str, &str)]) -> Result<Envelope> {
        self.get_json(self.endpoint(path, params)?).await
    }

    /// Channel command; an `error` body becomes an error.
    async fn command(&self, path: &str, channel: &str) -> Result<String> {
        let envelope = self.envelope(path, &[("channel", channel)]).await?;
        check(envelope)
    }

    /// Channel command that a lock can reject.
    async fn guarded_command(&self, path: &str, channel: &str) -> Result<()> {
        let message = self.command(path, channel).await?;
        if message == MSG_LOCKED {
            return Err(Error::channel_locked(channel));
        }
        Ok(())
    }

    /// Enqueues an item string.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects the item.
    pub async fn push(&self, item: &str) -> Result<()> {
        let envelope = self.envelope("/tinyq/push", &[("item", item)]).await?;
        check(envelope).map(|_| ())
    }

    /// Pushes `channel.id[.payload]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded or the push fails.
    pub async fn route(&self, channel: &str, id: &str, payload: &Payload) -> Result<()> {
        let item = Item::new(channel, id).with_payload(payload)?;
        self.push(&item.to_string()).await
    }

    /// Takes the next item of a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server reports an error.
    pub async fn pop(&self, channel: &str) -> Result<PopOutcome> {
        let envelope = self.envelope("/tinyq/pop", &[("channel", channel)]).await?;
        if envelope.is_error() {
            return Err(server_error(envelope));
        }
        let message = envelope.message;
        if message.eq_ignore_ascii_case(MSG_EMPTY) {
            Ok(PopOutcome::Empty)
        } else if message.eq_ignore_ascii_case(MSG_PAUSED) {
            Ok(PopOutcome::Paused)
        } else {
            Ok(PopOutcome::Item(message))
        }
    }

    /// Takes up to `count` items (the server clamps to `1..=10`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelPaused`] for a paused channel, or an error if
    /// the request fails.
    pub async fn pop_many(&self, channel: &str, count: usize) -> Result<Vec<String>> {
        let count = count.to_string();
        let envelope = self
            .envelope("/tinyq/pop", &[("channel", channel), ("count", &count)])
            .await?;
        if envelope.is_error() {
            return Err(server_error(envelope));
        }
        let message = envelope.message;
        if message.eq_ignore_ascii_case(MSG_EMPTY) {
            Ok(Vec::new())
        } else if message.eq_ignore_ascii_case(MSG_PAUSED) {
            Err(Error::channel_paused(channel))
        } else {
            Ok(message.lines().map(str::to_string).collect())
        }
    }

    /// Removes one item without popping the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the channel doesn't exist.
    pub async fn ack(&self, item: &str) -> Result<()> {
        let envelope = self.envelope("/tinyq/ack", &[("item", item)]).await?;
        check(envelope).map(|_| ())
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn count(&self, channel: &str) -> Result<u64> {
        let message = self.command("/tinyq/count", channel).await?;
        message
            .parse()
            .map_err(|_| Error::Http(format!("unexpected count '{message}'")))
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn channels(&self) -> Result<Vec<ChannelInfo>> {
        let envelope = self.envelope("/tinyq/channels", &[]).await?;
        let message = check(envelope)?;
        Ok(message.lines().filter_map(ChannelInfo::from_row).collect())
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn pause(&self, channel: &str) -> Result<()> {
        self.command("/tinyq/channels/pause", channel).await.map(|_| ())
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn resume(&self, channel: &str) -> Result<()> {
        self.command("/tinyq/channels/resume", channel).await.map(|_| ())
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn is_paused(&self, channel: &str) -> Result<bool> {
        let message = self.command("/tinyq/channels/status", channel).await?;
        Ok(message == "true")
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn lock(&self, channel: &str) -> Result<()> {
        self.command("/tinyq/channels/lock", channel).await.map(|_| ())
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn unlock(&self, channel: &str) -> Result<()> {
        self.command("/tinyq/channels/unlock", channel).await.map(|_| ())
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn is_locked(&self, channel: &str) -> Result<bool> {
        let message = self.command("/tinyq/channels/lockstatus", channel).await?;
        Ok(message == MSG_LOCKED)
    }

    /// # Errors
    ///
    /// Returns [`Error::ChannelLocked`] if the channel is locked, or an error
    /// if the request fails.
    pub async fn clear(&self, channel: &str) -> Result<()> {
        self.guarded_command("/tinyq/channels/clear", channel).await
    }

    /// # Errors
    ///
    /// Returns [`Error::ChannelLocked`] if the channel is locked, or an error
    /// if the request fails.
    pub async fn delete(&self, channel: &str) -> Result<()> {
        self.guarded_command("/tinyq/channels/delete", channel).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or the body isn't a stats list.
    pub async fn stats(&self) -> Result<Vec<ChannelStats>> {
        self.get_json(self.endpoint("/tinyq/stats", &[])?).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or the body isn't a name list.
    pub async fn databases(&self) -> Result<Vec<String>> {
        self.get_json(self.endpoint("/tinyq/databases", &[])?).await
    }

    fn crud_endpoint(&self, command: &str, key: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.endpoint(&format!("/tinyq/crud/{command}"), params)?;
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("server URL cannot hold a path: {}", self.base)))?
            .push(key);
        Ok(url)
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let envelope: Envelope = self.get_json(self.crud_endpoint("get", key, &[])?).await?;
        if envelope.is_error() {
            return Err(server_error(envelope));
        }
        Ok((!envelope.message.is_empty()).then_some(envelope.message))
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        let envelope: Envelope = self
            .get_json(self.crud_endpoint("set", key, &[("v", value)])?)
            .await?;
        check(envelope).map(|_| ())
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn kv_delete(&self, key: &str) -> Result<()> {
        let envelope: Envelope = self.get_json(self.crud_endpoint("delete", key, &[])?).await?;
        check(envelope).map(|_| ())
    }
}

#[async_trait]
impl QueueTransport for WebClient {
    async fn pop(&self, channel: &str) -> Result<PopOutcome> {
        WebClient::pop(self, channel).await
    }

    async fn push(&self, item: &str) -> Result<()> {
        WebClient::push(self, item).await
    }
}

fn server_error(envelope: Envelope) -> Error {
    Error::Http(
        envelope
            .error
            .unwrap_or_else(|| constants::MSG_ERROR.to_string()),
    )
}

/// Message of a successful envelope; an `error` body becomes an error.
fn check(envelope: Envelope) -> Result<String> {
    if envelope.is_error() {
        return Err(server_error(envelope));
    }
    Ok(envelope.message)
}
