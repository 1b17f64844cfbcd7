//! Shared test host: a tinyq daemon on an ephemeral port backed by a
//! temporary store directory.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use tinyq::client::ClientOptions;
use tinyq::daemon::http::{AppState, router};
use tinyq::daemon::manager::QueueManager;
use tinyq::protocol::Envelope;

pub const DEFAULT_APP: &str = "default";

/// Running daemon. The server task is aborted on drop.
pub struct TestHost {
    addr: SocketAddr,
    client: reqwest::Client,
    manager: QueueManager,
    server: JoinHandle<()>,
    _dir: TempDir,
}

impl TestHost {
    pub async fn start() -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let manager = QueueManager::new(dir.path(), 64);
        let state = Arc::new(AppState::new(manager.clone(), DEFAULT_APP));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router(state)).await;
        });

        Ok(Self {
            addr,
            client: reqwest::Client::new(),
            manager,
            server,
            _dir: dir,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn manager(&self) -> &QueueManager {
        &self.manager
    }

    pub async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client.get(self.url(path)).send().await
    }

    /// GETs `path` with URL-encoded query parameters.
    pub async fn get_with(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> reqwest::Result<reqwest::Response> {
        let mut url = url::Url::parse(&self.url(path)).expect("invalid test URL");
        url.query_pairs_mut().extend_pairs(params);
        self.client.get(url).send().await
    }

    /// GETs `path` and decodes the envelope, asserting status 200.
    pub async fn envelope(&self, path: &str) -> Envelope {
        let resp = self.get(path).await.expect("request failed");
        assert_eq!(resp.status(), 200, "unexpected status for {path}");
        resp.json().await.expect("invalid envelope")
    }

    /// Message of a successful envelope.
    pub async fn message(&self, path: &str) -> String {
        let envelope = self.envelope(path).await;
        assert!(!envelope.is_error(), "{path} failed: {:?}", envelope.error);
        envelope.message
    }

    pub fn client_options(&self, application: &str) -> ClientOptions {
        ClientOptions {
            url: self.url(""),
            application: application.to_string(),
            token: None,
            backoff: Duration::from_millis(20),
        }
    }
}

impl Drop for TestHost {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Polls `check` every 10ms until it returns true or 5 seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
