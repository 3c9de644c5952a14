//! HTTP client for the messaging bridge.
//!
//! The bridge holds the authenticated session with the messaging service and
//! exposes its calls as JSON over HTTP. Responses are the tagged shapes from
//! `chatvault_core::remote` unchanged.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use chatvault_core::defaults::{BRIDGE_TIMEOUT_SECS, BRIDGE_URL};
use chatvault_core::env::env_parse;
use chatvault_core::{
    DialogCursor, DialogsPage, Error, HistoryPage, InputPeer, InputUser, MessagingService,
    RemoteChat, RemoteMedia, RemoteUser, Result,
};

use crate::error::{parse_retry_after, status_to_error};
use crate::types::*;

/// Configuration for the bridge client.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Base URL of the bridge.
    pub base_url: String,
    /// Bearer token, if the bridge requires one.
    pub token: Option<String>,
    /// Request timeout in seconds. Covers media downloads.
    pub timeout_seconds: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: BRIDGE_URL.to_string(),
            token: None,
            timeout_seconds: BRIDGE_TIMEOUT_SECS,
        }
    }
}

impl BridgeConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `BRIDGE_URL` | `http://localhost:8081` | Bridge base URL |
    /// | `BRIDGE_TOKEN` | (none) | Bearer token |
    /// | `BRIDGE_TIMEOUT_SECS` | `120` | Request timeout |
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: std::env::var("BRIDGE_URL").unwrap_or_else(|_| BRIDGE_URL.to_string()),
            token: std::env::var("BRIDGE_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout_seconds: env_parse("BRIDGE_TIMEOUT_SECS", BRIDGE_TIMEOUT_SECS)?,
        })
    }
}

/// [`MessagingService`] backed by the bridge HTTP API.
pub struct HttpMessagingClient {
    client: Client,
    config: BridgeConfig,
}

impl HttpMessagingClient {
    /// Create a new client with the given configuration.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "remote",
            component = "bridge",
            base_url = %config.base_url,
            timeout_secs = config.timeout_seconds,
            "Initializing bridge client"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(BridgeConfig::from_env()?)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.config.token {
            Some(ref token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }

    /// Send a request and turn non-success statuses into errors.
    async fn send(&self, op: &'static str, req: RequestBuilder) -> Result<Response> {
        let start = Instant::now();
        let response = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| Error::Request(format!("{} request failed: {}", op, e)))?;

        let status = response.status();
        debug!(
            subsystem = "remote",
            component = "bridge",
            op,
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Bridge call finished"
        );

        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(
            response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok()),
        );
        let message = match response.json::<BridgeErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };
        Err(status_to_error(status.as_u16(), &message, retry_after))
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        op: &'static str,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        let req = self.client.post(self.url(endpoint)).json(body);
        let response = self.send(op, req).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Serialization(format!("{} response: {}", op, e)))
    }
}

#[async_trait]
impl MessagingService for HttpMessagingClient {
    async fn current_user(&self) -> Result<RemoteUser> {
        let req = self.client.get(self.url("/self"));
        let response = self.send("current_user", req).await?;
        response
            .json::<RemoteUser>()
            .await
            .map_err(|e| Error::Serialization(format!("current_user response: {}", e)))
    }

    async fn list_dialogs(&self, cursor: &DialogCursor, limit: i32) -> Result<DialogsPage> {
        self.post_json(
            "list_dialogs",
            "/dialogs",
            &DialogsRequest::new(cursor, limit),
        )
        .await
    }

    async fn message_history(
        &self,
        peer: &InputPeer,
        offset_id: i64,
        limit: i32,
    ) -> Result<HistoryPage> {
        self.post_json(
            "message_history",
            "/history",
            &HistoryRequest {
                peer: *peer,
                offset_id,
                limit,
            },
        )
        .await
    }

    async fn get_users(&self, users: &[InputUser]) -> Result<Vec<RemoteUser>> {
        if users.is_empty() {
            return Ok(Vec::new());
        }
        let response: UsersResponse = self
            .post_json(
                "get_users",
                "/users",
                &UsersRequest {
                    users: users.to_vec(),
                },
            )
            .await?;
        Ok(response.users)
    }

    async fn get_chats(&self, chat_ids: &[i64]) -> Result<Vec<RemoteChat>> {
        if chat_ids.is_empty() {
            return Ok(Vec::new());
        }
        let response: ChatsResponse = self
            .post_json(
                "get_chats",
                "/chats",
                &ChatsRequest {
                    chat_ids: chat_ids.to_vec(),
                },
            )
            .await?;
        Ok(response.chats)
    }

    async fn download_media(&self, media: &RemoteMedia) -> Result<Vec<u8>> {
        if matches!(media, RemoteMedia::Unsupported) {
            return Err(Error::Classification(
                "cannot download unsupported media".to_string(),
            ));
        }
        let req = self.client.post(self.url("/media")).json(&MediaRequest {
            media: media.clone(),
        });
        let response = self.send("download_media", req).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Request(format!("download_media body: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.base_url, "http://localhost:8081");
        assert_eq!(config.timeout_seconds, 120);
        assert!(config.token.is_none());
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = HttpMessagingClient::new(BridgeConfig {
            base_url: "http://bridge:8081/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.url("/dialogs"), "http://bridge:8081/dialogs");
    }
}
