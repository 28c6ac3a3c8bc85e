//! HTTP + WebSocket gateway client

use super::{decode_sessions, AgentActions, PushStream, RemoteSessionSnapshot, SessionSource};
use crate::{FleetError, Result};
use async_trait::async_trait;
use futures_util::{future, StreamExt};
use reqwest::StatusCode;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Request timeout for pull and action calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Gateway reachable over HTTP(S), with a WebSocket push channel
pub struct HttpGateway {
    base: Url,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| FleetError::Config(format!("invalid gateway url '{}': {}", base_url, e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(FleetError::Config(format!(
                "gateway url must be http or https, got '{}'",
                base.scheme()
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base,
            token: token.filter(|t| !t.trim().is_empty()),
            client,
        })
    }

    fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or(FleetError::Unauthorized)
    }

    /// Append path segments (percent-encoded) to the base url
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| FleetError::Config(format!("gateway url '{}' cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn stream_url(&self) -> Result<Url> {
        let mut url = self.endpoint(&["api", "sessions", "stream"])?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| FleetError::Config(format!("cannot derive push url from '{}'", self.base)))?;
        Ok(url)
    }

    async fn post_action(&self, agent_id: &str, action: &str) -> Result<()> {
        let token = self.token()?;
        let url = self.endpoint(&["api", "sessions", agent_id, action])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| FleetError::Action {
                agent_id: agent_id.to_string(),
                message: e.to_string(),
            })?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FleetError::Unauthorized),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(FleetError::Action {
                    agent_id: agent_id.to_string(),
                    message: format!("{} {}", s, body.trim()).trim().to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl SessionSource for HttpGateway {
    async fn pull(&self, limit: usize) -> Result<Vec<RemoteSessionSnapshot>> {
        let token = self.token()?;
        let url = self.endpoint(&["api", "sessions"])?;
        let response = self
            .client
            .get(url)
            .query(&[("limit", limit)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| FleetError::ConnectionUnavailable(e.to_string()))?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(FleetError::Unauthorized),
            s => {
                return Err(FleetError::ConnectionUnavailable(format!(
                    "pull returned {}",
                    s
                )));
            }
        }

        let body = response.text().await?;
        decode_sessions(&body)
    }

    async fn subscribe(&self) -> Result<PushStream> {
        let token = self.token()?;
        let url = self.stream_url()?;
        let mut request = url.as_str().into_client_request()?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| FleetError::Unauthorized)?;
        request.headers_mut().insert("Authorization", auth);

        let (ws, _response) = connect_async(request).await?;
        tracing::debug!("Push channel connected to {}", url);

        let stream = ws.filter_map(|msg| {
            let item = match msg {
                Ok(Message::Text(text)) => decode_frame(&text),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => decode_frame(&text),
                    Err(_) => None,
                },
                Ok(_) => None,
                Err(e) => Some(Err(FleetError::from(e))),
            };
            future::ready(item)
        });

        Ok(stream.boxed())
    }
}

fn decode_frame(text: &str) -> Option<Result<Vec<RemoteSessionSnapshot>>> {
    match decode_sessions(text) {
        Ok(sessions) => Some(Ok(sessions)),
        Err(e) => {
            tracing::warn!("Ignoring unparseable push frame: {}", e);
            None
        }
    }
}

#[async_trait]
impl AgentActions for HttpGateway {
    async fn kill(&self, agent_id: &str) -> Result<()> {
        self.post_action(agent_id, "kill").await
    }

    async fn archive(&self, agent_id: &str) -> Result<()> {
        self.post_action(agent_id, "archive").await
    }
}
