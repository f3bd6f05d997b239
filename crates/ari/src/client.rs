//! ARI REST client and `CallControl` implementation
//!
//! Channel operations are REST calls; `play` and `record` additionally park a
//! oneshot completion that the event pump resolves when the switch reports
//! `PlaybackFinished` / `RecordingFinished` / `RecordingFailed`. A 404 from
//! any channel-targeted operation means the channel is already torn down and
//! maps to `TelephonyError::ChannelGone`, terminal for that channel.

use crate::connection;
use async_trait::async_trait;
use call_agent_config::AriSettings;
use call_agent_core::{
    CallControl, ChannelEvent, ConnectionState, OriginateParams, RecordingParams, StoredRecording,
    TelephonyError,
};
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

/// Buffered internal events between the pump and the engine dispatcher
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub(crate) struct AriInner {
    pub(crate) http: reqwest::Client,
    pub(crate) settings: AriSettings,
    pub(crate) pending_playbacks: DashMap<String, oneshot::Sender<()>>,
    pub(crate) pending_recordings:
        DashMap<String, oneshot::Sender<Result<StoredRecording, TelephonyError>>>,
    pub(crate) event_tx: mpsc::Sender<ChannelEvent>,
    pub(crate) state_tx: watch::Sender<ConnectionState>,
}

impl AriInner {
    /// Fail every parked completion; called when the event stream drops so no
    /// operation waits on a dead connection.
    pub(crate) fn fail_pending(&self) {
        self.pending_playbacks.clear();
        let names: Vec<String> = self
            .pending_recordings
            .iter()
            .map(|e| e.key().clone())
            .collect();
        for name in names {
            if let Some((_, tx)) = self.pending_recordings.remove(&name) {
                let _ = tx.send(Err(TelephonyError::Disconnected));
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: String,
}

/// Client for the switch's control protocol
#[derive(Clone)]
pub struct AriClient {
    inner: Arc<AriInner>,
}

impl AriClient {
    /// Create the client and the internal event feed it will translate raw
    /// protocol events onto. Call [`AriClient::start`] to begin pumping.
    pub fn new(
        settings: AriSettings,
    ) -> Result<(Self, mpsc::Receiver<ChannelEvent>), TelephonyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.operation_timeout_secs))
            .build()
            .map_err(|e| TelephonyError::Transport(format!("HTTP client: {}", e)))?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Reconnecting { attempt: 0 });

        let inner = Arc::new(AriInner {
            http,
            settings,
            pending_playbacks: DashMap::new(),
            pending_recordings: DashMap::new(),
            event_tx,
            state_tx,
        });

        Ok((Self { inner }, event_rx))
    }

    /// Spawn the event pump (connect, read, reconnect with bounded backoff).
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move { connection::run_event_pump(inner).await })
    }

    /// Observe connection state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/ari{}",
            self.inner.settings.url.trim_end_matches('/'),
            path
        )
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.inner
            .http
            .request(method, self.url(path))
            .basic_auth(
                &self.inner.settings.username,
                Some(&self.inner.settings.password),
            )
    }

    /// Map a channel-targeted response; 404 means the channel is already gone.
    async fn check_channel_response(
        response: reqwest::Response,
        channel_id: &str,
    ) -> Result<reqwest::Response, TelephonyError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TelephonyError::ChannelGone(channel_id.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        channel_id: &str,
    ) -> Result<reqwest::Response, TelephonyError> {
        let response = builder
            .send()
            .await
            .map_err(|e| TelephonyError::Transport(e.to_string()))?;
        Self::check_channel_response(response, channel_id).await
    }
}

#[async_trait]
impl CallControl for AriClient {
    async fn answer(&self, channel_id: &str) -> Result<(), TelephonyError> {
        self.send(
            self.request(
                reqwest::Method::POST,
                &format!("/channels/{}/answer", channel_id),
            ),
            channel_id,
        )
        .await?;
        tracing::debug!(channel_id = %channel_id, "Channel answered");
        Ok(())
    }

    async fn hangup(&self, channel_id: &str) -> Result<(), TelephonyError> {
        self.send(
            self.request(reqwest::Method::DELETE, &format!("/channels/{}", channel_id)),
            channel_id,
        )
        .await?;
        tracing::debug!(channel_id = %channel_id, "Channel hung up");
        Ok(())
    }

    async fn play(&self, channel_id: &str, media_uri: &str) -> Result<(), TelephonyError> {
        // Client-chosen playback id lets the completion be parked before the
        // request goes out, so the finish event can never be missed.
        let playback_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.inner.pending_playbacks.insert(playback_id.clone(), tx);

        let result = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/channels/{}/play/{}", channel_id, playback_id),
                )
                .query(&[("media", media_uri)]),
                channel_id,
            )
            .await;

        if let Err(e) = result {
            self.inner.pending_playbacks.remove(&playback_id);
            return Err(e);
        }

        let timeout = Duration::from_secs(self.inner.settings.operation_timeout_secs);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(TelephonyError::Transport(
                "event stream closed before playback finished".to_string(),
            )),
            Err(_) => {
                self.inner.pending_playbacks.remove(&playback_id);
                Err(TelephonyError::Timeout(format!(
                    "playback {} on {}",
                    playback_id, channel_id
                )))
            }
        }
    }

    async fn record(
        &self,
        channel_id: &str,
        params: &RecordingParams,
    ) -> Result<StoredRecording, TelephonyError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending_recordings
            .insert(params.name.clone(), tx);

        let result = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/channels/{}/record", channel_id),
                )
                .query(&[
                    ("name", params.name.as_str()),
                    ("format", params.format.as_str()),
                    ("maxDurationSeconds", &params.max_duration_secs.to_string()),
                    ("maxSilenceSeconds", &params.max_silence_secs.to_string()),
                    ("ifExists", "overwrite"),
                    ("beep", "false"),
                    ("terminateOn", "none"),
                ]),
                channel_id,
            )
            .await;

        if let Err(e) = result {
            self.inner.pending_recordings.remove(&params.name);
            return Err(e);
        }

        // The switch ends the recording on its own caps; the extra grace only
        // covers a lost completion event.
        let timeout = Duration::from_secs(
            u64::from(params.max_duration_secs) + self.inner.settings.operation_timeout_secs,
        );
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(TelephonyError::Transport(
                "event stream closed before recording finished".to_string(),
            )),
            Err(_) => {
                self.inner.pending_recordings.remove(&params.name);
                Err(TelephonyError::Timeout(format!(
                    "recording {} on {}",
                    params.name, channel_id
                )))
            }
        }
    }

    async fn fetch_recording(&self, name: &str) -> Result<Vec<u8>, TelephonyError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/recordings/stored/{}/file", name),
            )
            .send()
            .await
            .map_err(|e| TelephonyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TelephonyError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn delete_recording(&self, name: &str) -> Result<(), TelephonyError> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/recordings/stored/{}", name),
            )
            .send()
            .await
            .map_err(|e| TelephonyError::Transport(e.to_string()))?;

        let status = response.status();
        // Already gone is fine; deletion is idempotent
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            let message = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    async fn create_bridge(&self) -> Result<String, TelephonyError> {
        let response = self
            .request(reqwest::Method::POST, "/bridges")
            .query(&[("type", "mixing")])
            .send()
            .await
            .map_err(|e| TelephonyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bridge: BridgeResponse = response
            .json()
            .await
            .map_err(|e| TelephonyError::InvalidResponse(e.to_string()))?;
        tracing::debug!(bridge_id = %bridge.id, "Mixing bridge created");
        Ok(bridge.id)
    }

    async fn originate(&self, params: &OriginateParams) -> Result<String, TelephonyError> {
        if !self.is_connected() {
            return Err(TelephonyError::Disconnected);
        }

        let mut query: Vec<(&str, String)> = vec![
            ("endpoint", params.endpoint.clone()),
            ("app", self.inner.settings.app.clone()),
            ("timeout", params.timeout_secs.to_string()),
        ];
        if let Some(ref caller_id) = params.caller_id {
            query.push(("callerId", caller_id.clone()));
        }
        if let Some(ref args) = params.app_args {
            query.push(("appArgs", args.clone()));
        }

        let response = self
            .request(reqwest::Method::POST, "/channels")
            .query(&query)
            .send()
            .await
            .map_err(|e| TelephonyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let channel: ChannelResponse = response
            .json()
            .await
            .map_err(|e| TelephonyError::InvalidResponse(e.to_string()))?;
        tracing::info!(channel_id = %channel.id, endpoint = %params.endpoint, "Channel originated");
        Ok(channel.id)
    }

    fn connection_state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }
}
