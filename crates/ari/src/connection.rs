//! ARI WebSocket event pump
//!
//! Connects the named application to the switch's event feed, translates raw
//! events into internal `ChannelEvent`s and resolves pending
//! playback/recording completions. On disconnect it reconnects with linearly
//! increasing backoff up to a bounded attempt count, then reports itself
//! permanently down.

use crate::client::AriInner;
use crate::events::AriEvent;
use call_agent_core::{ChannelEvent, ConnectionState, StoredRecording, TelephonyError};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

pub(crate) async fn run_event_pump(inner: Arc<AriInner>) {
    let events_url = inner.settings.events_url();
    let mut attempt: u32 = 0;

    loop {
        match connect_async(events_url.as_str()).await {
            Ok((ws, _)) => {
                attempt = 0;
                inner.state_tx.send_replace(ConnectionState::Connected);
                tracing::info!(app = %inner.settings.app, "ARI event stream connected");

                let (mut sink, mut stream) = ws.split();
                while let Some(msg) = stream.next().await {
                    match msg {
                        Ok(Message::Text(text)) => handle_event(&inner, &text).await,
                        Ok(Message::Ping(payload)) => {
                            let _ = sink.send(Message::Pong(payload)).await;
                        }
                        Ok(Message::Close(frame)) => {
                            tracing::warn!(frame = ?frame, "ARI event stream closed by switch");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "ARI event stream read failed");
                            break;
                        }
                    }
                }

                inner.fail_pending();
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "ARI connection attempt failed");
            }
        }

        attempt += 1;
        if attempt > inner.settings.reconnect_max_attempts {
            inner.state_tx.send_replace(ConnectionState::Down);
            tracing::error!(
                attempts = inner.settings.reconnect_max_attempts,
                "ARI reconnect budget exhausted; control connection is down"
            );
            return;
        }

        inner.state_tx.send_replace(ConnectionState::Reconnecting { attempt });
        let backoff = Duration::from_millis(inner.settings.reconnect_base_ms * u64::from(attempt));
        tracing::info!(attempt, backoff_ms = backoff.as_millis() as u64, "Reconnecting to ARI");
        tokio::time::sleep(backoff).await;
    }
}

async fn handle_event(inner: &Arc<AriInner>, text: &str) {
    let event: AriEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unparseable ARI event");
            return;
        }
    };

    match event {
        AriEvent::StasisStart { channel, .. } => {
            tracing::info!(channel_id = %channel.id, state = %channel.state, "Channel entered application");
            forward(inner, ChannelEvent::Entered(channel.info())).await;
        }
        AriEvent::StasisEnd { channel } => {
            tracing::info!(channel_id = %channel.id, "Channel left application");
            forward(
                inner,
                ChannelEvent::Left {
                    channel_id: channel.id,
                },
            )
            .await;
        }
        AriEvent::ChannelDtmfReceived { channel, digit } => {
            if let Some(digit) = digit.chars().next() {
                forward(
                    inner,
                    ChannelEvent::Dtmf {
                        channel_id: channel.id,
                        digit,
                    },
                )
                .await;
            }
        }
        AriEvent::ChannelStateChange { channel } => {
            tracing::trace!(channel_id = %channel.id, state = %channel.state, "Channel state change");
        }
        AriEvent::PlaybackFinished { playback } => {
            if let Some((_, tx)) = inner.pending_playbacks.remove(&playback.id) {
                let _ = tx.send(());
            }
        }
        AriEvent::RecordingFinished { recording } => {
            if let Some((_, tx)) = inner.pending_recordings.remove(&recording.name) {
                let _ = tx.send(Ok(StoredRecording {
                    name: recording.name,
                    duration_secs: recording.duration.map(|d| d.max(0) as u32),
                }));
            }
        }
        AriEvent::RecordingFailed { recording } => {
            if let Some((_, tx)) = inner.pending_recordings.remove(&recording.name) {
                let _ = tx.send(Err(TelephonyError::RecordingFailed {
                    name: recording.name,
                    cause: recording.cause.unwrap_or_else(|| "unknown".to_string()),
                }));
            }
        }
        AriEvent::PlaybackStarted { .. } | AriEvent::RecordingStarted { .. } => {}
        AriEvent::Unknown => {}
    }
}

/// Hand an internal event to the dispatcher. Session logic never runs here;
/// the dispatch path only forwards.
async fn forward(inner: &Arc<AriInner>, event: ChannelEvent) {
    if inner.event_tx.send(event).await.is_err() {
        tracing::warn!("Internal event receiver dropped; discarding channel event");
    }
}
