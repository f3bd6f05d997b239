//! Conversation engine and event dispatcher
//!
//! One tokio task per active channel runs the turn loop; the dispatcher only
//! looks up the owning task by channel id and forwards events. The session
//! table has exactly one insert site (channel entry) and one remove site
//! (session retirement), so "session exists" is a checkable invariant.

use crate::session::{ConversationSession, SessionPhase};
use async_trait::async_trait;
use call_agent_config::Settings;
use call_agent_core::{
    is_closing_intent, AgentPersona, CallControl, ChannelEvent, ChannelInfo, EndReason, Lead,
    ProviderError, RecordingParams, ReplyGenerator, SessionOutcome, Speaker, SpeechToText,
    TelephonyError, TextToSpeech,
};
use call_agent_persistence::{CallStore, RecordingMeta, RecordingStore};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// The three provider backends the turn loop calls out to
#[derive(Clone)]
pub struct Providers {
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub generator: Arc<dyn ReplyGenerator>,
}

/// Engine tuning, resolved from `Settings`
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub record_max_secs: u32,
    pub record_silence_secs: u32,
    pub min_confidence: f32,
    pub turn_failure_budget: u32,
    pub closing_grace_ms: u64,
    pub end_digit: char,
    pub media_dir: PathBuf,
    pub media_scheme: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            record_max_secs: 15,
            record_silence_secs: 3,
            min_confidence: 0.3,
            turn_failure_budget: 3,
            closing_grace_ms: 500,
            end_digit: '#',
            media_dir: std::env::temp_dir().join("call-agent-media"),
            media_scheme: "sound:call-agent".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            record_max_secs: settings.conversation.record_max_secs,
            record_silence_secs: settings.conversation.record_silence_secs,
            min_confidence: settings.conversation.min_confidence,
            turn_failure_budget: settings.conversation.turn_failure_budget,
            closing_grace_ms: settings.conversation.closing_grace_ms,
            end_digit: settings.calling.end_digit,
            media_dir: PathBuf::from(&settings.media.dir),
            media_scheme: settings.media.scheme.clone(),
        }
    }
}

/// Everything a session needs to converse on behalf of a call
#[derive(Clone)]
pub struct SessionContext {
    pub call_id: Uuid,
    pub lead: Lead,
    pub persona: Arc<AgentPersona>,
}

/// The engine's upstream authority: admits inbound rings and consumes
/// completion events. Implemented by the call orchestrator.
#[async_trait]
pub trait CallAuthority: Send + Sync {
    /// Called for a channel that entered the application without a registered
    /// outbound context. `None` declines the channel (it is hung up and no
    /// session is created).
    async fn admit_inbound(&self, channel: &ChannelInfo) -> Option<SessionContext>;

    /// The channel went active and its session is starting.
    async fn session_started(&self, call_id: Uuid);

    /// A session finished; finalize the call.
    async fn session_ended(&self, outcome: SessionOutcome);
}

/// Signals forwarded from the dispatcher into a session task
#[derive(Debug, Clone, Copy)]
enum SessionSignal {
    /// The switch reported the channel gone
    Gone,
    Dtmf(char),
}

struct SessionHandle {
    signal_tx: mpsc::UnboundedSender<SessionSignal>,
}

/// Transient vs terminal classification of a single turn step
enum StepError {
    ChannelGone,
    Transient(String),
}

impl From<TelephonyError> for StepError {
    fn from(err: TelephonyError) -> Self {
        if err.is_channel_gone() {
            StepError::ChannelGone
        } else {
            StepError::Transient(err.to_string())
        }
    }
}

impl From<ProviderError> for StepError {
    fn from(err: ProviderError) -> Self {
        StepError::Transient(err.to_string())
    }
}

/// Owns all live conversation sessions
pub struct ConversationEngine {
    control: Arc<dyn CallControl>,
    providers: Providers,
    calls: Arc<dyn CallStore>,
    recordings: Arc<dyn RecordingStore>,
    config: EngineConfig,
    sessions: DashMap<String, SessionHandle>,
    /// Outbound contexts registered before their channel enters the app
    pending: DashMap<String, SessionContext>,
}

impl ConversationEngine {
    pub fn new(
        control: Arc<dyn CallControl>,
        providers: Providers,
        calls: Arc<dyn CallStore>,
        recordings: Arc<dyn RecordingStore>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            control,
            providers,
            calls,
            recordings,
            config,
            sessions: DashMap::new(),
            pending: DashMap::new(),
        })
    }

    /// Register the context for an originated channel so its session can start
    /// the moment the channel enters the application.
    pub fn register_outbound(&self, channel_id: &str, context: SessionContext) {
        self.pending.insert(channel_id.to_string(), context);
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Spawn the dispatcher. Events are forwarded to per-channel tasks; no
    /// session logic executes inline here.
    pub fn run(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<ChannelEvent>,
        authority: Arc<dyn CallAuthority>,
    ) -> tokio::task::JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    ChannelEvent::Entered(info) => engine.on_channel_entered(info, &authority),
                    ChannelEvent::Left { channel_id } => {
                        engine.forward_signal(&channel_id, SessionSignal::Gone);
                    }
                    ChannelEvent::Dtmf { channel_id, digit } => {
                        engine.forward_signal(&channel_id, SessionSignal::Dtmf(digit));
                    }
                }
            }
            tracing::info!("Channel event feed closed; dispatcher exiting");
        })
    }

    fn on_channel_entered(self: &Arc<Self>, info: ChannelInfo, authority: &Arc<dyn CallAuthority>) {
        if self.sessions.contains_key(&info.id) {
            tracing::warn!(channel_id = %info.id, "Duplicate channel entry ignored");
            return;
        }

        let preregistered = self.pending.remove(&info.id).map(|(_, ctx)| ctx);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        // Sole insert site for the session table
        self.sessions
            .insert(info.id.clone(), SessionHandle { signal_tx });

        let engine = self.clone();
        let authority = authority.clone();
        tokio::spawn(async move {
            engine
                .session_task(info, preregistered, signal_rx, authority)
                .await;
        });
    }

    fn forward_signal(&self, channel_id: &str, signal: SessionSignal) {
        match self.sessions.get(channel_id) {
            Some(handle) => {
                let _ = handle.signal_tx.send(signal);
            }
            None => {
                tracing::debug!(channel_id = %channel_id, signal = ?signal, "Signal for unknown channel");
            }
        }
    }

    /// Sole remove site for the session table.
    fn remove_session(&self, channel_id: &str) {
        if self.sessions.remove(channel_id).is_some() {
            tracing::debug!(channel_id = %channel_id, "Session retired");
        }
    }

    async fn session_task(
        self: Arc<Self>,
        info: ChannelInfo,
        preregistered: Option<SessionContext>,
        mut signals: mpsc::UnboundedReceiver<SessionSignal>,
        authority: Arc<dyn CallAuthority>,
    ) {
        let context = match preregistered {
            Some(ctx) => Some(ctx),
            None => authority.admit_inbound(&info).await,
        };

        let Some(context) = context else {
            tracing::info!(
                channel_id = %info.id,
                caller = ?info.caller_number,
                "Channel declined; hanging up"
            );
            let _ = self.control.hangup(&info.id).await;
            self.remove_session(&info.id);
            return;
        };

        let mut session = ConversationSession::new(context.call_id, info.id.clone());
        tracing::info!(
            call_id = %session.call_id,
            channel_id = %session.channel_id,
            persona = %context.persona.agent_name,
            "Conversation session started"
        );
        authority.session_started(session.call_id).await;

        let reason = self
            .run_conversation(&mut session, &context, &mut signals)
            .await;

        // Once the channel is gone no further protocol operation may target it
        if !matches!(reason, EndReason::ChannelLost | EndReason::RemoteHangup) {
            self.close_session(&mut session, &context).await;
        }
        session.set_phase(SessionPhase::Ended);

        let outcome = session.outcome(reason);
        tracing::info!(
            call_id = %outcome.call_id,
            reason = %outcome.reason.as_str(),
            turns = outcome.turns,
            duration_secs = outcome.duration.as_secs(),
            "Conversation session ended"
        );

        // Cleanup is unconditional: table removal and completion emit happen
        // on every path out of the loop
        self.remove_session(&session.channel_id);
        authority.session_ended(outcome).await;
    }

    /// The turn loop. Returns the end reason; the caller decides whether the
    /// closing/hangup path still applies.
    async fn run_conversation(
        &self,
        session: &mut ConversationSession,
        context: &SessionContext,
        signals: &mut mpsc::UnboundedReceiver<SessionSignal>,
    ) -> EndReason {
        let persona = &context.persona;
        let lead_name = context.lead.name.clone();

        if let Err(e) = self.control.answer(&session.channel_id).await {
            tracing::warn!(channel_id = %session.channel_id, error = %e, "Answer failed");
            return EndReason::ChannelLost;
        }

        let greeting = persona.greeting(&lead_name);
        match self
            .speak(&session.channel_id, persona.voice_id.as_deref(), &greeting)
            .await
        {
            Ok(()) => {
                session.push_agent(&greeting);
                self.append_log(session.call_id, Speaker::Agent, &greeting).await;
            }
            Err(StepError::ChannelGone) => return EndReason::ChannelLost,
            Err(StepError::Transient(e)) => {
                tracing::warn!(call_id = %session.call_id, error = %e, "Greeting playback failed");
            }
        }

        let mut consecutive_failures: u32 = 0;
        let system_prompt = persona.system_prompt(&lead_name);

        while session.turns_taken < persona.max_turns {
            if let Some(reason) = self.drain_signals(signals) {
                return reason;
            }

            session.turns_taken += 1;
            session.set_phase(SessionPhase::Listening);

            let recording_name = format!("{}-turn-{}", session.channel_id, session.turns_taken);
            let params = RecordingParams::bounded(
                recording_name,
                self.config.record_max_secs,
                self.config.record_silence_secs,
            );

            let stored = match self.control.record(&session.channel_id, &params).await {
                Ok(stored) => stored,
                Err(e) if e.is_channel_gone() => return EndReason::ChannelLost,
                Err(e) => {
                    tracing::warn!(call_id = %session.call_id, turn = session.turns_taken, error = %e, "Recording failed");
                    consecutive_failures += 1;
                    if consecutive_failures >= self.config.turn_failure_budget {
                        return EndReason::FailureBudget;
                    }
                    continue;
                }
            };

            let audio = self.control.fetch_recording(&stored.name).await;
            if persona.recording_enabled {
                let meta =
                    RecordingMeta::new(session.call_id, &stored.name, stored.duration_secs);
                if let Err(e) = self.recordings.insert(&meta).await {
                    tracing::warn!(call_id = %session.call_id, error = %e, "Recording metadata write failed");
                }
            }
            // The switch-side artifact is transient; delete on every path
            if let Err(e) = self.control.delete_recording(&stored.name).await {
                tracing::debug!(name = %stored.name, error = %e, "Recording delete failed");
            }

            let audio = match audio {
                Ok(audio) => audio,
                Err(e) if e.is_channel_gone() => return EndReason::ChannelLost,
                Err(e) => {
                    tracing::warn!(call_id = %session.call_id, error = %e, "Recording fetch failed");
                    consecutive_failures += 1;
                    if consecutive_failures >= self.config.turn_failure_budget {
                        return EndReason::FailureBudget;
                    }
                    continue;
                }
            };

            let transcription = match self.providers.stt.transcribe(&audio, None).await {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(call_id = %session.call_id, error = %e, "Transcription failed");
                    consecutive_failures += 1;
                    if consecutive_failures >= self.config.turn_failure_budget {
                        return EndReason::FailureBudget;
                    }
                    continue;
                }
            };

            if !transcription.is_usable(self.config.min_confidence) {
                // Silence consumes the turn but is not a failure and leaves
                // no user history entry
                tracing::debug!(
                    call_id = %session.call_id,
                    turn = session.turns_taken,
                    "Empty transcription; continuing"
                );
                continue;
            }

            let text = transcription.text.trim().to_string();
            session.push_user(&text);
            self.append_log(session.call_id, Speaker::User, &text).await;
            session.set_phase(SessionPhase::Processing);

            if is_closing_intent(&text, &persona.negative_keywords) {
                return EndReason::UserEnded;
            }

            let reply = match self
                .providers
                .generator
                .generate(&session.history, &system_prompt)
                .await
            {
                Ok(reply) if !reply.trim().is_empty() => reply,
                Ok(_) => {
                    tracing::warn!(call_id = %session.call_id, "Generator returned empty reply");
                    consecutive_failures += 1;
                    if consecutive_failures >= self.config.turn_failure_budget {
                        return EndReason::FailureBudget;
                    }
                    continue;
                }
                Err(e) => {
                    tracing::warn!(call_id = %session.call_id, error = %e, "Reply generation failed");
                    consecutive_failures += 1;
                    if consecutive_failures >= self.config.turn_failure_budget {
                        return EndReason::FailureBudget;
                    }
                    continue;
                }
            };

            session.push_agent(&reply);
            self.append_log(session.call_id, Speaker::Agent, &reply).await;
            session.set_phase(SessionPhase::Speaking);

            match self
                .speak(&session.channel_id, persona.voice_id.as_deref(), &reply)
                .await
            {
                Ok(()) => {
                    consecutive_failures = 0;
                }
                Err(StepError::ChannelGone) => return EndReason::ChannelLost,
                Err(StepError::Transient(e)) => {
                    tracing::warn!(call_id = %session.call_id, error = %e, "Reply playback failed");
                    consecutive_failures += 1;
                    if consecutive_failures >= self.config.turn_failure_budget {
                        return EndReason::FailureBudget;
                    }
                }
            }
        }

        EndReason::MaxTurns
    }

    /// Exit path: closing message, short playback grace, hangup. Every step
    /// is best-effort; teardown proceeds regardless.
    async fn close_session(&self, session: &mut ConversationSession, context: &SessionContext) {
        let closing = context.persona.closing(&context.lead.name);
        session.set_phase(SessionPhase::Speaking);

        match self
            .speak(
                &session.channel_id,
                context.persona.voice_id.as_deref(),
                &closing,
            )
            .await
        {
            Ok(()) => {
                session.push_agent(&closing);
                self.append_log(session.call_id, Speaker::Agent, &closing).await;
            }
            Err(StepError::ChannelGone) => return,
            Err(StepError::Transient(e)) => {
                tracing::debug!(call_id = %session.call_id, error = %e, "Closing playback failed");
            }
        }

        tokio::time::sleep(Duration::from_millis(self.config.closing_grace_ms)).await;

        if let Err(e) = self.control.hangup(&session.channel_id).await {
            tracing::debug!(channel_id = %session.channel_id, error = %e, "Hangup failed");
        }
    }

    /// Non-blocking signal check at iteration boundaries. Channel teardown
    /// dominates; non-end digits are logged and ignored.
    fn drain_signals(
        &self,
        signals: &mut mpsc::UnboundedReceiver<SessionSignal>,
    ) -> Option<EndReason> {
        let mut result = None;
        while let Ok(signal) = signals.try_recv() {
            match signal {
                SessionSignal::Gone => return Some(EndReason::RemoteHangup),
                SessionSignal::Dtmf(digit) if digit == self.config.end_digit => {
                    result = Some(EndReason::DtmfInterrupt);
                }
                SessionSignal::Dtmf(digit) => {
                    tracing::debug!(digit = %digit, "Ignoring DTMF digit");
                }
            }
        }
        result
    }

    /// Synthesize, stage under the media dir, play, and always remove the
    /// transient file.
    async fn speak(
        &self,
        channel_id: &str,
        voice_id: Option<&str>,
        text: &str,
    ) -> Result<(), StepError> {
        let audio = self.providers.tts.synthesize(text, voice_id).await?;

        if let Err(e) = tokio::fs::create_dir_all(&self.config.media_dir).await {
            return Err(StepError::Transient(format!("media dir: {}", e)));
        }

        let stem = Uuid::new_v4().to_string();
        let path = self.config.media_dir.join(format!("{}.wav", stem));
        if let Err(e) = tokio::fs::write(&path, &audio).await {
            return Err(StepError::Transient(format!("media write: {}", e)));
        }

        let media_uri = format!("{}/{}", self.config.media_scheme, stem);
        let played = self.control.play(channel_id, &media_uri).await;

        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::debug!(path = %path.display(), error = %e, "Media file cleanup failed");
        }

        played.map_err(StepError::from)
    }

    async fn append_log(&self, call_id: Uuid, speaker: Speaker, message: &str) {
        let entry = call_agent_core::CallLogEntry::new(call_id, speaker, message);
        if let Err(e) = self.calls.append_log(&entry).await {
            tracing::warn!(call_id = %call_id, error = %e, "Call log append failed");
        }
    }
}
