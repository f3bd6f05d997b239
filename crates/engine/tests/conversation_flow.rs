//! Integration tests for the conversation engine
//!
//! Drive full sessions against fakes of the call control trait and the
//! provider backends, and assert on outcomes, protocol operation order and
//! transcript contents.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use call_agent_core::{
    AgentPersona, CallControl, ChannelEvent, ChannelInfo, ConnectionState, EndReason, Lead,
    OriginateParams, ProviderError, RecordingParams, ReplyGenerator, SessionOutcome, Speaker,
    SpeechToText, StoredRecording, TelephonyError, TextToSpeech, Transcription, Turn,
};
use call_agent_engine::{
    CallAuthority, ConversationEngine, EngineConfig, Providers, SessionContext,
};
use call_agent_persistence::{CallStore, InMemoryCallStore, InMemoryRecordingStore};

/// What the fake switch records for each turn of a session
#[derive(Debug, Clone, Copy)]
enum RecordScript {
    Say(&'static str),
    Silence,
    Gone,
    Fail,
}

struct FakeControl {
    ops: Mutex<Vec<String>>,
    script: Mutex<VecDeque<RecordScript>>,
    stored: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeControl {
    fn new(script: Vec<RecordScript>) -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            script: Mutex::new(script.into_iter().collect()),
            stored: Mutex::new(HashMap::new()),
        }
    }

    fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    fn push_op(&self, op: &str) {
        self.ops.lock().unwrap().push(op.to_string());
    }
}

#[async_trait]
impl CallControl for FakeControl {
    async fn answer(&self, _channel_id: &str) -> Result<(), TelephonyError> {
        self.push_op("answer");
        Ok(())
    }

    async fn hangup(&self, _channel_id: &str) -> Result<(), TelephonyError> {
        self.push_op("hangup");
        Ok(())
    }

    async fn play(&self, _channel_id: &str, _media_uri: &str) -> Result<(), TelephonyError> {
        self.push_op("play");
        Ok(())
    }

    async fn record(
        &self,
        channel_id: &str,
        params: &RecordingParams,
    ) -> Result<StoredRecording, TelephonyError> {
        self.push_op("record");
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RecordScript::Silence);
        match step {
            RecordScript::Say(text) => {
                self.stored
                    .lock()
                    .unwrap()
                    .insert(params.name.clone(), text.as_bytes().to_vec());
                Ok(StoredRecording {
                    name: params.name.clone(),
                    duration_secs: Some(2),
                })
            }
            RecordScript::Silence => {
                self.stored
                    .lock()
                    .unwrap()
                    .insert(params.name.clone(), Vec::new());
                Ok(StoredRecording {
                    name: params.name.clone(),
                    duration_secs: Some(0),
                })
            }
            RecordScript::Gone => Err(TelephonyError::ChannelGone(channel_id.to_string())),
            RecordScript::Fail => Err(TelephonyError::RecordingFailed {
                name: params.name.clone(),
                cause: "write error".to_string(),
            }),
        }
    }

    async fn fetch_recording(&self, name: &str) -> Result<Vec<u8>, TelephonyError> {
        self.push_op("fetch");
        Ok(self
            .stored
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_recording(&self, _name: &str) -> Result<(), TelephonyError> {
        self.push_op("delete");
        Ok(())
    }

    async fn create_bridge(&self) -> Result<String, TelephonyError> {
        Ok("bridge-1".to_string())
    }

    async fn originate(&self, _params: &OriginateParams) -> Result<String, TelephonyError> {
        Ok("chan-out".to_string())
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Connected
    }
}

/// Transcribes whatever bytes the fake switch stored; empty audio is silence.
struct FakeStt;

#[async_trait]
impl SpeechToText for FakeStt {
    async fn transcribe(
        &self,
        audio: &[u8],
        _language: Option<&str>,
    ) -> Result<Transcription, ProviderError> {
        if audio.is_empty() {
            return Ok(Transcription::default());
        }
        Ok(Transcription {
            text: String::from_utf8_lossy(audio).to_string(),
            confidence: 0.95,
            language: None,
        })
    }

    fn model_name(&self) -> &str {
        "fake-stt"
    }
}

struct FakeTts;

#[async_trait]
impl TextToSpeech for FakeTts {
    async fn synthesize(
        &self,
        _text: &str,
        _voice_id: Option<&str>,
    ) -> Result<Vec<u8>, ProviderError> {
        Ok(vec![0u8; 64])
    }

    fn model_name(&self) -> &str {
        "fake-tts"
    }
}

struct FakeGenerator;

#[async_trait]
impl ReplyGenerator for FakeGenerator {
    async fn generate(
        &self,
        _history: &[Turn],
        _system_prompt: &str,
    ) -> Result<String, ProviderError> {
        Ok("That is great to hear, tell me more.".to_string())
    }

    fn model_name(&self) -> &str {
        "fake-generator"
    }
}

struct TestAuthority {
    outcome_tx: mpsc::UnboundedSender<SessionOutcome>,
}

#[async_trait]
impl CallAuthority for TestAuthority {
    async fn admit_inbound(&self, _channel: &ChannelInfo) -> Option<SessionContext> {
        None
    }

    async fn session_started(&self, _call_id: Uuid) {}

    async fn session_ended(&self, outcome: SessionOutcome) {
        let _ = self.outcome_tx.send(outcome);
    }
}

struct Harness {
    engine: Arc<ConversationEngine>,
    control: Arc<FakeControl>,
    calls: Arc<InMemoryCallStore>,
    events_tx: mpsc::Sender<ChannelEvent>,
    outcome_rx: mpsc::UnboundedReceiver<SessionOutcome>,
    _media_dir: tempfile::TempDir,
}

fn harness(script: Vec<RecordScript>) -> Harness {
    let media_dir = tempfile::tempdir().unwrap();
    let control = Arc::new(FakeControl::new(script));
    let calls = Arc::new(InMemoryCallStore::new());
    let recordings = Arc::new(InMemoryRecordingStore::new());

    let config = EngineConfig {
        closing_grace_ms: 1,
        media_dir: media_dir.path().to_path_buf(),
        ..Default::default()
    };

    let engine = ConversationEngine::new(
        control.clone(),
        Providers {
            stt: Arc::new(FakeStt),
            tts: Arc::new(FakeTts),
            generator: Arc::new(FakeGenerator),
        },
        calls.clone(),
        recordings,
        config,
    );

    let (events_tx, events_rx) = mpsc::channel(32);
    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
    let _ = engine.run(events_rx, Arc::new(TestAuthority { outcome_tx }));

    Harness {
        engine,
        control,
        calls,
        events_tx,
        outcome_rx,
        _media_dir: media_dir,
    }
}

fn channel_info(id: &str) -> ChannelInfo {
    ChannelInfo {
        id: id.to_string(),
        caller_number: Some("+15550100".to_string()),
        caller_name: None,
        extension: None,
    }
}

fn context(call_id: Uuid, persona: AgentPersona) -> SessionContext {
    SessionContext {
        call_id,
        lead: Lead::new("Ravi", "+15550100").with_consent(),
        persona: Arc::new(persona),
    }
}

async fn expect_outcome(h: &mut Harness) -> SessionOutcome {
    timeout(Duration::from_secs(5), h.outcome_rx.recv())
        .await
        .expect("session did not complete in time")
        .expect("outcome channel closed")
}

#[tokio::test]
async fn test_closing_phrase_ends_conversation() {
    let mut h = harness(vec![RecordScript::Say("well, thank you so much for calling")]);
    let call_id = Uuid::new_v4();

    h.engine
        .register_outbound("chan-1", context(call_id, AgentPersona::default()));
    h.events_tx
        .send(ChannelEvent::Entered(channel_info("chan-1")))
        .await
        .unwrap();

    let outcome = expect_outcome(&mut h).await;
    assert_eq!(outcome.call_id, call_id);
    assert_eq!(outcome.reason, EndReason::UserEnded);
    assert_eq!(outcome.turns, 1);

    let ops = h.control.ops();
    assert_eq!(ops.first().map(String::as_str), Some("answer"));
    assert_eq!(ops.last().map(String::as_str), Some("hangup"));

    // Greeting, user turn and closing all made it into the transcript
    let log = h.calls.list_log(call_id).await.unwrap();
    assert!(log.iter().any(|e| e.speaker == Speaker::User));
    assert!(log.iter().filter(|e| e.speaker == Speaker::Agent).count() >= 2);

    assert_eq!(h.engine.active_session_count(), 0);
}

#[tokio::test]
async fn test_empty_transcriptions_consume_turns_until_cap() {
    // Unintelligible audio every turn on a max_turns=10 persona: silence
    // consumes turns but appends no user history, and turn 10 forces the
    // max-turns exit rather than user_ended
    let mut h = harness(vec![RecordScript::Silence; 10]);
    let call_id = Uuid::new_v4();

    h.engine
        .register_outbound("chan-1", context(call_id, AgentPersona::default()));
    h.events_tx
        .send(ChannelEvent::Entered(channel_info("chan-1")))
        .await
        .unwrap();

    let outcome = expect_outcome(&mut h).await;
    assert_eq!(outcome.reason, EndReason::MaxTurns);
    assert_eq!(outcome.turns, 10);

    let log = h.calls.list_log(call_id).await.unwrap();
    assert!(log.iter().all(|e| e.speaker != Speaker::User));
}

#[tokio::test]
async fn test_channel_gone_mid_recording_stops_all_operations() {
    let mut h = harness(vec![
        RecordScript::Say("hello there"),
        RecordScript::Say("sounds interesting"),
        RecordScript::Gone,
    ]);
    let call_id = Uuid::new_v4();

    h.engine
        .register_outbound("chan-1", context(call_id, AgentPersona::default()));
    h.events_tx
        .send(ChannelEvent::Entered(channel_info("chan-1")))
        .await
        .unwrap();

    let outcome = expect_outcome(&mut h).await;
    assert_eq!(outcome.reason, EndReason::ChannelLost);
    assert_eq!(outcome.turns, 3);

    // The failing record is the last operation: no fetch, no closing
    // playback, no hangup on a channel the switch already tore down
    let ops = h.control.ops();
    assert_eq!(ops.last().map(String::as_str), Some("record"));
    assert!(!ops.contains(&"hangup".to_string()));

    assert_eq!(h.engine.active_session_count(), 0);
}

#[tokio::test]
async fn test_dtmf_end_digit_interrupts() {
    let mut h = harness(vec![]);
    let call_id = Uuid::new_v4();

    h.engine
        .register_outbound("chan-1", context(call_id, AgentPersona::default()));
    h.events_tx
        .send(ChannelEvent::Entered(channel_info("chan-1")))
        .await
        .unwrap();
    h.events_tx
        .send(ChannelEvent::Dtmf {
            channel_id: "chan-1".to_string(),
            digit: '#',
        })
        .await
        .unwrap();

    let outcome = expect_outcome(&mut h).await;
    assert_eq!(outcome.reason, EndReason::DtmfInterrupt);

    // The interrupt still gets the polite exit path
    let ops = h.control.ops();
    assert_eq!(ops.last().map(String::as_str), Some("hangup"));
}

#[tokio::test]
async fn test_remote_hangup_ends_session_without_further_operations() {
    let mut h = harness(vec![RecordScript::Say("hello"); 10]);
    let call_id = Uuid::new_v4();

    h.engine
        .register_outbound("chan-1", context(call_id, AgentPersona::default()));
    h.events_tx
        .send(ChannelEvent::Entered(channel_info("chan-1")))
        .await
        .unwrap();
    h.events_tx
        .send(ChannelEvent::Left {
            channel_id: "chan-1".to_string(),
        })
        .await
        .unwrap();

    let outcome = expect_outcome(&mut h).await;
    assert_eq!(outcome.reason, EndReason::RemoteHangup);
    assert!(!h.control.ops().contains(&"hangup".to_string()));
}

#[tokio::test]
async fn test_consecutive_failures_exhaust_budget() {
    let mut h = harness(vec![RecordScript::Fail; 5]);
    let call_id = Uuid::new_v4();

    h.engine
        .register_outbound("chan-1", context(call_id, AgentPersona::default()));
    h.events_tx
        .send(ChannelEvent::Entered(channel_info("chan-1")))
        .await
        .unwrap();

    let outcome = expect_outcome(&mut h).await;
    assert_eq!(outcome.reason, EndReason::FailureBudget);
    // Default budget of 3 consecutive failures
    assert_eq!(outcome.turns, 3);
}

#[tokio::test]
async fn test_session_never_exceeds_persona_turn_cap() {
    let mut persona = AgentPersona::default();
    persona.max_turns = 4;

    let mut h = harness(vec![RecordScript::Say("keep going"); 20]);
    let call_id = Uuid::new_v4();

    h.engine.register_outbound("chan-1", context(call_id, persona));
    h.events_tx
        .send(ChannelEvent::Entered(channel_info("chan-1")))
        .await
        .unwrap();

    let outcome = expect_outcome(&mut h).await;
    assert_eq!(outcome.reason, EndReason::MaxTurns);
    assert_eq!(outcome.turns, 4);
}

#[tokio::test]
async fn test_unadmitted_inbound_channel_is_declined() {
    let mut h = harness(vec![]);

    // No registered context and the test authority declines inbound rings
    h.events_tx
        .send(ChannelEvent::Entered(channel_info("chan-unknown")))
        .await
        .unwrap();

    // Declined channels are hung up and leave no session behind
    timeout(Duration::from_secs(2), async {
        loop {
            if h.control.ops().contains(&"hangup".to_string()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("declined channel was not hung up");

    assert_eq!(h.engine.active_session_count(), 0);
    assert!(timeout(Duration::from_millis(200), h.outcome_rx.recv())
        .await
        .is_err());
}
