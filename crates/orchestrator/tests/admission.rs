//! Integration tests for call admission and lifecycle
//!
//! Drive the orchestrator against in-memory stores and a no-op switch and
//! assert the admission policy, the consent invariant, the terminal-record
//! invariant and finalization idempotency.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, Timelike};
use uuid::Uuid;

use call_agent_config::{AriSettings, CallingPolicy};
use call_agent_core::{
    AgentPersona, CallControl, CallStatus, ChannelInfo, ConnectionState, EndReason, Lead,
    LeadStatus, OriginateParams, ProviderError, RecordingParams, ReplyGenerator, SessionOutcome,
    SpeechToText, StoredRecording, TelephonyError, TextToSpeech, Transcription, Turn,
};
use call_agent_engine::{CallAuthority, ConversationEngine, EngineConfig, Providers};
use call_agent_orchestrator::{
    Admission, CallOrchestrator, CallOutcome, CallStatusReport, DeferReason, OrchestratorError,
    PersonaCache,
};
use call_agent_persistence::{
    CallStore, InMemoryCallStore, InMemoryLeadStore, InMemoryPersonaStore, InMemoryRecordingStore,
    LeadStore,
};

struct NoopControl {
    connected: bool,
    originated: AtomicUsize,
    hangups: Mutex<Vec<String>>,
}

impl NoopControl {
    fn new(connected: bool) -> Self {
        Self {
            connected,
            originated: AtomicUsize::new(0),
            hangups: Mutex::new(Vec::new()),
        }
    }

    fn hangup_count(&self) -> usize {
        self.hangups.lock().unwrap().len()
    }
}

#[async_trait]
impl CallControl for NoopControl {
    async fn answer(&self, _channel_id: &str) -> Result<(), TelephonyError> {
        Ok(())
    }

    async fn hangup(&self, channel_id: &str) -> Result<(), TelephonyError> {
        self.hangups.lock().unwrap().push(channel_id.to_string());
        Ok(())
    }

    async fn play(&self, _channel_id: &str, _media_uri: &str) -> Result<(), TelephonyError> {
        Ok(())
    }

    async fn record(
        &self,
        _channel_id: &str,
        params: &RecordingParams,
    ) -> Result<StoredRecording, TelephonyError> {
        Ok(StoredRecording {
            name: params.name.clone(),
            duration_secs: Some(0),
        })
    }

    async fn fetch_recording(&self, _name: &str) -> Result<Vec<u8>, TelephonyError> {
        Ok(Vec::new())
    }

    async fn delete_recording(&self, _name: &str) -> Result<(), TelephonyError> {
        Ok(())
    }

    async fn create_bridge(&self) -> Result<String, TelephonyError> {
        Ok("bridge-1".to_string())
    }

    async fn originate(&self, _params: &OriginateParams) -> Result<String, TelephonyError> {
        let n = self.originated.fetch_add(1, Ordering::SeqCst);
        Ok(format!("chan-{}", n))
    }

    fn connection_state(&self) -> ConnectionState {
        if self.connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Down
        }
    }
}

struct NoopStt;

#[async_trait]
impl SpeechToText for NoopStt {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _language: Option<&str>,
    ) -> Result<Transcription, ProviderError> {
        Ok(Transcription::default())
    }

    fn model_name(&self) -> &str {
        "noop-stt"
    }
}

struct NoopTts;

#[async_trait]
impl TextToSpeech for NoopTts {
    async fn synthesize(
        &self,
        _text: &str,
        _voice_id: Option<&str>,
    ) -> Result<Vec<u8>, ProviderError> {
        Ok(vec![0u8; 8])
    }

    fn model_name(&self) -> &str {
        "noop-tts"
    }
}

struct NoopGenerator;

#[async_trait]
impl ReplyGenerator for NoopGenerator {
    async fn generate(
        &self,
        _history: &[Turn],
        _system_prompt: &str,
    ) -> Result<String, ProviderError> {
        Ok("ok".to_string())
    }

    fn model_name(&self) -> &str {
        "noop-generator"
    }
}

struct Harness {
    orchestrator: Arc<CallOrchestrator>,
    control: Arc<NoopControl>,
    leads: Arc<InMemoryLeadStore>,
    calls: Arc<InMemoryCallStore>,
    personas: Arc<InMemoryPersonaStore>,
}

fn all_hours() -> CallingPolicy {
    CallingPolicy {
        hours_start: 0,
        hours_end: 24,
        ..Default::default()
    }
}

fn harness(policy: CallingPolicy, connected: bool) -> Harness {
    let control = Arc::new(NoopControl::new(connected));
    let leads = Arc::new(InMemoryLeadStore::new());
    let calls = Arc::new(InMemoryCallStore::new());
    let personas = Arc::new(InMemoryPersonaStore::new());

    let engine = ConversationEngine::new(
        control.clone(),
        Providers {
            stt: Arc::new(NoopStt),
            tts: Arc::new(NoopTts),
            generator: Arc::new(NoopGenerator),
        },
        calls.clone(),
        Arc::new(InMemoryRecordingStore::new()),
        EngineConfig::default(),
    );

    let orchestrator = CallOrchestrator::new(
        control.clone(),
        engine,
        leads.clone(),
        calls.clone(),
        PersonaCache::new(personas.clone(), Duration::from_secs(60)),
        policy,
        AriSettings::default(),
    );

    Harness {
        orchestrator,
        control,
        leads,
        calls,
        personas,
    }
}

async fn consented_lead(h: &Harness) -> Lead {
    let lead = Lead::new("Ravi", format!("+1555{:07}", rand_suffix())).with_consent();
    h.leads.create(&lead).await.unwrap();
    lead
}

fn rand_suffix() -> u32 {
    // Uuid-derived; good enough to keep fake phone numbers distinct
    Uuid::new_v4().as_u128() as u32 % 10_000_000
}

#[tokio::test]
async fn test_initiate_without_consent_creates_no_record() {
    let h = harness(all_hours(), true);
    let lead = Lead::new("NoConsent", "+15550111");
    h.leads.create(&lead).await.unwrap();

    let result = h.orchestrator.initiate_call(lead.id).await;
    assert!(matches!(result, Err(OrchestratorError::ConsentMissing(id)) if id == lead.id));

    assert_eq!(h.calls.call_count(), 0);
    assert_eq!(h.orchestrator.active_count(), 0);
    // Lead status untouched
    let lead = h.leads.get(lead.id).await.unwrap().unwrap();
    assert_eq!(lead.status, LeadStatus::New);
}

#[tokio::test]
async fn test_initiate_unknown_lead_fails() {
    let h = harness(all_hours(), true);
    let missing = Uuid::new_v4();
    let result = h.orchestrator.initiate_call(missing).await;
    assert!(matches!(result, Err(OrchestratorError::LeadNotFound(id)) if id == missing));
}

#[tokio::test]
async fn test_queue_call_happy_path() {
    let h = harness(all_hours(), true);
    let lead = consented_lead(&h).await;

    let admission = h.orchestrator.queue_call(lead.id).await.unwrap();
    let Admission::Accepted { call_id } = admission else {
        panic!("expected acceptance, got {:?}", admission);
    };

    assert_eq!(h.orchestrator.active_count(), 1);

    let record = h.calls.get(call_id).await.unwrap().unwrap();
    assert_eq!(record.status, CallStatus::Ringing);
    assert!(record.channel_id.is_some());
    assert!(record.ended_at.is_none());

    let lead = h.leads.get(lead.id).await.unwrap().unwrap();
    assert_eq!(lead.status, LeadStatus::Calling);
}

#[tokio::test]
async fn test_concurrent_admissions_respect_ceiling() {
    let policy = CallingPolicy {
        max_concurrent_calls: 3,
        ..all_hours()
    };
    let h = harness(policy, true);

    let mut lead_ids = Vec::new();
    for _ in 0..4 {
        lead_ids.push(consented_lead(&h).await.id);
    }

    let mut handles = Vec::new();
    for lead_id in lead_ids {
        let orchestrator = h.orchestrator.clone();
        handles.push(tokio::spawn(
            async move { orchestrator.queue_call(lead_id).await },
        ));
    }

    let mut accepted = 0;
    let mut deferred = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            Admission::Accepted { .. } => accepted += 1,
            Admission::Deferred { reason } => {
                assert_eq!(reason, DeferReason::CeilingReached);
                deferred += 1;
            }
        }
    }

    assert_eq!(accepted, 3);
    assert_eq!(deferred, 1);
    assert_eq!(h.orchestrator.active_count(), 3);
}

#[tokio::test]
async fn test_outside_calling_hours_defers_silently() {
    // A one-hour window that excludes the current local hour
    let hour = Local::now().hour();
    let (start, end) = if hour >= 12 { (1, 2) } else { (13, 14) };
    let policy = CallingPolicy {
        hours_start: start,
        hours_end: end,
        ..Default::default()
    };
    let h = harness(policy, true);
    let lead = consented_lead(&h).await;

    let admission = h.orchestrator.queue_call(lead.id).await.unwrap();
    assert_eq!(
        admission,
        Admission::Deferred {
            reason: DeferReason::OutsideCallingHours
        }
    );
    assert_eq!(h.calls.call_count(), 0);
    assert_eq!(h.orchestrator.active_count(), 0);
}

#[tokio::test]
async fn test_disconnected_switch_defers_admission() {
    let h = harness(all_hours(), false);
    let lead = consented_lead(&h).await;

    let admission = h.orchestrator.queue_call(lead.id).await.unwrap();
    assert_eq!(
        admission,
        Admission::Deferred {
            reason: DeferReason::SwitchDisconnected
        }
    );
}

#[tokio::test]
async fn test_finalization_is_idempotent_first_writer_wins() {
    let h = harness(all_hours(), true);
    let lead = consented_lead(&h).await;

    let Admission::Accepted { call_id } = h.orchestrator.queue_call(lead.id).await.unwrap() else {
        panic!("expected acceptance");
    };

    h.orchestrator
        .on_call_ended(call_id, CallOutcome::Completed, Some(30), None)
        .await
        .unwrap();

    assert_eq!(h.orchestrator.active_count(), 0);
    let record = h.calls.get(call_id).await.unwrap().unwrap();
    assert_eq!(record.status, CallStatus::Completed);
    assert!(record.ended_at.is_some());
    assert_eq!(record.duration_secs, Some(30));

    // Second finalization (redelivered notification or force-end race) is a
    // no-op: the record keeps its first terminal state
    h.orchestrator
        .on_call_ended(call_id, CallOutcome::Failed, Some(99), None)
        .await
        .unwrap();
    let record = h.calls.get(call_id).await.unwrap().unwrap();
    assert_eq!(record.status, CallStatus::Completed);
    assert_eq!(record.duration_secs, Some(30));

    let lead = h.leads.get(lead.id).await.unwrap().unwrap();
    assert_eq!(lead.status, LeadStatus::Completed);
}

#[tokio::test]
async fn test_force_end_hangs_up_and_fails_the_call() {
    let h = harness(all_hours(), true);
    let lead = consented_lead(&h).await;

    let Admission::Accepted { call_id } = h.orchestrator.queue_call(lead.id).await.unwrap() else {
        panic!("expected acceptance");
    };

    h.orchestrator.force_end_call(call_id).await.unwrap();

    assert_eq!(h.control.hangup_count(), 1);
    assert_eq!(h.orchestrator.active_count(), 0);
    let record = h.calls.get(call_id).await.unwrap().unwrap();
    assert_eq!(record.status, CallStatus::Failed);
    assert!(record.ended_at.is_some());
}

#[tokio::test]
async fn test_call_status_live_then_finished_then_unknown() {
    let h = harness(all_hours(), true);
    let lead = consented_lead(&h).await;

    let Admission::Accepted { call_id } = h.orchestrator.queue_call(lead.id).await.unwrap() else {
        panic!("expected acceptance");
    };

    match h.orchestrator.get_call_status(call_id).await.unwrap() {
        Some(CallStatusReport::Live { state, .. }) => {
            assert_eq!(state.as_str(), "ringing");
        }
        other => panic!("expected live status, got {:?}", other),
    }

    h.orchestrator
        .on_call_ended(call_id, CallOutcome::NoAnswer, None, None)
        .await
        .unwrap();

    match h.orchestrator.get_call_status(call_id).await.unwrap() {
        Some(CallStatusReport::Finished(record)) => {
            assert_eq!(record.status, CallStatus::Failed);
        }
        other => panic!("expected finished status, got {:?}", other),
    }

    assert!(h
        .orchestrator
        .get_call_status(Uuid::new_v4())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_ended_at_iff_terminal_across_all_records() {
    let h = harness(all_hours(), true);

    for outcome in [CallOutcome::Completed, CallOutcome::Failed, CallOutcome::NoAnswer] {
        let lead = consented_lead(&h).await;
        let Admission::Accepted { call_id } = h.orchestrator.queue_call(lead.id).await.unwrap()
        else {
            panic!("expected acceptance");
        };
        h.orchestrator
            .on_call_ended(call_id, outcome, Some(5), None)
            .await
            .unwrap();
    }
    // One record left in flight
    let lead = consented_lead(&h).await;
    h.orchestrator.queue_call(lead.id).await.unwrap();

    for record in h.calls.all() {
        assert_eq!(
            record.ended_at.is_some(),
            record.status.is_terminal(),
            "record {} violates ended_at iff terminal",
            record.id
        );
    }
}

#[tokio::test]
async fn test_unconfigured_persona_falls_back_to_default() {
    let h = harness(all_hours(), true);
    // Persona store is empty: the default persona (no id) carries the call
    h.personas.set(None);
    let lead = consented_lead(&h).await;

    let Admission::Accepted { call_id } = h.orchestrator.queue_call(lead.id).await.unwrap() else {
        panic!("expected acceptance");
    };

    let record = h.calls.get(call_id).await.unwrap().unwrap();
    assert!(record.persona_id.is_none());
}

#[tokio::test]
async fn test_configured_persona_id_is_recorded() {
    let h = harness(all_hours(), true);
    let persona = AgentPersona {
        id: Some(Uuid::new_v4()),
        agent_name: "Priya".to_string(),
        ..Default::default()
    };
    h.personas.set(Some(persona.clone()));
    let lead = consented_lead(&h).await;

    let Admission::Accepted { call_id } = h.orchestrator.queue_call(lead.id).await.unwrap() else {
        panic!("expected acceptance");
    };

    let record = h.calls.get(call_id).await.unwrap().unwrap();
    assert_eq!(record.persona_id, persona.id);
}

#[tokio::test]
async fn test_inbound_ring_admission() {
    let h = harness(all_hours(), true);
    let lead = consented_lead(&h).await;

    let known = ChannelInfo {
        id: "chan-in-1".to_string(),
        caller_number: Some(lead.phone.clone()),
        caller_name: None,
        extension: Some("100".to_string()),
    };
    let context = h.orchestrator.admit_inbound(&known).await;
    let context = context.expect("known consented caller should be admitted");
    assert_eq!(context.lead.id, lead.id);
    assert_eq!(h.orchestrator.active_count(), 1);

    // Unknown caller is declined and leaves nothing behind
    let unknown = ChannelInfo {
        id: "chan-in-2".to_string(),
        caller_number: Some("+19999999999".to_string()),
        caller_name: None,
        extension: None,
    };
    assert!(h.orchestrator.admit_inbound(&unknown).await.is_none());
    assert_eq!(h.orchestrator.active_count(), 1);

    // Session completion finalizes the inbound call
    h.orchestrator
        .session_ended(SessionOutcome {
            call_id: context.call_id,
            channel_id: "chan-in-1".to_string(),
            reason: EndReason::UserEnded,
            duration: Duration::from_secs(42),
            turns: 3,
        })
        .await;

    assert_eq!(h.orchestrator.active_count(), 0);
    let record = h.calls.get(context.call_id).await.unwrap().unwrap();
    assert_eq!(record.status, CallStatus::Completed);
    assert_eq!(record.duration_secs, Some(42));
}

#[tokio::test]
async fn test_unconsented_inbound_ring_is_declined() {
    let h = harness(all_hours(), true);
    let lead = Lead::new("NoConsent", "+15550222");
    h.leads.create(&lead).await.unwrap();

    let channel = ChannelInfo {
        id: "chan-in-3".to_string(),
        caller_number: Some(lead.phone.clone()),
        caller_name: None,
        extension: None,
    };
    assert!(h.orchestrator.admit_inbound(&channel).await.is_none());
    assert_eq!(h.calls.call_count(), 0);
}
