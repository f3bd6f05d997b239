//! Call admission and lifecycle
//!
//! The active-call table is the one piece of cross-call shared state; the
//! check-and-reserve on admission and the remove-on-terminal both happen
//! under its mutex, each at a single call site, so a call "counting against
//! the ceiling" is an explicit invariant. `on_call_ended` is idempotent:
//! whoever removes the entry finalizes the record, later callers observe a
//! terminal record and return without mutation.

use crate::persona_cache::PersonaCache;
use async_trait::async_trait;
use call_agent_config::{AriSettings, CallingPolicy};
use call_agent_core::{
    CallControl, CallLogEntry, CallRecord, CallStatus, ChannelInfo, LeadStatus, OriginateParams,
    SessionOutcome, Speaker, TelephonyError,
};
use call_agent_engine::{CallAuthority, ConversationEngine, SessionContext};
use call_agent_persistence::{CallStore, LeadStore, PersistenceError};
use chrono::{Local, Timelike};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Lead not found: {0}")]
    LeadNotFound(Uuid),

    /// Hard invariant: no call is ever placed without recorded consent
    #[error("Lead {0} has not given consent")]
    ConsentMissing(Uuid),

    /// Backstop for direct initiation racing past admission
    #[error("Concurrency ceiling reached")]
    CeilingReached,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Telephony(#[from] TelephonyError),
}

/// Outcome of an admission request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted { call_id: Uuid },
    /// Policy rejections are deferred no-ops, not errors
    Deferred { reason: DeferReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    OutsideCallingHours,
    CeilingReached,
    SwitchDisconnected,
}

impl DeferReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutsideCallingHours => "outside_calling_hours",
            Self::CeilingReached => "ceiling_reached",
            Self::SwitchDisconnected => "switch_disconnected",
        }
    }
}

/// Terminal classification of a finished call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Completed,
    Failed,
    NoAnswer,
}

impl CallOutcome {
    fn call_status(&self) -> CallStatus {
        match self {
            Self::Completed => CallStatus::Completed,
            Self::Failed | Self::NoAnswer => CallStatus::Failed,
        }
    }

    fn lead_status(&self) -> LeadStatus {
        match self {
            Self::Completed => LeadStatus::Completed,
            Self::Failed => LeadStatus::Failed,
            Self::NoAnswer => LeadStatus::NoAnswer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::NoAnswer => "no_answer",
        }
    }
}

/// Live state of a tracked call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveCallState {
    Queued,
    Initiating,
    Ringing,
    Connected,
}

impl LiveCallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Initiating => "initiating",
            Self::Ringing => "ringing",
            Self::Connected => "connected",
        }
    }
}

/// Tracking record for one call occupying a concurrency slot
struct ActiveCallEntry {
    lead_id: Uuid,
    state: LiveCallState,
    started: Instant,
    record: CallRecord,
}

/// Operational summary of one in-flight call
#[derive(Debug, Clone, Serialize)]
pub struct ActiveCallSummary {
    pub call_id: Uuid,
    pub lead_id: Uuid,
    pub state: LiveCallState,
    pub elapsed_secs: u64,
}

/// Live or persisted status of a call
#[derive(Debug, Clone)]
pub enum CallStatusReport {
    Live {
        call_id: Uuid,
        state: LiveCallState,
        elapsed_secs: u64,
    },
    Finished(CallRecord),
}

pub struct CallOrchestrator {
    control: Arc<dyn CallControl>,
    engine: Arc<ConversationEngine>,
    leads: Arc<dyn LeadStore>,
    calls: Arc<dyn CallStore>,
    personas: PersonaCache,
    policy: CallingPolicy,
    ari: AriSettings,
    active: Mutex<HashMap<Uuid, ActiveCallEntry>>,
}

impl CallOrchestrator {
    pub fn new(
        control: Arc<dyn CallControl>,
        engine: Arc<ConversationEngine>,
        leads: Arc<dyn LeadStore>,
        calls: Arc<dyn CallStore>,
        personas: PersonaCache,
        policy: CallingPolicy,
        ari: AriSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            control,
            engine,
            leads,
            calls,
            personas,
            policy,
            ari,
            active: Mutex::new(HashMap::new()),
        })
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn active_calls(&self) -> Vec<ActiveCallSummary> {
        self.active
            .lock()
            .iter()
            .map(|(call_id, entry)| ActiveCallSummary {
                call_id: *call_id,
                lead_id: entry.lead_id,
                state: entry.state,
                elapsed_secs: entry.started.elapsed().as_secs(),
            })
            .collect()
    }

    /// Atomic check-and-reserve: the sole insert site for the active table.
    fn try_reserve(&self, call_id: Uuid, entry: ActiveCallEntry) -> bool {
        let mut active = self.active.lock();
        if active.len() >= self.policy.max_concurrent_calls {
            return false;
        }
        active.insert(call_id, entry);
        true
    }

    /// The sole remove site for the active table; freeing the slot and
    /// claiming the right to finalize are one atomic step.
    fn release(&self, call_id: Uuid) -> Option<ActiveCallEntry> {
        self.active.lock().remove(&call_id)
    }

    /// Admit a new outbound call request. Policy rejections defer silently.
    pub async fn queue_call(&self, lead_id: Uuid) -> Result<Admission, OrchestratorError> {
        let hour = Local::now().hour();
        if !self.policy.hour_allowed(hour) {
            tracing::warn!(
                lead_id = %lead_id,
                hour,
                "Call deferred: outside calling hours"
            );
            return Ok(Admission::Deferred {
                reason: DeferReason::OutsideCallingHours,
            });
        }

        if !self.control.is_connected() {
            tracing::warn!(lead_id = %lead_id, "Call deferred: switch control connection is down");
            return Ok(Admission::Deferred {
                reason: DeferReason::SwitchDisconnected,
            });
        }

        if self.active_count() >= self.policy.max_concurrent_calls {
            tracing::warn!(
                lead_id = %lead_id,
                ceiling = self.policy.max_concurrent_calls,
                "Call deferred: concurrency ceiling reached"
            );
            return Ok(Admission::Deferred {
                reason: DeferReason::CeilingReached,
            });
        }

        match self.initiate_call(lead_id).await {
            Ok(call_id) => Ok(Admission::Accepted { call_id }),
            // The reserve is the atomic check; losing the race is a deferral
            Err(OrchestratorError::CeilingReached) => Ok(Admission::Deferred {
                reason: DeferReason::CeilingReached,
            }),
            Err(e) => Err(e),
        }
    }

    /// Sweep consented leads that have not been called yet and admit as many
    /// as policy allows. Stops at the first deferral since the same policy
    /// would defer the rest.
    pub async fn queue_pending_leads(&self, limit: i32) -> Result<usize, OrchestratorError> {
        let pending = self.leads.list_pending_consented(limit).await?;
        let mut queued = 0;
        for lead in pending {
            match self.queue_call(lead.id).await? {
                Admission::Accepted { .. } => queued += 1,
                Admission::Deferred { reason } => {
                    tracing::info!(
                        reason = reason.as_str(),
                        queued,
                        "Pending-lead sweep stopped by policy"
                    );
                    break;
                }
            }
        }
        Ok(queued)
    }

    /// Place a call for a lead. This is the single point at which a call
    /// enters the concurrency-tracked set.
    pub async fn initiate_call(&self, lead_id: Uuid) -> Result<Uuid, OrchestratorError> {
        let lead = self
            .leads
            .get(lead_id)
            .await?
            .ok_or(OrchestratorError::LeadNotFound(lead_id))?;

        if !lead.has_consent() {
            return Err(OrchestratorError::ConsentMissing(lead_id));
        }

        let persona = self.personas.resolve().await;
        let record = CallRecord::new(lead.id, persona.id);
        let call_id = record.id;

        let entry = ActiveCallEntry {
            lead_id: lead.id,
            state: LiveCallState::Queued,
            started: Instant::now(),
            record: record.clone(),
        };
        if !self.try_reserve(call_id, entry) {
            return Err(OrchestratorError::CeilingReached);
        }

        if let Err(e) = self.calls.create(&record).await {
            self.release(call_id);
            return Err(e.into());
        }

        if let Err(e) = self.leads.update_status(lead.id, LeadStatus::Calling).await {
            self.release(call_id);
            return Err(e.into());
        }
        self.append_system_log(
            call_id,
            &format!("Call initiated for lead {} ({})", lead.name, lead.phone),
        )
        .await;

        self.set_live_state(call_id, LiveCallState::Initiating);

        let originate = OriginateParams {
            endpoint: self.ari.endpoint_for(&lead.phone),
            caller_id: self.ari.caller_id.clone(),
            timeout_secs: self.ari.originate_timeout_secs,
            app_args: Some(call_id.to_string()),
        };

        let channel_id = match self.control.originate(&originate).await {
            Ok(channel_id) => channel_id,
            Err(e) => {
                tracing::error!(call_id = %call_id, error = %e, "Originate failed");
                self.on_call_ended(call_id, CallOutcome::Failed, None, Some("originate failed"))
                    .await?;
                return Err(e.into());
            }
        };

        self.engine.register_outbound(
            &channel_id,
            SessionContext {
                call_id,
                lead: lead.clone(),
                persona,
            },
        );

        {
            let mut active = self.active.lock();
            if let Some(entry) = active.get_mut(&call_id) {
                entry.state = LiveCallState::Ringing;
                entry.record.status = CallStatus::Ringing;
                entry.record.channel_id = Some(channel_id.clone());
            }
        }
        if let Some(record) = self.snapshot_record(call_id) {
            self.calls.update(&record).await?;
        }

        tracing::info!(
            call_id = %call_id,
            lead_id = %lead.id,
            channel_id = %channel_id,
            "Outbound call ringing"
        );
        Ok(call_id)
    }

    /// The remote side answered; move the call to `in_progress`.
    pub async fn on_call_answered(&self, call_id: Uuid) -> Result<(), OrchestratorError> {
        {
            let mut active = self.active.lock();
            let Some(entry) = active.get_mut(&call_id) else {
                tracing::debug!(call_id = %call_id, "Answer event for untracked call ignored");
                return Ok(());
            };
            entry.state = LiveCallState::Connected;
            entry.record.mark_answered();
        }

        if let Some(record) = self.snapshot_record(call_id) {
            self.calls.update(&record).await?;
        }
        self.append_system_log(call_id, "Call connected").await;
        tracing::info!(call_id = %call_id, "Call answered");
        Ok(())
    }

    /// Finalize a call: terminal record, mirrored lead status, closing log
    /// entry, slot release. Idempotent; the only path that frees a slot, and
    /// the sole exit from every non-terminal state.
    pub async fn on_call_ended(
        &self,
        call_id: Uuid,
        outcome: CallOutcome,
        duration_secs: Option<u32>,
        note: Option<&str>,
    ) -> Result<(), OrchestratorError> {
        match self.release(call_id) {
            Some(mut entry) => {
                let duration = duration_secs
                    .unwrap_or_else(|| entry.started.elapsed().as_secs().min(u32::MAX as u64) as u32);
                entry.record.finalize(outcome.call_status(), duration);
                self.calls.update(&entry.record).await?;
                self.leads
                    .update_status(entry.lead_id, outcome.lead_status())
                    .await?;

                let message = match note {
                    Some(note) => format!("Call ended: {} ({})", outcome.as_str(), note),
                    None => format!("Call ended: {}", outcome.as_str()),
                };
                self.append_system_log(call_id, &message).await;

                tracing::info!(
                    call_id = %call_id,
                    outcome = outcome.as_str(),
                    duration_secs = duration,
                    "Call finalized"
                );
                Ok(())
            }
            None => {
                // Lost the finalization race, or a redelivered notification
                match self.calls.get(call_id).await? {
                    Some(record) if record.is_terminal() => {
                        tracing::debug!(call_id = %call_id, "Call already finalized; no-op");
                        Ok(())
                    }
                    Some(mut record) => {
                        // Untracked but non-terminal (e.g. recovery after a
                        // restart): still drive it to a terminal state
                        record.finalize(outcome.call_status(), duration_secs.unwrap_or(0));
                        self.calls.update(&record).await?;
                        self.leads
                            .update_status(record.lead_id, outcome.lead_status())
                            .await?;
                        tracing::warn!(call_id = %call_id, "Finalized untracked call record");
                        Ok(())
                    }
                    None => {
                        tracing::warn!(call_id = %call_id, "End event for unknown call ignored");
                        Ok(())
                    }
                }
            }
        }
    }

    /// Administrative override: hang the channel up and finalize as failed.
    /// The in-flight session observes the teardown and exits cooperatively.
    pub async fn force_end_call(&self, call_id: Uuid) -> Result<(), OrchestratorError> {
        let channel_id = {
            let active = self.active.lock();
            active
                .get(&call_id)
                .and_then(|entry| entry.record.channel_id.clone())
        };

        if let Some(channel_id) = channel_id {
            match self.control.hangup(&channel_id).await {
                Ok(()) | Err(TelephonyError::ChannelGone(_)) => {}
                Err(e) => {
                    tracing::warn!(call_id = %call_id, error = %e, "Force-end hangup failed");
                }
            }
        }

        self.on_call_ended(call_id, CallOutcome::Failed, None, Some("force ended"))
            .await
    }

    /// Live state for in-flight calls, persisted record otherwise.
    pub async fn get_call_status(
        &self,
        call_id: Uuid,
    ) -> Result<Option<CallStatusReport>, OrchestratorError> {
        {
            let active = self.active.lock();
            if let Some(entry) = active.get(&call_id) {
                return Ok(Some(CallStatusReport::Live {
                    call_id,
                    state: entry.state,
                    elapsed_secs: entry.started.elapsed().as_secs(),
                }));
            }
        }

        Ok(self
            .calls
            .get(call_id)
            .await?
            .map(CallStatusReport::Finished))
    }

    fn set_live_state(&self, call_id: Uuid, state: LiveCallState) {
        let mut active = self.active.lock();
        if let Some(entry) = active.get_mut(&call_id) {
            entry.state = state;
        }
    }

    fn snapshot_record(&self, call_id: Uuid) -> Option<CallRecord> {
        self.active
            .lock()
            .get(&call_id)
            .map(|entry| entry.record.clone())
    }

    async fn append_system_log(&self, call_id: Uuid, message: &str) {
        let entry = CallLogEntry::new(call_id, Speaker::System, message);
        if let Err(e) = self.calls.append_log(&entry).await {
            tracing::warn!(call_id = %call_id, error = %e, "System log append failed");
        }
    }

    /// Inbound admission used by `admit_inbound`; consent remains a hard
    /// invariant for inbound rings too.
    async fn admit_inbound_ring(
        &self,
        channel: &ChannelInfo,
    ) -> Result<Option<SessionContext>, OrchestratorError> {
        let Some(number) = channel.caller_number.as_deref() else {
            tracing::info!(channel_id = %channel.id, "Inbound ring without caller id declined");
            return Ok(None);
        };

        let Some(lead) = self.leads.find_by_phone(number).await? else {
            tracing::info!(channel_id = %channel.id, caller = %number, "Inbound ring from unknown caller declined");
            return Ok(None);
        };

        if !lead.has_consent() {
            tracing::info!(lead_id = %lead.id, "Inbound ring from unconsented lead declined");
            return Ok(None);
        }

        let persona = self.personas.resolve().await;
        let mut record = CallRecord::new(lead.id, persona.id);
        record.channel_id = Some(channel.id.clone());
        record.mark_answered();
        let call_id = record.id;

        let entry = ActiveCallEntry {
            lead_id: lead.id,
            state: LiveCallState::Connected,
            started: Instant::now(),
            record: record.clone(),
        };
        if !self.try_reserve(call_id, entry) {
            tracing::warn!(
                lead_id = %lead.id,
                ceiling = self.policy.max_concurrent_calls,
                "Inbound ring declined: concurrency ceiling reached"
            );
            return Ok(None);
        }

        if let Err(e) = self.calls.create(&record).await {
            self.release(call_id);
            return Err(e.into());
        }
        self.leads.update_status(lead.id, LeadStatus::Calling).await?;
        self.append_system_log(call_id, &format!("Inbound call accepted from {}", number))
            .await;

        tracing::info!(call_id = %call_id, lead_id = %lead.id, "Inbound call admitted");
        Ok(Some(SessionContext {
            call_id,
            lead,
            persona,
        }))
    }

    fn outcome_for(reason: call_agent_core::EndReason) -> CallOutcome {
        if reason.is_success() {
            CallOutcome::Completed
        } else {
            CallOutcome::Failed
        }
    }
}

#[async_trait]
impl CallAuthority for CallOrchestrator {
    async fn admit_inbound(&self, channel: &ChannelInfo) -> Option<SessionContext> {
        match self.admit_inbound_ring(channel).await {
            Ok(context) => context,
            Err(e) => {
                tracing::error!(channel_id = %channel.id, error = %e, "Inbound admission failed");
                None
            }
        }
    }

    async fn session_started(&self, call_id: Uuid) {
        if let Err(e) = self.on_call_answered(call_id).await {
            tracing::error!(call_id = %call_id, error = %e, "Answered transition failed");
        }
    }

    async fn session_ended(&self, outcome: SessionOutcome) {
        let call_outcome = Self::outcome_for(outcome.reason);
        let duration = outcome.duration.as_secs().min(u32::MAX as u64) as u32;
        if let Err(e) = self
            .on_call_ended(
                outcome.call_id,
                call_outcome,
                Some(duration),
                Some(outcome.reason.as_str()),
            )
            .await
        {
            tracing::error!(call_id = %outcome.call_id, error = %e, "Call finalization failed");
        }
    }
}
